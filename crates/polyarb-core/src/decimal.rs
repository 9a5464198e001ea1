//! Decimal newtypes for quotes and quantities.
//!
//! Quotes on a binary market are probabilities, so a `Price` lives in
//! [0, 1] and a `Size` counts outcome tokens. Both wrap `rust_decimal`
//! so money math stays exact, and the newtypes keep the two from being
//! swapped in signatures. Raw arithmetic goes through `inner()`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! decimal_wrapper {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
            Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Decimal);

        impl $name {
            pub fn new(value: Decimal) -> Self {
                Self(value)
            }

            /// The wrapped decimal, for raw arithmetic.
            pub fn inner(&self) -> Decimal {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = rust_decimal::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }
    };
}

decimal_wrapper!(Price, "A quoted probability for one outcome leg.");
decimal_wrapper!(Size, "A quantity of outcome tokens.");

impl Price {
    /// Midpoint between a bid and an ask quote.
    pub fn mid(bid: Price, ask: Price) -> Price {
        Self((bid.0 + ask.0) / Decimal::TWO)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

/// Spread arithmetic: `ask - bid`.
impl std::ops::Sub for Price {
    type Output = Price;

    fn sub(self, rhs: Price) -> Price {
        Self(self.0 - rhs.0)
    }
}

impl Size {
    pub const ZERO: Size = Size(Decimal::ZERO);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn mid_sits_between_quotes() {
        let mid = Price::mid(Price::new(dec!(0.40)), Price::new(dec!(0.50)));
        assert_eq!(mid.inner(), dec!(0.45));
        // A locked book has mid == both quotes.
        let locked = Price::mid(Price::new(dec!(0.30)), Price::new(dec!(0.30)));
        assert_eq!(locked.inner(), dec!(0.30));
    }

    #[test]
    fn spread_via_subtraction() {
        let spread = Price::new(dec!(0.47)) - Price::new(dec!(0.45));
        assert_eq!(spread.inner(), dec!(0.02));
    }

    #[test]
    fn parses_wire_strings() {
        assert_eq!("0.485".parse::<Price>().unwrap().inner(), dec!(0.485));
        assert_eq!("120".parse::<Size>().unwrap().inner(), dec!(120));
        assert!("not-a-number".parse::<Price>().is_err());
    }

    #[test]
    fn ordering_follows_decimal() {
        assert!(Price::new(dec!(0.48)) < Price::new(dec!(0.50)));
        assert!(Size::ZERO < Size::new(dec!(1)));
    }
}
