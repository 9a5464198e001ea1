//! Market and outcome-leg identifiers and book types.
//!
//! A binary market has exactly two outcome legs, YES and NO, each with a
//! stable per-exchange token id. Prices are decimal probabilities; the pair
//! sums to at most 1 at resolution.

use crate::decimal::{Price, Size};
use crate::error::CoreError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// External market identifier (the exchange's condition id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketId(String);

impl MarketId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MarketId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MarketId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Per-exchange token id for one outcome leg of a market.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(String);

impl TokenId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TokenId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TokenId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Outcome leg of a binary market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Yes,
    No,
}

impl Outcome {
    /// Returns the complementary leg.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Yes => Self::No,
            Self::No => Self::Yes,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "YES",
            Self::No => "NO",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "YES" => Ok(Self::Yes),
            "NO" => Ok(Self::No),
            other => Err(CoreError::InvalidOutcome(other.to_string())),
        }
    }
}

/// Metadata for a subscribed asset (one outcome leg).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetInfo {
    /// Token id on the exchange.
    pub token_id: TokenId,
    /// Owning market.
    pub market_id: MarketId,
    /// Which leg this token represents.
    pub outcome: Outcome,
    /// Human-readable question.
    pub question: String,
    /// Category tag.
    pub category: String,
    /// 24h notional volume.
    pub volume_24h: Decimal,
}

/// One level of an orderbook: price in [0, 1], size >= 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: Price,
    pub size: Size,
}

/// Top-of-book view of one outcome leg.
///
/// Any side may be absent until first observation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TopOfBook {
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
    pub bid_size: Option<Size>,
    pub ask_size: Option<Size>,
}

impl TopOfBook {
    /// Spread: ask - bid. Requires both sides.
    pub fn spread(&self) -> Option<Price> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Midpoint of the book. Requires both sides.
    pub fn mid(&self) -> Option<Price> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => Some(Price::mid(bid, ask)),
            _ => None,
        }
    }

    /// Spread relative to mid: spread / mid.
    pub fn spread_pct(&self) -> Option<Decimal> {
        let spread = self.spread()?;
        let mid = self.mid()?;
        if mid.is_zero() {
            return None;
        }
        Some(spread.inner() / mid.inner())
    }

    /// Both sides observed.
    pub fn is_complete(&self) -> bool {
        self.best_bid.is_some() && self.best_ask.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_outcome_opposite() {
        assert_eq!(Outcome::Yes.opposite(), Outcome::No);
        assert_eq!(Outcome::No.opposite(), Outcome::Yes);
    }

    #[test]
    fn test_outcome_parse_roundtrip() {
        assert_eq!("YES".parse::<Outcome>().unwrap(), Outcome::Yes);
        assert_eq!("no".parse::<Outcome>().unwrap(), Outcome::No);
        assert!("MAYBE".parse::<Outcome>().is_err());
    }

    #[test]
    fn test_top_of_book_spread_pct() {
        let book = TopOfBook {
            best_bid: Some(Price::new(dec!(0.40))),
            best_ask: Some(Price::new(dec!(0.50))),
            bid_size: Some(Size::new(dec!(100))),
            ask_size: Some(Size::new(dec!(80))),
        };
        assert_eq!(book.spread().unwrap().inner(), dec!(0.10));
        assert_eq!(book.mid().unwrap().inner(), dec!(0.45));
        // 0.10 / 0.45
        let pct = book.spread_pct().unwrap();
        assert!(pct > dec!(0.22) && pct < dec!(0.223));
    }

    #[test]
    fn test_top_of_book_one_sided() {
        let book = TopOfBook {
            best_bid: Some(Price::new(dec!(0.40))),
            ..Default::default()
        };
        assert!(book.spread().is_none());
        assert!(book.mid().is_none());
        assert!(!book.is_complete());
    }
}
