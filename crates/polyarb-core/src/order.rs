//! Order sides, statuses, and entity identifiers.

use crate::error::CoreError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Which way an order trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Apply this side's direction to a magnitude: a buy adds to a
    /// position, a sell subtracts from it.
    pub fn signed(&self, magnitude: Decimal) -> Decimal {
        match self {
            Self::Buy => magnitude,
            Self::Sell => -magnitude,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderSide {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            other => Err(CoreError::InvalidSide(other.to_string())),
        }
    }
}

/// Simulated order status.
///
/// Transitions only PENDING -> {FILLED, CANCELLED, EXPIRED};
/// terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether a transition from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(self, Self::Pending) && next.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Filled => "FILLED",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "FILLED" => Ok(Self::Filled),
            "CANCELLED" => Ok(Self::Cancelled),
            "EXPIRED" => Ok(Self::Expired),
            other => Err(CoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// Generates a prefixed entity id type backed by a random v4 UUID.
/// Uniqueness rests on the UUID alone, so ids survive replays, retries,
/// and clock skew.
macro_rules! entity_id {
    ($name:ident, $prefix:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Mint a fresh id with this type's prefix.
            pub fn generate() -> Self {
                Self(format!(concat!($prefix, "-{}"), Uuid::new_v4().simple()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        /// Rehydrate an id read back from storage.
        impl From<String> for $name {
            fn from(stored: String) -> Self {
                Self(stored)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

entity_id!(OrderId, "ord", "Identifier of one simulated order.");
entity_id!(TradeId, "trd", "Identifier of one simulated trade.");

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashSet;

    #[test]
    fn signed_magnitudes() {
        assert_eq!(OrderSide::Buy.signed(dec!(50)), dec!(50));
        assert_eq!(OrderSide::Sell.signed(dec!(50)), dec!(-50));
        assert_eq!(OrderSide::Sell.signed(dec!(0)), dec!(0));
    }

    #[test]
    fn side_survives_sql_roundtrip() {
        assert_eq!("BUY".parse::<OrderSide>().unwrap(), OrderSide::Buy);
        assert_eq!("sell".parse::<OrderSide>().unwrap(), OrderSide::Sell);
        assert!("HOLD".parse::<OrderSide>().is_err());
    }

    #[test]
    fn pending_is_the_only_open_status() {
        assert!(!OrderStatus::Pending.is_terminal());
        for terminal in [
            OrderStatus::Filled,
            OrderStatus::Cancelled,
            OrderStatus::Expired,
        ] {
            assert!(terminal.is_terminal());
            assert!(OrderStatus::Pending.can_transition_to(terminal));
            // Terminal states are absorbing.
            assert!(!terminal.can_transition_to(OrderStatus::Pending));
            assert!(!terminal.can_transition_to(OrderStatus::Filled));
        }
    }

    #[test]
    fn status_survives_sql_roundtrip() {
        for status in ["PENDING", "FILLED", "CANCELLED", "EXPIRED"] {
            assert_eq!(status.parse::<OrderStatus>().unwrap().as_str(), status);
        }
        assert!("OPEN".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn minted_ids_are_prefixed_and_distinct() {
        let ids: HashSet<String> = (0..64)
            .map(|_| OrderId::generate().as_str().to_string())
            .collect();
        assert_eq!(ids.len(), 64);
        assert!(ids.iter().all(|id| id.starts_with("ord-")));
        assert!(TradeId::generate().as_str().starts_with("trd-"));
    }

    #[test]
    fn stored_ids_rehydrate_unchanged() {
        let minted = OrderId::generate();
        let rehydrated = OrderId::from(minted.as_str().to_string());
        assert_eq!(minted, rehydrated);
    }
}
