//! Opportunity classification types shared between the batch detector
//! and the persistence layer.

use crate::error::CoreError;
use crate::market::MarketId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of detected opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpportunityKind {
    Arbitrage,
    WideSpread,
    VolumeSpike,
    ThinBook,
    Mispricing,
}

impl OpportunityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Arbitrage => "ARBITRAGE",
            Self::WideSpread => "WIDE_SPREAD",
            Self::VolumeSpike => "VOLUME_SPIKE",
            Self::ThinBook => "THIN_BOOK",
            Self::Mispricing => "MISPRICING",
        }
    }

    pub const ALL: [OpportunityKind; 5] = [
        Self::Arbitrage,
        Self::WideSpread,
        Self::VolumeSpike,
        Self::ThinBook,
        Self::Mispricing,
    ];
}

impl fmt::Display for OpportunityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpportunityKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ARBITRAGE" => Ok(Self::Arbitrage),
            "WIDE_SPREAD" => Ok(Self::WideSpread),
            "VOLUME_SPIKE" => Ok(Self::VolumeSpike),
            "THIN_BOOK" => Ok(Self::ThinBook),
            "MISPRICING" => Ok(Self::Mispricing),
            other => Err(CoreError::InvalidOpportunityKind(other.to_string())),
        }
    }
}

/// One opportunity observed during a detection pass.
///
/// Optional fields apply only to some kinds (e.g. `yes_no_sum` is
/// arbitrage-only, `spread_percent` is wide-spread-only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedOpportunity {
    pub kind: OpportunityKind,
    pub market_id: MarketId,
    pub yes_no_sum: Option<Decimal>,
    pub spread_percent: Option<Decimal>,
    pub available_liquidity: Option<Decimal>,
    pub market_volume: Option<Decimal>,
    pub theoretical_profit_usd: Option<Decimal>,
}

impl ObservedOpportunity {
    /// Minimal record with all metrics unset.
    pub fn new(kind: OpportunityKind, market_id: MarketId) -> Self {
        Self {
            kind,
            market_id,
            yes_no_sum: None,
            spread_percent: None,
            available_liquidity: None,
            market_volume: None,
            theoretical_profit_usd: None,
        }
    }

    /// Diff key: one active row per `(market_id, kind)` at any instant.
    pub fn key(&self) -> (MarketId, OpportunityKind) {
        (self.market_id.clone(), self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_roundtrip() {
        for kind in OpportunityKind::ALL {
            assert_eq!(kind.as_str().parse::<OpportunityKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_kind_rejects_unknown() {
        assert!("SOMETHING_ELSE".parse::<OpportunityKind>().is_err());
    }
}
