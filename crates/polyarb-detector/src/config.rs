//! Batch detector configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Thresholds for the five classifiers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Snapshot lookback window.
    pub window_mins: i64,
    /// Arbitrage: `yes_ask + no_ask` below this.
    pub arbitrage_threshold: Decimal,
    /// Wide spread: `spread / mid` above this.
    pub wide_spread_threshold: Decimal,
    /// Volume spike: current over 24h-average volume at or above this.
    pub volume_spike_multiplier: Decimal,
    /// Thin book: volume floor for consideration.
    pub thin_book_min_volume: Decimal,
    /// Thin book: summed best-level liquidity below this.
    pub thin_book_max_liquidity: Decimal,
    /// Mispricing: both YES mids inside [min, max].
    pub mispricing_mid_min: Decimal,
    pub mispricing_mid_max: Decimal,
    /// Mispricing: absolute mid divergence above this.
    pub mispricing_min_diff: Decimal,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_mins: 5,
            arbitrage_threshold: Decimal::new(995, 3),
            wide_spread_threshold: Decimal::new(5, 2),
            volume_spike_multiplier: Decimal::from(3),
            thin_book_min_volume: Decimal::from(10_000),
            thin_book_max_liquidity: Decimal::from(500),
            mispricing_mid_min: Decimal::new(2, 1),
            mispricing_mid_max: Decimal::new(8, 1),
            mispricing_min_diff: Decimal::new(1, 1),
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.window_mins <= 0 {
            return Err("window_mins must be positive".to_string());
        }
        if self.arbitrage_threshold <= Decimal::ZERO || self.arbitrage_threshold > Decimal::ONE {
            return Err("arbitrage_threshold must be in (0, 1]".to_string());
        }
        if self.wide_spread_threshold <= Decimal::ZERO {
            return Err("wide_spread_threshold must be positive".to_string());
        }
        if self.volume_spike_multiplier <= Decimal::ONE {
            return Err("volume_spike_multiplier must exceed 1".to_string());
        }
        if self.mispricing_mid_min >= self.mispricing_mid_max {
            return Err("mispricing mid band is empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_validates() {
        assert!(DetectorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_bad_threshold_rejected() {
        let config = DetectorConfig {
            arbitrage_threshold: dec!(1.5),
            ..DetectorConfig::default()
        };
        assert!(config.validate().is_err());

        let config = DetectorConfig {
            volume_spike_multiplier: dec!(0.5),
            ..DetectorConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
