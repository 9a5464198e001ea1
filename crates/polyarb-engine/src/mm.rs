//! Market-making quote computation.
//!
//! Joins or improves the current best bid/ask depending on how wide the
//! book is, with hard bounds so quotes stay inside (0, 1).

use polyarb_core::Price;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Quote parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketMakingConfig {
    /// Minimum price increment.
    pub min_tick: Decimal,
    /// Below this spread, improve by exactly one tick.
    pub narrow_spread: Decimal,
    /// Tick improvement is capped at this fraction of the spread.
    pub tick_cap_fraction: Decimal,
    /// BUY quotes never exceed this.
    pub max_buy_price: Decimal,
    /// SELL quotes never fall below this.
    pub min_sell_price: Decimal,
    /// Skip placement when `size * best_bid` is below this notional
    /// (gas would eat the trade).
    pub min_notional_usd: Decimal,
}

impl Default for MarketMakingConfig {
    fn default() -> Self {
        Self {
            min_tick: Decimal::new(1, 3),
            narrow_spread: Decimal::new(5, 3),
            tick_cap_fraction: Decimal::new(4, 1),
            max_buy_price: Decimal::new(99, 2),
            min_sell_price: Decimal::new(1, 2),
            min_notional_usd: Decimal::from(5),
        }
    }
}

/// Compute the BUY/SELL quote pair for one leg.
///
/// - spread <= min tick: join best bid and best ask exactly
/// - spread < narrow threshold: improve one tick on each side
/// - otherwise: improve by `tick_improvement` clamped to
///   [min tick, tick_cap_fraction * spread]
///
/// Returns `None` when the adjusted quotes cross or pin.
pub fn compute_quotes(
    best_bid: Price,
    best_ask: Price,
    tick_improvement: Decimal,
    config: &MarketMakingConfig,
) -> Option<(Price, Price)> {
    let spread = best_ask.inner() - best_bid.inner();
    if spread < Decimal::ZERO {
        return None;
    }

    let (mut buy, mut sell) = if spread <= config.min_tick {
        (best_bid.inner(), best_ask.inner())
    } else if spread < config.narrow_spread {
        (
            best_bid.inner() + config.min_tick,
            best_ask.inner() - config.min_tick,
        )
    } else {
        let adjusted_tick = tick_improvement
            .max(config.min_tick)
            .min(config.tick_cap_fraction * spread);
        (
            best_bid.inner() + adjusted_tick,
            best_ask.inner() - adjusted_tick,
        )
    };

    buy = buy.min(config.max_buy_price);
    sell = sell.max(config.min_sell_price);

    if sell <= buy {
        return None;
    }
    Some((Price::new(buy), Price::new(sell)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config() -> MarketMakingConfig {
        MarketMakingConfig::default()
    }

    #[test]
    fn test_join_at_minimal_spread() {
        let (buy, sell) = compute_quotes(
            Price::new(dec!(0.500)),
            Price::new(dec!(0.501)),
            dec!(0.002),
            &config(),
        )
        .unwrap();
        assert_eq!(buy.inner(), dec!(0.500));
        assert_eq!(sell.inner(), dec!(0.501));
    }

    #[test]
    fn test_one_tick_inside_narrow_spread() {
        let (buy, sell) = compute_quotes(
            Price::new(dec!(0.500)),
            Price::new(dec!(0.504)),
            dec!(0.002),
            &config(),
        )
        .unwrap();
        assert_eq!(buy.inner(), dec!(0.501));
        assert_eq!(sell.inner(), dec!(0.503));
    }

    #[test]
    fn test_wide_spread_uses_clamped_improvement() {
        // Spread 0.10; cap = 0.04; requested 0.06 clamps to 0.04.
        let (buy, sell) = compute_quotes(
            Price::new(dec!(0.40)),
            Price::new(dec!(0.50)),
            dec!(0.06),
            &config(),
        )
        .unwrap();
        assert_eq!(buy.inner(), dec!(0.44));
        assert_eq!(sell.inner(), dec!(0.46));
    }

    #[test]
    fn test_tick_improvement_floor() {
        // Requested improvement below min tick rounds up to min tick.
        let (buy, sell) = compute_quotes(
            Price::new(dec!(0.40)),
            Price::new(dec!(0.50)),
            dec!(0.0001),
            &config(),
        )
        .unwrap();
        assert_eq!(buy.inner(), dec!(0.401));
        assert_eq!(sell.inner(), dec!(0.499));
    }

    #[test]
    fn test_buy_capped_near_one() {
        // Spread 0.014, improvement clamps to 0.0056; raw buy 0.9906 caps at 0.99.
        let (buy, sell) = compute_quotes(
            Price::new(dec!(0.985)),
            Price::new(dec!(0.999)),
            dec!(0.01),
            &config(),
        )
        .unwrap();
        assert_eq!(buy.inner(), dec!(0.99));
        assert_eq!(sell.inner(), dec!(0.9934));
    }

    #[test]
    fn test_pinned_quotes_rejected() {
        // Improving inside a 0.002 spread meets in the middle: skipped.
        assert!(compute_quotes(
            Price::new(dec!(0.500)),
            Price::new(dec!(0.502)),
            dec!(0.002),
            &config(),
        )
        .is_none());
    }

    #[test]
    fn test_crossed_book_rejected() {
        assert!(compute_quotes(
            Price::new(dec!(0.50)),
            Price::new(dec!(0.49)),
            dec!(0.002),
            &config(),
        )
        .is_none());
    }
}
