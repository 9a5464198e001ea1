//! Trade cost model.
//!
//! Pure functions mapping a notional trade value to platform fee, fixed
//! gas, slippage, and signed net cash flow.

use polyarb_core::OrderSide;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Cost parameters. Defaults: 2% platform fee, $0.10 gas, 0.5% slippage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostModelConfig {
    pub platform_fee_pct: Decimal,
    pub gas_cost_fixed: Decimal,
    pub slippage_pct: Decimal,
}

impl Default for CostModelConfig {
    fn default() -> Self {
        Self {
            platform_fee_pct: Decimal::new(2, 2),
            gas_cost_fixed: Decimal::new(10, 2),
            slippage_pct: Decimal::new(5, 3),
        }
    }
}

/// Cost decomposition for one trade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeCosts {
    pub platform_fee: Decimal,
    pub gas_cost: Decimal,
    pub slippage_cost: Decimal,
    pub total_cost: Decimal,
}

/// Side-effect-free cost calculator.
#[derive(Debug, Clone, Copy, Default)]
pub struct CostModel {
    config: CostModelConfig,
}

impl CostModel {
    pub fn new(config: CostModelConfig) -> Self {
        Self { config }
    }

    /// Decompose the costs of a trade with the given gross value.
    pub fn costs(&self, value: Decimal) -> TradeCosts {
        let platform_fee = value * self.config.platform_fee_pct;
        let gas_cost = self.config.gas_cost_fixed;
        let slippage_cost = value * self.config.slippage_pct;
        TradeCosts {
            platform_fee,
            gas_cost,
            slippage_cost,
            total_cost: platform_fee + gas_cost + slippage_cost,
        }
    }

    /// Signed net cash flow: negative for a BUY (cash out plus costs),
    /// positive for a SELL (cash in minus costs).
    pub fn net_value(&self, value: Decimal, side: OrderSide, costs: &TradeCosts) -> Decimal {
        match side {
            OrderSide::Buy => -(value + costs.total_cost),
            OrderSide::Sell => value - costs.total_cost,
        }
    }

    /// Book-pressure multiplier on the base slippage: larger orders
    /// relative to available liquidity slip more.
    pub fn slippage_multiplier(&self, order_size: Decimal, liquidity: Decimal) -> Decimal {
        let epsilon = Decimal::new(1, 6);
        let ratio = order_size / liquidity.max(epsilon);
        if ratio < Decimal::new(1, 1) {
            Decimal::ONE
        } else if ratio < Decimal::new(25, 2) {
            Decimal::new(15, 1)
        } else if ratio < Decimal::new(5, 1) {
            Decimal::TWO
        } else {
            Decimal::from(3)
        }
    }

    /// Slippage estimate scaled by book pressure.
    pub fn slippage_estimate(
        &self,
        order_size: Decimal,
        liquidity: Decimal,
        base: Decimal,
    ) -> Decimal {
        base * self.slippage_multiplier(order_size, liquidity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cost_decomposition() {
        let model = CostModel::default();
        let costs = model.costs(dec!(14.0));
        assert_eq!(costs.platform_fee, dec!(0.280));
        assert_eq!(costs.gas_cost, dec!(0.10));
        assert_eq!(costs.slippage_cost, dec!(0.0700));
        assert_eq!(costs.total_cost, dec!(0.4500));
    }

    #[test]
    fn test_net_value_signs() {
        let model = CostModel::default();
        let value = dec!(14.0);
        let costs = model.costs(value);
        let buy = model.net_value(value, OrderSide::Buy, &costs);
        let sell = model.net_value(value, OrderSide::Sell, &costs);
        assert_eq!(buy, dec!(-14.4500));
        assert_eq!(sell, dec!(13.5500));
        // |net(BUY)| = value + total, net(SELL) = value - total
        assert_eq!(buy.abs(), value + costs.total_cost);
        assert_eq!(sell, value - costs.total_cost);
    }

    #[test]
    fn test_slippage_multiplier_tiers() {
        let model = CostModel::default();
        assert_eq!(model.slippage_multiplier(dec!(5), dec!(100)), dec!(1));
        assert_eq!(model.slippage_multiplier(dec!(20), dec!(100)), dec!(1.5));
        assert_eq!(model.slippage_multiplier(dec!(40), dec!(100)), dec!(2));
        assert_eq!(model.slippage_multiplier(dec!(80), dec!(100)), dec!(3));
    }

    #[test]
    fn test_slippage_multiplier_zero_liquidity() {
        let model = CostModel::default();
        // Degenerate liquidity maxes out the multiplier instead of dividing by zero.
        assert_eq!(model.slippage_multiplier(dec!(10), dec!(0)), dec!(3));
    }

    #[test]
    fn test_slippage_estimate() {
        let model = CostModel::default();
        assert_eq!(
            model.slippage_estimate(dec!(20), dec!(100), dec!(0.005)),
            dec!(0.0075)
        );
    }
}
