//! Risk gates for market-making BUY orders.
//!
//! All gates must pass before a BUY is placed. The SELL path has no
//! gates: closing exposure is always permitted.

use crate::error::EngineResult;
use crate::store::PaperStore;
use chrono::Duration;
use polyarb_core::{MarketId, Outcome};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Gate configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskGateConfig {
    /// Hard position cap per `(market, leg)`.
    pub max_position_quantity: Decimal,
    /// Stop-loss: block BUYs when unrealized pnl pct drops below this.
    pub stop_loss_pnl_pct: Decimal,
    /// Balanced trading: a SELL must have executed within this window
    /// for further BUYs into an existing position.
    pub balanced_trading_window_mins: i64,
    /// Trend filter lookback.
    pub trend_lookback_mins: i64,
    /// Trend filter: block BUYs when the mid dropped below this percent
    /// change over the lookback.
    pub trend_drop_pct: Decimal,
}

impl Default for RiskGateConfig {
    fn default() -> Self {
        Self {
            max_position_quantity: Decimal::from(300),
            stop_loss_pnl_pct: Decimal::new(-5, 2),
            balanced_trading_window_mins: 10,
            trend_lookback_mins: 30,
            trend_drop_pct: Decimal::from(-5),
        }
    }
}

/// Result of a gate check.
#[derive(Debug, Clone, PartialEq)]
pub enum GateResult {
    Pass,
    Block(String),
}

impl GateResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// BUY-side gate battery.
#[derive(Debug, Clone)]
pub struct RiskGates {
    config: RiskGateConfig,
}

impl RiskGates {
    pub fn new(config: RiskGateConfig) -> Self {
        Self { config }
    }

    /// Run all gates for a prospective BUY on one leg.
    pub async fn check_buy<S: PaperStore + ?Sized>(
        &self,
        store: &S,
        market_id: &MarketId,
        token_side: Outcome,
    ) -> EngineResult<GateResult> {
        let position = store.position(market_id, token_side).await?;

        if let Some(pos) = &position {
            // 1. Hard position cap.
            if pos.quantity >= self.config.max_position_quantity {
                return Ok(GateResult::Block(format!(
                    "position cap: quantity {} >= {}",
                    pos.quantity, self.config.max_position_quantity
                )));
            }

            // 2. Stop-loss on a losing long.
            if pos.quantity > Decimal::ZERO {
                if let Some(pct) = pos.unrealized_pnl_pct {
                    if pct < self.config.stop_loss_pnl_pct {
                        return Ok(GateResult::Block(format!(
                            "stop loss: unrealized pnl pct {pct}"
                        )));
                    }
                }
            }

            // 3. Balanced trading: no piling onto a position that has not
            //    sold anything recently.
            if pos.quantity > Decimal::ZERO {
                let window = Duration::minutes(self.config.balanced_trading_window_mins);
                if !store.recent_sell_exists(market_id, token_side, window).await? {
                    return Ok(GateResult::Block(format!(
                        "balanced trading: no SELL in last {} min",
                        self.config.balanced_trading_window_mins
                    )));
                }
            }
        }

        // 4. Trend filter: do not buy into a falling leg.
        let lookback = Duration::minutes(self.config.trend_lookback_mins);
        if let Some(change) = store.mid_change_pct(market_id, token_side, lookback).await? {
            if change < self.config.trend_drop_pct {
                return Ok(GateResult::Block(format!(
                    "trend filter: mid changed {change:.2}% over {} min",
                    self.config.trend_lookback_mins
                )));
            }
        }

        debug!(market_id = %market_id, token_side = %token_side, "BUY gates passed");
        Ok(GateResult::Pass)
    }
}
