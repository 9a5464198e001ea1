//! Fast-path arbitrage detector-executor.
//!
//! Evaluates the hot cache on every touched market. When both asks sum
//! below the threshold with enough liquidity, records a dual BUY
//! transactionally, at most once per market per rate-limit window.
//! Persistence latency directly throttles the arbitrage rate, which is
//! the intended backpressure.

use crate::cache::{HotCache, HotPrices};
use crate::error::FeedResult;
use crate::latency::{LatencySample, LatencyStats, LatencySummary};
use chrono::{DateTime, Utc};
use polyarb_core::{MarketId, Price, Size};
use polyarb_engine::{build_arb_execution, CostModel, PaperStore};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Executions kept for post-mortem inspection.
const EXECUTION_HISTORY: usize = 100;

/// Fast-path parameters.
#[derive(Debug, Clone, Copy)]
pub struct FastArbConfig {
    /// Minimum gap between executions per market.
    pub rate_limit_ms: u64,
    /// Execute when `yes_ask + no_ask` is below this.
    pub threshold: Decimal,
    /// Target order size per leg.
    pub order_size: Decimal,
    /// Skip when available size is below this.
    pub min_size: Decimal,
}

impl Default for FastArbConfig {
    fn default() -> Self {
        Self {
            rate_limit_ms: 1_000,
            threshold: Decimal::new(995, 3),
            order_size: Decimal::from(50),
            min_size: Decimal::from(10),
        }
    }
}

/// One recorded fast-path execution.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub market_id: MarketId,
    pub yes_ask: Price,
    pub no_ask: Price,
    pub sum: Decimal,
    pub size: Size,
    pub executed_at: DateTime<Utc>,
    pub total_ms: f64,
}

/// Per-message arbitrage evaluator.
pub struct FastArb {
    store: Arc<dyn PaperStore>,
    cost_model: CostModel,
    config: FastArbConfig,
    last_execution: HashMap<MarketId, Instant>,
    executions: VecDeque<ExecutionRecord>,
    latency: LatencyStats,
}

impl FastArb {
    pub fn new(store: Arc<dyn PaperStore>, cost_model: CostModel, config: FastArbConfig) -> Self {
        Self {
            store,
            cost_model,
            config,
            last_execution: HashMap::new(),
            executions: VecDeque::new(),
            latency: LatencyStats::new(),
        }
    }

    /// Evaluate one market against the cache. Returns true when a dual
    /// BUY was recorded.
    ///
    /// `receive_time` is when the triggering message arrived; the
    /// end-to-end latency is measured from it.
    pub async fn try_arbitrage(
        &mut self,
        cache: &HotCache,
        market_id: &MarketId,
        receive_time: Instant,
    ) -> FeedResult<bool> {
        let entry_time = Instant::now();

        if let Some(last) = self.last_execution.get(market_id) {
            if last.elapsed().as_millis() < u128::from(self.config.rate_limit_ms) {
                return Ok(false);
            }
        }

        let Some(prices) = cache.get(market_id) else {
            return Ok(false);
        };
        let Some((yes_ask, no_ask, available)) = self.qualify(prices) else {
            return Ok(false);
        };
        let sum = yes_ask.inner() + no_ask.inner();

        // The rate-limit window opens at execution time, successful or
        // not, so a failing store is not hammered at message rate.
        self.last_execution.insert(market_id.clone(), Instant::now());

        let exec = build_arb_execution(
            market_id,
            yes_ask,
            no_ask,
            available,
            prices.yes_bid,
            prices.no_bid,
            &self.cost_model,
        );
        let detection_ms = elapsed_ms(entry_time);

        let db_start = Instant::now();
        if let Err(e) = self.store.record_arbitrage_execution(&exec).await {
            warn!(market_id = %market_id, error = %e, "[FAST-ARB] execution missed");
            return Err(e.into());
        }
        let execution_ms = elapsed_ms(db_start);
        let total_ms = elapsed_ms(receive_time);

        self.latency.record(LatencySample {
            detection_ms,
            execution_ms,
            total_ms,
        });
        if self.executions.len() >= EXECUTION_HISTORY {
            self.executions.pop_front();
        }
        self.executions.push_back(ExecutionRecord {
            market_id: market_id.clone(),
            yes_ask,
            no_ask,
            sum,
            size: available,
            executed_at: Utc::now(),
            total_ms,
        });

        info!(
            market_id = %market_id,
            yes_ask = %yes_ask,
            no_ask = %no_ask,
            sum = %sum,
            size = %available,
            total_ms,
            "[FAST-ARB] dual BUY executed"
        );
        Ok(true)
    }

    /// Threshold and liquidity qualification against the cached legs.
    fn qualify(&self, prices: &HotPrices) -> Option<(Price, Price, Size)> {
        let yes_ask = prices.yes_ask?;
        let no_ask = prices.no_ask?;

        if yes_ask.inner() + no_ask.inner() >= self.config.threshold {
            return None;
        }

        let yes_size = prices.yes_ask_size?.inner();
        let no_size = prices.no_ask_size?.inner();
        let available = yes_size.min(no_size).min(self.config.order_size);
        if available < self.config.min_size {
            return None;
        }
        Some((yes_ask, no_ask, Size::new(available)))
    }

    pub fn latency_summary(&self) -> LatencySummary {
        self.latency.summary()
    }

    pub fn recent_executions(&self) -> impl Iterator<Item = &ExecutionRecord> {
        self.executions.iter()
    }

    pub fn execution_count(&self) -> u64 {
        self.latency.summary().executions
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1_000.0
}
