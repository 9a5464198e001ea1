//! Price-update processing pipeline.
//!
//! For every inbound batch: buffer for the periodic flush, merge into
//! the hot cache, then evaluate arbitrage for each touched market in
//! receive order.

use crate::cache::HotCache;
use crate::error::FeedResult;
use crate::fast_arb::{FastArb, FastArbConfig};
use crate::latency::LatencySummary;
use polyarb_core::{MarketId, PriceUpdate};
use polyarb_engine::{CostModel, PaperStore};
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

/// Single-writer owner of the cache and the fast path.
pub struct FeedProcessor {
    cache: HotCache,
    fast_arb: FastArb,
}

impl FeedProcessor {
    pub fn new(store: Arc<dyn PaperStore>, cost_model: CostModel, config: FastArbConfig) -> Self {
        Self {
            cache: HotCache::new(),
            fast_arb: FastArb::new(store, cost_model, config),
        }
    }

    /// Process one update batch. Returns the number of fast-path
    /// executions it produced.
    ///
    /// A persistence failure on one market is a missed execution; the
    /// remaining markets still evaluate.
    pub async fn on_price_updates(&mut self, updates: &[PriceUpdate]) -> u64 {
        let receive_time = Instant::now();
        let touched = self.cache.apply_batch(updates);

        let mut executed = 0u64;
        for market_id in &touched {
            match self
                .fast_arb
                .try_arbitrage(&self.cache, market_id, receive_time)
                .await
            {
                Ok(true) => executed += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(market_id = %market_id, error = %e, "[FAST-ARB] evaluation failed");
                }
            }
        }
        executed
    }

    /// Drain buffered updates for the periodic flush.
    pub fn take_flush_buffer(&mut self) -> Vec<PriceUpdate> {
        self.cache.take_flush_buffer()
    }

    /// Put failed-flush updates back at the head of the buffer.
    pub fn requeue(&mut self, updates: Vec<PriceUpdate>) {
        self.cache.requeue(updates)
    }

    pub fn cache(&self) -> &HotCache {
        &self.cache
    }

    pub fn latency_summary(&self) -> LatencySummary {
        self.fast_arb.latency_summary()
    }

    pub fn execution_count(&self) -> u64 {
        self.fast_arb.execution_count()
    }

    pub fn recent_execution_markets(&self) -> Vec<MarketId> {
        self.fast_arb
            .recent_executions()
            .map(|e| e.market_id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use polyarb_core::{OrderSide, Outcome, Price, Size, TokenId};
    use polyarb_engine::{CostModelConfig, MemStore};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn update(
        market: &str,
        outcome: Outcome,
        bid: Decimal,
        ask: Decimal,
        ask_size: Decimal,
    ) -> PriceUpdate {
        PriceUpdate {
            asset_id: TokenId::from("t"),
            market_id: polyarb_core::MarketId::from(market),
            outcome,
            best_bid: Some(Price::new(bid)),
            best_ask: Some(Price::new(ask)),
            bid_size: Some(Size::new(dec!(100))),
            ask_size: Some(Size::new(ask_size)),
            spread: Some(Price::new(ask - bid)),
            spread_pct: None,
            question: String::new(),
            category: String::new(),
            volume_24h: Decimal::ZERO,
            timestamp: Utc::now(),
        }
    }

    fn processor(store: Arc<MemStore>) -> FeedProcessor {
        FeedProcessor::new(
            store,
            CostModel::new(CostModelConfig::default()),
            FastArbConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_arbitrage_fires_with_dual_buy() {
        let store = Arc::new(MemStore::new());
        let mut processor = processor(store.clone());

        // yes_ask 0.48 + no_ask 0.50 = 0.98 < 0.995, 100 on both asks.
        let executed = processor
            .on_price_updates(&[
                update("m1", Outcome::Yes, dec!(0.46), dec!(0.48), dec!(100)),
                update("m1", Outcome::No, dec!(0.48), dec!(0.50), dec!(100)),
            ])
            .await;
        assert_eq!(executed, 1);

        // Exactly two BUY orders and two trades, sized at the config cap.
        let orders = store.orders();
        let trades = store.trades();
        assert_eq!(orders.len(), 2);
        assert_eq!(trades.len(), 2);
        assert!(trades.iter().all(|t| t.side == OrderSide::Buy));
        assert!(trades.iter().all(|t| t.size.inner() == dec!(50)));

        let yes = store
            .position(&polyarb_core::MarketId::from("m1"), Outcome::Yes)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(yes.quantity, dec!(50));
        assert_eq!(yes.average_cost, dec!(0.48));
        assert_eq!(yes.cost_basis, dec!(24.00));

        let no = store
            .position(&polyarb_core::MarketId::from("m1"), Outcome::No)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(no.quantity, dec!(50));
        assert_eq!(no.average_cost, dec!(0.50));
        assert_eq!(no.cost_basis, dec!(25.00));

        // Platform fees 0.48 + 0.50, gas 0.10 per leg.
        let platform_total: Decimal = trades.iter().map(|t| t.value * dec!(0.02)).sum();
        assert_eq!(platform_total, dec!(0.98));
        let total_costs: Decimal = trades.iter().map(|t| t.total_cost).sum();
        // 0.98 platform + 0.20 gas + 0.245 slippage
        assert_eq!(total_costs, dec!(1.4250));
    }

    #[tokio::test]
    async fn test_rate_limit_suppresses_second_execution() {
        let store = Arc::new(MemStore::new());
        let mut processor = processor(store.clone());
        let batch = [
            update("m1", Outcome::Yes, dec!(0.46), dec!(0.48), dec!(100)),
            update("m1", Outcome::No, dec!(0.48), dec!(0.50), dec!(100)),
        ];

        assert_eq!(processor.on_price_updates(&batch).await, 1);
        // Identical delivery inside the window: no new rows.
        assert_eq!(processor.on_price_updates(&batch).await, 0);
        assert_eq!(store.orders().len(), 2);
        assert_eq!(store.trades().len(), 2);
    }

    #[tokio::test]
    async fn test_sum_at_threshold_skipped() {
        let store = Arc::new(MemStore::new());
        let mut processor = processor(store.clone());

        // 0.50 + 0.495 = 0.995, not strictly below the threshold.
        let executed = processor
            .on_price_updates(&[
                update("m1", Outcome::Yes, dec!(0.48), dec!(0.50), dec!(100)),
                update("m1", Outcome::No, dec!(0.47), dec!(0.495), dec!(100)),
            ])
            .await;
        assert_eq!(executed, 0);
        assert!(store.orders().is_empty());
    }

    #[tokio::test]
    async fn test_thin_ask_skipped() {
        let store = Arc::new(MemStore::new());
        let mut processor = processor(store.clone());

        // min(8, 100, 50) = 8 < 10.
        let executed = processor
            .on_price_updates(&[
                update("m1", Outcome::Yes, dec!(0.46), dec!(0.48), dec!(8)),
                update("m1", Outcome::No, dec!(0.48), dec!(0.50), dec!(100)),
            ])
            .await;
        assert_eq!(executed, 0);
        assert!(store.trades().is_empty());
    }

    #[tokio::test]
    async fn test_one_sided_cache_skipped() {
        let store = Arc::new(MemStore::new());
        let mut processor = processor(store.clone());

        let executed = processor
            .on_price_updates(&[update("m1", Outcome::Yes, dec!(0.46), dec!(0.48), dec!(100))])
            .await;
        assert_eq!(executed, 0);
    }

    #[tokio::test]
    async fn test_flush_buffer_collects_batches() {
        let store = Arc::new(MemStore::new());
        let mut processor = processor(store);

        processor
            .on_price_updates(&[update("m1", Outcome::Yes, dec!(0.60), dec!(0.62), dec!(100))])
            .await;
        processor
            .on_price_updates(&[update("m1", Outcome::No, dec!(0.40), dec!(0.42), dec!(100))])
            .await;

        let buffered = processor.take_flush_buffer();
        assert_eq!(buffered.len(), 2);
        assert_eq!(processor.take_flush_buffer().len(), 0);
    }
}
