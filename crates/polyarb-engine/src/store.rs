//! Storage boundary for the simulated execution engine.
//!
//! The trait is deliberately coarse: every multi-row write is one method,
//! so an implementation can make it one transaction. A reader never
//! observes a trade without its owning order FILLED or its position
//! updated.

use crate::error::EngineResult;
use async_trait::async_trait;
use chrono::Duration;
use polyarb_core::{MarketId, Outcome};
use polyarb_db::{ArbExecution, BookSnapshotRow, FillExecution, NewOrder, OrderRow, PositionRow};
use rust_decimal::Decimal;

/// Paper-book storage operations used by the engine and the fast path.
#[async_trait]
pub trait PaperStore: Send + Sync {
    /// Insert a single PENDING order.
    async fn insert_order(&self, order: &NewOrder) -> EngineResult<()>;

    /// Insert two PENDING orders atomically.
    async fn insert_order_pair(&self, first: &NewOrder, second: &NewOrder) -> EngineResult<()>;

    /// All PENDING orders, oldest first.
    async fn pending_orders(&self) -> EngineResult<Vec<OrderRow>>;

    /// Latest stored orderbook for one leg.
    async fn latest_book(
        &self,
        market_id: &MarketId,
        token_side: Outcome,
    ) -> EngineResult<Option<BookSnapshotRow>>;

    /// Current position for one leg.
    async fn position(
        &self,
        market_id: &MarketId,
        token_side: Outcome,
    ) -> EngineResult<Option<PositionRow>>;

    /// Record a fill atomically: order to FILLED, trade inserted,
    /// position updated. Returns false when the order was not PENDING.
    async fn record_fill(&self, fill: &FillExecution) -> EngineResult<bool>;

    /// Record a fast-path arbitrage execution atomically: two orders
    /// inserted FILLED, two trades, two position updates.
    async fn record_arbitrage_execution(&self, exec: &ArbExecution) -> EngineResult<()>;

    /// Sweep PENDING orders older than the bound into EXPIRED.
    async fn expire_old_pending_orders(&self, max_age: Duration) -> EngineResult<u64>;

    /// Whether a SELL trade executed for this leg within the window.
    async fn recent_sell_exists(
        &self,
        market_id: &MarketId,
        token_side: Outcome,
        window: Duration,
    ) -> EngineResult<bool>;

    /// Mid-price change for one leg over a lookback window, in percent.
    async fn mid_change_pct(
        &self,
        market_id: &MarketId,
        token_side: Outcome,
        lookback: Duration,
    ) -> EngineResult<Option<Decimal>>;
}
