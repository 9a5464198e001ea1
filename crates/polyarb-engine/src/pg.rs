//! Postgres adapter: delegates the storage boundary to the repositories.

use crate::error::EngineResult;
use crate::store::PaperStore;
use async_trait::async_trait;
use chrono::Duration;
use polyarb_core::{MarketId, Outcome};
use polyarb_db::{
    ArbExecution, BookSnapshotRow, Db, FillExecution, NewOrder, OrderRow, PositionRow,
};
use rust_decimal::Decimal;

#[async_trait]
impl PaperStore for Db {
    async fn insert_order(&self, order: &NewOrder) -> EngineResult<()> {
        Ok(Db::insert_order(self, order).await?)
    }

    async fn insert_order_pair(&self, first: &NewOrder, second: &NewOrder) -> EngineResult<()> {
        Ok(Db::insert_order_pair(self, first, second).await?)
    }

    async fn pending_orders(&self) -> EngineResult<Vec<OrderRow>> {
        Ok(Db::pending_orders(self).await?)
    }

    async fn latest_book(
        &self,
        market_id: &MarketId,
        token_side: Outcome,
    ) -> EngineResult<Option<BookSnapshotRow>> {
        Ok(Db::latest_book(self, market_id, token_side).await?)
    }

    async fn position(
        &self,
        market_id: &MarketId,
        token_side: Outcome,
    ) -> EngineResult<Option<PositionRow>> {
        Ok(Db::position(self, market_id, token_side).await?)
    }

    async fn record_fill(&self, fill: &FillExecution) -> EngineResult<bool> {
        Ok(Db::record_fill(self, fill).await?)
    }

    async fn record_arbitrage_execution(&self, exec: &ArbExecution) -> EngineResult<()> {
        Ok(Db::record_arbitrage_execution(self, exec).await?)
    }

    async fn expire_old_pending_orders(&self, max_age: Duration) -> EngineResult<u64> {
        Ok(Db::expire_old_pending_orders(self, max_age).await?)
    }

    async fn recent_sell_exists(
        &self,
        market_id: &MarketId,
        token_side: Outcome,
        window: Duration,
    ) -> EngineResult<bool> {
        Ok(Db::recent_sell_exists(self, market_id, token_side, window).await?)
    }

    async fn mid_change_pct(
        &self,
        market_id: &MarketId,
        token_side: Outcome,
        lookback: Duration,
    ) -> EngineResult<Option<Decimal>> {
        Ok(Db::mid_change_pct(self, market_id, token_side, lookback).await?)
    }
}
