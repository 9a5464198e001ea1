//! In-memory paper store.
//!
//! Mirrors the transactional semantics of the Postgres adapter for
//! tests and offline dry-runs: each write method applies all of its
//! rows or none.

use crate::error::EngineResult;
use crate::store::PaperStore;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use polyarb_core::position::apply_trade;
use polyarb_core::{
    mark_position, pnl_pct, MarketId, OrderSide, OrderStatus, Outcome, Price, Size, TradeId,
};
use polyarb_db::{ArbExecution, BookSnapshotRow, FillExecution, NewOrder, OrderRow, PositionRow};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// A recorded trade.
#[derive(Debug, Clone)]
pub struct MemTrade {
    pub trade_id: TradeId,
    pub order_id: String,
    pub market_id: MarketId,
    pub side: OrderSide,
    pub token_side: Outcome,
    pub price: Price,
    pub size: Size,
    pub value: Decimal,
    pub total_cost: Decimal,
    pub net_value: Decimal,
    pub executed_at: DateTime<Utc>,
}

#[derive(Default)]
struct MemInner {
    orders: Vec<OrderRow>,
    trades: Vec<MemTrade>,
    positions: HashMap<(MarketId, Outcome), PositionRow>,
    books: HashMap<(MarketId, Outcome), BookSnapshotRow>,
    mids: HashMap<(MarketId, Outcome), Vec<(DateTime<Utc>, Decimal)>>,
}

/// In-memory [`PaperStore`] implementation.
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<MemInner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace the latest book for one leg.
    pub fn set_book(&self, row: BookSnapshotRow) {
        let mut inner = self.inner.lock();
        if let Some(mid) = row.mid {
            inner
                .mids
                .entry((row.market_id.clone(), row.token_side))
                .or_default()
                .push((row.scan_timestamp, mid.inner()));
        }
        inner
            .books
            .insert((row.market_id.clone(), row.token_side), row);
    }

    /// Append a historical mid observation (trend-filter input).
    pub fn push_mid(&self, market_id: &MarketId, token_side: Outcome, at: DateTime<Utc>, mid: Decimal) {
        self.inner
            .lock()
            .mids
            .entry((market_id.clone(), token_side))
            .or_default()
            .push((at, mid));
    }

    pub fn orders(&self) -> Vec<OrderRow> {
        self.inner.lock().orders.clone()
    }

    pub fn trades(&self) -> Vec<MemTrade> {
        self.inner.lock().trades.clone()
    }

    fn update_position(
        inner: &mut MemInner,
        market_id: &MarketId,
        token_side: Outcome,
        side: OrderSide,
        size: Size,
        price: Price,
    ) {
        let key = (market_id.clone(), token_side);
        let existing = inner.positions.get(&key).map(|p| p.state());
        let state = apply_trade(existing, side, size.inner(), price.inner());
        let (market_value, unrealized) = mark_position(&state, price.inner());
        inner.positions.insert(
            key,
            PositionRow {
                market_id: market_id.clone(),
                token_side,
                quantity: state.quantity,
                average_cost: state.average_cost,
                cost_basis: state.cost_basis,
                current_price: Some(price),
                market_value: Some(market_value),
                unrealized_pnl: Some(unrealized),
                unrealized_pnl_pct: pnl_pct(unrealized, state.cost_basis),
                updated_at: Utc::now(),
            },
        );
    }
}

#[async_trait]
impl PaperStore for MemStore {
    async fn insert_order(&self, order: &NewOrder) -> EngineResult<()> {
        self.inner.lock().orders.push(OrderRow {
            order_id: order.order_id.clone(),
            market_id: order.market_id.clone(),
            side: order.side,
            token_side: order.token_side,
            order_price: order.order_price,
            order_size: order.order_size,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            fill_price: None,
            fill_size: None,
        });
        Ok(())
    }

    async fn insert_order_pair(&self, first: &NewOrder, second: &NewOrder) -> EngineResult<()> {
        self.insert_order(first).await?;
        self.insert_order(second).await
    }

    async fn pending_orders(&self) -> EngineResult<Vec<OrderRow>> {
        Ok(self
            .inner
            .lock()
            .orders
            .iter()
            .filter(|o| o.status == OrderStatus::Pending)
            .cloned()
            .collect())
    }

    async fn latest_book(
        &self,
        market_id: &MarketId,
        token_side: Outcome,
    ) -> EngineResult<Option<BookSnapshotRow>> {
        Ok(self
            .inner
            .lock()
            .books
            .get(&(market_id.clone(), token_side))
            .cloned())
    }

    async fn position(
        &self,
        market_id: &MarketId,
        token_side: Outcome,
    ) -> EngineResult<Option<PositionRow>> {
        Ok(self
            .inner
            .lock()
            .positions
            .get(&(market_id.clone(), token_side))
            .cloned())
    }

    async fn record_fill(&self, fill: &FillExecution) -> EngineResult<bool> {
        let mut inner = self.inner.lock();
        let Some(order) = inner
            .orders
            .iter_mut()
            .find(|o| o.order_id == fill.order_id && o.status == OrderStatus::Pending)
        else {
            return Ok(false);
        };
        order.status = OrderStatus::Filled;
        order.fill_price = Some(fill.fill_price);
        order.fill_size = Some(fill.fill_size);

        inner.trades.push(MemTrade {
            trade_id: fill.trade_id.clone(),
            order_id: fill.order_id.as_str().to_string(),
            market_id: fill.market_id.clone(),
            side: fill.side,
            token_side: fill.token_side,
            price: fill.fill_price,
            size: fill.fill_size,
            value: fill.value,
            total_cost: fill.total_cost,
            net_value: fill.net_value,
            executed_at: Utc::now(),
        });

        Self::update_position(
            &mut inner,
            &fill.market_id,
            fill.token_side,
            fill.side,
            fill.fill_size,
            fill.fill_price,
        );
        Ok(true)
    }

    async fn record_arbitrage_execution(&self, exec: &ArbExecution) -> EngineResult<()> {
        let mut inner = self.inner.lock();
        for leg in [&exec.yes, &exec.no] {
            inner.orders.push(OrderRow {
                order_id: leg.order_id.clone(),
                market_id: exec.market_id.clone(),
                side: OrderSide::Buy,
                token_side: leg.token_side,
                order_price: leg.price,
                order_size: leg.size,
                status: OrderStatus::Filled,
                created_at: Utc::now(),
                fill_price: Some(leg.price),
                fill_size: Some(leg.size),
            });
            inner.trades.push(MemTrade {
                trade_id: leg.trade_id.clone(),
                order_id: leg.order_id.as_str().to_string(),
                market_id: exec.market_id.clone(),
                side: OrderSide::Buy,
                token_side: leg.token_side,
                price: leg.price,
                size: leg.size,
                value: leg.value,
                total_cost: leg.total_cost,
                net_value: leg.net_value,
                executed_at: Utc::now(),
            });
            Self::update_position(
                &mut inner,
                &exec.market_id,
                leg.token_side,
                OrderSide::Buy,
                leg.size,
                leg.price,
            );
        }
        Ok(())
    }

    async fn expire_old_pending_orders(&self, max_age: Duration) -> EngineResult<u64> {
        let cutoff = Utc::now() - max_age;
        let mut expired = 0u64;
        for order in &mut self.inner.lock().orders {
            if order.status == OrderStatus::Pending && order.created_at < cutoff {
                order.status = OrderStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn recent_sell_exists(
        &self,
        market_id: &MarketId,
        token_side: Outcome,
        window: Duration,
    ) -> EngineResult<bool> {
        let since = Utc::now() - window;
        Ok(self.inner.lock().trades.iter().any(|t| {
            t.market_id == *market_id
                && t.token_side == token_side
                && t.side == OrderSide::Sell
                && t.executed_at >= since
        }))
    }

    async fn mid_change_pct(
        &self,
        market_id: &MarketId,
        token_side: Outcome,
        lookback: Duration,
    ) -> EngineResult<Option<Decimal>> {
        let since = Utc::now() - lookback;
        let inner = self.inner.lock();
        let Some(series) = inner.mids.get(&(market_id.clone(), token_side)) else {
            return Ok(None);
        };
        let window: Vec<&(DateTime<Utc>, Decimal)> =
            series.iter().filter(|(at, _)| *at >= since).collect();
        if window.len() < 2 {
            return Ok(None);
        }
        let oldest = window.first().map(|(_, m)| *m).unwrap_or(Decimal::ZERO);
        let newest = window.last().map(|(_, m)| *m).unwrap_or(Decimal::ZERO);
        if oldest.is_zero() {
            return Ok(None);
        }
        Ok(Some((newest - oldest) / oldest * Decimal::from(100)))
    }
}
