//! Transactional execution writes.
//!
//! A fill is one transaction: order flips to FILLED, its trade is
//! inserted, and the position absorbs the trade. A reader never observes
//! a trade without its owning order being FILLED or its position updated.
//! The fast-path arbitrage execution writes both legs the same way in a
//! single transaction.

use crate::db::Db;
use crate::error::DbResult;
use crate::positions::{position_from_row, upsert_position_exec};
use polyarb_core::position::apply_trade;
use polyarb_core::{MarketId, OrderId, OrderSide, Outcome, Price, Size, TradeId};
use rust_decimal::Decimal;
use sqlx::{Postgres, Transaction};
use tracing::info;

/// A fill of an existing PENDING order, with its cost decomposition.
#[derive(Debug, Clone)]
pub struct FillExecution {
    pub order_id: OrderId,
    pub trade_id: TradeId,
    pub market_id: MarketId,
    pub side: OrderSide,
    pub token_side: Outcome,
    pub fill_price: Price,
    pub fill_size: Size,
    pub value: Decimal,
    pub platform_fee: Decimal,
    pub gas_cost: Decimal,
    pub slippage_cost: Decimal,
    pub total_cost: Decimal,
    pub net_value: Decimal,
}

/// One leg of a fast-path arbitrage execution (immediate BUY at the ask).
#[derive(Debug, Clone)]
pub struct ArbLeg {
    pub order_id: OrderId,
    pub trade_id: TradeId,
    pub token_side: Outcome,
    pub price: Price,
    pub size: Size,
    pub value: Decimal,
    pub platform_fee: Decimal,
    pub gas_cost: Decimal,
    pub slippage_cost: Decimal,
    pub total_cost: Decimal,
    pub net_value: Decimal,
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
}

/// Paired immediate-fill BUYs on both legs of one market.
#[derive(Debug, Clone)]
pub struct ArbExecution {
    pub market_id: MarketId,
    pub yes: ArbLeg,
    pub no: ArbLeg,
}

async fn insert_trade(
    tx: &mut Transaction<'_, Postgres>,
    trade_id: &TradeId,
    order_id: &OrderId,
    market_id: &MarketId,
    side: OrderSide,
    token_side: Outcome,
    price: Price,
    size: Size,
    value: Decimal,
    platform_fee: Decimal,
    gas_cost: Decimal,
    slippage_cost: Decimal,
    total_cost: Decimal,
    net_value: Decimal,
) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO paper_trades
             (trade_id, order_id, market_id, side, token_side, price, size, value,
              platform_fee, gas_cost, slippage_cost, total_cost, net_value)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
    )
    .bind(trade_id.as_str())
    .bind(order_id.as_str())
    .bind(market_id.as_str())
    .bind(side.as_str())
    .bind(token_side.as_str())
    .bind(price.inner())
    .bind(size.inner())
    .bind(value)
    .bind(platform_fee)
    .bind(gas_cost)
    .bind(slippage_cost)
    .bind(total_cost)
    .bind(net_value)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn apply_position_trade(
    tx: &mut Transaction<'_, Postgres>,
    market_id: &MarketId,
    token_side: Outcome,
    side: OrderSide,
    size: Size,
    price: Price,
) -> DbResult<()> {
    let existing = sqlx::query(
        "SELECT market_id, token_side, quantity, average_cost, cost_basis,
                current_price, market_value, unrealized_pnl, unrealized_pnl_pct, updated_at
         FROM paper_positions
         WHERE market_id = $1 AND token_side = $2
         FOR UPDATE",
    )
    .bind(market_id.as_str())
    .bind(token_side.as_str())
    .fetch_optional(&mut **tx)
    .await?
    .as_ref()
    .map(position_from_row)
    .transpose()?;

    let state = apply_trade(
        existing.map(|p| p.state()),
        side,
        size.inner(),
        price.inner(),
    );
    upsert_position_exec(&mut **tx, market_id, token_side, &state, price).await
}

impl Db {
    /// Record a fill atomically. Returns false when the order was no
    /// longer PENDING (already terminal), in which case nothing is
    /// written.
    pub async fn record_fill(&self, fill: &FillExecution) -> DbResult<bool> {
        let mut tx = self.pool().begin().await?;

        let updated = sqlx::query(
            "UPDATE paper_orders SET
                 status = 'FILLED', fill_price = $2, fill_size = $3, updated_at = NOW()
             WHERE order_id = $1 AND status = 'PENDING'",
        )
        .bind(fill.order_id.as_str())
        .bind(fill.fill_price.inner())
        .bind(fill.fill_size.inner())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        insert_trade(
            &mut tx,
            &fill.trade_id,
            &fill.order_id,
            &fill.market_id,
            fill.side,
            fill.token_side,
            fill.fill_price,
            fill.fill_size,
            fill.value,
            fill.platform_fee,
            fill.gas_cost,
            fill.slippage_cost,
            fill.total_cost,
            fill.net_value,
        )
        .await?;

        apply_position_trade(
            &mut tx,
            &fill.market_id,
            fill.token_side,
            fill.side,
            fill.fill_size,
            fill.fill_price,
        )
        .await?;

        tx.commit().await?;
        info!(
            order_id = %fill.order_id,
            market_id = %fill.market_id,
            side = %fill.side,
            token_side = %fill.token_side,
            price = %fill.fill_price,
            size = %fill.fill_size,
            "[ORDER-FILLED] fill recorded"
        );
        Ok(true)
    }

    /// Record a fast-path arbitrage execution: two BUY orders inserted
    /// already FILLED, two trades, two position updates, one transaction.
    pub async fn record_arbitrage_execution(&self, exec: &ArbExecution) -> DbResult<()> {
        let mut tx = self.pool().begin().await?;

        for leg in [&exec.yes, &exec.no] {
            sqlx::query(
                "INSERT INTO paper_orders
                     (order_id, market_id, side, token_side, order_price, order_size,
                      status, fill_price, fill_size, best_bid, best_ask, spread)
                 VALUES ($1, $2, 'BUY', $3, $4, $5, 'FILLED', $4, $5, $6, $7, $8)",
            )
            .bind(leg.order_id.as_str())
            .bind(exec.market_id.as_str())
            .bind(leg.token_side.as_str())
            .bind(leg.price.inner())
            .bind(leg.size.inner())
            .bind(leg.best_bid.map(|p| Price::inner(&p)))
            .bind(leg.best_ask.map(|p| Price::inner(&p)))
            .bind(match (leg.best_bid, leg.best_ask) {
                (Some(bid), Some(ask)) => Some((ask - bid).inner()),
                _ => None,
            })
            .execute(&mut *tx)
            .await?;

            insert_trade(
                &mut tx,
                &leg.trade_id,
                &leg.order_id,
                &exec.market_id,
                OrderSide::Buy,
                leg.token_side,
                leg.price,
                leg.size,
                leg.value,
                leg.platform_fee,
                leg.gas_cost,
                leg.slippage_cost,
                leg.total_cost,
                leg.net_value,
            )
            .await?;

            apply_position_trade(
                &mut tx,
                &exec.market_id,
                leg.token_side,
                OrderSide::Buy,
                leg.size,
                leg.price,
            )
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
