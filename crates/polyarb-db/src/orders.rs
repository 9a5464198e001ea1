//! Simulated order repository.

use crate::db::Db;
use crate::error::DbResult;
use chrono::{DateTime, Duration, Utc};
use polyarb_core::{MarketId, OrderId, OrderSide, OrderStatus, Outcome, Price, Size};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::Row;
use std::str::FromStr;
use tracing::info;

/// A new PENDING order with its placement-time book snapshot.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub market_id: MarketId,
    pub side: OrderSide,
    pub token_side: Outcome,
    pub order_price: Price,
    pub order_size: Size,
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
    pub spread: Option<Price>,
}

/// Stored order row.
#[derive(Debug, Clone)]
pub struct OrderRow {
    pub order_id: OrderId,
    pub market_id: MarketId,
    pub side: OrderSide,
    pub token_side: Outcome,
    pub order_price: Price,
    pub order_size: Size,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub fill_price: Option<Price>,
    pub fill_size: Option<Size>,
}

fn order_from_row(r: &PgRow) -> DbResult<OrderRow> {
    Ok(OrderRow {
        order_id: OrderId::from(r.get::<String, _>("order_id")),
        market_id: MarketId::from(r.get::<String, _>("market_id")),
        side: OrderSide::from_str(&r.get::<String, _>("side"))?,
        token_side: Outcome::from_str(&r.get::<String, _>("token_side"))?,
        order_price: Price::new(r.get::<Decimal, _>("order_price")),
        order_size: Size::new(r.get::<Decimal, _>("order_size")),
        status: OrderStatus::from_str(&r.get::<String, _>("status"))?,
        created_at: r.get("created_at"),
        fill_price: r.get::<Option<Decimal>, _>("fill_price").map(Price::new),
        fill_size: r.get::<Option<Decimal>, _>("fill_size").map(Size::new),
    })
}

const INSERT_ORDER_SQL: &str = "INSERT INTO paper_orders
     (order_id, market_id, side, token_side, order_price, order_size,
      status, best_bid, best_ask, spread)
 VALUES ($1, $2, $3, $4, $5, $6, 'PENDING', $7, $8, $9)";

fn bind_new_order<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    order: &'q NewOrder,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(order.order_id.as_str())
        .bind(order.market_id.as_str())
        .bind(order.side.as_str())
        .bind(order.token_side.as_str())
        .bind(order.order_price.inner())
        .bind(order.order_size.inner())
        .bind(order.best_bid.map(|p| Price::inner(&p)))
        .bind(order.best_ask.map(|p| Price::inner(&p)))
        .bind(order.spread.map(|p| Price::inner(&p)))
}

impl Db {
    /// Insert a single PENDING order. No fill logic runs here; fills are
    /// inferred later so the simulator never looks into the future.
    pub async fn insert_order(&self, order: &NewOrder) -> DbResult<()> {
        bind_new_order(sqlx::query(INSERT_ORDER_SQL), order)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Insert two PENDING orders atomically (arbitrage pair placement).
    pub async fn insert_order_pair(&self, first: &NewOrder, second: &NewOrder) -> DbResult<()> {
        let mut tx = self.pool().begin().await?;
        bind_new_order(sqlx::query(INSERT_ORDER_SQL), first)
            .execute(&mut *tx)
            .await?;
        bind_new_order(sqlx::query(INSERT_ORDER_SQL), second)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// All PENDING orders, oldest first.
    pub async fn pending_orders(&self) -> DbResult<Vec<OrderRow>> {
        let rows = sqlx::query(
            "SELECT order_id, market_id, side, token_side, order_price, order_size,
                    status, created_at, fill_price, fill_size
             FROM paper_orders WHERE status = 'PENDING'
             ORDER BY created_at ASC",
        )
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(order_from_row).collect()
    }

    /// Sweep PENDING orders older than the bound into EXPIRED.
    pub async fn expire_old_pending_orders(&self, max_age: Duration) -> DbResult<u64> {
        let cutoff = Utc::now() - max_age;
        let expired = sqlx::query(
            "UPDATE paper_orders
             SET status = 'EXPIRED', updated_at = NOW()
             WHERE status = 'PENDING' AND created_at < $1",
        )
        .bind(cutoff)
        .execute(self.pool())
        .await?
        .rows_affected();

        if expired > 0 {
            info!(expired, "[ORDER-EXPIRED] swept stale pending orders");
        }
        Ok(expired)
    }

    /// Total orders ever placed.
    pub async fn total_orders(&self) -> DbResult<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM paper_orders")
            .fetch_one(self.pool())
            .await?;
        Ok(n)
    }
}
