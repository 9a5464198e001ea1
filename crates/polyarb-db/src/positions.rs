//! Position repository.
//!
//! One row per `(market_id, token_side)`. Rows persist when quantity
//! returns to zero (dormant) and are updated in the same transaction
//! that records the trade that moved them.

use crate::db::Db;
use crate::error::DbResult;
use chrono::{DateTime, Duration, Utc};
use polyarb_core::position::{mark_position, pnl_pct, PositionState};
use polyarb_core::{MarketId, Outcome, Price};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::Row;
use std::str::FromStr;

/// Stored position row.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRow {
    pub market_id: MarketId,
    pub token_side: Outcome,
    pub quantity: Decimal,
    pub average_cost: Decimal,
    pub cost_basis: Decimal,
    pub current_price: Option<Price>,
    pub market_value: Option<Decimal>,
    pub unrealized_pnl: Option<Decimal>,
    pub unrealized_pnl_pct: Option<Decimal>,
    pub updated_at: DateTime<Utc>,
}

impl PositionRow {
    pub fn state(&self) -> PositionState {
        PositionState {
            quantity: self.quantity,
            average_cost: self.average_cost,
            cost_basis: self.cost_basis,
        }
    }
}

pub(crate) fn position_from_row(r: &PgRow) -> DbResult<PositionRow> {
    Ok(PositionRow {
        market_id: MarketId::from(r.get::<String, _>("market_id")),
        token_side: Outcome::from_str(&r.get::<String, _>("token_side"))?,
        quantity: r.get("quantity"),
        average_cost: r.get("average_cost"),
        cost_basis: r.get("cost_basis"),
        current_price: r.get::<Option<Decimal>, _>("current_price").map(Price::new),
        market_value: r.get("market_value"),
        unrealized_pnl: r.get("unrealized_pnl"),
        unrealized_pnl_pct: r.get("unrealized_pnl_pct"),
        updated_at: r.get("updated_at"),
    })
}

const SELECT_POSITION_SQL: &str = "SELECT market_id, token_side, quantity, average_cost, cost_basis,
        current_price, market_value, unrealized_pnl, unrealized_pnl_pct, updated_at
 FROM paper_positions";

/// Upsert a position with its derived mark figures, on any executor.
///
/// The pnl percentage is clamped to the stored column range so a
/// near-zero basis cannot overflow it.
pub(crate) async fn upsert_position_exec<'e, E>(
    executor: E,
    market_id: &MarketId,
    token_side: Outcome,
    state: &PositionState,
    current_price: Price,
) -> DbResult<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let (market_value, unrealized) = mark_position(state, current_price.inner());
    let pct = pnl_pct(unrealized, state.cost_basis);

    sqlx::query(
        "INSERT INTO paper_positions
             (market_id, token_side, quantity, average_cost, cost_basis,
              current_price, market_value, unrealized_pnl, unrealized_pnl_pct, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
         ON CONFLICT (market_id, token_side) DO UPDATE SET
             quantity = EXCLUDED.quantity,
             average_cost = EXCLUDED.average_cost,
             cost_basis = EXCLUDED.cost_basis,
             current_price = EXCLUDED.current_price,
             market_value = EXCLUDED.market_value,
             unrealized_pnl = EXCLUDED.unrealized_pnl,
             unrealized_pnl_pct = EXCLUDED.unrealized_pnl_pct,
             updated_at = NOW()",
    )
    .bind(market_id.as_str())
    .bind(token_side.as_str())
    .bind(state.quantity)
    .bind(state.average_cost)
    .bind(state.cost_basis)
    .bind(current_price.inner())
    .bind(market_value)
    .bind(unrealized)
    .bind(pct)
    .execute(executor)
    .await?;
    Ok(())
}

impl Db {
    /// Position for one leg, if a row exists.
    pub async fn position(
        &self,
        market_id: &MarketId,
        token_side: Outcome,
    ) -> DbResult<Option<PositionRow>> {
        let row = sqlx::query(&format!(
            "{SELECT_POSITION_SQL} WHERE market_id = $1 AND token_side = $2"
        ))
        .bind(market_id.as_str())
        .bind(token_side.as_str())
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(position_from_row).transpose()
    }

    /// All positions with non-zero quantity.
    pub async fn open_positions(&self) -> DbResult<Vec<PositionRow>> {
        let rows = sqlx::query(&format!("{SELECT_POSITION_SQL} WHERE quantity <> 0"))
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(position_from_row).collect()
    }

    /// Upsert outside a fill transaction (mark-to-market refresh).
    pub async fn upsert_position(
        &self,
        market_id: &MarketId,
        token_side: Outcome,
        state: &PositionState,
        current_price: Price,
    ) -> DbResult<()> {
        upsert_position_exec(self.pool(), market_id, token_side, state, current_price).await
    }

    /// Whether a SELL trade executed for this leg within the window.
    pub async fn recent_sell_exists(
        &self,
        market_id: &MarketId,
        token_side: Outcome,
        window: Duration,
    ) -> DbResult<bool> {
        let since = Utc::now() - window;
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM paper_trades
             WHERE market_id = $1 AND token_side = $2 AND side = 'SELL'
               AND executed_at >= $3",
        )
        .bind(market_id.as_str())
        .bind(token_side.as_str())
        .bind(since)
        .fetch_one(self.pool())
        .await?;
        Ok(n > 0)
    }

    /// Sum of position market values.
    pub async fn total_position_value(&self) -> DbResult<Decimal> {
        let total: Option<Decimal> =
            sqlx::query_scalar("SELECT SUM(market_value) FROM paper_positions")
                .fetch_one(self.pool())
                .await?;
        Ok(total.unwrap_or(Decimal::ZERO))
    }

    /// Sum of unrealized pnl across positions.
    pub async fn total_unrealized_pnl(&self) -> DbResult<Decimal> {
        let total: Option<Decimal> =
            sqlx::query_scalar("SELECT SUM(unrealized_pnl) FROM paper_positions")
                .fetch_one(self.pool())
                .await?;
        Ok(total.unwrap_or(Decimal::ZERO))
    }
}
