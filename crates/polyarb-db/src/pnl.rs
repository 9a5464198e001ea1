//! P&L snapshot repository and portfolio aggregates.
//!
//! Cash balance is defined as `initial_capital + sum(trades.net_value)`;
//! realized P&L is reported as zero while positions remain open (the
//! cash-flow definition is authoritative).

use crate::db::Db;
use crate::error::DbResult;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

/// One append-only portfolio snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct PnlSnapshotRow {
    pub cash_balance: Decimal,
    pub position_value: Decimal,
    pub total_equity: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub total_pnl: Decimal,
    pub trades_today: i64,
    pub fill_rate_today: Option<Decimal>,
    pub win_rate_today: Option<Decimal>,
    pub snapshot_at: DateTime<Utc>,
}

/// Daily trading counters derived from the paper book.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeStats {
    pub total_trades: i64,
    pub trades_today: i64,
    pub fill_rate_today: Option<Decimal>,
    pub win_rate_today: Option<Decimal>,
}

impl Db {
    /// Net cash flow over all trades (negative while capital is deployed).
    pub async fn total_cash_flow(&self) -> DbResult<Decimal> {
        let total: Option<Decimal> = sqlx::query_scalar("SELECT SUM(net_value) FROM paper_trades")
            .fetch_one(self.pool())
            .await?;
        Ok(total.unwrap_or(Decimal::ZERO))
    }

    /// Today's trade counters: trade count, order fill rate, and the share
    /// of SELL trades that netted positive cash.
    pub async fn trade_stats(&self) -> DbResult<TradeStats> {
        let row = sqlx::query(
            "SELECT
                 (SELECT COUNT(*) FROM paper_trades) AS total_trades,
                 (SELECT COUNT(*) FROM paper_trades
                   WHERE executed_at >= date_trunc('day', NOW())) AS trades_today,
                 (SELECT COUNT(*) FROM paper_orders
                   WHERE created_at >= date_trunc('day', NOW())) AS orders_today,
                 (SELECT COUNT(*) FROM paper_orders
                   WHERE created_at >= date_trunc('day', NOW())
                     AND status = 'FILLED') AS filled_today,
                 (SELECT COUNT(*) FROM paper_trades
                   WHERE executed_at >= date_trunc('day', NOW())
                     AND side = 'SELL') AS sells_today,
                 (SELECT COUNT(*) FROM paper_trades
                   WHERE executed_at >= date_trunc('day', NOW())
                     AND side = 'SELL' AND net_value > 0) AS winning_sells_today",
        )
        .fetch_one(self.pool())
        .await?;

        let orders_today: i64 = row.get("orders_today");
        let filled_today: i64 = row.get("filled_today");
        let sells_today: i64 = row.get("sells_today");
        let winning_sells_today: i64 = row.get("winning_sells_today");

        let fill_rate_today = (orders_today > 0)
            .then(|| Decimal::from(filled_today) / Decimal::from(orders_today));
        let win_rate_today = (sells_today > 0)
            .then(|| Decimal::from(winning_sells_today) / Decimal::from(sells_today));

        Ok(TradeStats {
            total_trades: row.get("total_trades"),
            trades_today: row.get("trades_today"),
            fill_rate_today,
            win_rate_today,
        })
    }

    /// Append a P&L snapshot.
    pub async fn insert_pnl_snapshot(&self, snapshot: &PnlSnapshotRow) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO paper_pnl
                 (cash_balance, position_value, total_equity, realized_pnl,
                  unrealized_pnl, total_pnl, trades_today, fill_rate_today,
                  win_rate_today, snapshot_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(snapshot.cash_balance)
        .bind(snapshot.position_value)
        .bind(snapshot.total_equity)
        .bind(snapshot.realized_pnl)
        .bind(snapshot.unrealized_pnl)
        .bind(snapshot.total_pnl)
        .bind(snapshot.trades_today)
        .bind(snapshot.fill_rate_today)
        .bind(snapshot.win_rate_today)
        .bind(snapshot.snapshot_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Most recent P&L snapshot.
    pub async fn latest_pnl_snapshot(&self) -> DbResult<Option<PnlSnapshotRow>> {
        let row = sqlx::query(
            "SELECT cash_balance, position_value, total_equity, realized_pnl,
                    unrealized_pnl, total_pnl, trades_today, fill_rate_today,
                    win_rate_today, snapshot_at
             FROM paper_pnl ORDER BY snapshot_at DESC LIMIT 1",
        )
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|r| PnlSnapshotRow {
            cash_balance: r.get("cash_balance"),
            position_value: r.get("position_value"),
            total_equity: r.get("total_equity"),
            realized_pnl: r.get("realized_pnl"),
            unrealized_pnl: r.get("unrealized_pnl"),
            total_pnl: r.get("total_pnl"),
            trades_today: r.get("trades_today"),
            fill_rate_today: r.get("fill_rate_today"),
            win_rate_today: r.get("win_rate_today"),
            snapshot_at: r.get("snapshot_at"),
        }))
    }
}
