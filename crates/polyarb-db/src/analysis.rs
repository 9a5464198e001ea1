//! Hourly analysis rollups and the end-of-run validation summary.

use crate::db::Db;
use crate::error::DbResult;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

/// End-of-run summary row.
#[derive(Debug, Clone)]
pub struct ValidationSummaryRow {
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub markets_tracked: i64,
    pub updates_persisted: i64,
    pub opportunities_detected: i64,
    pub trades_executed: i64,
    pub final_equity: Decimal,
}

impl Db {
    /// Recompute today's per-hour and per-category opportunity counts.
    ///
    /// Conflict keys `(analysis_date, hour_of_day)` and
    /// `(analysis_date, category)` make the refresh idempotent.
    pub async fn refresh_analysis_tables(&self) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO time_analysis (analysis_date, hour_of_day, opportunity_count)
             SELECT detected_at::date, EXTRACT(HOUR FROM detected_at)::int, COUNT(*)
             FROM opportunities
             WHERE detected_at >= date_trunc('day', NOW())
             GROUP BY 1, 2
             ON CONFLICT (analysis_date, hour_of_day)
                 DO UPDATE SET opportunity_count = EXCLUDED.opportunity_count",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            "INSERT INTO category_analysis (analysis_date, category, opportunity_count)
             SELECT o.detected_at::date, COALESCE(m.category, ''), COUNT(*)
             FROM opportunities o
             LEFT JOIN LATERAL (
                 SELECT category FROM market_snapshots
                 WHERE market_id = o.market_id
                 ORDER BY scan_timestamp DESC LIMIT 1
             ) m ON TRUE
             WHERE o.detected_at >= date_trunc('day', NOW())
             GROUP BY 1, 2
             ON CONFLICT (analysis_date, category)
                 DO UPDATE SET opportunity_count = EXCLUDED.opportunity_count",
        )
        .execute(self.pool())
        .await?;

        debug!("Analysis tables refreshed");
        Ok(())
    }

    /// Record the end-of-run summary.
    pub async fn insert_validation_summary(&self, summary: &ValidationSummaryRow) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO validation_summary
                 (started_at, stopped_at, markets_tracked, updates_persisted,
                  opportunities_detected, trades_executed, final_equity)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(summary.started_at)
        .bind(summary.stopped_at)
        .bind(summary.markets_tracked)
        .bind(summary.updates_persisted)
        .bind(summary.opportunities_detected)
        .bind(summary.trades_executed)
        .bind(summary.final_equity)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
