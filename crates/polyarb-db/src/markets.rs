//! Paper-market repository and seeding selection queries.
//!
//! Selection restricts to markets whose latest bids sit in [0.20, 0.80]
//! on both legs (near-degenerate markets are useless for simulation) and
//! excludes markets already active in the paper book.

use crate::db::Db;
use crate::error::DbResult;
use chrono::{DateTime, Utc};
use polyarb_core::{MarketId, TokenId};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::info;

/// Why a market entered the paper book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    Liquid,
    MediumVolume,
    New,
    Arbitrage,
}

impl SelectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Liquid => "LIQUID",
            Self::MediumVolume => "MEDIUM_VOLUME",
            Self::New => "NEW",
            Self::Arbitrage => "ARBITRAGE",
        }
    }
}

impl std::fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Active paper market row.
#[derive(Debug, Clone)]
pub struct PaperMarketRow {
    pub market_id: MarketId,
    pub question: String,
    pub category: String,
    pub yes_token_id: TokenId,
    pub no_token_id: TokenId,
    pub selection_reason: String,
    pub created_at: DateTime<Utc>,
}

impl PaperMarketRow {
    pub fn is_arbitrage(&self) -> bool {
        self.selection_reason == SelectionReason::Arbitrage.as_str()
    }
}

/// A market proposed by a selection query. Token ids are resolved by the
/// caller from its subscription metadata.
#[derive(Debug, Clone)]
pub struct MarketCandidate {
    pub market_id: MarketId,
    pub question: String,
    pub category: String,
    pub volume_24h: Decimal,
}

fn candidate_from_row(r: &PgRow) -> MarketCandidate {
    MarketCandidate {
        market_id: MarketId::from(r.get::<String, _>("market_id")),
        question: r.get("question"),
        category: r.get("category"),
        volume_24h: r.get("volume_24h"),
    }
}

/// Shared eligibility CTEs: latest per-leg books with both bids in range,
/// excluding markets already in the paper book, joined to the latest
/// market metadata.
const SELECTION_BASE_SQL: &str = "WITH latest AS (
    SELECT DISTINCT ON (market_id, token_side)
           market_id, token_side, best_bid
    FROM orderbook_snapshots
    WHERE scan_timestamp > NOW() - INTERVAL '15 minutes'
    ORDER BY market_id, token_side, scan_timestamp DESC
),
eligible AS (
    SELECT y.market_id
    FROM latest y
    JOIN latest n ON n.market_id = y.market_id AND n.token_side = 'NO'
    WHERE y.token_side = 'YES'
      AND y.best_bid BETWEEN 0.20 AND 0.80
      AND n.best_bid BETWEEN 0.20 AND 0.80
      AND y.market_id NOT IN (SELECT market_id FROM paper_markets WHERE active)
),
meta AS (
    SELECT DISTINCT ON (market_id)
           market_id, question, category, volume_24h
    FROM market_snapshots
    ORDER BY market_id, scan_timestamp DESC
),
first_seen AS (
    SELECT market_id, MIN(scan_timestamp) AS first_scan
    FROM market_snapshots
    GROUP BY market_id
)
SELECT m.market_id, m.question, m.category, m.volume_24h
FROM meta m
JOIN eligible e ON e.market_id = m.market_id
JOIN first_seen f ON f.market_id = m.market_id ";

impl Db {
    /// Highest-volume eligible market.
    pub async fn select_liquid_market(&self) -> DbResult<Option<MarketCandidate>> {
        let row = sqlx::query(&format!(
            "{SELECTION_BASE_SQL} ORDER BY m.volume_24h DESC LIMIT 1"
        ))
        .fetch_optional(self.pool())
        .await?;
        Ok(row.as_ref().map(candidate_from_row))
    }

    /// Eligible market inside a mid-range volume band.
    pub async fn select_medium_volume_market(
        &self,
        min_volume: Decimal,
        max_volume: Decimal,
    ) -> DbResult<Option<MarketCandidate>> {
        let row = sqlx::query(&format!(
            "{SELECTION_BASE_SQL}
             WHERE m.volume_24h BETWEEN $1 AND $2
             ORDER BY m.volume_24h DESC LIMIT 1"
        ))
        .bind(min_volume)
        .bind(max_volume)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.as_ref().map(candidate_from_row))
    }

    /// Most recently first-seen eligible market.
    pub async fn select_new_market(&self) -> DbResult<Option<MarketCandidate>> {
        let row = sqlx::query(&format!(
            "{SELECTION_BASE_SQL} ORDER BY f.first_scan DESC LIMIT 1"
        ))
        .fetch_optional(self.pool())
        .await?;
        Ok(row.as_ref().map(candidate_from_row))
    }

    /// Add (or reactivate) a market in the paper book.
    pub async fn upsert_paper_market(
        &self,
        market_id: &MarketId,
        question: &str,
        category: &str,
        yes_token_id: &TokenId,
        no_token_id: &TokenId,
        reason: SelectionReason,
    ) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO paper_markets
                 (market_id, question, category, yes_token_id, no_token_id,
                  selection_reason, active)
             VALUES ($1, $2, $3, $4, $5, $6, TRUE)
             ON CONFLICT (market_id) DO UPDATE SET
                 selection_reason = EXCLUDED.selection_reason,
                 active = TRUE",
        )
        .bind(market_id.as_str())
        .bind(question)
        .bind(category)
        .bind(yes_token_id.as_str())
        .bind(no_token_id.as_str())
        .bind(reason.as_str())
        .execute(self.pool())
        .await?;
        info!(market_id = %market_id, reason = %reason, "Paper market enrolled");
        Ok(())
    }

    /// All active paper markets.
    pub async fn active_paper_markets(&self) -> DbResult<Vec<PaperMarketRow>> {
        let rows = sqlx::query(
            "SELECT market_id, question, category, yes_token_id, no_token_id,
                    selection_reason, created_at
             FROM paper_markets WHERE active
             ORDER BY created_at ASC",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| PaperMarketRow {
                market_id: MarketId::from(r.get::<String, _>("market_id")),
                question: r.get("question"),
                category: r.get("category"),
                yes_token_id: TokenId::from(r.get::<String, _>("yes_token_id")),
                no_token_id: TokenId::from(r.get::<String, _>("no_token_id")),
                selection_reason: r.get("selection_reason"),
                created_at: r.get("created_at"),
            })
            .collect())
    }

    pub async fn count_active_paper_markets(&self) -> DbResult<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM paper_markets WHERE active")
            .fetch_one(self.pool())
            .await?;
        Ok(n)
    }
}
