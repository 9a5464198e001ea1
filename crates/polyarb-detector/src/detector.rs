//! Five-way opportunity classification over persisted snapshots.

use crate::config::DetectorConfig;
use crate::error::{DetectorError, DetectorResult};
use chrono::{DateTime, Duration, Utc};
use polyarb_core::{MarketId, ObservedOpportunity, OpportunityKind};
use polyarb_db::Db;
use rust_decimal::Decimal;
use sqlx::Row;
use tracing::{debug, info};

/// Latest-per-leg CTE shared by the book-based classifiers.
const LATEST_BOOKS_CTE: &str = "latest AS (
    SELECT DISTINCT ON (market_id, token_side)
           market_id, token_side, best_bid, best_ask, bid_size, ask_size, spread, mid
    FROM orderbook_snapshots
    WHERE scan_timestamp > $1
    ORDER BY market_id, token_side, scan_timestamp DESC
),
meta AS (
    SELECT DISTINCT ON (market_id) market_id, category, volume_24h
    FROM market_snapshots
    ORDER BY market_id, scan_timestamp DESC
)";

/// Result of one detection pass.
#[derive(Debug, Clone)]
pub struct DetectionPass {
    pub scan_timestamp: DateTime<Utc>,
    pub observed: Vec<ObservedOpportunity>,
    pub inserted: u64,
}

/// Periodic batch detector over the relational store.
pub struct BatchDetector {
    db: Db,
    config: DetectorConfig,
}

impl BatchDetector {
    pub fn new(db: Db, config: DetectorConfig) -> DetectorResult<Self> {
        config.validate().map_err(DetectorError::ConfigError)?;
        Ok(Self { db, config })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Run all five classifiers and apply the diff-upsert in a single
    /// transaction.
    pub async fn run_pass(&self) -> DetectorResult<DetectionPass> {
        let scan_timestamp = Utc::now();
        let mut observed = Vec::new();

        observed.extend(self.detect_arbitrage().await?);
        observed.extend(self.detect_wide_spread().await?);
        observed.extend(self.detect_volume_spike().await?);
        observed.extend(self.detect_thin_book().await?);
        observed.extend(self.detect_mispricing().await?);

        let inserted = self.db.upsert_opportunities(&observed, scan_timestamp).await?;
        if inserted > 0 {
            info!(observed = observed.len(), inserted, "Detection pass complete");
        } else {
            debug!(observed = observed.len(), "Detection pass complete");
        }

        Ok(DetectionPass {
            scan_timestamp,
            observed,
            inserted,
        })
    }

    fn window_start(&self) -> DateTime<Utc> {
        Utc::now() - Duration::minutes(self.config.window_mins)
    }

    /// Markets where buying both asks locks in under-par cost.
    /// Ranked by per-unit profit `1 - (yes_ask + no_ask)`.
    pub async fn detect_arbitrage(&self) -> DetectorResult<Vec<ObservedOpportunity>> {
        let rows = sqlx::query(&format!(
            "WITH {LATEST_BOOKS_CTE}
             SELECT y.market_id,
                    y.best_ask + n.best_ask AS yes_no_sum,
                    LEAST(y.ask_size, n.ask_size) AS liquidity,
                    m.volume_24h
             FROM latest y
             JOIN latest n ON n.market_id = y.market_id AND n.token_side = 'NO'
             LEFT JOIN meta m ON m.market_id = y.market_id
             WHERE y.token_side = 'YES'
               AND y.best_ask IS NOT NULL AND n.best_ask IS NOT NULL
               AND y.best_ask + n.best_ask < $2
             ORDER BY y.best_ask + n.best_ask ASC"
        ))
        .bind(self.window_start())
        .bind(self.config.arbitrage_threshold)
        .fetch_all(self.db.pool())
        .await
        .map_err(polyarb_db::DbError::from)?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let sum: Decimal = r.get("yes_no_sum");
                let liquidity: Option<Decimal> = r.get("liquidity");
                let profit_per_unit = Decimal::ONE - sum;
                ObservedOpportunity {
                    kind: OpportunityKind::Arbitrage,
                    market_id: MarketId::from(r.get::<String, _>("market_id")),
                    yes_no_sum: Some(sum),
                    spread_percent: None,
                    available_liquidity: liquidity,
                    market_volume: r.get("volume_24h"),
                    theoretical_profit_usd: liquidity.map(|l| profit_per_unit * l),
                }
            })
            .collect())
    }

    /// Markets whose widest leg spread exceeds the relative threshold.
    pub async fn detect_wide_spread(&self) -> DetectorResult<Vec<ObservedOpportunity>> {
        let rows = sqlx::query(&format!(
            "WITH {LATEST_BOOKS_CTE}
             SELECT l.market_id,
                    MAX(l.spread / NULLIF(l.mid, 0)) AS spread_pct,
                    MAX(m.volume_24h) AS volume_24h
             FROM latest l
             LEFT JOIN meta m ON m.market_id = l.market_id
             WHERE l.spread IS NOT NULL AND l.mid IS NOT NULL AND l.mid > 0
             GROUP BY l.market_id
             HAVING MAX(l.spread / NULLIF(l.mid, 0)) > $2
             ORDER BY 2 DESC
             LIMIT 50"
        ))
        .bind(self.window_start())
        .bind(self.config.wide_spread_threshold)
        .fetch_all(self.db.pool())
        .await
        .map_err(polyarb_db::DbError::from)?;

        Ok(rows
            .into_iter()
            .map(|r| ObservedOpportunity {
                kind: OpportunityKind::WideSpread,
                market_id: MarketId::from(r.get::<String, _>("market_id")),
                yes_no_sum: None,
                spread_percent: Some(r.get("spread_pct")),
                available_liquidity: None,
                market_volume: r.get("volume_24h"),
                theoretical_profit_usd: None,
            })
            .collect())
    }

    /// Markets whose last-hour volume runs a multiple of their 24h average.
    pub async fn detect_volume_spike(&self) -> DetectorResult<Vec<ObservedOpportunity>> {
        let rows = sqlx::query(
            "WITH current AS (
                 SELECT DISTINCT ON (market_id) market_id, volume_24h
                 FROM market_snapshots
                 WHERE scan_timestamp > NOW() - INTERVAL '1 hour'
                 ORDER BY market_id, scan_timestamp DESC
             ),
             baseline AS (
                 SELECT market_id, AVG(volume_24h) AS avg_volume
                 FROM market_snapshots
                 WHERE scan_timestamp > NOW() - INTERVAL '24 hours'
                 GROUP BY market_id
             )
             SELECT c.market_id, c.volume_24h,
                    c.volume_24h / NULLIF(b.avg_volume, 0) AS ratio
             FROM current c
             JOIN baseline b ON b.market_id = c.market_id
             WHERE b.avg_volume > 0
               AND c.volume_24h / b.avg_volume >= $1
             ORDER BY ratio DESC
             LIMIT 20",
        )
        .bind(self.config.volume_spike_multiplier)
        .fetch_all(self.db.pool())
        .await
        .map_err(polyarb_db::DbError::from)?;

        Ok(rows
            .into_iter()
            .map(|r| ObservedOpportunity {
                kind: OpportunityKind::VolumeSpike,
                market_id: MarketId::from(r.get::<String, _>("market_id")),
                yes_no_sum: None,
                spread_percent: None,
                available_liquidity: None,
                market_volume: Some(r.get("volume_24h")),
                theoretical_profit_usd: None,
            })
            .collect())
    }

    /// High-volume markets with nearly empty best levels.
    pub async fn detect_thin_book(&self) -> DetectorResult<Vec<ObservedOpportunity>> {
        let rows = sqlx::query(&format!(
            "WITH {LATEST_BOOKS_CTE},
             liquidity AS (
                 SELECT market_id,
                        SUM(COALESCE(bid_size, 0) + COALESCE(ask_size, 0)) AS total_liquidity
                 FROM latest
                 GROUP BY market_id
             )
             SELECT l.market_id, l.total_liquidity, m.volume_24h
             FROM liquidity l
             JOIN meta m ON m.market_id = l.market_id
             WHERE m.volume_24h >= $2 AND l.total_liquidity < $3
             ORDER BY m.volume_24h DESC
             LIMIT 20"
        ))
        .bind(self.window_start())
        .bind(self.config.thin_book_min_volume)
        .bind(self.config.thin_book_max_liquidity)
        .fetch_all(self.db.pool())
        .await
        .map_err(polyarb_db::DbError::from)?;

        Ok(rows
            .into_iter()
            .map(|r| ObservedOpportunity {
                kind: OpportunityKind::ThinBook,
                market_id: MarketId::from(r.get::<String, _>("market_id")),
                yes_no_sum: None,
                spread_percent: None,
                available_liquidity: Some(r.get("total_liquidity")),
                market_volume: Some(r.get("volume_24h")),
                theoretical_profit_usd: None,
            })
            .collect())
    }

    /// Same-category market pairs whose YES mids diverge beyond the
    /// threshold while both sit in the tradeable band. The divergence is
    /// carried in `spread_percent`.
    pub async fn detect_mispricing(&self) -> DetectorResult<Vec<ObservedOpportunity>> {
        let rows = sqlx::query(&format!(
            "WITH {LATEST_BOOKS_CTE}
             SELECT a.market_id AS market_a,
                    b.market_id AS market_b,
                    ABS(a.mid - b.mid) AS divergence,
                    ma.volume_24h
             FROM latest a
             JOIN meta ma ON ma.market_id = a.market_id
             JOIN latest b ON b.token_side = 'YES' AND b.market_id > a.market_id
             JOIN meta mb ON mb.market_id = b.market_id
             WHERE a.token_side = 'YES'
               AND ma.category = mb.category AND ma.category <> ''
               AND a.mid BETWEEN $2 AND $3
               AND b.mid BETWEEN $2 AND $3
               AND ABS(a.mid - b.mid) > $4
             ORDER BY divergence DESC
             LIMIT 10"
        ))
        .bind(self.window_start())
        .bind(self.config.mispricing_mid_min)
        .bind(self.config.mispricing_mid_max)
        .bind(self.config.mispricing_min_diff)
        .fetch_all(self.db.pool())
        .await
        .map_err(polyarb_db::DbError::from)?;

        Ok(rows
            .into_iter()
            .map(|r| ObservedOpportunity {
                kind: OpportunityKind::Mispricing,
                market_id: MarketId::from(r.get::<String, _>("market_a")),
                yes_no_sum: None,
                spread_percent: Some(r.get("divergence")),
                available_liquidity: None,
                market_volume: r.get("volume_24h"),
                theoretical_profit_usd: None,
            })
            .collect())
    }
}
