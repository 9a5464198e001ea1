//! Market and orderbook snapshot repository.
//!
//! Streaming updates are flushed in batches under one scan timestamp;
//! the conflict keys make a scan window idempotent.

use crate::db::Db;
use crate::error::DbResult;
use chrono::{DateTime, Duration, Utc};
use polyarb_core::{MarketId, Outcome, Price, PriceUpdate, Size, TopOfBook};
use rust_decimal::Decimal;
use sqlx::{QueryBuilder, Row};
use std::collections::HashMap;
use tracing::debug;

/// Latest stored top-of-book for one leg.
#[derive(Debug, Clone, PartialEq)]
pub struct BookSnapshotRow {
    pub market_id: MarketId,
    pub token_side: Outcome,
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
    pub bid_size: Option<Size>,
    pub ask_size: Option<Size>,
    pub spread: Option<Price>,
    pub mid: Option<Price>,
    pub scan_timestamp: DateTime<Utc>,
}

impl BookSnapshotRow {
    pub fn top(&self) -> TopOfBook {
        TopOfBook {
            best_bid: self.best_bid,
            best_ask: self.best_ask,
            bid_size: self.bid_size,
            ask_size: self.ask_size,
        }
    }
}

impl Db {
    /// Flush a batch of streamed price updates under one scan timestamp.
    ///
    /// For each distinct market an owning market snapshot is upserted at
    /// `scan_timestamp`; orderbook rows then upsert on
    /// `(market_id, token_side, scan_timestamp)` so replaying the same
    /// window keeps the row count stable and the values most-recent.
    ///
    /// Returns the number of orderbook rows written.
    pub async fn batch_insert_ws_updates(
        &self,
        updates: &[PriceUpdate],
        scan_timestamp: DateTime<Utc>,
    ) -> DbResult<u64> {
        if updates.is_empty() {
            return Ok(0);
        }

        // Last update wins per market and per leg.
        let mut per_market: HashMap<&MarketId, &PriceUpdate> = HashMap::new();
        let mut per_leg: HashMap<(&MarketId, Outcome), &PriceUpdate> = HashMap::new();
        for update in updates {
            per_market.insert(&update.market_id, update);
            per_leg.insert((&update.market_id, update.outcome), update);
        }

        let mut tx = self.pool().begin().await?;

        let mut snapshot_ids: HashMap<&MarketId, i64> = HashMap::with_capacity(per_market.len());
        for (market_id, update) in &per_market {
            let row = sqlx::query(
                "INSERT INTO market_snapshots
                     (market_id, question, category, volume_24h, status, scan_timestamp)
                 VALUES ($1, $2, $3, $4, 'active', $5)
                 ON CONFLICT (market_id, scan_timestamp) DO UPDATE SET
                     question = EXCLUDED.question,
                     category = EXCLUDED.category,
                     volume_24h = EXCLUDED.volume_24h,
                     status = EXCLUDED.status
                 RETURNING id",
            )
            .bind(market_id.as_str())
            .bind(&update.question)
            .bind(&update.category)
            .bind(update.volume_24h)
            .bind(scan_timestamp)
            .fetch_one(&mut *tx)
            .await?;
            snapshot_ids.insert(*market_id, row.get::<i64, _>(0));
        }

        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
            "INSERT INTO orderbook_snapshots
                 (market_snapshot_id, market_id, token_side, best_bid, best_ask,
                  bid_size, ask_size, spread, mid, scan_timestamp) ",
        );
        builder.push_values(per_leg.iter(), |mut b, ((market_id, outcome), update)| {
            let mid = match (update.best_bid, update.best_ask) {
                (Some(bid), Some(ask)) => Some(Price::mid(bid, ask)),
                _ => None,
            };
            b.push_bind(snapshot_ids[*market_id])
                .push_bind(market_id.as_str())
                .push_bind(outcome.as_str())
                .push_bind(update.best_bid.map(|p| Price::inner(&p)))
                .push_bind(update.best_ask.map(|p| Price::inner(&p)))
                .push_bind(update.bid_size.map(|p| Size::inner(&p)))
                .push_bind(update.ask_size.map(|p| Size::inner(&p)))
                .push_bind(update.spread.map(|p| Price::inner(&p)))
                .push_bind(mid.map(|m| m.inner()))
                .push_bind(scan_timestamp);
        });
        builder.push(
            " ON CONFLICT (market_id, token_side, scan_timestamp) DO UPDATE SET
                 market_snapshot_id = EXCLUDED.market_snapshot_id,
                 best_bid = EXCLUDED.best_bid,
                 best_ask = EXCLUDED.best_ask,
                 bid_size = EXCLUDED.bid_size,
                 ask_size = EXCLUDED.ask_size,
                 spread = EXCLUDED.spread,
                 mid = EXCLUDED.mid",
        );
        let written = builder.build().execute(&mut *tx).await?.rows_affected();

        tx.commit().await?;
        debug!(
            updates = updates.len(),
            rows = written,
            "Flushed streaming updates"
        );
        Ok(written)
    }

    /// Latest stored orderbook for one leg.
    pub async fn latest_book(
        &self,
        market_id: &MarketId,
        token_side: Outcome,
    ) -> DbResult<Option<BookSnapshotRow>> {
        let row = sqlx::query(
            "SELECT best_bid, best_ask, bid_size, ask_size, spread, mid, scan_timestamp
             FROM orderbook_snapshots
             WHERE market_id = $1 AND token_side = $2
             ORDER BY scan_timestamp DESC
             LIMIT 1",
        )
        .bind(market_id.as_str())
        .bind(token_side.as_str())
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|r| BookSnapshotRow {
            market_id: market_id.clone(),
            token_side,
            best_bid: r.get::<Option<Decimal>, _>("best_bid").map(Price::new),
            best_ask: r.get::<Option<Decimal>, _>("best_ask").map(Price::new),
            bid_size: r.get::<Option<Decimal>, _>("bid_size").map(Size::new),
            ask_size: r.get::<Option<Decimal>, _>("ask_size").map(Size::new),
            spread: r.get::<Option<Decimal>, _>("spread").map(Price::new),
            mid: r.get::<Option<Decimal>, _>("mid").map(Price::new),
            scan_timestamp: r.get("scan_timestamp"),
        }))
    }

    /// Mid-price change for one leg over a lookback window, in percent.
    ///
    /// Compares the oldest and newest mids inside the window; `None` when
    /// fewer than two observations carry a mid.
    pub async fn mid_change_pct(
        &self,
        market_id: &MarketId,
        token_side: Outcome,
        lookback: Duration,
    ) -> DbResult<Option<Decimal>> {
        let since = Utc::now() - lookback;
        let row = sqlx::query(
            "WITH window_mids AS (
                 SELECT mid, scan_timestamp
                 FROM orderbook_snapshots
                 WHERE market_id = $1 AND token_side = $2
                   AND scan_timestamp >= $3 AND mid IS NOT NULL
             )
             SELECT
                 (SELECT mid FROM window_mids ORDER BY scan_timestamp ASC LIMIT 1) AS oldest,
                 (SELECT mid FROM window_mids ORDER BY scan_timestamp DESC LIMIT 1) AS newest,
                 (SELECT COUNT(*) FROM window_mids) AS n",
        )
        .bind(market_id.as_str())
        .bind(token_side.as_str())
        .bind(since)
        .fetch_one(self.pool())
        .await?;

        let n: i64 = row.get("n");
        if n < 2 {
            return Ok(None);
        }
        let oldest: Decimal = row.get("oldest");
        let newest: Decimal = row.get("newest");
        if oldest.is_zero() {
            return Ok(None);
        }
        Ok(Some((newest - oldest) / oldest * Decimal::from(100)))
    }

    /// Delete snapshots older than the retention window.
    pub async fn purge_snapshots_older_than(&self, retention_days: u32) -> DbResult<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        // Orderbook rows cascade from their market snapshot.
        let deleted = sqlx::query("DELETE FROM market_snapshots WHERE scan_timestamp < $1")
            .bind(cutoff)
            .execute(self.pool())
            .await?
            .rows_affected();
        Ok(deleted)
    }
}
