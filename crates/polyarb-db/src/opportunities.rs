//! Opportunity log repository.
//!
//! At most one row per `(market_id, opportunity_type)` is active at any
//! instant (enforced by a partial unique index). A detection pass diffs
//! its observations against the active set: new keys insert, re-observed
//! keys stay untouched, and keys that stopped being observed expire with
//! their lifetime recorded.

use crate::db::Db;
use crate::error::DbResult;
use chrono::{DateTime, Duration, Utc};
use polyarb_core::{MarketId, ObservedOpportunity, OpportunityKind};
use rust_decimal::Decimal;
use sqlx::Row;
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{debug, info};

/// Key of a currently-active opportunity row.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveOpportunityKey {
    pub market_id: MarketId,
    pub kind: OpportunityKind,
    pub detected_at: DateTime<Utc>,
}

/// Outcome of diffing one detection pass against the active set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpportunityDiff {
    /// Observed keys with no active row: insert.
    pub to_insert: Vec<usize>,
    /// Observed keys that already have an active row: no-op.
    pub retained: usize,
    /// Active keys that were not observed this pass: expire.
    pub to_expire: Vec<(MarketId, OpportunityKind)>,
}

/// Pure diff between the active set and one pass of observations.
///
/// `to_insert` holds indices into `observed` so callers keep the full
/// records for insertion.
pub fn diff_keys(
    active: &[ActiveOpportunityKey],
    observed: &[ObservedOpportunity],
) -> OpportunityDiff {
    let active_keys: HashSet<(&str, OpportunityKind)> = active
        .iter()
        .map(|a| (a.market_id.as_str(), a.kind))
        .collect();
    let observed_keys: HashSet<(&str, OpportunityKind)> = observed
        .iter()
        .map(|o| (o.market_id.as_str(), o.kind))
        .collect();

    let mut diff = OpportunityDiff::default();
    let mut seen: HashSet<(&str, OpportunityKind)> = HashSet::new();
    for (idx, obs) in observed.iter().enumerate() {
        let key = (obs.market_id.as_str(), obs.kind);
        if !seen.insert(key) {
            continue; // duplicate observation within the pass
        }
        if active_keys.contains(&key) {
            diff.retained += 1;
        } else {
            diff.to_insert.push(idx);
        }
    }
    for key in &active_keys {
        if !observed_keys.contains(key) {
            diff.to_expire.push((MarketId::from(key.0), key.1));
        }
    }
    diff
}

impl Db {
    /// Active `(market, type)` keys with their detection times.
    pub async fn active_opportunities(&self) -> DbResult<Vec<ActiveOpportunityKey>> {
        let rows = sqlx::query(
            "SELECT market_id, opportunity_type, detected_at
             FROM opportunities WHERE still_active",
        )
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(ActiveOpportunityKey {
                    market_id: MarketId::from(r.get::<String, _>("market_id")),
                    kind: OpportunityKind::from_str(&r.get::<String, _>("opportunity_type"))?,
                    detected_at: r.get("detected_at"),
                })
            })
            .collect()
    }

    /// Apply one detection pass: insert new, keep re-observed, expire the
    /// rest. Runs in a single transaction so readers never see a torn pass.
    ///
    /// Returns the number of newly-inserted rows.
    pub async fn upsert_opportunities(
        &self,
        observed: &[ObservedOpportunity],
        scan_timestamp: DateTime<Utc>,
    ) -> DbResult<u64> {
        let mut tx = self.pool().begin().await?;

        let active: Vec<ActiveOpportunityKey> = sqlx::query(
            "SELECT market_id, opportunity_type, detected_at
             FROM opportunities WHERE still_active
             FOR UPDATE",
        )
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(|r| {
            Ok(ActiveOpportunityKey {
                market_id: MarketId::from(r.get::<String, _>("market_id")),
                kind: OpportunityKind::from_str(&r.get::<String, _>("opportunity_type"))?,
                detected_at: r.get("detected_at"),
            })
        })
        .collect::<DbResult<_>>()?;
        let diff = diff_keys(&active, observed);

        for idx in &diff.to_insert {
            let obs = &observed[*idx];
            sqlx::query(
                "INSERT INTO opportunities
                     (opportunity_type, market_id, detected_at, yes_no_sum, spread_percent,
                      available_liquidity, market_volume, theoretical_profit_usd, still_active)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE)",
            )
            .bind(obs.kind.as_str())
            .bind(obs.market_id.as_str())
            .bind(scan_timestamp)
            .bind(obs.yes_no_sum)
            .bind(obs.spread_percent)
            .bind(obs.available_liquidity)
            .bind(obs.market_volume)
            .bind(obs.theoretical_profit_usd)
            .execute(&mut *tx)
            .await?;
        }

        for (market_id, kind) in &diff.to_expire {
            sqlx::query(
                "UPDATE opportunities SET
                     still_active = FALSE,
                     expired_at = $3,
                     duration_seconds = FLOOR(EXTRACT(EPOCH FROM ($3 - detected_at)))::bigint
                 WHERE market_id = $1 AND opportunity_type = $2 AND still_active",
            )
            .bind(market_id.as_str())
            .bind(kind.as_str())
            .bind(scan_timestamp)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            inserted = diff.to_insert.len(),
            retained = diff.retained,
            expired = diff.to_expire.len(),
            "Opportunity pass applied"
        );
        Ok(diff.to_insert.len() as u64)
    }

    /// Force-expire rows whose detection is older than the bound,
    /// regardless of observation. Hourly sweep.
    pub async fn expire_stale_opportunities(&self, max_age: Duration) -> DbResult<u64> {
        let now = Utc::now();
        let cutoff = now - max_age;
        let expired = sqlx::query(
            "UPDATE opportunities SET
                 still_active = FALSE,
                 expired_at = $1,
                 duration_seconds = FLOOR(EXTRACT(EPOCH FROM ($1 - detected_at)))::bigint
             WHERE still_active AND detected_at < $2",
        )
        .bind(now)
        .bind(cutoff)
        .execute(self.pool())
        .await?
        .rows_affected();

        if expired > 0 {
            info!(expired, "Force-expired stale opportunities");
        }
        Ok(expired)
    }

    /// Active row count per opportunity type, for the dashboard.
    pub async fn active_opportunity_counts(&self) -> DbResult<Vec<(OpportunityKind, i64)>> {
        let rows = sqlx::query(
            "SELECT opportunity_type, COUNT(*) AS n
             FROM opportunities WHERE still_active
             GROUP BY opportunity_type",
        )
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok((
                    OpportunityKind::from_str(&r.get::<String, _>("opportunity_type"))?,
                    r.get::<i64, _>("n"),
                ))
            })
            .collect()
    }

    /// Total opportunities ever recorded.
    pub async fn total_opportunities(&self) -> DbResult<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM opportunities")
            .fetch_one(self.pool())
            .await?;
        Ok(n)
    }

    /// Markets with a fresh ARBITRAGE row detected at the given scan time.
    pub async fn fresh_arbitrage_markets(
        &self,
        scan_timestamp: DateTime<Utc>,
    ) -> DbResult<Vec<(MarketId, Option<Decimal>)>> {
        let rows = sqlx::query(
            "SELECT market_id, theoretical_profit_usd
             FROM opportunities
             WHERE opportunity_type = 'ARBITRAGE' AND still_active AND detected_at = $1",
        )
        .bind(scan_timestamp)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    MarketId::from(r.get::<String, _>("market_id")),
                    r.get::<Option<Decimal>, _>("theoretical_profit_usd"),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(market: &str, kind: OpportunityKind) -> ObservedOpportunity {
        ObservedOpportunity::new(kind, MarketId::from(market))
    }

    fn active(market: &str, kind: OpportunityKind) -> ActiveOpportunityKey {
        ActiveOpportunityKey {
            market_id: MarketId::from(market),
            kind,
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn test_diff_insert_new() {
        let diff = diff_keys(&[], &[obs("m1", OpportunityKind::Arbitrage)]);
        assert_eq!(diff.to_insert, vec![0]);
        assert_eq!(diff.retained, 0);
        assert!(diff.to_expire.is_empty());
    }

    #[test]
    fn test_diff_retains_reobserved() {
        let diff = diff_keys(
            &[active("m1", OpportunityKind::Arbitrage)],
            &[obs("m1", OpportunityKind::Arbitrage)],
        );
        assert!(diff.to_insert.is_empty());
        assert_eq!(diff.retained, 1);
        assert!(diff.to_expire.is_empty());
    }

    #[test]
    fn test_diff_expires_missing() {
        let diff = diff_keys(
            &[
                active("m1", OpportunityKind::Arbitrage),
                active("m2", OpportunityKind::WideSpread),
            ],
            &[obs("m1", OpportunityKind::Arbitrage)],
        );
        assert_eq!(diff.retained, 1);
        assert_eq!(
            diff.to_expire,
            vec![(MarketId::from("m2"), OpportunityKind::WideSpread)]
        );
    }

    #[test]
    fn test_diff_same_market_different_kind() {
        let diff = diff_keys(
            &[active("m1", OpportunityKind::Arbitrage)],
            &[obs("m1", OpportunityKind::WideSpread)],
        );
        assert_eq!(diff.to_insert, vec![0]);
        assert_eq!(
            diff.to_expire,
            vec![(MarketId::from("m1"), OpportunityKind::Arbitrage)]
        );
    }

    #[test]
    fn test_diff_dedupes_observations() {
        let diff = diff_keys(
            &[],
            &[
                obs("m1", OpportunityKind::Arbitrage),
                obs("m1", OpportunityKind::Arbitrage),
            ],
        );
        assert_eq!(diff.to_insert, vec![0]);
    }
}
