//! Pooled Postgres handle, schema bootstrap and verification.

use crate::error::{DbError, DbResult};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

/// Tables the engine requires. Startup fails when any is missing.
pub const REQUIRED_TABLES: [&str; 11] = [
    "market_snapshots",
    "orderbook_snapshots",
    "opportunities",
    "paper_markets",
    "paper_orders",
    "paper_trades",
    "paper_positions",
    "paper_pnl",
    "time_analysis",
    "category_analysis",
    "validation_summary",
];

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_connections: 10,
            acquire_timeout_ms: 5_000,
        }
    }
}

/// Shared database handle. Cheap to clone; the pool is reference-counted.
#[derive(Debug, Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect with pool options. The pool is process-wide and its
    /// lifecycle is tied to orchestrator start/stop.
    pub async fn connect(config: &DbConfig) -> DbResult<Self> {
        if config.database_url.is_empty() {
            return Err(DbError::Config("database URL is empty".to_string()));
        }
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_millis(config.acquire_timeout_ms))
            .connect(&config.database_url)
            .await?;
        info!(max_connections = config.max_connections, "Database pool ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create all tables and indexes. Idempotent.
    pub async fn init_schema(&self) -> DbResult<()> {
        for ddl in SCHEMA_DDL {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        info!("Schema initialized");
        Ok(())
    }

    /// Verify every required table exists. Fatal at startup when not.
    pub async fn verify_schema(&self) -> DbResult<()> {
        let present: Vec<String> = sqlx::query_scalar(
            "SELECT table_name::text FROM information_schema.tables
             WHERE table_schema = 'public'",
        )
        .fetch_all(&self.pool)
        .await?;

        let missing: Vec<String> = REQUIRED_TABLES
            .iter()
            .filter(|t| !present.iter().any(|p| p == *t))
            .map(|t| t.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(DbError::SchemaMissing(missing))
        }
    }

    /// Row counts per required table, for the db-status command.
    pub async fn table_counts(&self) -> DbResult<Vec<(String, i64)>> {
        let mut counts = Vec::with_capacity(REQUIRED_TABLES.len());
        for table in REQUIRED_TABLES {
            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&self.pool)
                .await?;
            counts.push((table.to_string(), count));
        }
        Ok(counts)
    }

    /// Wipe the paper book and opportunity log. Used by the reset command.
    pub async fn reset_paper_state(&self) -> DbResult<()> {
        sqlx::query(
            "TRUNCATE paper_orders, paper_trades, paper_positions, paper_pnl,
                      paper_markets, opportunities, validation_summary",
        )
        .execute(&self.pool)
        .await?;
        info!("Paper trading state reset");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

const SCHEMA_DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS market_snapshots (
        id              BIGSERIAL PRIMARY KEY,
        market_id       TEXT NOT NULL,
        question        TEXT NOT NULL DEFAULT '',
        category        TEXT NOT NULL DEFAULT '',
        volume_24h      NUMERIC(20,6) NOT NULL DEFAULT 0,
        status          TEXT NOT NULL DEFAULT 'active',
        scan_timestamp  TIMESTAMPTZ NOT NULL,
        UNIQUE (market_id, scan_timestamp)
    )",
    "CREATE INDEX IF NOT EXISTS idx_market_snapshots_scan
        ON market_snapshots (scan_timestamp)",
    "CREATE TABLE IF NOT EXISTS orderbook_snapshots (
        id                  BIGSERIAL PRIMARY KEY,
        market_snapshot_id  BIGINT NOT NULL REFERENCES market_snapshots (id) ON DELETE CASCADE,
        market_id           TEXT NOT NULL,
        token_side          TEXT NOT NULL,
        best_bid            NUMERIC(10,6),
        best_ask            NUMERIC(10,6),
        bid_size            NUMERIC(20,6),
        ask_size            NUMERIC(20,6),
        spread              NUMERIC(10,6),
        mid                 NUMERIC(10,6),
        scan_timestamp      TIMESTAMPTZ NOT NULL,
        UNIQUE (market_id, token_side, scan_timestamp)
    )",
    "CREATE INDEX IF NOT EXISTS idx_orderbook_snapshots_market_scan
        ON orderbook_snapshots (market_id, token_side, scan_timestamp DESC)",
    "CREATE TABLE IF NOT EXISTS opportunities (
        id                      BIGSERIAL PRIMARY KEY,
        opportunity_type        TEXT NOT NULL,
        market_id               TEXT NOT NULL,
        detected_at             TIMESTAMPTZ NOT NULL,
        yes_no_sum              NUMERIC(10,6),
        spread_percent          NUMERIC(10,6),
        available_liquidity     NUMERIC(20,6),
        market_volume           NUMERIC(20,6),
        theoretical_profit_usd  NUMERIC(20,6),
        still_active            BOOLEAN NOT NULL DEFAULT TRUE,
        expired_at              TIMESTAMPTZ,
        duration_seconds        BIGINT
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_opportunities_active_key
        ON opportunities (market_id, opportunity_type) WHERE still_active",
    "CREATE INDEX IF NOT EXISTS idx_opportunities_detected
        ON opportunities (detected_at)",
    "CREATE TABLE IF NOT EXISTS paper_markets (
        market_id         TEXT PRIMARY KEY,
        question          TEXT NOT NULL DEFAULT '',
        category          TEXT NOT NULL DEFAULT '',
        yes_token_id      TEXT NOT NULL,
        no_token_id       TEXT NOT NULL,
        selection_reason  TEXT NOT NULL,
        active            BOOLEAN NOT NULL DEFAULT TRUE,
        created_at        TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE TABLE IF NOT EXISTS paper_orders (
        order_id      TEXT PRIMARY KEY,
        market_id     TEXT NOT NULL,
        side          TEXT NOT NULL,
        token_side    TEXT NOT NULL,
        order_price   NUMERIC(10,6) NOT NULL,
        order_size    NUMERIC(20,6) NOT NULL,
        status        TEXT NOT NULL DEFAULT 'PENDING',
        created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        fill_price    NUMERIC(10,6),
        fill_size     NUMERIC(20,6),
        best_bid      NUMERIC(10,6),
        best_ask      NUMERIC(10,6),
        spread        NUMERIC(10,6)
    )",
    "CREATE INDEX IF NOT EXISTS idx_paper_orders_status
        ON paper_orders (status, created_at)",
    "CREATE TABLE IF NOT EXISTS paper_trades (
        trade_id       TEXT PRIMARY KEY,
        order_id       TEXT NOT NULL REFERENCES paper_orders (order_id),
        market_id      TEXT NOT NULL,
        side           TEXT NOT NULL,
        token_side     TEXT NOT NULL,
        price          NUMERIC(10,6) NOT NULL,
        size           NUMERIC(20,6) NOT NULL,
        value          NUMERIC(20,6) NOT NULL,
        platform_fee   NUMERIC(20,6) NOT NULL,
        gas_cost       NUMERIC(20,6) NOT NULL,
        slippage_cost  NUMERIC(20,6) NOT NULL,
        total_cost     NUMERIC(20,6) NOT NULL,
        net_value      NUMERIC(20,6) NOT NULL,
        executed_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE INDEX IF NOT EXISTS idx_paper_trades_market
        ON paper_trades (market_id, token_side, executed_at DESC)",
    "CREATE TABLE IF NOT EXISTS paper_positions (
        market_id           TEXT NOT NULL,
        token_side          TEXT NOT NULL,
        quantity            NUMERIC(20,6) NOT NULL DEFAULT 0,
        average_cost        NUMERIC(10,6) NOT NULL DEFAULT 0,
        cost_basis          NUMERIC(20,6) NOT NULL DEFAULT 0,
        current_price       NUMERIC(10,6),
        market_value        NUMERIC(20,6),
        unrealized_pnl      NUMERIC(20,6),
        unrealized_pnl_pct  NUMERIC(8,4),
        updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (market_id, token_side)
    )",
    "CREATE TABLE IF NOT EXISTS paper_pnl (
        id               BIGSERIAL PRIMARY KEY,
        cash_balance     NUMERIC(20,6) NOT NULL,
        position_value   NUMERIC(20,6) NOT NULL,
        total_equity     NUMERIC(20,6) NOT NULL,
        realized_pnl     NUMERIC(20,6) NOT NULL,
        unrealized_pnl   NUMERIC(20,6) NOT NULL,
        total_pnl        NUMERIC(20,6) NOT NULL,
        trades_today     BIGINT NOT NULL DEFAULT 0,
        fill_rate_today  NUMERIC(8,4),
        win_rate_today   NUMERIC(8,4),
        snapshot_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE TABLE IF NOT EXISTS time_analysis (
        analysis_date      DATE NOT NULL,
        hour_of_day        INT NOT NULL,
        opportunity_count  BIGINT NOT NULL DEFAULT 0,
        UNIQUE (analysis_date, hour_of_day)
    )",
    "CREATE TABLE IF NOT EXISTS category_analysis (
        analysis_date      DATE NOT NULL,
        category           TEXT NOT NULL,
        opportunity_count  BIGINT NOT NULL DEFAULT 0,
        UNIQUE (analysis_date, category)
    )",
    "CREATE TABLE IF NOT EXISTS validation_summary (
        id                      BIGSERIAL PRIMARY KEY,
        started_at              TIMESTAMPTZ NOT NULL,
        stopped_at              TIMESTAMPTZ NOT NULL,
        markets_tracked         BIGINT NOT NULL,
        updates_persisted       BIGINT NOT NULL,
        opportunities_detected  BIGINT NOT NULL,
        trades_executed         BIGINT NOT NULL,
        final_equity            NUMERIC(20,6) NOT NULL
    )",
];
