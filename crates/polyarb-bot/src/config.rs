//! Environment-driven application configuration.

use crate::error::{AppError, AppResult};
use polyarb_detector::DetectorConfig;
use polyarb_engine::EngineConfig;
use polyarb_feed::FastArbConfig;
use polyarb_registry::RegistryConfig;
use polyarb_ws::StreamConfig;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Top-level configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Relational store connection string.
    pub database_url: String,
    /// Subscription cap in markets.
    pub priority_market_count: usize,
    /// Master switch for the simulated market-making cycle.
    pub paper_trading_enabled: bool,
    /// Starting cash balance.
    pub initial_capital: Decimal,
    /// Paper markets seeded at startup.
    pub markets_to_select: usize,
    /// Snapshot retention.
    pub retention_days: u32,
    /// Fast-path and batch arbitrage cutoff on `yes_ask + no_ask`.
    pub arbitrage_threshold: Decimal,
    /// Batch detector: relative spread cutoff.
    pub wide_spread_threshold: Decimal,
    /// Batch detector: volume spike multiplier.
    pub volume_spike_multiplier: Decimal,
    /// Batch detector: a thin book has fewer than this many makers'
    /// worth of best-level liquidity (100 units per maker).
    pub thin_book_maker_count: u32,
    /// Hard cap on subscribed assets.
    pub ws_max_subscriptions: usize,
    /// Volume floor for catalog markets.
    pub min_volume: Decimal,
    /// Heartbeat ping interval.
    pub ws_heartbeat_ms: u64,
    /// Stream endpoint.
    pub ws_url: String,
    /// Reconnect delay.
    pub ws_reconnect_interval_ms: u64,
    /// Market catalog endpoint.
    pub catalog_url: String,
    /// Orderbook REST endpoint.
    pub books_url: String,
    /// Market-making order size per quote.
    pub mm_order_size: Decimal,
    /// Market-making tick improvement.
    pub mm_tick_improvement: Decimal,
    /// Fast-path order size cap per leg.
    pub arb_order_size: Decimal,
}

impl Default for AppConfig {
    fn default() -> Self {
        let registry = RegistryConfig::default();
        let stream = StreamConfig::default();
        Self {
            database_url: String::new(),
            priority_market_count: 50,
            paper_trading_enabled: true,
            initial_capital: Decimal::from(10_000),
            markets_to_select: 3,
            retention_days: 7,
            arbitrage_threshold: Decimal::new(995, 3),
            wide_spread_threshold: Decimal::new(5, 2),
            volume_spike_multiplier: Decimal::from(3),
            thin_book_maker_count: 5,
            ws_max_subscriptions: 100,
            min_volume: Decimal::from(10_000),
            ws_heartbeat_ms: 30_000,
            ws_url: stream.url,
            ws_reconnect_interval_ms: stream.reconnect_interval_ms,
            catalog_url: registry.catalog_url,
            books_url: registry.books_url,
            mm_order_size: Decimal::from(50),
            mm_tick_improvement: Decimal::new(2, 3),
            arb_order_size: Decimal::from(50),
        }
    }
}

fn read_var<T: FromStr>(name: &str, default: T) -> AppResult<T> {
    match std::env::var(name) {
        Ok(raw) if !raw.is_empty() => raw
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{name}={raw:?} is not valid"))),
        _ => Ok(default),
    }
}

fn read_bool(name: &str, default: bool) -> AppResult<bool> {
    match std::env::var(name) {
        Ok(raw) if !raw.is_empty() => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(AppError::Config(format!("{name}={raw:?} is not a boolean"))),
        },
        _ => Ok(default),
    }
}

impl AppConfig {
    /// Read configuration from the environment, falling back to
    /// defaults for everything except `DATABASE_URL`.
    pub fn from_env() -> AppResult<Self> {
        let defaults = Self::default();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| AppError::Config("DATABASE_URL is required".to_string()))?;

        let config = Self {
            database_url,
            priority_market_count: read_var("PRIORITY_MARKET_COUNT", defaults.priority_market_count)?,
            paper_trading_enabled: read_bool("PAPER_TRADING_ENABLED", defaults.paper_trading_enabled)?,
            initial_capital: read_var("INITIAL_CAPITAL", defaults.initial_capital)?,
            markets_to_select: read_var("MARKETS_TO_SELECT", defaults.markets_to_select)?,
            retention_days: read_var("RETENTION_DAYS", defaults.retention_days)?,
            arbitrage_threshold: read_var("ARBITRAGE_THRESHOLD", defaults.arbitrage_threshold)?,
            wide_spread_threshold: read_var("WIDE_SPREAD_THRESHOLD", defaults.wide_spread_threshold)?,
            volume_spike_multiplier: read_var("VOLUME_SPIKE_MULTIPLIER", defaults.volume_spike_multiplier)?,
            thin_book_maker_count: read_var("THIN_BOOK_MAKER_COUNT", defaults.thin_book_maker_count)?,
            ws_max_subscriptions: read_var("WS_MAX_SUBSCRIPTIONS", defaults.ws_max_subscriptions)?,
            min_volume: read_var("MIN_VOLUME", defaults.min_volume)?,
            ws_heartbeat_ms: read_var("WS_HEARTBEAT_MS", defaults.ws_heartbeat_ms)?,
            ws_url: read_var("WS_URL", defaults.ws_url)?,
            ws_reconnect_interval_ms: read_var("WS_RECONNECT_INTERVAL_MS", defaults.ws_reconnect_interval_ms)?,
            catalog_url: read_var("CATALOG_URL", defaults.catalog_url)?,
            books_url: read_var("BOOKS_URL", defaults.books_url)?,
            mm_order_size: read_var("MM_ORDER_SIZE", defaults.mm_order_size)?,
            mm_tick_improvement: read_var("MM_TICK_IMPROVEMENT", defaults.mm_tick_improvement)?,
            arb_order_size: read_var("ARB_ORDER_SIZE", defaults.arb_order_size)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AppResult<()> {
        if self.database_url.is_empty() {
            return Err(AppError::Config("DATABASE_URL is required".to_string()));
        }
        if self.priority_market_count == 0 {
            return Err(AppError::Config("PRIORITY_MARKET_COUNT must be positive".to_string()));
        }
        if self.arbitrage_threshold <= Decimal::ZERO || self.arbitrage_threshold > Decimal::ONE {
            return Err(AppError::Config("ARBITRAGE_THRESHOLD must be in (0, 1]".to_string()));
        }
        if self.initial_capital <= Decimal::ZERO {
            return Err(AppError::Config("INITIAL_CAPITAL must be positive".to_string()));
        }
        Ok(())
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            url: self.ws_url.clone(),
            reconnect_interval_ms: self.ws_reconnect_interval_ms,
            heartbeat_interval_ms: self.ws_heartbeat_ms,
        }
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            catalog_url: self.catalog_url.clone(),
            books_url: self.books_url.clone(),
            timeout_ms: 30_000,
        }
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            arbitrage_threshold: self.arbitrage_threshold,
            wide_spread_threshold: self.wide_spread_threshold,
            volume_spike_multiplier: self.volume_spike_multiplier,
            thin_book_min_volume: self.min_volume,
            thin_book_max_liquidity: Decimal::from(self.thin_book_maker_count) * Decimal::from(100),
            ..DetectorConfig::default()
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            arb_threshold: self.arbitrage_threshold,
            ..EngineConfig::default()
        }
    }

    pub fn fast_arb_config(&self) -> FastArbConfig {
        FastArbConfig {
            threshold: self.arbitrage_threshold,
            order_size: self.arb_order_size,
            ..FastArbConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_follow_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.arbitrage_threshold, dec!(0.995));
        assert_eq!(config.wide_spread_threshold, dec!(0.05));
        assert_eq!(config.volume_spike_multiplier, dec!(3));
        assert_eq!(config.ws_max_subscriptions, 100);
        assert_eq!(config.min_volume, dec!(10000));
        assert_eq!(config.ws_heartbeat_ms, 30_000);
        assert_eq!(config.thin_book_maker_count, 5);
    }

    #[test]
    fn test_thin_book_liquidity_derivation() {
        let config = AppConfig {
            database_url: "postgres://x".to_string(),
            ..AppConfig::default()
        };
        assert_eq!(config.detector_config().thin_book_max_liquidity, dec!(500));
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let config = AppConfig {
            database_url: "postgres://x".to_string(),
            arbitrage_threshold: dec!(1.5),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
