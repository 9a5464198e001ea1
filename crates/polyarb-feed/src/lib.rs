//! Hot price cache and fast-path arbitrage.
//!
//! The cache holds per-market best prices for both outcome legs and is
//! owned by a single writer (the orchestrator's event loop). Every
//! update batch is buffered for the periodic flush, merged into the
//! cache, and evaluated for arbitrage market-by-market.

pub mod cache;
pub mod error;
pub mod fast_arb;
pub mod latency;
pub mod processor;

pub use cache::{HotCache, HotPrices};
pub use error::{FeedError, FeedResult};
pub use fast_arb::{ExecutionRecord, FastArb, FastArbConfig};
pub use latency::{LatencySample, LatencyStats, LatencySummary};
pub use processor::FeedProcessor;
