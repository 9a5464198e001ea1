//! Postgres persistence for the polyarb validation engine.
//!
//! Owns every stored row: market and orderbook snapshots, the opportunity
//! log, and the paper book (markets, orders, trades, positions, P&L).
//! Multi-step writes run inside explicit transactions; streaming upserts
//! use conflict keys so a scan window is idempotent.

pub mod analysis;
pub mod db;
pub mod error;
pub mod execution;
pub mod markets;
pub mod opportunities;
pub mod orders;
pub mod pnl;
pub mod positions;
pub mod snapshots;

pub use analysis::ValidationSummaryRow;
pub use db::{Db, DbConfig, REQUIRED_TABLES};
pub use error::{DbError, DbResult};
pub use execution::{ArbExecution, ArbLeg, FillExecution};
pub use markets::{MarketCandidate, PaperMarketRow, SelectionReason};
pub use opportunities::{diff_keys, ActiveOpportunityKey, OpportunityDiff};
pub use orders::{NewOrder, OrderRow};
pub use pnl::{PnlSnapshotRow, TradeStats};
pub use positions::PositionRow;
pub use snapshots::BookSnapshotRow;
