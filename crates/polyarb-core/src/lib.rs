//! Core domain types for the polyarb validation engine.
//!
//! This crate provides fundamental types used throughout the system:
//! - `MarketId`, `TokenId`: identifiers for binary markets and their outcome legs
//! - `Price`, `Size`: precision-safe numeric types
//! - `Outcome`, `OrderSide`, `OrderStatus`, `OpportunityKind`: closed trading enums
//! - `PriceUpdate`, `TradeEvent`: normalized streaming events

pub mod decimal;
pub mod error;
pub mod market;
pub mod opportunity;
pub mod order;
pub mod position;
pub mod update;

pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use market::{AssetInfo, MarketId, Outcome, OrderBookLevel, TokenId, TopOfBook};
pub use opportunity::{ObservedOpportunity, OpportunityKind};
pub use order::{OrderId, OrderSide, OrderStatus, TradeId};
pub use position::{apply_trade, mark_position, pnl_pct, PositionState};
pub use update::{PriceUpdate, TradeEvent};
