//! Normalized streaming events emitted by the market-data client.

use crate::decimal::{Price, Size};
use crate::market::{MarketId, Outcome, TokenId};
use crate::order::OrderSide;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Normalized best-price update for one outcome leg.
///
/// Emitted synchronously as messages arrive, batched so downstream can
/// process atomically. Carries the subscription metadata the persistence
/// layer needs for the market snapshot upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdate {
    /// Token id the update refers to.
    pub asset_id: TokenId,
    /// Owning market.
    pub market_id: MarketId,
    /// Which leg was updated.
    pub outcome: Outcome,
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
    pub bid_size: Option<Size>,
    pub ask_size: Option<Size>,
    /// ask - bid, when both sides are known.
    pub spread: Option<Price>,
    /// spread / mid, when both sides are known.
    pub spread_pct: Option<Decimal>,
    /// Question text from the subscription metadata.
    pub question: String,
    /// Category tag from the subscription metadata.
    pub category: String,
    /// 24h notional volume from the subscription metadata.
    pub volume_24h: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// A trade print from the stream. Does not move best bid/ask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub asset_id: TokenId,
    pub market_id: MarketId,
    pub outcome: Outcome,
    pub price: Price,
    pub size: Size,
    pub side: OrderSide,
    pub timestamp: DateTime<Utc>,
}
