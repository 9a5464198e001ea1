//! Raw event normalization.
//!
//! Turns decoded wire events into `PriceUpdate`s using the subscription
//! metadata and a per-asset top-of-book cache owned by the connection
//! loop (single writer). Updates for unsubscribed assets are dropped.

use crate::error::{WsError, WsResult};
use crate::message::{RawBook, RawEvent, RawLastTrade, RawPriceChange};
use crate::subscription::SubscriptionSet;
use chrono::Utc;
use polyarb_core::{AssetInfo, OrderSide, Price, PriceUpdate, Size, TokenId, TopOfBook, TradeEvent};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, trace};

/// Stateful normalizer for one connection.
pub struct Normalizer {
    subscriptions: Arc<SubscriptionSet>,
    books: HashMap<TokenId, TopOfBook>,
}

impl Normalizer {
    pub fn new(subscriptions: Arc<SubscriptionSet>) -> Self {
        Self {
            subscriptions,
            books: HashMap::new(),
        }
    }

    /// Drop cached state for an unsubscribed asset.
    pub fn forget(&mut self, token_id: &TokenId) {
        self.books.remove(token_id);
    }

    /// Apply one event, appending any normalized output.
    pub fn apply(
        &mut self,
        event: RawEvent,
        updates: &mut Vec<PriceUpdate>,
        trades: &mut Vec<TradeEvent>,
    ) -> WsResult<()> {
        match event {
            RawEvent::Book(book) => {
                if let Some(update) = self.apply_book(book)? {
                    updates.push(update);
                }
            }
            RawEvent::PriceChange(change) => {
                self.apply_price_change(change, updates)?;
            }
            RawEvent::LastTradePrice(trade) => {
                if let Some(event) = self.apply_trade(trade)? {
                    trades.push(event);
                }
            }
            RawEvent::TickSizeChange(change) => {
                trace!(asset_id = %change.asset_id, "Tick size change (informational)");
            }
        }
        Ok(())
    }

    /// Full snapshot: best bid is the level with maximum price, best ask
    /// the level with minimum price.
    fn apply_book(&mut self, book: RawBook) -> WsResult<Option<PriceUpdate>> {
        let token_id = TokenId::from(book.asset_id);
        let Some(info) = self.subscriptions.get(&token_id) else {
            debug!(asset_id = %token_id, "Book for unsubscribed asset dropped");
            return Ok(None);
        };

        let mut best_bid: Option<(Price, Size)> = None;
        for level in &book.bids {
            let price = parse_price(&level.price)?;
            let size = parse_size(&level.size)?;
            if best_bid.map_or(true, |(p, _)| price > p) {
                best_bid = Some((price, size));
            }
        }
        let mut best_ask: Option<(Price, Size)> = None;
        for level in &book.asks {
            let price = parse_price(&level.price)?;
            let size = parse_size(&level.size)?;
            if best_ask.map_or(true, |(p, _)| price < p) {
                best_ask = Some((price, size));
            }
        }

        let top = TopOfBook {
            best_bid: best_bid.map(|(p, _)| p),
            best_ask: best_ask.map(|(p, _)| p),
            bid_size: best_bid.map(|(_, s)| s),
            ask_size: best_ask.map(|(_, s)| s),
        };
        self.books.insert(token_id, top);
        Ok(Some(make_update(&info, top)))
    }

    /// Merge a delta into the cached top-of-book. The newer form carries
    /// best bid/ask directly (sizes preserved when not supplied); the
    /// legacy form is a single `{price, size, side}`.
    fn apply_price_change(
        &mut self,
        change: RawPriceChange,
        updates: &mut Vec<PriceUpdate>,
    ) -> WsResult<()> {
        if let Some(entries) = change.price_changes {
            for entry in entries {
                let token_id = TokenId::from(entry.asset_id);
                let Some(info) = self.subscriptions.get(&token_id) else {
                    continue;
                };
                let top = self.books.entry(token_id).or_default();
                if entry.best_bid.is_none() && entry.best_ask.is_none() {
                    // Entry degenerates to the legacy shape.
                    merge_legacy(
                        top,
                        entry.price.as_deref(),
                        entry.size.as_deref(),
                        entry.side.as_deref(),
                    )?;
                } else {
                    if let Some(bid) = entry.best_bid.as_deref() {
                        top.best_bid = Some(parse_price(bid)?);
                    }
                    if let Some(ask) = entry.best_ask.as_deref() {
                        top.best_ask = Some(parse_price(ask)?);
                    }
                }
                updates.push(make_update(&info, *top));
            }
            return Ok(());
        }

        let Some(asset_id) = change.asset_id else {
            return Err(WsError::Decode(
                "price_change without asset_id or price_changes".to_string(),
            ));
        };
        let token_id = TokenId::from(asset_id);
        let Some(info) = self.subscriptions.get(&token_id) else {
            return Ok(());
        };
        let top = self.books.entry(token_id).or_default();
        merge_legacy(
            top,
            change.price.as_deref(),
            change.size.as_deref(),
            change.side.as_deref(),
        )?;
        updates.push(make_update(&info, *top));
        Ok(())
    }

    /// Trade prints never move best bid/ask.
    fn apply_trade(&self, trade: RawLastTrade) -> WsResult<Option<TradeEvent>> {
        let token_id = TokenId::from(trade.asset_id);
        let Some(info) = self.subscriptions.get(&token_id) else {
            return Ok(None);
        };
        let side = trade
            .side
            .as_deref()
            .map(OrderSide::from_str)
            .transpose()
            .map_err(|e| WsError::Decode(e.to_string()))?
            .unwrap_or(OrderSide::Buy);
        Ok(Some(TradeEvent {
            asset_id: info.token_id.clone(),
            market_id: info.market_id.clone(),
            outcome: info.outcome,
            price: parse_price(&trade.price)?,
            size: trade
                .size
                .as_deref()
                .map(parse_size)
                .transpose()?
                .unwrap_or(Size::ZERO),
            side,
            timestamp: Utc::now(),
        }))
    }
}

fn merge_legacy(
    top: &mut TopOfBook,
    price: Option<&str>,
    size: Option<&str>,
    side: Option<&str>,
) -> WsResult<()> {
    let (Some(price), Some(side)) = (price, side) else {
        return Err(WsError::Decode(
            "legacy price_change missing price or side".to_string(),
        ));
    };
    let price = parse_price(price)?;
    let size = size.map(parse_size).transpose()?;
    match OrderSide::from_str(side).map_err(|e| WsError::Decode(e.to_string()))? {
        OrderSide::Buy => {
            top.best_bid = Some(price);
            if size.is_some() {
                top.bid_size = size;
            }
        }
        OrderSide::Sell => {
            top.best_ask = Some(price);
            if size.is_some() {
                top.ask_size = size;
            }
        }
    }
    Ok(())
}

fn make_update(info: &AssetInfo, top: TopOfBook) -> PriceUpdate {
    PriceUpdate {
        asset_id: info.token_id.clone(),
        market_id: info.market_id.clone(),
        outcome: info.outcome,
        best_bid: top.best_bid,
        best_ask: top.best_ask,
        bid_size: top.bid_size,
        ask_size: top.ask_size,
        spread: top.spread(),
        spread_pct: top.spread_pct(),
        question: info.question.clone(),
        category: info.category.clone(),
        volume_24h: info.volume_24h,
        timestamp: Utc::now(),
    }
}

fn parse_price(s: &str) -> WsResult<Price> {
    Price::from_str(s).map_err(|e| WsError::Decode(format!("bad price {s:?}: {e}")))
}

fn parse_size(s: &str) -> WsResult<Size> {
    Size::from_str(s).map_err(|e| WsError::Decode(format!("bad size {s:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::decode_frame;
    use polyarb_core::{MarketId, Outcome};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn subscriptions() -> Arc<SubscriptionSet> {
        let set = SubscriptionSet::new();
        set.replace(HashMap::from([
            (
                TokenId::from("111"),
                AssetInfo {
                    token_id: TokenId::from("111"),
                    market_id: MarketId::from("0xabc"),
                    outcome: Outcome::Yes,
                    question: "Q".to_string(),
                    category: "Sports".to_string(),
                    volume_24h: Decimal::from(1000),
                },
            ),
            (
                TokenId::from("222"),
                AssetInfo {
                    token_id: TokenId::from("222"),
                    market_id: MarketId::from("0xabc"),
                    outcome: Outcome::No,
                    question: "Q".to_string(),
                    category: "Sports".to_string(),
                    volume_24h: Decimal::from(1000),
                },
            ),
        ]));
        Arc::new(set)
    }

    fn apply_frame(normalizer: &mut Normalizer, frame: &str) -> (Vec<PriceUpdate>, Vec<TradeEvent>) {
        let mut updates = Vec::new();
        let mut trades = Vec::new();
        for event in decode_frame(frame).unwrap() {
            normalizer.apply(event, &mut updates, &mut trades).unwrap();
        }
        (updates, trades)
    }

    #[test]
    fn test_book_picks_extreme_levels() {
        let mut normalizer = Normalizer::new(subscriptions());
        let (updates, _) = apply_frame(
            &mut normalizer,
            r#"{
                "event_type": "book",
                "asset_id": "111",
                "bids": [{"price": "0.44", "size": "300"}, {"price": "0.45", "size": "120"}],
                "asks": [{"price": "0.48", "size": "90"}, {"price": "0.47", "size": "80"}]
            }"#,
        );
        assert_eq!(updates.len(), 1);
        let u = &updates[0];
        assert_eq!(u.best_bid.unwrap().inner(), dec!(0.45));
        assert_eq!(u.best_ask.unwrap().inner(), dec!(0.47));
        assert_eq!(u.bid_size.unwrap().inner(), dec!(120));
        assert_eq!(u.ask_size.unwrap().inner(), dec!(80));
        assert_eq!(u.spread.unwrap().inner(), dec!(0.02));
        assert_eq!(u.outcome, Outcome::Yes);
    }

    #[test]
    fn test_legacy_price_change_merges_side() {
        let mut normalizer = Normalizer::new(subscriptions());
        apply_frame(
            &mut normalizer,
            r#"{"event_type": "book", "asset_id": "111",
                "bids": [{"price": "0.45", "size": "120"}],
                "asks": [{"price": "0.47", "size": "80"}]}"#,
        );
        let (updates, _) = apply_frame(
            &mut normalizer,
            r#"{"event_type": "price_change", "asset_id": "111",
                "price": "0.46", "size": "50", "side": "BUY"}"#,
        );
        let u = &updates[0];
        assert_eq!(u.best_bid.unwrap().inner(), dec!(0.46));
        assert_eq!(u.bid_size.unwrap().inner(), dec!(50));
        // Ask side untouched.
        assert_eq!(u.best_ask.unwrap().inner(), dec!(0.47));
        assert_eq!(u.ask_size.unwrap().inner(), dec!(80));
    }

    #[test]
    fn test_batched_price_change_preserves_sizes() {
        let mut normalizer = Normalizer::new(subscriptions());
        apply_frame(
            &mut normalizer,
            r#"{"event_type": "book", "asset_id": "222",
                "bids": [{"price": "0.50", "size": "200"}],
                "asks": [{"price": "0.53", "size": "150"}]}"#,
        );
        let (updates, _) = apply_frame(
            &mut normalizer,
            r#"{"event_type": "price_change",
                "price_changes": [{"asset_id": "222", "best_bid": "0.51", "best_ask": "0.52"}]}"#,
        );
        let u = &updates[0];
        assert_eq!(u.best_bid.unwrap().inner(), dec!(0.51));
        assert_eq!(u.best_ask.unwrap().inner(), dec!(0.52));
        assert_eq!(u.bid_size.unwrap().inner(), dec!(200));
        assert_eq!(u.ask_size.unwrap().inner(), dec!(150));
    }

    #[test]
    fn test_trade_print_does_not_move_book() {
        let mut normalizer = Normalizer::new(subscriptions());
        apply_frame(
            &mut normalizer,
            r#"{"event_type": "book", "asset_id": "111",
                "bids": [{"price": "0.45", "size": "120"}],
                "asks": [{"price": "0.47", "size": "80"}]}"#,
        );
        let (updates, trades) = apply_frame(
            &mut normalizer,
            r#"{"event_type": "last_trade_price", "asset_id": "111",
                "price": "0.46", "size": "10", "side": "SELL"}"#,
        );
        assert!(updates.is_empty());
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price.inner(), dec!(0.46));
        assert_eq!(trades[0].side, OrderSide::Sell);
    }

    #[test]
    fn test_unknown_asset_dropped() {
        let mut normalizer = Normalizer::new(subscriptions());
        let (updates, trades) = apply_frame(
            &mut normalizer,
            r#"{"event_type": "book", "asset_id": "999", "bids": [], "asks": []}"#,
        );
        assert!(updates.is_empty());
        assert!(trades.is_empty());
    }
}
