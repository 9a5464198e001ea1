//! Market-channel wire messages.
//!
//! Four inbound event kinds are handled: `book` (full-depth snapshot),
//! `price_change` (legacy single delta or the newer `price_changes[]`
//! batch carrying best bid/ask directly), `last_trade_price` (trade
//! print, never moves the book), and `tick_size_change` (informational).
//! Frames may carry a single event or an array of events.

use crate::error::{WsError, WsResult};
use serde::Deserialize;
use serde_json::json;

/// Subscribe frame for a set of asset ids.
pub fn subscribe_frame(asset_ids: &[String]) -> String {
    json!({ "type": "subscribe", "assets_ids": asset_ids }).to_string()
}

/// Unsubscribe frame, mirror of the subscribe shape.
pub fn unsubscribe_frame(asset_ids: &[String]) -> String {
    json!({ "type": "unsubscribe", "assets_ids": asset_ids }).to_string()
}

/// One price level as sent on the wire (string-encoded decimals).
#[derive(Debug, Clone, Deserialize)]
pub struct RawLevel {
    pub price: String,
    pub size: String,
}

/// Full-depth book snapshot for one asset.
#[derive(Debug, Clone, Deserialize)]
pub struct RawBook {
    pub asset_id: String,
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default)]
    pub bids: Vec<RawLevel>,
    #[serde(default)]
    pub asks: Vec<RawLevel>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// One entry of the newer `price_changes[]` form.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPriceChangeEntry {
    pub asset_id: String,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub best_bid: Option<String>,
    #[serde(default)]
    pub best_ask: Option<String>,
}

/// Best-price delta. Either the legacy single-delta fields or the newer
/// `price_changes` array is present.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPriceChange {
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub price_changes: Option<Vec<RawPriceChangeEntry>>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Trade print.
#[derive(Debug, Clone, Deserialize)]
pub struct RawLastTrade {
    pub asset_id: String,
    pub price: String,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Tick size change notice.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTickSizeChange {
    pub asset_id: String,
    #[serde(default)]
    pub old_tick_size: Option<String>,
    #[serde(default)]
    pub new_tick_size: Option<String>,
}

/// Decoded inbound event.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event_type")]
pub enum RawEvent {
    #[serde(rename = "book")]
    Book(RawBook),
    #[serde(rename = "price_change")]
    PriceChange(RawPriceChange),
    #[serde(rename = "last_trade_price")]
    LastTradePrice(RawLastTrade),
    #[serde(rename = "tick_size_change")]
    TickSizeChange(RawTickSizeChange),
}

/// Decode a text frame into events. The channel sends either a single
/// event object or an array of them.
pub fn decode_frame(text: &str) -> WsResult<Vec<RawEvent>> {
    if let Ok(events) = serde_json::from_str::<Vec<RawEvent>>(text) {
        return Ok(events);
    }
    match serde_json::from_str::<RawEvent>(text) {
        Ok(event) => Ok(vec![event]),
        Err(e) => Err(WsError::Decode(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_book_event() {
        let frame = r#"{
            "event_type": "book",
            "asset_id": "111",
            "market": "0xabc",
            "bids": [{"price": "0.45", "size": "120"}, {"price": "0.44", "size": "300"}],
            "asks": [{"price": "0.47", "size": "80"}],
            "timestamp": "1700000000000"
        }"#;
        let events = decode_frame(frame).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            RawEvent::Book(book) => {
                assert_eq!(book.asset_id, "111");
                assert_eq!(book.bids.len(), 2);
                assert_eq!(book.asks.len(), 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_array_frame() {
        let frame = r#"[
            {"event_type": "book", "asset_id": "1", "bids": [], "asks": []},
            {"event_type": "tick_size_change", "asset_id": "1", "new_tick_size": "0.001"}
        ]"#;
        let events = decode_frame(frame).unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_decode_legacy_price_change() {
        let frame = r#"{
            "event_type": "price_change",
            "asset_id": "111",
            "price": "0.46",
            "size": "55",
            "side": "BUY"
        }"#;
        let events = decode_frame(frame).unwrap();
        match &events[0] {
            RawEvent::PriceChange(pc) => {
                assert_eq!(pc.asset_id.as_deref(), Some("111"));
                assert_eq!(pc.side.as_deref(), Some("BUY"));
                assert!(pc.price_changes.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_batched_price_change() {
        let frame = r#"{
            "event_type": "price_change",
            "market": "0xabc",
            "price_changes": [
                {"asset_id": "111", "best_bid": "0.45", "best_ask": "0.47"},
                {"asset_id": "222", "best_bid": "0.52", "best_ask": "0.55"}
            ]
        }"#;
        let events = decode_frame(frame).unwrap();
        match &events[0] {
            RawEvent::PriceChange(pc) => {
                let changes = pc.price_changes.as_ref().unwrap();
                assert_eq!(changes.len(), 2);
                assert_eq!(changes[0].best_bid.as_deref(), Some("0.45"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_malformed_frame() {
        assert!(decode_frame("{\"event_type\": \"book\"").is_err());
        assert!(decode_frame("{\"event_type\": \"unknown_kind\"}").is_err());
    }

    #[test]
    fn test_subscribe_frame_shape() {
        let frame = subscribe_frame(&["111".to_string(), "222".to_string()]);
        let v: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(v["type"], "subscribe");
        assert_eq!(v["assets_ids"][1], "222");
    }
}
