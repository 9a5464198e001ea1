//! Hot per-market price cache and flush buffer.

use chrono::{DateTime, Utc};
use polyarb_core::{MarketId, Outcome, Price, PriceUpdate, Size};
use std::collections::{HashMap, VecDeque};
use tracing::warn;

/// Default flush-buffer capacity. Beyond this the tail is dropped.
pub const DEFAULT_BUFFER_CAP: usize = 10_000;

/// Best prices for both legs of one market. Any field stays `None`
/// until that side has been observed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HotPrices {
    pub yes_ask: Option<Price>,
    pub yes_bid: Option<Price>,
    pub no_ask: Option<Price>,
    pub no_bid: Option<Price>,
    pub yes_ask_size: Option<Size>,
    pub no_ask_size: Option<Size>,
    pub last_update: Option<DateTime<Utc>>,
}

/// Single-writer price cache, the authoritative source for the fast path.
#[derive(Debug, Default)]
pub struct HotCache {
    prices: HashMap<MarketId, HotPrices>,
    flush_buffer: VecDeque<PriceUpdate>,
    buffer_cap: usize,
    dropped_updates: u64,
}

impl HotCache {
    pub fn new() -> Self {
        Self::with_buffer_cap(DEFAULT_BUFFER_CAP)
    }

    pub fn with_buffer_cap(buffer_cap: usize) -> Self {
        Self {
            prices: HashMap::new(),
            flush_buffer: VecDeque::new(),
            buffer_cap,
            dropped_updates: 0,
        }
    }

    /// Merge a batch: buffer every update for the next flush, fold each
    /// into its market's hot prices, and return the set of touched
    /// markets (deduplicated, in first-touch order).
    pub fn apply_batch(&mut self, updates: &[PriceUpdate]) -> Vec<MarketId> {
        let mut touched: Vec<MarketId> = Vec::new();

        for update in updates {
            self.buffer(update.clone());
            self.merge(update);
            if !touched.contains(&update.market_id) {
                touched.push(update.market_id.clone());
            }
        }
        touched
    }

    /// Fields are only overwritten for the updated outcome, and only
    /// when the incoming value is non-null.
    fn merge(&mut self, update: &PriceUpdate) {
        let entry = self.prices.entry(update.market_id.clone()).or_default();
        match update.outcome {
            Outcome::Yes => {
                if update.best_ask.is_some() {
                    entry.yes_ask = update.best_ask;
                }
                if update.best_bid.is_some() {
                    entry.yes_bid = update.best_bid;
                }
                if update.ask_size.is_some() {
                    entry.yes_ask_size = update.ask_size;
                }
            }
            Outcome::No => {
                if update.best_ask.is_some() {
                    entry.no_ask = update.best_ask;
                }
                if update.best_bid.is_some() {
                    entry.no_bid = update.best_bid;
                }
                if update.ask_size.is_some() {
                    entry.no_ask_size = update.ask_size;
                }
            }
        }
        entry.last_update = Some(update.timestamp);
    }

    fn buffer(&mut self, update: PriceUpdate) {
        if self.flush_buffer.len() >= self.buffer_cap {
            self.flush_buffer.pop_back();
            self.dropped_updates += 1;
            if self.dropped_updates % 1_000 == 1 {
                warn!(
                    dropped = self.dropped_updates,
                    "Flush buffer full, dropping tail"
                );
            }
        }
        self.flush_buffer.push_back(update);
    }

    /// Drain the flush buffer for persistence.
    pub fn take_flush_buffer(&mut self) -> Vec<PriceUpdate> {
        self.flush_buffer.drain(..).collect()
    }

    /// Re-buffer updates whose flush failed, ahead of newer ones.
    /// The capacity cap still applies.
    pub fn requeue(&mut self, updates: Vec<PriceUpdate>) {
        for update in updates.into_iter().rev() {
            if self.flush_buffer.len() >= self.buffer_cap {
                self.flush_buffer.pop_back();
                self.dropped_updates += 1;
            }
            self.flush_buffer.push_front(update);
        }
    }

    pub fn get(&self, market_id: &MarketId) -> Option<&HotPrices> {
        self.prices.get(market_id)
    }

    pub fn market_count(&self) -> usize {
        self.prices.len()
    }

    pub fn buffer_len(&self) -> usize {
        self.flush_buffer.len()
    }

    pub fn dropped_updates(&self) -> u64 {
        self.dropped_updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyarb_core::TokenId;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn update(market: &str, outcome: Outcome, bid: Option<Decimal>, ask: Option<Decimal>) -> PriceUpdate {
        PriceUpdate {
            asset_id: TokenId::from("t"),
            market_id: MarketId::from(market),
            outcome,
            best_bid: bid.map(Price::new),
            best_ask: ask.map(Price::new),
            bid_size: bid.map(|_| Size::new(dec!(100))),
            ask_size: ask.map(|_| Size::new(dec!(100))),
            spread: None,
            spread_pct: None,
            question: String::new(),
            category: String::new(),
            volume_24h: Decimal::ZERO,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_merge_only_touches_updated_leg() {
        let mut cache = HotCache::new();
        let market = MarketId::from("m1");
        cache.apply_batch(&[update("m1", Outcome::Yes, Some(dec!(0.46)), Some(dec!(0.48)))]);
        cache.apply_batch(&[update("m1", Outcome::No, Some(dec!(0.48)), Some(dec!(0.50)))]);

        let prices = cache.get(&market).unwrap();
        assert_eq!(prices.yes_ask.unwrap().inner(), dec!(0.48));
        assert_eq!(prices.no_ask.unwrap().inner(), dec!(0.50));

        // A YES-only update leaves the NO fields untouched.
        cache.apply_batch(&[update("m1", Outcome::Yes, None, Some(dec!(0.47)))]);
        let prices = cache.get(&market).unwrap();
        assert_eq!(prices.yes_ask.unwrap().inner(), dec!(0.47));
        assert_eq!(prices.yes_bid.unwrap().inner(), dec!(0.46));
        assert_eq!(prices.no_ask.unwrap().inner(), dec!(0.50));
    }

    #[test]
    fn test_null_fields_do_not_clobber() {
        let mut cache = HotCache::new();
        cache.apply_batch(&[update("m1", Outcome::Yes, Some(dec!(0.46)), Some(dec!(0.48)))]);
        cache.apply_batch(&[update("m1", Outcome::Yes, Some(dec!(0.45)), None)]);
        let prices = cache.get(&MarketId::from("m1")).unwrap();
        assert_eq!(prices.yes_bid.unwrap().inner(), dec!(0.45));
        assert_eq!(prices.yes_ask.unwrap().inner(), dec!(0.48));
    }

    #[test]
    fn test_touched_markets_deduped() {
        let mut cache = HotCache::new();
        let touched = cache.apply_batch(&[
            update("m1", Outcome::Yes, Some(dec!(0.46)), Some(dec!(0.48))),
            update("m1", Outcome::No, Some(dec!(0.48)), Some(dec!(0.50))),
            update("m2", Outcome::Yes, Some(dec!(0.30)), Some(dec!(0.32))),
        ]);
        assert_eq!(touched, vec![MarketId::from("m1"), MarketId::from("m2")]);
    }

    #[test]
    fn test_buffer_caps_and_drops_tail() {
        let mut cache = HotCache::with_buffer_cap(3);
        for i in 0..5 {
            cache.apply_batch(&[update(&format!("m{i}"), Outcome::Yes, None, Some(dec!(0.5)))]);
        }
        assert_eq!(cache.buffer_len(), 3);
        assert_eq!(cache.dropped_updates(), 2);
    }

    #[test]
    fn test_requeue_preserves_order() {
        let mut cache = HotCache::new();
        cache.apply_batch(&[update("m2", Outcome::Yes, None, Some(dec!(0.5)))]);
        let failed = vec![
            update("m0", Outcome::Yes, None, Some(dec!(0.1))),
            update("m1", Outcome::Yes, None, Some(dec!(0.2))),
        ];
        cache.requeue(failed);
        let drained = cache.take_flush_buffer();
        let markets: Vec<&str> = drained.iter().map(|u| u.market_id.as_str()).collect();
        assert_eq!(markets, vec!["m0", "m1", "m2"]);
        assert_eq!(cache.buffer_len(), 0);
    }
}
