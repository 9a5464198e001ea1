//! Subscription set reconciliation.
//!
//! Holds the desired `asset id -> AssetInfo` map. Replacing the map
//! yields the diff the connection must apply on the wire; the full set
//! is re-sent after every reconnect.

use parking_lot::RwLock;
use polyarb_core::{AssetInfo, TokenId};
use std::collections::HashMap;

/// Wire-level changes produced by a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionDiff {
    pub added: Vec<TokenId>,
    pub removed: Vec<TokenId>,
}

impl SubscriptionDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Current asset subscriptions, shared between the reconciliation task
/// and the connection loop.
#[derive(Default)]
pub struct SubscriptionSet {
    assets: RwLock<HashMap<TokenId, AssetInfo>>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the desired set, returning what changed.
    pub fn replace(&self, new_assets: HashMap<TokenId, AssetInfo>) -> SubscriptionDiff {
        let mut assets = self.assets.write();
        let added = new_assets
            .keys()
            .filter(|k| !assets.contains_key(*k))
            .cloned()
            .collect();
        let removed = assets
            .keys()
            .filter(|k| !new_assets.contains_key(*k))
            .cloned()
            .collect();
        *assets = new_assets;
        SubscriptionDiff { added, removed }
    }

    /// Metadata for one asset, if subscribed.
    pub fn get(&self, token_id: &TokenId) -> Option<AssetInfo> {
        self.assets.read().get(token_id).cloned()
    }

    /// All subscribed asset ids (for the full subscribe frame).
    pub fn asset_ids(&self) -> Vec<String> {
        self.assets
            .read()
            .keys()
            .map(|k| k.as_str().to_string())
            .collect()
    }

    /// YES and NO token ids for one market, when both legs are subscribed.
    pub fn tokens_for_market(&self, market_id: &polyarb_core::MarketId) -> Option<(TokenId, TokenId)> {
        let assets = self.assets.read();
        let mut yes = None;
        let mut no = None;
        for info in assets.values() {
            if &info.market_id != market_id {
                continue;
            }
            match info.outcome {
                polyarb_core::Outcome::Yes => yes = Some(info.token_id.clone()),
                polyarb_core::Outcome::No => no = Some(info.token_id.clone()),
            }
        }
        Some((yes?, no?))
    }

    /// Number of distinct markets currently covered.
    pub fn market_count(&self) -> usize {
        let assets = self.assets.read();
        let mut markets: Vec<&str> = assets.values().map(|a| a.market_id.as_str()).collect();
        markets.sort_unstable();
        markets.dedup();
        markets.len()
    }

    pub fn len(&self) -> usize {
        self.assets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyarb_core::{MarketId, Outcome};
    use rust_decimal::Decimal;

    fn info(token: &str, market: &str, outcome: Outcome) -> (TokenId, AssetInfo) {
        (
            TokenId::from(token),
            AssetInfo {
                token_id: TokenId::from(token),
                market_id: MarketId::from(market),
                outcome,
                question: String::new(),
                category: String::new(),
                volume_24h: Decimal::ZERO,
            },
        )
    }

    #[test]
    fn test_replace_computes_diff() {
        let set = SubscriptionSet::new();
        let diff = set.replace(HashMap::from([
            info("1", "m1", Outcome::Yes),
            info("2", "m1", Outcome::No),
        ]));
        assert_eq!(diff.added.len(), 2);
        assert!(diff.removed.is_empty());

        let mut diff = set.replace(HashMap::from([
            info("2", "m1", Outcome::No),
            info("3", "m2", Outcome::Yes),
        ]));
        diff.added.sort();
        diff.removed.sort();
        assert_eq!(diff.added, vec![TokenId::from("3")]);
        assert_eq!(diff.removed, vec![TokenId::from("1")]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_market_count_dedupes_legs() {
        let set = SubscriptionSet::new();
        set.replace(HashMap::from([
            info("1", "m1", Outcome::Yes),
            info("2", "m1", Outcome::No),
            info("3", "m2", Outcome::Yes),
        ]));
        assert_eq!(set.market_count(), 2);
    }
}
