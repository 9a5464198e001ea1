//! Catalog and orderbook REST client.
//!
//! The catalog returns per-market metadata where `clobTokenIds` and
//! `outcomes` arrive as JSON arrays encoded inside strings, and numeric
//! fields arrive as either numbers or strings. Both quirks are absorbed
//! at the deserialization boundary.

use crate::error::{RegistryError, RegistryResult};
use polyarb_core::{AssetInfo, MarketId, OrderBookLevel, Outcome, Price, Size, TokenId, TopOfBook};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_PAGE_SIZE: usize = 500;
const MAX_RETRIES: u32 = 3;
const BACKOFF_BASE_MS: u64 = 1_000;

/// Registry endpoints and HTTP options.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Market catalog base URL.
    pub catalog_url: String,
    /// Orderbook endpoint base URL.
    pub books_url: String,
    /// Request timeout.
    pub timeout_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            catalog_url: "https://gamma-api.polymarket.com".to_string(),
            books_url: "https://clob.polymarket.com".to_string(),
            timeout_ms: 30_000,
        }
    }
}

/// One market from the catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogMarket {
    #[serde(rename = "conditionId")]
    pub condition_id: String,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(rename = "volume24hr", default, deserialize_with = "de_decimal_opt")]
    pub volume_24h: Option<Decimal>,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<String>,
    #[serde(rename = "endDate", default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub closed: Option<bool>,
    #[serde(default, deserialize_with = "de_string_vec")]
    pub outcomes: Vec<String>,
    #[serde(rename = "clobTokenIds", default, deserialize_with = "de_string_vec")]
    pub clob_token_ids: Vec<String>,
}

impl CatalogMarket {
    /// Resolve the YES and NO token ids by outcome name.
    pub fn token_legs(&self) -> Option<(TokenId, TokenId)> {
        if self.outcomes.len() != 2 || self.clob_token_ids.len() != 2 {
            return None;
        }
        let yes_idx = self
            .outcomes
            .iter()
            .position(|o| o.eq_ignore_ascii_case("yes"))?;
        let no_idx = self
            .outcomes
            .iter()
            .position(|o| o.eq_ignore_ascii_case("no"))?;
        Some((
            TokenId::from(self.clob_token_ids[yes_idx].clone()),
            TokenId::from(self.clob_token_ids[no_idx].clone()),
        ))
    }

    pub fn is_tradeable(&self) -> bool {
        self.active.unwrap_or(false) && !self.closed.unwrap_or(false)
    }
}

/// Level-2-shallow book from the REST endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RestBook {
    #[serde(default)]
    pub market: Option<String>,
    pub asset_id: String,
    #[serde(default)]
    pub bids: Vec<RestLevel>,
    #[serde(default)]
    pub asks: Vec<RestLevel>,
}

impl RestBook {
    /// Bid level with the maximum price.
    pub fn best_bid(&self) -> Option<OrderBookLevel> {
        self.bids
            .iter()
            .max_by_key(|l| l.price)
            .map(|l| OrderBookLevel {
                price: Price::new(l.price),
                size: Size::new(l.size),
            })
    }

    /// Ask level with the minimum price.
    pub fn best_ask(&self) -> Option<OrderBookLevel> {
        self.asks
            .iter()
            .min_by_key(|l| l.price)
            .map(|l| OrderBookLevel {
                price: Price::new(l.price),
                size: Size::new(l.size),
            })
    }

    pub fn top(&self) -> TopOfBook {
        let bid = self.best_bid();
        let ask = self.best_ask();
        TopOfBook {
            best_bid: bid.map(|l| l.price),
            best_ask: ask.map(|l| l.price),
            bid_size: bid.map(|l| l.size),
            ask_size: ask.map(|l| l.size),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestLevel {
    #[serde(deserialize_with = "de_decimal")]
    pub price: Decimal,
    #[serde(deserialize_with = "de_decimal")]
    pub size: Decimal,
}

/// Some catalog responses encode JSON arrays as strings
/// (e.g. `"[\"Yes\",\"No\"]"`).
fn de_string_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    match v {
        Value::Array(arr) => Ok(arr
            .into_iter()
            .filter_map(|x| match x {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect()),
        Value::String(s) => {
            serde_json::from_str::<Vec<String>>(&s).map_err(serde::de::Error::custom)
        }
        _ => Ok(Vec::new()),
    }
}

fn de_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    de_decimal_opt(deserializer)?.ok_or_else(|| serde::de::Error::custom("missing decimal"))
}

fn de_decimal_opt<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    match v {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .to_string()
            .parse::<Decimal>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => s.parse::<Decimal>().map(Some).map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

/// HTTP client for the two auxiliary upstreams.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    config: RegistryConfig,
    http: reqwest::Client,
}

impl RegistryClient {
    pub fn new(config: RegistryConfig) -> RegistryResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self { config, http })
    }

    /// Fetch tradeable markets ordered by 24h volume, paginating until
    /// `max_count` survive the volume floor or the catalog is exhausted.
    pub async fn top_markets(
        &self,
        max_count: usize,
        min_volume: Decimal,
    ) -> RegistryResult<Vec<CatalogMarket>> {
        let mut markets: Vec<CatalogMarket> = Vec::with_capacity(max_count);
        let mut offset = 0usize;

        loop {
            let url = format!(
                "{}/markets?active=true&closed=false&order=volume24hr&ascending=false&limit={}&offset={}",
                self.config.catalog_url, MAX_PAGE_SIZE, offset
            );
            let page: Vec<CatalogMarket> = self.get_with_backoff(&url).await?;
            let page_len = page.len();

            for market in page {
                if !market.is_tradeable() || market.token_legs().is_none() {
                    continue;
                }
                if market.volume_24h.unwrap_or(Decimal::ZERO) < min_volume {
                    continue;
                }
                markets.push(market);
                if markets.len() >= max_count {
                    debug!(count = markets.len(), "Catalog fetch complete");
                    return Ok(markets);
                }
            }

            if page_len < MAX_PAGE_SIZE {
                debug!(count = markets.len(), "Catalog exhausted");
                return Ok(markets);
            }
            offset += MAX_PAGE_SIZE;
        }
    }

    /// Fetch the shallow book for one token. `None` when no book exists
    /// (404); transient failures retry with backoff.
    pub async fn order_book(&self, token_id: &TokenId) -> RegistryResult<Option<RestBook>> {
        let url = format!("{}/book?token_id={}", self.config.books_url, token_id);
        let mut attempt = 0u32;

        loop {
            match self.http.get(&url).send().await {
                Ok(resp) if resp.status().as_u16() == 404 => return Ok(None),
                Ok(resp) if resp.status().is_success() => {
                    return Ok(Some(resp.json::<RestBook>().await?));
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt >= MAX_RETRIES {
                        return Err(RegistryError::Status { status, url });
                    }
                }
                Err(e) => {
                    if attempt >= MAX_RETRIES {
                        return Err(RegistryError::RetriesExhausted(e.to_string()));
                    }
                }
            }
            let delay = BACKOFF_BASE_MS * (1 << attempt);
            warn!(url = %url, attempt, delay_ms = delay, "Orderbook fetch retry");
            tokio::time::sleep(Duration::from_millis(delay)).await;
            attempt += 1;
        }
    }

    async fn get_with_backoff<T: serde::de::DeserializeOwned>(&self, url: &str) -> RegistryResult<T> {
        let mut attempt = 0u32;
        loop {
            match self.http.get(url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(resp.json::<T>().await?);
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt >= MAX_RETRIES {
                        return Err(RegistryError::Status {
                            status,
                            url: url.to_string(),
                        });
                    }
                }
                Err(e) => {
                    if attempt >= MAX_RETRIES {
                        return Err(RegistryError::RetriesExhausted(e.to_string()));
                    }
                }
            }
            let delay = BACKOFF_BASE_MS * (1 << attempt);
            warn!(url = %url, attempt, delay_ms = delay, "Catalog fetch retry");
            tokio::time::sleep(Duration::from_millis(delay)).await;
            attempt += 1;
        }
    }
}

/// Build the asset-id map for subscription reconciliation.
pub fn build_asset_map(markets: &[CatalogMarket]) -> HashMap<TokenId, AssetInfo> {
    let mut map = HashMap::with_capacity(markets.len() * 2);
    for market in markets {
        let Some((yes_token, no_token)) = market.token_legs() else {
            continue;
        };
        let market_id = MarketId::from(market.condition_id.clone());
        let question = market.question.clone().unwrap_or_default();
        let category = market.category.clone().unwrap_or_default();
        let volume = market.volume_24h.unwrap_or(Decimal::ZERO);

        for (token_id, outcome) in [(yes_token, Outcome::Yes), (no_token, Outcome::No)] {
            map.insert(
                token_id.clone(),
                AssetInfo {
                    token_id,
                    market_id: market_id.clone(),
                    outcome,
                    question: question.clone(),
                    category: category.clone(),
                    volume_24h: volume,
                },
            );
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_catalog_market_stringified_arrays() {
        let json = r#"{
            "conditionId": "0xabc",
            "question": "Will it rain?",
            "category": "Weather",
            "volume24hr": "12345.5",
            "active": true,
            "closed": false,
            "outcomes": "[\"Yes\",\"No\"]",
            "clobTokenIds": "[\"111\",\"222\"]"
        }"#;
        let market: CatalogMarket = serde_json::from_str(json).unwrap();
        assert_eq!(market.volume_24h, Some(dec!(12345.5)));
        let (yes, no) = market.token_legs().unwrap();
        assert_eq!(yes.as_str(), "111");
        assert_eq!(no.as_str(), "222");
        assert!(market.is_tradeable());
    }

    #[test]
    fn test_catalog_market_native_arrays() {
        let json = r#"{
            "conditionId": "0xdef",
            "volume24hr": 999,
            "outcomes": ["No", "Yes"],
            "clobTokenIds": ["333", "444"]
        }"#;
        let market: CatalogMarket = serde_json::from_str(json).unwrap();
        let (yes, no) = market.token_legs().unwrap();
        // Outcome order is not fixed; legs resolve by name.
        assert_eq!(yes.as_str(), "444");
        assert_eq!(no.as_str(), "333");
        assert!(!market.is_tradeable());
    }

    #[test]
    fn test_non_binary_market_has_no_legs() {
        let json = r#"{
            "conditionId": "0x123",
            "outcomes": ["A", "B", "C"],
            "clobTokenIds": ["1", "2", "3"]
        }"#;
        let market: CatalogMarket = serde_json::from_str(json).unwrap();
        assert!(market.token_legs().is_none());
    }

    #[test]
    fn test_rest_book_best_levels() {
        let json = r#"{
            "asset_id": "111",
            "bids": [{"price": "0.44", "size": 300}, {"price": "0.45", "size": "120"}],
            "asks": [{"price": "0.48", "size": "90"}, {"price": "0.47", "size": "80"}]
        }"#;
        let book: RestBook = serde_json::from_str(json).unwrap();
        let bid = book.best_bid().unwrap();
        let ask = book.best_ask().unwrap();
        assert_eq!(bid.price.inner(), dec!(0.45));
        assert_eq!(bid.size.inner(), dec!(120));
        assert_eq!(ask.price.inner(), dec!(0.47));
        assert!(book.top().is_complete());
    }

    #[test]
    fn test_build_asset_map() {
        let json = r#"{
            "conditionId": "0xabc",
            "question": "Q",
            "category": "Sports",
            "volume24hr": 50000,
            "active": true,
            "closed": false,
            "outcomes": ["Yes", "No"],
            "clobTokenIds": ["111", "222"]
        }"#;
        let market: CatalogMarket = serde_json::from_str(json).unwrap();
        let map = build_asset_map(&[market]);
        assert_eq!(map.len(), 2);
        let yes = &map[&TokenId::from("111")];
        assert_eq!(yes.outcome, Outcome::Yes);
        assert_eq!(yes.market_id.as_str(), "0xabc");
        assert_eq!(yes.volume_24h, dec!(50000));
    }
}
