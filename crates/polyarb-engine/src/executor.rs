//! Order placement, fill inference and expiry.

use crate::cost::{CostModel, CostModelConfig};
use crate::error::EngineResult;
use crate::mm::{compute_quotes, MarketMakingConfig};
use crate::risk::{GateResult, RiskGateConfig, RiskGates};
use crate::store::PaperStore;
use chrono::Duration;
use polyarb_core::{MarketId, OrderId, OrderSide, Outcome, Price, Size, TradeId};
use polyarb_db::{FillExecution, NewOrder, OrderRow};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// PENDING orders older than this are swept into EXPIRED on every
    /// fill-check cycle.
    pub order_expiry_secs: i64,
    /// Arbitrage re-verification threshold on `yes_ask + no_ask`.
    pub arb_threshold: Decimal,
    /// Minimum executable size for an arbitrage pair.
    pub min_arb_size: Decimal,
    /// Leg-quantity imbalance beyond which partial fills are hedged.
    pub hedge_tolerance: Decimal,
    pub cost: CostModelConfig,
    pub mm: MarketMakingConfig,
    pub risk: RiskGateConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            order_expiry_secs: 300,
            arb_threshold: Decimal::new(995, 3),
            min_arb_size: Decimal::from(10),
            hedge_tolerance: Decimal::new(1, 2),
            cost: CostModelConfig::default(),
            mm: MarketMakingConfig::default(),
            risk: RiskGateConfig::default(),
        }
    }
}

/// Order placement request.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub market_id: MarketId,
    pub side: OrderSide,
    pub token_side: Outcome,
    pub price: Price,
    pub size: Size,
}

/// Result of one market-making placement.
#[derive(Debug, Clone, Default)]
pub struct MmPlacement {
    pub buy_order_id: Option<OrderId>,
    pub sell_order_id: Option<OrderId>,
}

/// Simulated execution engine over a paper store.
pub struct PaperEngine {
    store: Arc<dyn PaperStore>,
    cost_model: CostModel,
    gates: RiskGates,
    config: EngineConfig,
}

impl PaperEngine {
    pub fn new(store: Arc<dyn PaperStore>, config: EngineConfig) -> Self {
        Self {
            store,
            cost_model: CostModel::new(config.cost),
            gates: RiskGates::new(config.risk),
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn PaperStore> {
        &self.store
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost_model
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Place a PENDING order with a snapshot of the book at placement.
    /// No fill logic runs here; fills are inferred later so the
    /// simulator never looks into the future.
    pub async fn place_order(
        &self,
        request: OrderRequest,
        best_bid: Option<Price>,
        best_ask: Option<Price>,
        spread: Option<Price>,
    ) -> EngineResult<OrderId> {
        let order_id = OrderId::generate();
        let order = NewOrder {
            order_id: order_id.clone(),
            market_id: request.market_id,
            side: request.side,
            token_side: request.token_side,
            order_price: request.price,
            order_size: request.size,
            best_bid,
            best_ask,
            spread,
        };
        self.store.insert_order(&order).await?;
        debug!(
            order_id = %order_id,
            market_id = %order.market_id,
            side = %order.side,
            price = %order.order_price,
            size = %order.order_size,
            "Order placed"
        );
        Ok(order_id)
    }

    /// Place improving BUY/SELL quotes on one leg.
    ///
    /// The BUY passes through the risk gates; the SELL is always
    /// attempted (closing exposure is always permitted).
    pub async fn place_market_making_orders(
        &self,
        market_id: &MarketId,
        token_side: Outcome,
        size: Size,
        tick_improvement: Decimal,
    ) -> EngineResult<MmPlacement> {
        let mut placement = MmPlacement::default();

        let Some(book) = self.store.latest_book(market_id, token_side).await? else {
            return Ok(placement);
        };
        let (Some(best_bid), Some(best_ask)) = (book.best_bid, book.best_ask) else {
            return Ok(placement);
        };

        // Gas-cost guard: tiny notionals lose money by construction.
        if size.inner() * best_bid.inner() < self.config.mm.min_notional_usd {
            debug!(market_id = %market_id, token_side = %token_side, "Notional below gas guard, skipped");
            return Ok(placement);
        }

        let Some((buy_price, sell_price)) =
            compute_quotes(best_bid, best_ask, tick_improvement, &self.config.mm)
        else {
            return Ok(placement);
        };
        let spread = Some(best_ask - best_bid);

        match self.gates.check_buy(self.store.as_ref(), market_id, token_side).await? {
            GateResult::Pass => {
                let order_id = self
                    .place_order(
                        OrderRequest {
                            market_id: market_id.clone(),
                            side: OrderSide::Buy,
                            token_side,
                            price: buy_price,
                            size,
                        },
                        Some(best_bid),
                        Some(best_ask),
                        spread,
                    )
                    .await?;
                placement.buy_order_id = Some(order_id);
            }
            GateResult::Block(reason) => {
                info!(market_id = %market_id, token_side = %token_side, reason, "[RISK] BUY blocked");
            }
        }

        let order_id = self
            .place_order(
                OrderRequest {
                    market_id: market_id.clone(),
                    side: OrderSide::Sell,
                    token_side,
                    price: sell_price,
                    size,
                },
                Some(best_bid),
                Some(best_ask),
                spread,
            )
            .await?;
        placement.sell_order_id = Some(order_id);

        Ok(placement)
    }

    /// Infer fills for all PENDING orders against the latest stored
    /// books, then sweep stale orders into EXPIRED.
    ///
    /// A BUY fills iff `best_ask <= order_price` at `min(order, ask)`;
    /// a SELL fills iff `best_bid >= order_price` at `max(order, bid)`
    /// and only when the position can cover it (no synthetic shorts).
    pub async fn check_fills(&self) -> EngineResult<u64> {
        let pending = self.store.pending_orders().await?;
        let mut fill_count = 0u64;

        for order in &pending {
            let Some(book) = self
                .store
                .latest_book(&order.market_id, order.token_side)
                .await?
            else {
                continue;
            };

            let fill_price = match order.side {
                OrderSide::Buy => match book.best_ask {
                    Some(ask) if ask <= order.order_price => {
                        Some(Price::new(order.order_price.inner().min(ask.inner())))
                    }
                    _ => None,
                },
                OrderSide::Sell => match book.best_bid {
                    Some(bid) if bid >= order.order_price => {
                        let quantity = self
                            .store
                            .position(&order.market_id, order.token_side)
                            .await?
                            .map(|p| p.quantity)
                            .unwrap_or(Decimal::ZERO);
                        if quantity >= order.order_size.inner() {
                            Some(Price::new(order.order_price.inner().max(bid.inner())))
                        } else {
                            // Left PENDING; the expiry sweep picks it up.
                            debug!(
                                order_id = %order.order_id,
                                quantity = %quantity,
                                "SELL without covering position left pending"
                            );
                            None
                        }
                    }
                    _ => None,
                },
            };

            if let Some(price) = fill_price {
                let fill = self.build_fill(order, price);
                if self.store.record_fill(&fill).await? {
                    fill_count += 1;
                }
            }
        }

        self.store
            .expire_old_pending_orders(Duration::seconds(self.config.order_expiry_secs))
            .await?;

        Ok(fill_count)
    }

    fn build_fill(&self, order: &OrderRow, fill_price: Price) -> FillExecution {
        let value = fill_price.inner() * order.order_size.inner();
        let costs = self.cost_model.costs(value);
        let net_value = self.cost_model.net_value(value, order.side, &costs);
        FillExecution {
            order_id: order.order_id.clone(),
            trade_id: TradeId::generate(),
            market_id: order.market_id.clone(),
            side: order.side,
            token_side: order.token_side,
            fill_price,
            fill_size: order.order_size,
            value,
            platform_fee: costs.platform_fee,
            gas_cost: costs.gas_cost,
            slippage_cost: costs.slippage_cost,
            total_cost: costs.total_cost,
            net_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::MemStore;
    use polyarb_db::BookSnapshotRow;
    use rust_decimal_macros::dec;

    fn book(market: &str, side: Outcome, bid: Decimal, ask: Decimal) -> BookSnapshotRow {
        BookSnapshotRow {
            market_id: MarketId::from(market),
            token_side: side,
            best_bid: Some(Price::new(bid)),
            best_ask: Some(Price::new(ask)),
            bid_size: Some(Size::new(dec!(500))),
            ask_size: Some(Size::new(dec!(500))),
            spread: Some(Price::new(ask - bid)),
            mid: Some(Price::mid(Price::new(bid), Price::new(ask))),
            scan_timestamp: Utc::now(),
        }
    }

    fn engine(store: Arc<MemStore>) -> PaperEngine {
        PaperEngine::new(store, EngineConfig::default())
    }

    use chrono::Utc;

    #[tokio::test]
    async fn test_buy_fill_at_touched_ask() {
        let store = Arc::new(MemStore::new());
        let engine = engine(store.clone());

        // PENDING BUY at 0.30 size 50; ask drops to 0.28.
        engine
            .place_order(
                OrderRequest {
                    market_id: MarketId::from("m1"),
                    side: OrderSide::Buy,
                    token_side: Outcome::Yes,
                    price: Price::new(dec!(0.30)),
                    size: Size::new(dec!(50)),
                },
                None,
                None,
                None,
            )
            .await
            .unwrap();
        store.set_book(book("m1", Outcome::Yes, dec!(0.26), dec!(0.28)));

        let fills = engine.check_fills().await.unwrap();
        assert_eq!(fills, 1);

        let trades = store.trades();
        assert_eq!(trades.len(), 1);
        let trade = &trades[0];
        assert_eq!(trade.price.inner(), dec!(0.28));
        assert_eq!(trade.value, dec!(14.00));
        assert_eq!(trade.total_cost, dec!(0.4500));
        assert_eq!(trade.net_value, dec!(-14.4500));

        let position = store
            .position(&MarketId::from("m1"), Outcome::Yes)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(position.quantity, dec!(50));
        assert_eq!(position.average_cost, dec!(0.28));
        assert_eq!(position.cost_basis, dec!(14.00));
    }

    #[tokio::test]
    async fn test_buy_does_not_fill_above_limit() {
        let store = Arc::new(MemStore::new());
        let engine = engine(store.clone());

        engine
            .place_order(
                OrderRequest {
                    market_id: MarketId::from("m1"),
                    side: OrderSide::Buy,
                    token_side: Outcome::Yes,
                    price: Price::new(dec!(0.30)),
                    size: Size::new(dec!(50)),
                },
                None,
                None,
                None,
            )
            .await
            .unwrap();
        store.set_book(book("m1", Outcome::Yes, dec!(0.30), dec!(0.32)));

        assert_eq!(engine.check_fills().await.unwrap(), 0);
        assert!(store.trades().is_empty());
    }

    #[tokio::test]
    async fn test_sell_blocked_without_position_stays_pending() {
        let store = Arc::new(MemStore::new());
        let engine = engine(store.clone());

        // SELL size 20 at 0.60 with no position; bid crosses at 0.65.
        engine
            .place_order(
                OrderRequest {
                    market_id: MarketId::from("m1"),
                    side: OrderSide::Sell,
                    token_side: Outcome::Yes,
                    price: Price::new(dec!(0.60)),
                    size: Size::new(dec!(20)),
                },
                None,
                None,
                None,
            )
            .await
            .unwrap();
        store.set_book(book("m1", Outcome::Yes, dec!(0.65), dec!(0.67)));

        assert_eq!(engine.check_fills().await.unwrap(), 0);
        let orders = store.orders();
        assert_eq!(orders[0].status, polyarb_core::OrderStatus::Pending);

        // After the expiry window it is swept into EXPIRED.
        store
            .expire_old_pending_orders(Duration::seconds(-1))
            .await
            .unwrap();
        assert_eq!(store.orders()[0].status, polyarb_core::OrderStatus::Expired);
    }

    #[tokio::test]
    async fn test_sell_fill_reduces_position_at_bid() {
        let store = Arc::new(MemStore::new());
        let engine = engine(store.clone());
        let market = MarketId::from("m1");

        // Open a long first via a filled BUY.
        engine
            .place_order(
                OrderRequest {
                    market_id: market.clone(),
                    side: OrderSide::Buy,
                    token_side: Outcome::Yes,
                    price: Price::new(dec!(0.50)),
                    size: Size::new(dec!(100)),
                },
                None,
                None,
                None,
            )
            .await
            .unwrap();
        store.set_book(book("m1", Outcome::Yes, dec!(0.48), dec!(0.50)));
        assert_eq!(engine.check_fills().await.unwrap(), 1);

        engine
            .place_order(
                OrderRequest {
                    market_id: market.clone(),
                    side: OrderSide::Sell,
                    token_side: Outcome::Yes,
                    price: Price::new(dec!(0.55)),
                    size: Size::new(dec!(40)),
                },
                None,
                None,
                None,
            )
            .await
            .unwrap();
        store.set_book(book("m1", Outcome::Yes, dec!(0.58), dec!(0.60)));
        assert_eq!(engine.check_fills().await.unwrap(), 1);

        let position = store.position(&market, Outcome::Yes).await.unwrap().unwrap();
        assert_eq!(position.quantity, dec!(60));
        // Average cost unchanged by the reducing SELL.
        assert_eq!(position.average_cost, dec!(0.50));

        let sell = store
            .trades()
            .into_iter()
            .find(|t| t.side == OrderSide::Sell)
            .unwrap();
        // SELL fills at max(order, bid) = 0.58.
        assert_eq!(sell.price.inner(), dec!(0.58));
        assert!(sell.net_value > Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_mm_skips_tiny_notional() {
        let store = Arc::new(MemStore::new());
        let engine = engine(store.clone());
        store.set_book(book("m1", Outcome::Yes, dec!(0.40), dec!(0.50)));

        // 10 * 0.40 = $4 notional, under the $5 gas guard.
        let placement = engine
            .place_market_making_orders(
                &MarketId::from("m1"),
                Outcome::Yes,
                Size::new(dec!(10)),
                dec!(0.002),
            )
            .await
            .unwrap();
        assert!(placement.buy_order_id.is_none());
        assert!(placement.sell_order_id.is_none());
        assert!(store.orders().is_empty());
    }

    #[tokio::test]
    async fn test_mm_places_both_sides_when_gates_pass() {
        let store = Arc::new(MemStore::new());
        let engine = engine(store.clone());
        store.set_book(book("m1", Outcome::Yes, dec!(0.40), dec!(0.50)));

        let placement = engine
            .place_market_making_orders(
                &MarketId::from("m1"),
                Outcome::Yes,
                Size::new(dec!(50)),
                dec!(0.02),
            )
            .await
            .unwrap();
        assert!(placement.buy_order_id.is_some());
        assert!(placement.sell_order_id.is_some());

        let orders = store.orders();
        assert_eq!(orders.len(), 2);
        let buy = orders.iter().find(|o| o.side == OrderSide::Buy).unwrap();
        let sell = orders.iter().find(|o| o.side == OrderSide::Sell).unwrap();
        assert_eq!(buy.order_price.inner(), dec!(0.42));
        assert_eq!(sell.order_price.inner(), dec!(0.48));
    }

    #[tokio::test]
    async fn test_mm_trend_filter_blocks_buy_only() {
        let store = Arc::new(MemStore::new());
        let engine = engine(store.clone());
        let market = MarketId::from("m1");

        // Mid dropped from 0.60 to 0.45 over the lookback: -25%.
        store.push_mid(
            &market,
            Outcome::Yes,
            Utc::now() - Duration::minutes(25),
            dec!(0.60),
        );
        store.set_book(book("m1", Outcome::Yes, dec!(0.40), dec!(0.50)));

        let placement = engine
            .place_market_making_orders(&market, Outcome::Yes, Size::new(dec!(50)), dec!(0.02))
            .await
            .unwrap();
        assert!(placement.buy_order_id.is_none());
        assert!(placement.sell_order_id.is_some());
    }
}
