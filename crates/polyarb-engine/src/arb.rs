//! Arbitrage pair placement and partial-fill hedging.
//!
//! When `yes_ask + no_ask` stays under the threshold, buying both legs
//! at the ask locks in a payoff of 1 at resolution. The pair is
//! self-hedged by construction, so no risk gates apply.

use crate::cost::CostModel;
use crate::error::EngineResult;
use crate::executor::{OrderRequest, PaperEngine};
use crate::store::PaperStore;
use polyarb_core::{MarketId, OrderId, OrderSide, Outcome, Price, Size, TradeId};
use polyarb_db::{ArbExecution, ArbLeg};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// Build the record of an immediate paired-BUY execution: both legs
/// filled in full at the ask, costs applied per leg. Shared between the
/// fast path and tests.
pub fn build_arb_execution(
    market_id: &MarketId,
    yes_price: Price,
    no_price: Price,
    size: Size,
    yes_best_bid: Option<Price>,
    no_best_bid: Option<Price>,
    cost_model: &CostModel,
) -> ArbExecution {
    let build_leg = |token_side: Outcome, price: Price, best_bid: Option<Price>| {
        let value = price.inner() * size.inner();
        let costs = cost_model.costs(value);
        let net_value = cost_model.net_value(value, OrderSide::Buy, &costs);
        ArbLeg {
            order_id: OrderId::generate(),
            trade_id: TradeId::generate(),
            token_side,
            price,
            size,
            value,
            platform_fee: costs.platform_fee,
            gas_cost: costs.gas_cost,
            slippage_cost: costs.slippage_cost,
            total_cost: costs.total_cost,
            net_value,
            best_bid,
            best_ask: Some(price),
        }
    };

    ArbExecution {
        market_id: market_id.clone(),
        yes: build_leg(Outcome::Yes, yes_price, yes_best_bid),
        no: build_leg(Outcome::No, no_price, no_best_bid),
    }
}

impl PaperEngine {
    /// Place a crossing BUY pair against both legs' current asks.
    ///
    /// Re-verifies the arbitrage condition against the latest stored
    /// books; the opportunity may have evaporated between detection and
    /// placement. Returns `None` when aborted.
    pub async fn place_arbitrage_orders(
        &self,
        market_id: &MarketId,
        size: Size,
    ) -> EngineResult<Option<(OrderId, OrderId)>> {
        let store = self.store();
        let (yes_book, no_book) = (
            store.latest_book(market_id, Outcome::Yes).await?,
            store.latest_book(market_id, Outcome::No).await?,
        );
        let (Some(yes_book), Some(no_book)) = (yes_book, no_book) else {
            return Ok(None);
        };
        let (Some(yes_ask), Some(no_ask)) = (yes_book.best_ask, no_book.best_ask) else {
            return Ok(None);
        };

        let sum = yes_ask.inner() + no_ask.inner();
        if sum >= self.config().arb_threshold {
            info!(
                market_id = %market_id,
                sum = %sum,
                "[CYCLE] arbitrage evaporated before placement"
            );
            return Ok(None);
        }

        let yes_liquidity = yes_book.ask_size.map(|p| Size::inner(&p)).unwrap_or(Decimal::ZERO);
        let no_liquidity = no_book.ask_size.map(|p| Size::inner(&p)).unwrap_or(Decimal::ZERO);
        let actual_size = size.inner().min(yes_liquidity).min(no_liquidity);
        if actual_size < self.config().min_arb_size {
            debug!(
                market_id = %market_id,
                actual_size = %actual_size,
                "[CYCLE] arbitrage size below minimum"
            );
            return Ok(None);
        }
        let actual_size = Size::new(actual_size);

        let yes_id = OrderId::generate();
        let no_id = OrderId::generate();
        let yes_order = polyarb_db::NewOrder {
            order_id: yes_id.clone(),
            market_id: market_id.clone(),
            side: OrderSide::Buy,
            token_side: Outcome::Yes,
            order_price: yes_ask,
            order_size: actual_size,
            best_bid: yes_book.best_bid,
            best_ask: Some(yes_ask),
            spread: yes_book.spread,
        };
        let no_order = polyarb_db::NewOrder {
            order_id: no_id.clone(),
            market_id: market_id.clone(),
            side: OrderSide::Buy,
            token_side: Outcome::No,
            order_price: no_ask,
            order_size: actual_size,
            best_bid: no_book.best_bid,
            best_ask: Some(no_ask),
            spread: no_book.spread,
        };

        store.insert_order_pair(&yes_order, &no_order).await?;
        info!(
            market_id = %market_id,
            yes_ask = %yes_ask,
            no_ask = %no_ask,
            size = %actual_size,
            "[CYCLE] arbitrage pair placed"
        );
        Ok(Some((yes_id, no_id)))
    }

    /// Hedge leg imbalances left by partial fills: when the YES and NO
    /// quantities diverge beyond tolerance, SELL the excess leg at its
    /// current best bid. Returns the number of hedge orders placed.
    pub async fn handle_partial_arbitrage_fills(
        &self,
        market_ids: &[MarketId],
    ) -> EngineResult<u64> {
        let mut hedges = 0u64;

        for market_id in market_ids {
            let yes_quantity = self
                .store()
                .position(market_id, Outcome::Yes)
                .await?
                .map(|p| p.quantity)
                .unwrap_or(Decimal::ZERO);
            let no_quantity = self
                .store()
                .position(market_id, Outcome::No)
                .await?
                .map(|p| p.quantity)
                .unwrap_or(Decimal::ZERO);

            let imbalance = yes_quantity - no_quantity;
            if imbalance.abs() <= self.config().hedge_tolerance {
                continue;
            }

            let (excess_side, excess) = if imbalance > Decimal::ZERO {
                (Outcome::Yes, imbalance)
            } else {
                (Outcome::No, -imbalance)
            };

            let Some(book) = self.store().latest_book(market_id, excess_side).await? else {
                warn!(market_id = %market_id, side = %excess_side, "[CYCLE] no book to hedge against");
                continue;
            };
            let Some(best_bid) = book.best_bid else {
                warn!(market_id = %market_id, side = %excess_side, "[CYCLE] no bid to hedge into");
                continue;
            };

            let order_id = self
                .place_order(
                    OrderRequest {
                        market_id: market_id.clone(),
                        side: OrderSide::Sell,
                        token_side: excess_side,
                        price: best_bid,
                        size: Size::new(excess),
                    },
                    Some(best_bid),
                    book.best_ask,
                    book.spread,
                )
                .await?;
            info!(
                market_id = %market_id,
                side = %excess_side,
                excess = %excess,
                order_id = %order_id,
                "[CYCLE] partial-fill hedge placed"
            );
            hedges += 1;
        }

        Ok(hedges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::EngineConfig;
    use crate::mem::MemStore;
    use chrono::Utc;
    use polyarb_db::BookSnapshotRow;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn book(
        market: &str,
        side: Outcome,
        bid: Decimal,
        ask: Decimal,
        ask_size: Decimal,
    ) -> BookSnapshotRow {
        BookSnapshotRow {
            market_id: MarketId::from(market),
            token_side: side,
            best_bid: Some(Price::new(bid)),
            best_ask: Some(Price::new(ask)),
            bid_size: Some(Size::new(dec!(500))),
            ask_size: Some(Size::new(ask_size)),
            spread: Some(Price::new(ask - bid)),
            mid: Some(Price::mid(Price::new(bid), Price::new(ask))),
            scan_timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_pair_placed_when_condition_holds() {
        let store = Arc::new(MemStore::new());
        let engine = PaperEngine::new(store.clone(), EngineConfig::default());
        store.set_book(book("m1", Outcome::Yes, dec!(0.46), dec!(0.48), dec!(100)));
        store.set_book(book("m1", Outcome::No, dec!(0.48), dec!(0.50), dec!(100)));

        let placed = engine
            .place_arbitrage_orders(&MarketId::from("m1"), Size::new(dec!(50)))
            .await
            .unwrap();
        assert!(placed.is_some());

        let orders = store.orders();
        assert_eq!(orders.len(), 2);
        assert!(orders.iter().all(|o| o.side == OrderSide::Buy));
        assert_eq!(orders[0].order_size.inner(), dec!(50));
    }

    #[tokio::test]
    async fn test_pair_aborts_when_opportunity_evaporated() {
        let store = Arc::new(MemStore::new());
        let engine = PaperEngine::new(store.clone(), EngineConfig::default());
        // Books moved: 0.60 + 0.40 = 1.00 >= 0.995.
        store.set_book(book("m1", Outcome::Yes, dec!(0.58), dec!(0.60), dec!(100)));
        store.set_book(book("m1", Outcome::No, dec!(0.38), dec!(0.40), dec!(100)));

        let placed = engine
            .place_arbitrage_orders(&MarketId::from("m1"), Size::new(dec!(50)))
            .await
            .unwrap();
        assert!(placed.is_none());
        assert!(store.orders().is_empty());
    }

    #[tokio::test]
    async fn test_pair_aborts_below_min_size() {
        let store = Arc::new(MemStore::new());
        let engine = PaperEngine::new(store.clone(), EngineConfig::default());
        store.set_book(book("m1", Outcome::Yes, dec!(0.46), dec!(0.48), dec!(5)));
        store.set_book(book("m1", Outcome::No, dec!(0.48), dec!(0.50), dec!(100)));

        let placed = engine
            .place_arbitrage_orders(&MarketId::from("m1"), Size::new(dec!(50)))
            .await
            .unwrap();
        assert!(placed.is_none());
    }

    #[tokio::test]
    async fn test_pair_size_capped_by_liquidity() {
        let store = Arc::new(MemStore::new());
        let engine = PaperEngine::new(store.clone(), EngineConfig::default());
        store.set_book(book("m1", Outcome::Yes, dec!(0.46), dec!(0.48), dec!(30)));
        store.set_book(book("m1", Outcome::No, dec!(0.48), dec!(0.50), dec!(100)));

        engine
            .place_arbitrage_orders(&MarketId::from("m1"), Size::new(dec!(50)))
            .await
            .unwrap()
            .unwrap();
        assert!(store.orders().iter().all(|o| o.order_size.inner() == dec!(30)));
    }

    #[tokio::test]
    async fn test_partial_fill_hedge_sells_excess_leg() {
        let store = Arc::new(MemStore::new());
        let engine = PaperEngine::new(store.clone(), EngineConfig::default());
        let market = MarketId::from("m1");

        // YES leg filled 50, NO leg only 30: 20 excess YES.
        let exec = build_arb_execution(
            &market,
            Price::new(dec!(0.48)),
            Price::new(dec!(0.50)),
            Size::new(dec!(50)),
            Some(Price::new(dec!(0.46))),
            Some(Price::new(dec!(0.48))),
            engine.cost_model(),
        );
        store.record_arbitrage_execution(&exec).await.unwrap();
        // Knock the NO position back down to 30 with a direct sell fill.
        {
            use polyarb_db::FillExecution;
            use polyarb_core::TradeId;
            let sell_order = polyarb_db::NewOrder {
                order_id: polyarb_core::OrderId::generate(),
                market_id: market.clone(),
                side: OrderSide::Sell,
                token_side: Outcome::No,
                order_price: Price::new(dec!(0.40)),
                order_size: Size::new(dec!(20)),
                best_bid: None,
                best_ask: None,
                spread: None,
            };
            store.insert_order(&sell_order).await.unwrap();
            store
                .record_fill(&FillExecution {
                    order_id: sell_order.order_id.clone(),
                    trade_id: TradeId::generate(),
                    market_id: market.clone(),
                    side: OrderSide::Sell,
                    token_side: Outcome::No,
                    fill_price: Price::new(dec!(0.40)),
                    fill_size: Size::new(dec!(20)),
                    value: dec!(8),
                    platform_fee: dec!(0.16),
                    gas_cost: dec!(0.10),
                    slippage_cost: dec!(0.04),
                    total_cost: dec!(0.30),
                    net_value: dec!(7.70),
                })
                .await
                .unwrap();
        }
        store.set_book(book("m1", Outcome::Yes, dec!(0.47), dec!(0.49), dec!(100)));

        let hedges = engine
            .handle_partial_arbitrage_fills(&[market.clone()])
            .await
            .unwrap();
        assert_eq!(hedges, 1);

        let hedge = store
            .orders()
            .into_iter()
            .find(|o| o.side == OrderSide::Sell && o.token_side == Outcome::Yes)
            .unwrap();
        assert_eq!(hedge.order_size.inner(), dec!(20));
        assert_eq!(hedge.order_price.inner(), dec!(0.47));
    }

    #[tokio::test]
    async fn test_balanced_legs_not_hedged() {
        let store = Arc::new(MemStore::new());
        let engine = PaperEngine::new(store.clone(), EngineConfig::default());
        let market = MarketId::from("m1");

        let exec = build_arb_execution(
            &market,
            Price::new(dec!(0.48)),
            Price::new(dec!(0.50)),
            Size::new(dec!(50)),
            None,
            None,
            engine.cost_model(),
        );
        store.record_arbitrage_execution(&exec).await.unwrap();

        let hedges = engine
            .handle_partial_arbitrage_fills(&[market])
            .await
            .unwrap();
        assert_eq!(hedges, 0);
    }
}
