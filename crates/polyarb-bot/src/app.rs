//! Main application orchestration.
//!
//! Owns the single event loop: streamed update batches, the periodic
//! tasks (buffer flush, subscription refresh, batch detection, P&L
//! snapshot, market-making cycle, dashboard, hourly maintenance), and
//! graceful shutdown. The hot cache and fast path live inside this loop,
//! so there is exactly one writer.

use crate::config::AppConfig;
use crate::dashboard::{self, StatusSnapshot};
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use polyarb_core::{MarketId, Outcome, Size};
use polyarb_db::{Db, DbConfig, PnlSnapshotRow, SelectionReason, ValidationSummaryRow};
use polyarb_detector::BatchDetector;
use polyarb_engine::{CostModel, PaperEngine, PaperStore};
use polyarb_feed::FeedProcessor;
use polyarb_registry::{build_asset_map, RegistryClient};
use polyarb_telemetry::metrics;
use polyarb_ws::{
    ConnectionManager, ConnectionState, FeedEvent, StreamStatsSnapshot, SubscriptionDiff,
    SubscriptionSet,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

const FLUSH_PERIOD: Duration = Duration::from_secs(5);
const SUBSCRIPTION_REFRESH_PERIOD: Duration = Duration::from_secs(300);
const DETECTION_PERIOD: Duration = Duration::from_secs(10);
const PNL_PERIOD: Duration = Duration::from_secs(900);
const MARKET_MAKING_PERIOD: Duration = Duration::from_secs(60);
const DASHBOARD_PERIOD: Duration = Duration::from_secs(10);
const MAINTENANCE_PERIOD: Duration = Duration::from_secs(3_600);

/// Opportunities older than this are force-expired by maintenance.
const OPPORTUNITY_MAX_AGE_MINS: i64 = 60;

fn every(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Main application.
pub struct Application {
    config: AppConfig,
    db: Db,
    registry: RegistryClient,
    subscriptions: Arc<SubscriptionSet>,
    connection: Arc<ConnectionManager>,
    diff_tx: mpsc::Sender<SubscriptionDiff>,
    diff_rx: Option<mpsc::Receiver<SubscriptionDiff>>,
    event_rx: mpsc::Receiver<FeedEvent>,
    processor: FeedProcessor,
    engine: PaperEngine,
    detector: BatchDetector,
    is_stopping: bool,
    started_at: DateTime<Utc>,
    updates_persisted: u64,
    last_stream_stats: StreamStatsSnapshot,
}

impl Application {
    /// Initialize persistence, verify the schema, and wire components.
    /// Fatal on configuration or schema errors.
    pub async fn new(config: AppConfig) -> AppResult<Self> {
        let db = Db::connect(&DbConfig {
            database_url: config.database_url.clone(),
            ..DbConfig::default()
        })
        .await?;
        db.init_schema().await?;
        db.verify_schema().await?;

        let registry = RegistryClient::new(config.registry_config())?;
        let subscriptions = Arc::new(SubscriptionSet::new());

        let (event_tx, event_rx) = mpsc::channel(8_192);
        let (diff_tx, diff_rx) = mpsc::channel(16);
        let connection = Arc::new(ConnectionManager::new(
            config.stream_config(),
            subscriptions.clone(),
            event_tx,
        ));

        let store: Arc<dyn PaperStore> = Arc::new(db.clone());
        let engine = PaperEngine::new(store.clone(), config.engine_config());
        let processor = FeedProcessor::new(
            store,
            CostModel::new(config.engine_config().cost),
            config.fast_arb_config(),
        );
        let detector = BatchDetector::new(db.clone(), config.detector_config())?;

        Ok(Self {
            config,
            db,
            registry,
            subscriptions,
            connection,
            diff_tx,
            diff_rx: Some(diff_rx),
            event_rx,
            processor,
            engine,
            detector,
            is_stopping: false,
            started_at: Utc::now(),
            updates_persisted: 0,
            last_stream_stats: StreamStatsSnapshot::default(),
        })
    }

    /// Run until a shutdown signal arrives.
    pub async fn run(&mut self) -> AppResult<()> {
        let Some(diff_rx) = self.diff_rx.take() else {
            return Err(AppError::Config("application already ran".to_string()));
        };

        if let Err(e) = self.refresh_subscriptions().await {
            warn!(error = %e, "[WS-VALIDATOR] initial catalog fetch failed, starting empty");
        }

        let connection = self.connection.clone();
        let mut ws_handle = tokio::spawn(async move { connection.run(diff_rx).await });

        if self.config.paper_trading_enabled {
            self.seed_paper_markets().await;
        }

        let mut flush = every(FLUSH_PERIOD);
        let mut refresh = every(SUBSCRIPTION_REFRESH_PERIOD);
        let mut detect = every(DETECTION_PERIOD);
        let mut pnl = every(PNL_PERIOD);
        let mut market_making = every(MARKET_MAKING_PERIOD);
        let mut dashboard_tick = every(DASHBOARD_PERIOD);
        let mut maintenance = every(MAINTENANCE_PERIOD);

        info!(
            markets = self.subscriptions.market_count(),
            assets = self.subscriptions.len(),
            "[WS-VALIDATOR] running"
        );

        let signal_fut = wait_for_signal();
        tokio::pin!(signal_fut);

        while !self.is_stopping {
            tokio::select! {
                event = self.event_rx.recv() => {
                    match event {
                        Some(FeedEvent::PriceUpdates(batch)) => {
                            let executed = self.processor.on_price_updates(&batch).await;
                            if executed > 0 {
                                metrics::FAST_ARB_EXECUTIONS_TOTAL.inc_by(executed);
                            }
                        }
                        Some(FeedEvent::Trade(trade)) => {
                            trace!(
                                market_id = %trade.market_id,
                                outcome = %trade.outcome,
                                price = %trade.price,
                                "Trade print"
                            );
                        }
                        None => {
                            warn!("[WS-VALIDATOR] feed channel closed");
                            break;
                        }
                    }
                }
                _ = flush.tick() => self.flush_buffer().await,
                _ = refresh.tick() => {
                    if let Err(e) = self.refresh_subscriptions().await {
                        error!(error = %e, "[WS-VALIDATOR] subscription refresh failed");
                    }
                }
                _ = detect.tick() => self.detection_pass().await,
                _ = pnl.tick() => {
                    if let Err(e) = self.record_pnl_snapshot().await {
                        error!(error = %e, "[WS-VALIDATOR] P&L snapshot failed");
                    }
                }
                _ = market_making.tick() => self.market_making_cycle().await,
                _ = dashboard_tick.tick() => self.render_dashboard().await,
                _ = maintenance.tick() => self.hourly_maintenance().await,
                _ = &mut signal_fut => {
                    info!("[WS-VALIDATOR] shutdown signal received");
                    self.is_stopping = true;
                }
                result = &mut ws_handle => {
                    match result {
                        Ok(Ok(())) => warn!("[WS-VALIDATOR] stream task ended"),
                        Ok(Err(e)) => error!(error = %e, "[WS-VALIDATOR] stream task failed"),
                        Err(e) => error!(error = %e, "[WS-VALIDATOR] stream task panicked"),
                    }
                    break;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Fetch the top catalog markets and reconcile the subscription set.
    async fn refresh_subscriptions(&mut self) -> AppResult<()> {
        if self.is_stopping {
            return Ok(());
        }
        let market_cap = self
            .config
            .priority_market_count
            .min(self.config.ws_max_subscriptions / 2);
        let mut markets = self
            .registry
            .top_markets(market_cap, self.config.min_volume)
            .await?;
        markets.truncate(market_cap);

        let asset_map = build_asset_map(&markets);
        let diff = self.subscriptions.replace(asset_map);
        if !diff.is_empty() {
            info!(
                added = diff.added.len(),
                removed = diff.removed.len(),
                markets = self.subscriptions.market_count(),
                "[WS-VALIDATOR] subscription set reconciled"
            );
            if self.diff_tx.send(diff).await.is_err() {
                warn!("[WS-VALIDATOR] connection loop dropped the diff channel");
            }
        }
        Ok(())
    }

    /// Drain the flush buffer into persistence. Failed batches re-buffer
    /// for the next tick.
    async fn flush_buffer(&mut self) {
        let updates = self.processor.take_flush_buffer();
        if updates.is_empty() {
            return;
        }
        let scan_timestamp = Utc::now();
        match self.db.batch_insert_ws_updates(&updates, scan_timestamp).await {
            Ok(rows) => {
                self.updates_persisted += rows;
                debug!(rows, "[WS-VALIDATOR] flushed update buffer");
            }
            Err(e) => {
                error!(error = %e, pending = updates.len(), "[WS-VALIDATOR] flush failed, re-buffering");
                self.processor.requeue(updates);
            }
        }
    }

    /// Run the batch detector and enroll fresh arbitrage markets into
    /// the paper book.
    async fn detection_pass(&mut self) {
        if self.is_stopping {
            return;
        }
        let pass = match self.detector.run_pass().await {
            Ok(pass) => pass,
            Err(e) => {
                error!(error = %e, "[WS-VALIDATOR] detection pass failed");
                return;
            }
        };
        for observed in &pass.observed {
            metrics::OPPORTUNITIES_TOTAL
                .with_label_values(&[observed.kind.as_str()])
                .inc();
        }

        if !self.config.paper_trading_enabled || pass.inserted == 0 {
            return;
        }
        match self.db.fresh_arbitrage_markets(pass.scan_timestamp).await {
            Ok(markets) => {
                for (market_id, _profit) in markets {
                    self.enroll_paper_market(&market_id, SelectionReason::Arbitrage).await;
                }
            }
            Err(e) => error!(error = %e, "[WS-VALIDATOR] arbitrage enrollment failed"),
        }
    }

    async fn enroll_paper_market(&self, market_id: &MarketId, reason: SelectionReason) {
        let Some((yes_token, no_token)) = self.subscriptions.tokens_for_market(market_id) else {
            debug!(market_id = %market_id, "Market not subscribed, cannot enroll");
            return;
        };
        // A 404 here means the leg has no book yet; simulation against it
        // would never fill, so skip enrollment until one exists.
        match self.registry.order_book(&yes_token).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!(market_id = %market_id, "No book for YES leg yet, enrollment deferred");
                return;
            }
            Err(e) => {
                warn!(market_id = %market_id, error = %e, "Book probe failed, enrolling anyway");
            }
        }
        let info = self.subscriptions.get(&yes_token);
        let (question, category) = info
            .map(|i| (i.question, i.category))
            .unwrap_or_default();

        if let Err(e) = self
            .db
            .upsert_paper_market(market_id, &question, &category, &yes_token, &no_token, reason)
            .await
        {
            error!(market_id = %market_id, error = %e, "Paper market enrollment failed");
        }
    }

    /// Process active paper markets: arbitrage markets first, then the
    /// standard market-making path; one fill check per cycle; hedge
    /// partial arbitrage fills last.
    async fn market_making_cycle(&mut self) {
        if self.is_stopping || !self.config.paper_trading_enabled {
            return;
        }
        let markets = match self.db.active_paper_markets().await {
            Ok(markets) => markets,
            Err(e) => {
                error!(error = %e, "[CYCLE] could not list paper markets");
                return;
            }
        };
        if markets.is_empty() {
            return;
        }

        let arb_market_ids: Vec<MarketId> = markets
            .iter()
            .filter(|m| m.is_arbitrage())
            .map(|m| m.market_id.clone())
            .collect();

        for market_id in &arb_market_ids {
            if let Err(e) = self
                .engine
                .place_arbitrage_orders(market_id, Size::new(self.config.arb_order_size))
                .await
            {
                error!(market_id = %market_id, error = %e, "[CYCLE] arbitrage placement failed");
            }
        }

        for market in markets.iter().filter(|m| !m.is_arbitrage()) {
            for token_side in [Outcome::Yes, Outcome::No] {
                if let Err(e) = self
                    .engine
                    .place_market_making_orders(
                        &market.market_id,
                        token_side,
                        Size::new(self.config.mm_order_size),
                        self.config.mm_tick_improvement,
                    )
                    .await
                {
                    error!(
                        market_id = %market.market_id,
                        token_side = %token_side,
                        error = %e,
                        "[CYCLE] market-making placement failed"
                    );
                }
            }
        }

        match self.engine.check_fills().await {
            Ok(fills) if fills > 0 => info!(fills, "[CYCLE] fills applied"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "[CYCLE] fill check failed"),
        }

        if !arb_market_ids.is_empty() {
            if let Err(e) = self.engine.handle_partial_arbitrage_fills(&arb_market_ids).await {
                error!(error = %e, "[CYCLE] partial-fill hedging failed");
            }
        }
    }

    fn pnl_snapshot_from(
        initial_capital: Decimal,
        cash_flow: Decimal,
        position_value: Decimal,
        unrealized: Decimal,
        stats: &polyarb_db::TradeStats,
    ) -> PnlSnapshotRow {
        let cash_balance = initial_capital + cash_flow;
        let total_equity = cash_balance + position_value;
        PnlSnapshotRow {
            cash_balance,
            position_value,
            total_equity,
            // Realized stays zero while positions are open; cash flow is
            // the authoritative balance definition.
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: unrealized,
            total_pnl: total_equity - initial_capital,
            trades_today: stats.trades_today,
            fill_rate_today: stats.fill_rate_today,
            win_rate_today: stats.win_rate_today,
            snapshot_at: Utc::now(),
        }
    }

    async fn record_pnl_snapshot(&self) -> AppResult<()> {
        let cash_flow = self.db.total_cash_flow().await?;
        let position_value = self.db.total_position_value().await?;
        let unrealized = self.db.total_unrealized_pnl().await?;
        let stats = self.db.trade_stats().await?;
        let snapshot = Self::pnl_snapshot_from(
            self.config.initial_capital,
            cash_flow,
            position_value,
            unrealized,
            &stats,
        );
        self.db.insert_pnl_snapshot(&snapshot).await?;
        info!(
            equity = %snapshot.total_equity,
            cash = %snapshot.cash_balance,
            unrealized = %snapshot.unrealized_pnl,
            trades_today = snapshot.trades_today,
            "P&L snapshot recorded"
        );
        Ok(())
    }

    /// Render the dashboard from a read-only snapshot. Data-gathering
    /// errors degrade to defaults; the tick never blocks on them.
    async fn render_dashboard(&mut self) {
        let stream = self.connection.stats().snapshot();
        self.mirror_metrics(&stream);

        let active_opportunities = self.db.active_opportunity_counts().await.unwrap_or_default();
        let open_positions = self.db.open_positions().await.map(|p| p.len()).unwrap_or(0);
        let paper_markets = self.db.count_active_paper_markets().await.unwrap_or(0);

        let snapshot = StatusSnapshot {
            connection_state: format!("{:?}", self.connection.state()),
            stream,
            subscribed_assets: self.subscriptions.len(),
            cached_markets: self.processor.cache().market_count(),
            buffer_len: self.processor.cache().buffer_len(),
            updates_persisted: self.updates_persisted,
            fast_arb_executions: self.processor.execution_count(),
            latency: self.processor.latency_summary(),
            active_opportunities,
            open_positions,
            paper_markets,
            uptime_secs: (Utc::now() - self.started_at).num_seconds(),
        };
        info!("\n{}", dashboard::render(&snapshot));
    }

    fn mirror_metrics(&mut self, stream: &StreamStatsSnapshot) {
        let previous = self.last_stream_stats;
        metrics::WS_MESSAGES_TOTAL
            .inc_by(stream.messages_received.saturating_sub(previous.messages_received));
        metrics::PRICE_UPDATES_TOTAL
            .inc_by(stream.price_updates.saturating_sub(previous.price_updates));
        metrics::WS_RECONNECTS_TOTAL
            .inc_by(stream.reconnects.saturating_sub(previous.reconnects));
        metrics::DECODE_ERRORS_TOTAL
            .inc_by(stream.decode_errors.saturating_sub(previous.decode_errors));
        self.last_stream_stats = *stream;

        let connected = self.connection.state() == ConnectionState::Connected;
        metrics::WS_CONNECTED.set(if connected { 1.0 } else { 0.0 });
        metrics::FLUSH_BUFFER_DEPTH.set(self.processor.cache().buffer_len() as i64);
        if let Some(at) = stream.last_message_at {
            metrics::LAST_MESSAGE_EPOCH_MS.set(at.timestamp_millis());
        }
    }

    /// Hourly sweep: stale opportunities, snapshot retention, analysis
    /// rollups, paper-market reseeding.
    async fn hourly_maintenance(&mut self) {
        if self.is_stopping {
            return;
        }
        if let Err(e) = self
            .db
            .expire_stale_opportunities(ChronoDuration::minutes(OPPORTUNITY_MAX_AGE_MINS))
            .await
        {
            error!(error = %e, "[WS-VALIDATOR] stale opportunity sweep failed");
        }
        match self.db.purge_snapshots_older_than(self.config.retention_days).await {
            Ok(deleted) if deleted > 0 => info!(deleted, "[WS-VALIDATOR] snapshots purged"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "[WS-VALIDATOR] retention purge failed"),
        }
        if let Err(e) = self.db.refresh_analysis_tables().await {
            error!(error = %e, "[WS-VALIDATOR] analysis refresh failed");
        }
        if self.config.paper_trading_enabled {
            match self.db.count_active_paper_markets().await {
                Ok(count) if (count as usize) < self.config.markets_to_select => {
                    self.seed_paper_markets().await;
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "[WS-VALIDATOR] paper market count failed"),
            }
        }
    }

    /// Seed the paper book: one liquid, one medium-volume, one
    /// recently-listed market, best-effort.
    async fn seed_paper_markets(&mut self) {
        let medium_low = self.config.min_volume;
        let medium_high = self.config.min_volume * Decimal::from(10);

        let selections = [
            (self.db.select_liquid_market().await, SelectionReason::Liquid),
            (
                self.db
                    .select_medium_volume_market(medium_low, medium_high)
                    .await,
                SelectionReason::MediumVolume,
            ),
            (self.db.select_new_market().await, SelectionReason::New),
        ];

        let mut enrolled = 0usize;
        for (candidate, reason) in selections {
            if enrolled >= self.config.markets_to_select {
                break;
            }
            match candidate {
                Ok(Some(market)) => {
                    self.enroll_paper_market(&market.market_id, reason).await;
                    enrolled += 1;
                }
                Ok(None) => debug!(reason = %reason, "No eligible market to seed"),
                Err(e) => error!(reason = %reason, error = %e, "Seeding query failed"),
            }
        }
    }

    /// Graceful shutdown: stop the stream, one final flush and P&L
    /// snapshot, record the validation summary, close the pool.
    /// Best-effort steps log instead of failing.
    async fn shutdown(&mut self) {
        info!("[WS-VALIDATOR] shutting down");
        self.is_stopping = true;
        self.connection.stop();

        self.flush_buffer().await;
        if let Err(e) = self.record_pnl_snapshot().await {
            warn!(error = %e, "Final P&L snapshot failed");
        }

        let stopped_at = Utc::now();
        let final_equity = match (self.db.total_cash_flow().await, self.db.total_position_value().await)
        {
            (Ok(cash_flow), Ok(position_value)) => {
                self.config.initial_capital + cash_flow + position_value
            }
            _ => self.config.initial_capital,
        };
        let stats = self.db.trade_stats().await.unwrap_or_default();
        let summary = ValidationSummaryRow {
            started_at: self.started_at,
            stopped_at,
            markets_tracked: self.subscriptions.market_count() as i64,
            updates_persisted: self.updates_persisted as i64,
            opportunities_detected: self.db.total_opportunities().await.unwrap_or(0),
            trades_executed: stats.total_trades,
            final_equity,
        };
        if let Err(e) = self.db.insert_validation_summary(&summary).await {
            warn!(error = %e, "Validation summary write failed");
        }

        let stream = self.connection.stats().snapshot();
        info!(
            uptime_secs = (stopped_at - self.started_at).num_seconds(),
            messages = stream.messages_received,
            updates_persisted = self.updates_persisted,
            trades = stats.total_trades,
            fast_arb_executions = self.processor.execution_count(),
            final_equity = %final_equity,
            "[WS-VALIDATOR] final stats"
        );

        self.db.close().await;
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyarb_db::TradeStats;
    use rust_decimal_macros::dec;

    #[test]
    fn test_pnl_snapshot_cash_flow_definition() {
        let stats = TradeStats {
            total_trades: 4,
            trades_today: 4,
            fill_rate_today: Some(dec!(0.8)),
            win_rate_today: Some(dec!(0.5)),
        };
        // Deployed 49 cash into positions worth 50, plus 1.425 costs paid.
        let snapshot = Application::pnl_snapshot_from(
            dec!(10000),
            dec!(-50.425),
            dec!(50),
            dec!(0.575),
            &stats,
        );
        assert_eq!(snapshot.cash_balance, dec!(9949.575));
        assert_eq!(snapshot.total_equity, dec!(9999.575));
        assert_eq!(snapshot.realized_pnl, dec!(0));
        assert_eq!(snapshot.total_pnl, dec!(-0.425));
        assert_eq!(snapshot.trades_today, 4);
    }
}
