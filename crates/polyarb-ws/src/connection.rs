//! Streaming connection manager.
//!
//! Owns the socket lifecycle: connect, subscribe the current asset set,
//! decode and normalize inbound frames, heartbeat, and reconnect after a
//! fixed interval while `should_reconnect` holds. Subscription diffs are
//! applied on the wire while connected; the full set is re-sent after
//! every reconnect.

use crate::error::{WsError, WsResult};
use crate::heartbeat::HeartbeatManager;
use crate::message::{decode_frame, subscribe_frame, unsubscribe_frame};
use crate::normalize::Normalizer;
use crate::stats::StreamStats;
use crate::subscription::{SubscriptionDiff, SubscriptionSet};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use polyarb_core::{PriceUpdate, TradeEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Events emitted downstream. Price updates carry the whole batch from
/// one frame so the consumer can process it atomically.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    PriceUpdates(Vec<PriceUpdate>),
    Trade(TradeEvent),
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Market channel URL.
    pub url: String,
    /// Delay before reconnecting after a close or error.
    pub reconnect_interval_ms: u64,
    /// Heartbeat ping interval; a pong must arrive within twice this.
    pub heartbeat_interval_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: "wss://ws-subscriptions-clob.polymarket.com/ws/market".to_string(),
            reconnect_interval_ms: 5_000,
            heartbeat_interval_ms: 30_000,
        }
    }
}

/// Connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Streaming connection manager.
pub struct ConnectionManager {
    config: StreamConfig,
    state: Arc<RwLock<ConnectionState>>,
    subscriptions: Arc<SubscriptionSet>,
    heartbeat: HeartbeatManager,
    stats: Arc<StreamStats>,
    event_tx: mpsc::Sender<FeedEvent>,
    should_reconnect: AtomicBool,
    shutdown: Notify,
}

impl ConnectionManager {
    pub fn new(
        config: StreamConfig,
        subscriptions: Arc<SubscriptionSet>,
        event_tx: mpsc::Sender<FeedEvent>,
    ) -> Self {
        let heartbeat = HeartbeatManager::new(config.heartbeat_interval_ms);
        Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            subscriptions,
            heartbeat,
            stats: Arc::new(StreamStats::new()),
            event_tx,
            should_reconnect: AtomicBool::new(true),
            shutdown: Notify::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn stats(&self) -> Arc<StreamStats> {
        self.stats.clone()
    }

    /// Stop the connection loop. Idempotent.
    pub fn stop(&self) {
        self.should_reconnect.store(false, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    /// Run until stopped. Reconnects after `reconnect_interval_ms` on
    /// close or error, re-sending the full subscription each time.
    pub async fn run(&self, mut diff_rx: mpsc::Receiver<SubscriptionDiff>) -> WsResult<()> {
        let mut first_session = true;

        while self.should_reconnect.load(Ordering::SeqCst) {
            *self.state.write() = if first_session {
                ConnectionState::Connecting
            } else {
                self.stats.record_reconnect();
                ConnectionState::Reconnecting
            };
            first_session = false;

            match self.run_session(&mut diff_rx).await {
                Ok(()) => {
                    info!("Stream session ended");
                }
                Err(e) => {
                    error!(error = %e, "Stream session error");
                }
            }

            if !self.should_reconnect.load(Ordering::SeqCst) {
                break;
            }

            let delay = Duration::from_millis(self.config.reconnect_interval_ms);
            warn!(delay_ms = self.config.reconnect_interval_ms, "Reconnecting");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.notified() => break,
            }
        }

        *self.state.write() = ConnectionState::Disconnected;
        Ok(())
    }

    async fn run_session(&self, diff_rx: &mut mpsc::Receiver<SubscriptionDiff>) -> WsResult<()> {
        info!(url = %self.config.url, "Connecting to market stream");
        let (ws_stream, _response) = connect_async(&self.config.url).await?;
        let (mut write, mut read) = ws_stream.split();

        *self.state.write() = ConnectionState::Connected;
        info!("Market stream connected");

        let asset_ids = self.subscriptions.asset_ids();
        if !asset_ids.is_empty() {
            write
                .send(Message::Text(subscribe_frame(&asset_ids)))
                .await?;
            info!(assets = asset_ids.len(), "Subscription sent");
        }

        self.heartbeat.reset();
        let mut normalizer = Normalizer::new(self.subscriptions.clone());

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text(&text, &mut normalizer).await;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.heartbeat.record_pong();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "Stream closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "Stream read error");
                            return Err(e.into());
                        }
                        None => {
                            warn!("Stream ended");
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                _ = self.heartbeat.wait_for_check() => {
                    if self.heartbeat.is_timed_out() {
                        error!("Heartbeat timeout, terminating socket");
                        return Err(WsError::HeartbeatTimeout);
                    }
                    if self.heartbeat.should_send_heartbeat() {
                        write.send(Message::Ping(Vec::new())).await?;
                        self.heartbeat.record_ping();
                        debug!("Heartbeat ping sent");
                    }
                }

                diff = diff_rx.recv() => {
                    match diff {
                        Some(diff) => {
                            self.apply_diff(&mut write, &mut normalizer, diff).await?;
                        }
                        None => {
                            warn!("Subscription channel closed");
                            return Ok(());
                        }
                    }
                }

                _ = self.shutdown.notified() => {
                    let _ = write.send(Message::Close(None)).await;
                    info!("Stream shutdown requested");
                    return Ok(());
                }
            }
        }
    }

    async fn handle_text(&self, text: &str, normalizer: &mut Normalizer) {
        self.stats.record_message();
        self.heartbeat.record_message();

        let events = match decode_frame(text) {
            Ok(events) => events,
            Err(e) => {
                self.stats.record_decode_error();
                warn!(error = %e, "Dropped undecodable frame");
                return;
            }
        };

        let mut updates = Vec::new();
        let mut trades = Vec::new();
        for event in events {
            if let Err(e) = normalizer.apply(event, &mut updates, &mut trades) {
                self.stats.record_decode_error();
                warn!(error = %e, "Dropped undecodable event");
            }
        }

        if !updates.is_empty() {
            self.stats.record_price_updates(updates.len() as u64);
            if self.event_tx.send(FeedEvent::PriceUpdates(updates)).await.is_err() {
                warn!("Feed event receiver dropped");
            }
        }
        for trade in trades {
            self.stats.record_trade_event();
            if self.event_tx.send(FeedEvent::Trade(trade)).await.is_err() {
                warn!("Feed event receiver dropped");
            }
        }
    }

    async fn apply_diff<S>(
        &self,
        write: &mut S,
        normalizer: &mut Normalizer,
        diff: SubscriptionDiff,
    ) -> WsResult<()>
    where
        S: SinkExt<Message> + Unpin,
        WsError: From<S::Error>,
    {
        if !diff.removed.is_empty() {
            let ids: Vec<String> = diff
                .removed
                .iter()
                .map(|t| t.as_str().to_string())
                .collect();
            write.send(Message::Text(unsubscribe_frame(&ids))).await?;
            for token in &diff.removed {
                normalizer.forget(token);
            }
            info!(count = ids.len(), "Unsubscribed assets");
        }
        if !diff.added.is_empty() {
            let ids: Vec<String> = diff.added.iter().map(|t| t.as_str().to_string()).collect();
            write.send(Message::Text(subscribe_frame(&ids))).await?;
            info!(count = ids.len(), "Subscribed assets");
        }
        Ok(())
    }
}
