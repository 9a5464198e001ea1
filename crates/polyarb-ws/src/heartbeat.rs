//! Heartbeat management for the streaming connection.
//!
//! Pings at a fixed interval and treats a missing pong within twice the
//! interval as a dead connection, which forces a reconnect.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::time::Duration;
use tracing::debug;

/// Connection-health tracker driven from the message loop.
pub struct HeartbeatManager {
    interval_ms: u64,
    /// Last ping sent time.
    last_ping: RwLock<Option<DateTime<Utc>>>,
    /// Last message received time (any message).
    last_message: RwLock<DateTime<Utc>>,
    /// Whether we're waiting for a pong.
    waiting_for_pong: RwLock<bool>,
}

impl HeartbeatManager {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_ping: RwLock::new(None),
            last_message: RwLock::new(Utc::now()),
            waiting_for_pong: RwLock::new(false),
        }
    }

    /// Reset state (called on connection).
    pub fn reset(&self) {
        *self.last_ping.write() = None;
        *self.last_message.write() = Utc::now();
        *self.waiting_for_pong.write() = false;
    }

    pub fn record_ping(&self) {
        *self.last_ping.write() = Some(Utc::now());
        *self.waiting_for_pong.write() = true;
    }

    pub fn record_pong(&self) {
        *self.waiting_for_pong.write() = false;
        if let Some(ping_time) = *self.last_ping.read() {
            let rtt_ms = (Utc::now() - ping_time).num_milliseconds();
            debug!(rtt_ms, "Heartbeat pong");
        }
    }

    pub fn record_message(&self) {
        *self.last_message.write() = Utc::now();
    }

    /// Pong overdue: no reply within twice the heartbeat interval.
    pub fn is_timed_out(&self) -> bool {
        if !*self.waiting_for_pong.read() {
            return false;
        }
        if let Some(ping_time) = *self.last_ping.read() {
            let elapsed_ms = (Utc::now() - ping_time).num_milliseconds();
            return elapsed_ms > (self.interval_ms * 2) as i64;
        }
        false
    }

    pub fn time_since_last_message_ms(&self) -> i64 {
        (Utc::now() - *self.last_message.read()).num_milliseconds()
    }

    /// A ping is due when we are not already waiting for one and the
    /// stream has been quiet for a full interval.
    pub fn should_send_heartbeat(&self) -> bool {
        if *self.waiting_for_pong.read() {
            return false;
        }
        self.time_since_last_message_ms() >= self.interval_ms as i64
    }

    /// Wait until the next heartbeat check.
    pub async fn wait_for_check(&self) {
        tokio::time::sleep(Duration::from_millis(self.interval_ms / 2)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_timed_out_without_ping() {
        let hb = HeartbeatManager::new(30_000);
        assert!(!hb.is_timed_out());
    }

    #[test]
    fn test_waiting_suppresses_next_ping() {
        let hb = HeartbeatManager::new(0);
        assert!(hb.should_send_heartbeat());
        hb.record_ping();
        assert!(!hb.should_send_heartbeat());
        hb.record_pong();
        assert!(hb.should_send_heartbeat());
    }
}
