//! Stream observability counters.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Atomic counters updated from the connection loop, queryable anywhere.
#[derive(Debug, Default)]
pub struct StreamStats {
    messages_received: AtomicU64,
    price_updates: AtomicU64,
    trade_events: AtomicU64,
    reconnects: AtomicU64,
    decode_errors: AtomicU64,
    /// Millisecond epoch of the last inbound message, 0 before the first.
    last_message_ms: AtomicI64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StreamStatsSnapshot {
    pub messages_received: u64,
    pub price_updates: u64,
    pub trade_events: u64,
    pub reconnects: u64,
    pub decode_errors: u64,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl StreamStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.last_message_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn record_price_updates(&self, count: u64) {
        self.price_updates.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_trade_event(&self) {
        self.trade_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StreamStatsSnapshot {
        let last_ms = self.last_message_ms.load(Ordering::Relaxed);
        let last_message_at = if last_ms > 0 {
            Utc.timestamp_millis_opt(last_ms).single()
        } else {
            None
        };
        StreamStatsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            price_updates: self.price_updates.load(Ordering::Relaxed),
            trade_events: self.trade_events.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            last_message_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counts() {
        let stats = StreamStats::new();
        stats.record_message();
        stats.record_price_updates(3);
        stats.record_decode_error();
        let snap = stats.snapshot();
        assert_eq!(snap.messages_received, 1);
        assert_eq!(snap.price_updates, 3);
        assert_eq!(snap.decode_errors, 1);
        assert!(snap.last_message_at.is_some());
    }
}
