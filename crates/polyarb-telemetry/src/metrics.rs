//! Prometheus metrics.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A failure means a
//! duplicate metric name, which is a fatal configuration error best
//! caught at static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_gauge, register_int_counter, register_int_counter_vec, register_int_gauge, Gauge,
    IntCounter, IntCounterVec, IntGauge,
};

/// Stream connection state (1 = connected, 0 = disconnected).
pub static WS_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("polyarb_ws_connected", "Stream connection state (1=connected)").unwrap()
});

/// Total inbound stream messages.
pub static WS_MESSAGES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("polyarb_ws_messages_total", "Total inbound stream messages").unwrap()
});

/// Total normalized price updates emitted.
pub static PRICE_UPDATES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "polyarb_price_updates_total",
        "Total normalized price updates emitted"
    )
    .unwrap()
});

/// Total stream reconnects.
pub static WS_RECONNECTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("polyarb_ws_reconnects_total", "Total stream reconnects").unwrap()
});

/// Total dropped undecodable frames or events.
pub static DECODE_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "polyarb_decode_errors_total",
        "Total dropped undecodable frames"
    )
    .unwrap()
});

/// Fast-path arbitrage executions.
pub static FAST_ARB_EXECUTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "polyarb_fast_arb_executions_total",
        "Total fast-path arbitrage executions"
    )
    .unwrap()
});

/// Opportunities inserted per detection kind.
pub static OPPORTUNITIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "polyarb_opportunities_total",
        "Opportunities inserted by kind",
        &["kind"]
    )
    .unwrap()
});

/// Current flush-buffer depth.
pub static FLUSH_BUFFER_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "polyarb_flush_buffer_depth",
        "Pending updates awaiting flush"
    )
    .unwrap()
});

/// Millisecond epoch of the last inbound stream message.
pub static LAST_MESSAGE_EPOCH_MS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "polyarb_last_message_epoch_ms",
        "Epoch millis of the last inbound stream message"
    )
    .unwrap()
});
