//! Status dashboard rendering.
//!
//! The renderer receives a read-only snapshot assembled by the
//! orchestrator, never component handles, and its task never blocks on
//! errors while gathering data.

use polyarb_core::OpportunityKind;
use polyarb_feed::LatencySummary;
use polyarb_ws::StreamStatsSnapshot;

/// Read-only view rendered every dashboard tick.
#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    pub connection_state: String,
    pub stream: StreamStatsSnapshot,
    pub subscribed_assets: usize,
    pub cached_markets: usize,
    pub buffer_len: usize,
    pub updates_persisted: u64,
    pub fast_arb_executions: u64,
    pub latency: LatencySummary,
    pub active_opportunities: Vec<(OpportunityKind, i64)>,
    pub open_positions: usize,
    pub paper_markets: i64,
    pub uptime_secs: i64,
}

/// Render the snapshot as a compact multi-line block.
pub fn render(snapshot: &StatusSnapshot) -> String {
    let mut out = String::with_capacity(512);
    out.push_str("==== polyarb validator ====\n");
    out.push_str(&format!(
        "stream: {} | msgs {} | updates {} | reconnects {} | decode errs {}\n",
        snapshot.connection_state,
        snapshot.stream.messages_received,
        snapshot.stream.price_updates,
        snapshot.stream.reconnects,
        snapshot.stream.decode_errors,
    ));
    out.push_str(&format!(
        "cache: {} markets over {} assets | flush buffer {} | persisted {}\n",
        snapshot.cached_markets,
        snapshot.subscribed_assets,
        snapshot.buffer_len,
        snapshot.updates_persisted,
    ));
    out.push_str(&format!(
        "fast path: {} executions | avg detect {:.2}ms exec {:.2}ms total {:.2}ms",
        snapshot.fast_arb_executions,
        snapshot.latency.avg_detection_ms,
        snapshot.latency.avg_execution_ms,
        snapshot.latency.avg_total_ms,
    ));
    match (snapshot.latency.min_total_ms, snapshot.latency.max_total_ms) {
        (Some(min), Some(max)) => {
            out.push_str(&format!(" | min {min:.2}ms max {max:.2}ms\n"));
        }
        _ => out.push('\n'),
    }
    if !snapshot.latency.recent_totals.is_empty() {
        let recent: Vec<String> = snapshot
            .latency
            .recent_totals
            .iter()
            .map(|ms| format!("{ms:.1}"))
            .collect();
        out.push_str(&format!("recent totals (ms): {}\n", recent.join(" ")));
    }
    if snapshot.active_opportunities.is_empty() {
        out.push_str("opportunities: none active\n");
    } else {
        let parts: Vec<String> = snapshot
            .active_opportunities
            .iter()
            .map(|(kind, n)| format!("{kind} {n}"))
            .collect();
        out.push_str(&format!("opportunities: {}\n", parts.join(" | ")));
    }
    out.push_str(&format!(
        "paper book: {} markets | {} open positions | uptime {}s",
        snapshot.paper_markets, snapshot.open_positions, snapshot.uptime_secs,
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_empty_snapshot() {
        let rendered = render(&StatusSnapshot::default());
        assert!(rendered.contains("polyarb validator"));
        assert!(rendered.contains("opportunities: none active"));
    }

    #[test]
    fn test_render_with_opportunities() {
        let snapshot = StatusSnapshot {
            active_opportunities: vec![
                (OpportunityKind::Arbitrage, 2),
                (OpportunityKind::WideSpread, 7),
            ],
            ..StatusSnapshot::default()
        };
        let rendered = render(&snapshot);
        assert!(rendered.contains("ARBITRAGE 2"));
        assert!(rendered.contains("WIDE_SPREAD 7"));
    }
}
