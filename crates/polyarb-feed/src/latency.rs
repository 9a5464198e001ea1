//! Fast-path latency accounting.

use std::collections::VecDeque;

/// Window for the rolling averages.
const ROLLING_WINDOW: usize = 20;
/// Ring of recent totals kept for the dashboard.
const DASHBOARD_RING: usize = 10;

/// One execution's latency decomposition, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySample {
    /// Time spent inside detection before the persistence call.
    pub detection_ms: f64,
    /// Duration of the persistence call.
    pub execution_ms: f64,
    /// Receive-to-done latency.
    pub total_ms: f64,
}

/// Aggregated view for reporting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatencySummary {
    pub executions: u64,
    pub avg_detection_ms: f64,
    pub avg_execution_ms: f64,
    pub avg_total_ms: f64,
    pub min_total_ms: Option<f64>,
    pub max_total_ms: Option<f64>,
    pub recent_totals: Vec<f64>,
}

/// Rolling averages over the last 20 executions, min/max over all, and
/// a short ring of totals for the dashboard.
#[derive(Debug, Default)]
pub struct LatencyStats {
    rolling: VecDeque<LatencySample>,
    ring: VecDeque<f64>,
    executions: u64,
    min_total_ms: Option<f64>,
    max_total_ms: Option<f64>,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, sample: LatencySample) {
        self.executions += 1;

        if self.rolling.len() >= ROLLING_WINDOW {
            self.rolling.pop_front();
        }
        self.rolling.push_back(sample);

        if self.ring.len() >= DASHBOARD_RING {
            self.ring.pop_front();
        }
        self.ring.push_back(sample.total_ms);

        self.min_total_ms = Some(match self.min_total_ms {
            Some(min) => min.min(sample.total_ms),
            None => sample.total_ms,
        });
        self.max_total_ms = Some(match self.max_total_ms {
            Some(max) => max.max(sample.total_ms),
            None => sample.total_ms,
        });
    }

    pub fn summary(&self) -> LatencySummary {
        let n = self.rolling.len() as f64;
        let (mut detection, mut execution, mut total) = (0.0, 0.0, 0.0);
        for sample in &self.rolling {
            detection += sample.detection_ms;
            execution += sample.execution_ms;
            total += sample.total_ms;
        }
        LatencySummary {
            executions: self.executions,
            avg_detection_ms: if n > 0.0 { detection / n } else { 0.0 },
            avg_execution_ms: if n > 0.0 { execution / n } else { 0.0 },
            avg_total_ms: if n > 0.0 { total / n } else { 0.0 },
            min_total_ms: self.min_total_ms,
            max_total_ms: self.max_total_ms,
            recent_totals: self.ring.iter().copied().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(total: f64) -> LatencySample {
        LatencySample {
            detection_ms: 0.1,
            execution_ms: total - 0.1,
            total_ms: total,
        }
    }

    #[test]
    fn test_rolling_window_caps_at_twenty() {
        let mut stats = LatencyStats::new();
        for i in 0..30 {
            stats.record(sample(i as f64));
        }
        let summary = stats.summary();
        assert_eq!(summary.executions, 30);
        // Rolling average covers samples 10..=29.
        assert!((summary.avg_total_ms - 19.5).abs() < 1e-9);
        // Min/max span every execution ever recorded.
        assert_eq!(summary.min_total_ms, Some(0.0));
        assert_eq!(summary.max_total_ms, Some(29.0));
        // Dashboard ring holds the last 10 totals.
        assert_eq!(summary.recent_totals.len(), 10);
        assert_eq!(summary.recent_totals[0], 20.0);
    }

    #[test]
    fn test_empty_summary() {
        let summary = LatencyStats::new().summary();
        assert_eq!(summary.executions, 0);
        assert!(summary.min_total_ms.is_none());
        assert_eq!(summary.avg_total_ms, 0.0);
    }
}
