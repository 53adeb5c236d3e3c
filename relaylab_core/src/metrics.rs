//! Session metrics.
//!
//! Metrics are computed from current policy parameters, not measured:
//! the engine teaches the shape of the numbers, it does not benchmark
//! itself.

use crate::message::PayloadSizeClass;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Base latency estimate in milliseconds for a given message rate.
///
/// `50 + 2 * rate`: a floor of transport overhead plus queueing
/// pressure that grows with the rate.
pub fn base_latency_ms(msg_rate_per_sec: u32) -> f64 {
    50.0 + 2.0 * f64::from(msg_rate_per_sec)
}

/// Headline metrics for the current session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SessionMetrics {
    /// Running drop percentage.
    ///
    /// Advances by `1 / msg_rate_per_sec` percentage points per drop
    /// (the reference's incremental accumulator, which the flaky-
    /// network property is written against), clamped to 100.
    pub dropped_pct: f64,

    /// Latency estimate, recomputed on every generator tick from
    /// `base_latency(rate) * payload_multiplier`
    pub latency_ms_estimate: f64,
}

impl SessionMetrics {
    /// Advances the drop accumulator for one dropped message.
    pub fn record_drop(&mut self, msg_rate_per_sec: u32) {
        self.dropped_pct =
            (self.dropped_pct + 1.0 / f64::from(msg_rate_per_sec.max(1))).min(100.0);
    }

    /// Recomputes the latency estimate from current parameters.
    pub fn recompute_latency(&mut self, msg_rate_per_sec: u32, payload: PayloadSizeClass) {
        self.latency_ms_estimate = base_latency_ms(msg_rate_per_sec) * payload.multiplier();
    }
}

/// Periodic snapshot handed to the event sink, one per generator tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Virtual time of the snapshot
    pub at: Duration,

    /// Current buffer depth
    pub depth: usize,

    /// Running drop percentage
    pub dropped_pct: f64,

    /// Current latency estimate in milliseconds
    pub latency_ms_estimate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_base_latency_grows_with_rate() {
        assert_relative_eq!(base_latency_ms(10), 70.0);
        assert_relative_eq!(base_latency_ms(100), 250.0);
    }

    #[test]
    fn test_latency_scales_with_payload() {
        let mut m = SessionMetrics::default();
        m.recompute_latency(10, PayloadSizeClass::Small);
        assert_relative_eq!(m.latency_ms_estimate, 70.0);

        m.recompute_latency(10, PayloadSizeClass::Large);
        assert_relative_eq!(m.latency_ms_estimate, 210.0);
    }

    #[test]
    fn test_drop_accumulator_advances_by_inverse_rate() {
        let mut m = SessionMetrics::default();
        for _ in 0..300 {
            m.record_drop(10);
        }
        // 300 drops at rate 10 -> 30 percentage points
        assert_relative_eq!(m.dropped_pct, 30.0, epsilon = 1e-9);
    }

    #[test]
    fn test_drop_accumulator_clamps_at_100() {
        let mut m = SessionMetrics::default();
        for _ in 0..2000 {
            m.record_drop(1);
        }
        assert_relative_eq!(m.dropped_pct, 100.0);
    }
}
