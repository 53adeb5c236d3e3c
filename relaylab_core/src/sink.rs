//! Decision records and the metrics/event sink.
//!
//! Every branch the engine takes emits a `(cause, decision,
//! explanation, timestamp)` record. The core only produces these; it
//! never reads them back. Renderers and tests consume them through an
//! [`EventSink`] implementation.

use crate::message::MessageId;
use crate::metrics::MetricsSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What prompted a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cause {
    GeneratorTick,
    FlakyNetwork,
    BatchWindowElapsed,
    ThrottleThreshold,
    BufferAtCapacity,
    AckWindowFull,
    ServiceDelayElapsed,
    Acknowledgment,
    LinkDown,
    RetryTimerElapsed,
    ManualRestore,
    ConcurrentEdit,
    ManualResolution,
}

/// What the engine decided to do about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decision {
    /// Message delivered immediately
    Delivered,

    /// Message staged in the batch accumulator
    Batched,

    /// A whole batch delivered as a unit
    Flushed { count: usize },

    /// Message admitted as pending
    Admitted,

    /// Message dropped
    Dropped,

    /// Oldest pending message evicted to make room
    Evicted { victim: MessageId },

    /// Ack window slot freed
    AckCleared,

    /// Traffic timers cancelled because the link went down
    TrafficHalted,

    /// A reconnect attempt was scheduled
    RetryScheduled { attempt: u32 },

    /// A reconnect attempt failed
    ReconnectFailed { attempt: u32 },

    /// The link came back
    ReconnectSucceeded { attempts: u32 },

    /// The bounded retry budget ran out
    RetriesExhausted { attempts: u32 },

    /// Delivery-history tail re-sent after reconnect
    Replayed { count: usize },

    /// Edit propagated to the shared value
    Propagated,

    /// Concurrent divergent edits opened a conflict
    ConflictOpened { field: String },

    /// A conflict was resolved
    ConflictResolved { field: String },
}

/// One appended `(cause, decision, explanation, timestamp)` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Virtual time of the decision
    pub at: Duration,

    /// What prompted it
    pub cause: Cause,

    /// What was decided
    pub decision: Decision,

    /// Human-readable explanation for the teaching display
    pub explanation: String,
}

/// Write-only sink for decision records and metric snapshots.
pub trait EventSink {
    /// Appends a decision record.
    fn record(&mut self, record: DecisionRecord);

    /// Appends a periodic metrics snapshot.
    fn snapshot(&mut self, snapshot: MetricsSnapshot);
}

/// Sink that forwards everything to `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&mut self, record: DecisionRecord) {
        tracing::info!(
            at_ms = record.at.as_millis() as u64,
            cause = ?record.cause,
            decision = ?record.decision,
            "{}",
            record.explanation
        );
    }

    fn snapshot(&mut self, snapshot: MetricsSnapshot) {
        tracing::debug!(
            at_ms = snapshot.at.as_millis() as u64,
            depth = snapshot.depth,
            dropped_pct = snapshot.dropped_pct,
            latency_ms = snapshot.latency_ms_estimate,
            "metrics snapshot"
        );
    }
}

/// Sink that discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&mut self, _record: DecisionRecord) {}

    fn snapshot(&mut self, _snapshot: MetricsSnapshot) {}
}

/// Default retention for [`MemorySink`].
const MEMORY_SINK_CAPACITY: usize = 4096;

/// In-memory capturing sink for tests and renderers.
///
/// Ring-buffered: oldest entries are evicted beyond the capacity so a
/// long-running session cannot grow without bound.
#[derive(Debug)]
pub struct MemorySink {
    records: VecDeque<DecisionRecord>,
    snapshots: VecDeque<MetricsSnapshot>,
    capacity: usize,
}

impl MemorySink {
    /// Creates a sink with the default retention.
    pub fn new() -> Self {
        Self::with_capacity(MEMORY_SINK_CAPACITY)
    }

    /// Creates a sink retaining at most `capacity` entries per stream.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            snapshots: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Captured decision records, oldest first.
    pub fn records(&self) -> &VecDeque<DecisionRecord> {
        &self.records
    }

    /// Captured metric snapshots, oldest first.
    pub fn snapshots(&self) -> &VecDeque<MetricsSnapshot> {
        &self.snapshots
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for MemorySink {
    fn record(&mut self, record: DecisionRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    fn snapshot(&mut self, snapshot: MetricsSnapshot) {
        if self.snapshots.len() == self.capacity {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
    }
}

/// Cloneable handle to a shared [`MemorySink`].
///
/// The session owns its sink; a runner that wants to inspect the
/// capture afterwards hands the session one half of this handle and
/// keeps the other.
#[derive(Debug, Clone, Default)]
pub struct SharedSink {
    inner: Arc<Mutex<MemorySink>>,
}

impl SharedSink {
    /// Creates a shared sink with the default retention.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clones out the captured decision records, oldest first.
    pub fn records(&self) -> Vec<DecisionRecord> {
        self.inner.lock().unwrap().records().iter().cloned().collect()
    }

    /// Clones out the captured snapshots, oldest first.
    pub fn snapshots(&self) -> Vec<MetricsSnapshot> {
        self.inner.lock().unwrap().snapshots().iter().cloned().collect()
    }
}

impl EventSink for SharedSink {
    fn record(&mut self, record: DecisionRecord) {
        self.inner.lock().unwrap().record(record);
    }

    fn snapshot(&mut self, snapshot: MetricsSnapshot) {
        self.inner.lock().unwrap().snapshot(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_at(ms: u64) -> DecisionRecord {
        DecisionRecord {
            at: Duration::from_millis(ms),
            cause: Cause::GeneratorTick,
            decision: Decision::Delivered,
            explanation: "test".to_string(),
        }
    }

    #[test]
    fn test_memory_sink_captures_in_order() {
        let mut sink = MemorySink::new();
        sink.record(record_at(1));
        sink.record(record_at(2));

        let captured: Vec<u128> = sink.records().iter().map(|r| r.at.as_millis()).collect();
        assert_eq!(captured, vec![1, 2]);
    }

    #[test]
    fn test_memory_sink_evicts_oldest_beyond_capacity() {
        let mut sink = MemorySink::with_capacity(3);
        for ms in 1..=5 {
            sink.record(record_at(ms));
        }

        let captured: Vec<u128> = sink.records().iter().map(|r| r.at.as_millis()).collect();
        assert_eq!(captured, vec![3, 4, 5]);
    }

    #[test]
    fn test_shared_sink_sees_writes_from_clone() {
        let sink = SharedSink::new();
        let mut writer = sink.clone();
        writer.record(record_at(7));

        assert_eq!(sink.records().len(), 1);
        assert_eq!(sink.records()[0].at, Duration::from_millis(7));
    }
}
