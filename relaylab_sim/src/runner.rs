//! Scenario runner - executes the transport scenarios and checks
//! their delivery properties.
//!
//! Every scenario builds one [`TransportSession`] over a `SharedSink`,
//! drives it through a scripted sequence of streaming intervals and
//! operator actions, and then checks the recorded decisions against
//! the property the scenario exists to demonstrate. A scenario fails
//! by listing the violated checks, never by panicking.

use crate::scenarios::ScenarioId;

use relaylab_core::backpressure::THROTTLE_THRESHOLD;
use relaylab_core::buffer::DEFAULT_CAPACITY;
use relaylab_core::conflict::{EditOutcome, Resolution, SyncPhase};
use relaylab_core::session::RESOLVED_LINGER;
use relaylab_core::{
    Cause, Decision, LinkState, MessageId, ScenarioConfig, SharedSink, TransportSession,
};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    #[serde(serialize_with = "serialize_scenario")]
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether every property check held
    pub passed: bool,

    /// Final virtual time in milliseconds
    pub final_time_ms: u64,

    /// Violated checks, if any
    pub failure_reason: Option<String>,

    /// Counters collected at the end of the run
    pub stats: ScenarioStats,
}

fn serialize_scenario<S: serde::Serializer>(
    scenario: &ScenarioId,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(scenario.name())
}

/// Counters collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioStats {
    /// Messages delivered
    pub delivered: u64,

    /// Messages dropped (flaky loss, throttle, eviction, window)
    pub dropped: u64,

    /// Final drop percentage estimate
    pub dropped_pct: f64,

    /// Decision records emitted
    pub decision_records: usize,

    /// Metrics snapshots emitted
    pub snapshots: usize,
}

/// Accumulates property violations for one scenario run.
#[derive(Default)]
struct Checks {
    failures: Vec<String>,
}

impl Checks {
    fn expect(&mut self, ok: bool, message: impl Into<String>) {
        if !ok {
            self.failures.push(message.into());
        }
    }

    fn into_reason(self) -> Option<String> {
        if self.failures.is_empty() {
            None
        } else {
            Some(self.failures.join("; "))
        }
    }
}

/// Runs transport scenarios.
pub struct ScenarioRunner {
    /// Master seed
    seed: u64,

    /// Streaming interval driven in each scenario phase, seconds
    stream_secs: u64,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            stream_secs: 10,
        }
    }

    /// Sets the streaming interval used by rate-accounting scenarios.
    pub fn with_stream_secs(mut self, secs: u64) -> Self {
        self.stream_secs = secs.max(1);
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_traced(scenario).0
    }

    /// Runs a scenario and also hands back the sink, for report export.
    pub fn run_traced(&self, scenario: ScenarioId) -> (ScenarioResult, SharedSink) {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        match scenario {
            ScenarioId::SteadyStream => self.run_steady_stream(),
            ScenarioId::FlakyFirehose => self.run_flaky_firehose(),
            ScenarioId::BatchBoundary => self.run_batch_boundary(),
            ScenarioId::ThrottleSqueeze => self.run_throttle_squeeze(),
            ScenarioId::DropOldChurn => self.run_drop_old_churn(),
            ScenarioId::AckWindowStall => self.run_ack_window_stall(),
            ScenarioId::ReplayAfterOutage => self.run_replay_after_outage(),
            ScenarioId::DeadAir => self.run_dead_air(),
            ScenarioId::LastWriteWins => self.run_last_write_wins(),
            ScenarioId::ManualMergeStandoff => self.run_manual_merge_standoff(),
            ScenarioId::RetryStorm => self.run_retry_storm(),
        }
    }

    fn session(&self, config: ScenarioConfig) -> (TransportSession, SharedSink) {
        let sink = SharedSink::new();
        let session = TransportSession::new(config, self.seed, Box::new(sink.clone()))
            .unwrap_or_else(|e| panic!("scenario config rejected: {e}"));
        (session, sink)
    }

    fn result(
        &self,
        scenario: ScenarioId,
        session: &TransportSession,
        sink: &SharedSink,
        checks: Checks,
    ) -> ScenarioResult {
        let reason = checks.into_reason();
        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: reason.is_none(),
            final_time_ms: session.now().as_millis() as u64,
            failure_reason: reason,
            stats: ScenarioStats {
                delivered: session.delivered_total(),
                dropped: session.buffer_state().dropped_count,
                dropped_pct: session.metrics().dropped_pct,
                decision_records: sink.records().len(),
                snapshots: sink.snapshots().len(),
            },
        }
    }

    /// RLB-001: SteadyStream - everything produced is delivered.
    ///
    /// Stable network, no backpressure: delivered count equals the
    /// configured rate times the streaming interval, the buffer never
    /// accumulates, and nothing is dropped.
    fn run_steady_stream(&self) -> (ScenarioResult, SharedSink) {
        let config = ScenarioId::SteadyStream.config();
        let rate = u64::from(config.msg_rate_per_sec);
        let (mut session, sink) = self.session(config);

        session.start_streaming();
        session.run_for(Duration::from_secs(self.stream_secs));
        session.stop_streaming();

        let expected = rate * self.stream_secs;
        let mut checks = Checks::default();
        checks.expect(
            session.delivered_total() == expected,
            format!(
                "delivered {} of {expected} expected",
                session.delivered_total()
            ),
        );
        checks.expect(
            session.buffer_state().dropped_count == 0,
            "dropped counter moved on a stable link",
        );
        checks.expect(
            session.metrics().dropped_pct == 0.0,
            "dropped_pct moved on a stable link",
        );
        checks.expect(
            sink.snapshots().iter().all(|s| s.depth == 0),
            "buffer accumulated without backpressure",
        );

        debug!("steady_stream delivered {}", session.delivered_total());
        (self.result(ScenarioId::SteadyStream, &session, &sink, checks), sink)
    }

    /// RLB-002: FlakyFirehose - every tick is accounted for.
    ///
    /// On a flaky network each produced-or-dropped tick must show up
    /// exactly once: delivered + dropped equals total ticks, and the
    /// drop percentage tracks the drop count.
    fn run_flaky_firehose(&self) -> (ScenarioResult, SharedSink) {
        let config = ScenarioId::FlakyFirehose.config();
        let rate = u64::from(config.msg_rate_per_sec);
        let (mut session, sink) = self.session(config);

        session.start_streaming();
        session.run_for(Duration::from_secs(self.stream_secs));
        session.stop_streaming();

        let ticks = rate * self.stream_secs;
        let delivered = session.delivered_total();
        let dropped = session.buffer_state().dropped_count;

        let mut checks = Checks::default();
        checks.expect(
            delivered + dropped == ticks,
            format!("{delivered} delivered + {dropped} dropped != {ticks} ticks"),
        );
        checks.expect(dropped > 0, "a flaky network dropped nothing");
        checks.expect(delivered > 0, "a flaky network delivered nothing");

        let flaky_records = sink
            .records()
            .iter()
            .filter(|r| r.cause == Cause::FlakyNetwork)
            .count() as u64;
        checks.expect(
            flaky_records == dropped,
            format!("{flaky_records} flaky records for {dropped} drops"),
        );

        let expected_pct = dropped as f64 * (1.0 / rate as f64);
        checks.expect(
            (session.metrics().dropped_pct - expected_pct).abs() < 1e-6,
            format!(
                "dropped_pct {} does not track {expected_pct}",
                session.metrics().dropped_pct
            ),
        );

        (self.result(ScenarioId::FlakyFirehose, &session, &sink, checks), sink)
    }

    /// RLB-003: BatchBoundary - deliveries only happen at flushes.
    fn run_batch_boundary(&self) -> (ScenarioResult, SharedSink) {
        let config = ScenarioId::BatchBoundary.config();
        let (mut session, sink) = self.session(config);

        session.start_streaming();
        session.run_for(Duration::from_secs(self.stream_secs));
        session.stop_streaming();

        let flushes: Vec<usize> = sink
            .records()
            .iter()
            .filter_map(|r| match r.decision {
                Decision::Flushed { count } => Some(count),
                _ => None,
            })
            .collect();
        let flushed_total: usize = flushes.iter().sum();

        let mut checks = Checks::default();
        checks.expect(!flushes.is_empty(), "no batch was ever flushed");
        checks.expect(
            flushes.iter().all(|&count| count >= 2),
            "a flush carried fewer than two messages at 10 msg/s over 500ms windows",
        );
        checks.expect(
            session.delivered_total() as usize == flushed_total,
            format!(
                "delivered {} but flushes account for {flushed_total}",
                session.delivered_total()
            ),
        );
        // Nothing may bypass the accumulator
        checks.expect(
            !sink
                .records()
                .iter()
                .any(|r| r.cause == Cause::GeneratorTick && r.decision == Decision::Delivered),
            "a message was delivered directly under the batch policy",
        );

        (self.result(ScenarioId::BatchBoundary, &session, &sink, checks), sink)
    }

    /// RLB-004: ThrottleSqueeze - depth pinned at the threshold.
    fn run_throttle_squeeze(&self) -> (ScenarioResult, SharedSink) {
        let config = ScenarioId::ThrottleSqueeze.config();
        let (mut session, sink) = self.session(config);

        session.start_streaming();
        session.run_for(Duration::from_secs(1));
        session.stop_streaming();

        let mut checks = Checks::default();
        let max_depth = sink.snapshots().iter().map(|s| s.depth).max().unwrap_or(0);
        checks.expect(
            max_depth <= THROTTLE_THRESHOLD,
            format!("depth reached {max_depth}, past the throttle threshold"),
        );
        checks.expect(
            session.buffer_state().dropped_count > 0,
            "a 1000 msg/s burst never engaged the throttle",
        );
        checks.expect(
            session.delivered_total() > 0,
            "the throttle starved delivery entirely",
        );

        (self.result(ScenarioId::ThrottleSqueeze, &session, &sink, checks), sink)
    }

    /// RLB-005: DropOldChurn - oldest evicted first, depth bounded.
    fn run_drop_old_churn(&self) -> (ScenarioResult, SharedSink) {
        let config = ScenarioId::DropOldChurn.config();
        let (mut session, sink) = self.session(config);

        session.start_streaming();
        session.run_for(Duration::from_secs(1));
        session.stop_streaming();

        let mut checks = Checks::default();
        let max_depth = sink.snapshots().iter().map(|s| s.depth).max().unwrap_or(0);
        checks.expect(
            max_depth <= DEFAULT_CAPACITY,
            format!("depth reached {max_depth}, past capacity"),
        );

        let victims: Vec<MessageId> = sink
            .records()
            .iter()
            .filter_map(|r| match r.decision {
                Decision::Evicted { victim } => Some(victim),
                _ => None,
            })
            .collect();
        checks.expect(!victims.is_empty(), "a 1000 msg/s burst evicted nothing");
        checks.expect(
            victims.windows(2).all(|pair| pair[0] < pair[1]),
            "evictions were not oldest-first",
        );

        (self.result(ScenarioId::DropOldChurn, &session, &sink, checks), sink)
    }

    /// RLB-006: AckWindowStall - the window stalls, one ack frees one slot.
    fn run_ack_window_stall(&self) -> (ScenarioResult, SharedSink) {
        let config = ScenarioId::AckWindowStall.config();
        let limit = config.ack_window_limit as u64;
        let (mut session, sink) = self.session(config);

        session.start_streaming();
        session.run_for(Duration::from_secs(2));

        let mut checks = Checks::default();
        checks.expect(
            session.buffer_state().ack_window.len() as u64 == limit,
            "the ack window did not fill",
        );
        checks.expect(
            session.delivered_total() == limit,
            format!(
                "{} delivered past an unacknowledged window of {limit}",
                session.delivered_total()
            ),
        );

        // Acknowledge one held message and stream on: exactly one
        // more admission fits.
        let held = session.buffer_state().ack_window.iter().min().copied();
        match held {
            Some(id) => {
                checks.expect(session.acknowledge(id), "held ack slot refused release");
            }
            None => checks.expect(false, "no held message to acknowledge"),
        }
        session.run_for(Duration::from_secs(1));
        session.stop_streaming();

        checks.expect(
            session.delivered_total() == limit + 1,
            format!(
                "{} delivered after one ack; expected {}",
                session.delivered_total(),
                limit + 1
            ),
        );

        (self.result(ScenarioId::AckWindowStall, &session, &sink, checks), sink)
    }

    /// RLB-007: ReplayAfterOutage - the delivered tail replays in order.
    fn run_replay_after_outage(&self) -> (ScenarioResult, SharedSink) {
        let config = ScenarioId::ReplayAfterOutage.config();
        let window = config.replay_window;
        let (mut session, sink) = self.session(config);

        session.start_streaming();
        session.run_for(Duration::from_secs(3));
        let delivered_before = session.delivered_total();

        session.simulate_disconnect();
        session.run_for(Duration::from_secs(3));

        let mut checks = Checks::default();
        checks.expect(
            session.connection_state().link == LinkState::Connected,
            "link did not recover with a certain retry",
        );

        let replayed = session.last_replay();
        checks.expect(
            replayed.len() == window.min(delivered_before as usize),
            format!("replayed {} of a window of {window}", replayed.len()),
        );
        let ids: Vec<u64> = replayed.iter().map(|m| m.id.0).collect();
        checks.expect(
            ids.windows(2).all(|pair| pair[0] < pair[1]),
            "replay was not in original delivery order",
        );
        checks.expect(
            ids.last().copied() == Some(delivered_before - 1),
            "replay tail does not end at the last delivered message",
        );
        checks.expect(
            sink.records()
                .iter()
                .any(|r| matches!(r.decision, Decision::Replayed { .. })),
            "no replay was recorded",
        );

        session.run_for(Duration::from_secs(1));
        session.stop_streaming();
        checks.expect(
            session.delivered_total() > delivered_before,
            "traffic did not resume after the reconnect",
        );

        (self.result(ScenarioId::ReplayAfterOutage, &session, &sink, checks), sink)
    }

    /// RLB-008: DeadAir - without a strategy, silence until restored.
    fn run_dead_air(&self) -> (ScenarioResult, SharedSink) {
        let config = ScenarioId::DeadAir.config();
        let (mut session, sink) = self.session(config);

        session.start_streaming();
        session.run_for(Duration::from_secs(2));
        let delivered_before = session.delivered_total();

        session.simulate_disconnect();
        session.run_for(Duration::from_secs(5));

        let mut checks = Checks::default();
        checks.expect(
            session.connection_state().link == LinkState::Disconnected,
            "link left Disconnected without a strategy",
        );
        checks.expect(
            session.delivered_total() == delivered_before,
            "something was delivered during dead air",
        );
        checks.expect(
            !sink
                .records()
                .iter()
                .any(|r| matches!(r.decision, Decision::RetryScheduled { .. })),
            "a retry was scheduled without a strategy",
        );

        session.restore_link();
        session.run_for(Duration::from_secs(1));
        session.stop_streaming();
        checks.expect(
            session.connection_state().link == LinkState::Connected,
            "manual restore did not reconnect",
        );
        checks.expect(
            session.delivered_total() > delivered_before,
            "traffic did not resume after restore",
        );

        (self.result(ScenarioId::DeadAir, &session, &sink, checks), sink)
    }

    /// RLB-009: LastWriteWins - the second writer wins everywhere.
    fn run_last_write_wins(&self) -> (ScenarioResult, SharedSink) {
        let config = ScenarioId::LastWriteWins.config();
        let (mut session, sink) = self.session(config);

        let first = session.edit_as_writer_a("ship it friday");
        let second = session.edit_as_writer_b("hold for review");

        let mut checks = Checks::default();
        checks.expect(
            first == EditOutcome::Propagated && second == EditOutcome::Propagated,
            "an edit failed to propagate under last-write-wins",
        );
        let field = session.shared_field();
        checks.expect(
            field.client_a == "hold for review"
                && field.client_b == "hold for review"
                && field.server == "hold for review",
            "writers did not converge on the last write",
        );
        checks.expect(
            session.conflict_record().is_none(),
            "last-write-wins opened a conflict",
        );

        (self.result(ScenarioId::LastWriteWins, &session, &sink, checks), sink)
    }

    /// RLB-010: ManualMergeStandoff - diverge, block, merge, clear.
    fn run_manual_merge_standoff(&self) -> (ScenarioResult, SharedSink) {
        let config = ScenarioId::ManualMergeStandoff.config();
        let (mut session, sink) = self.session(config);

        let first = session.edit_as_writer_a("ship it friday");
        let second = session.edit_as_writer_b("hold for review");

        let mut checks = Checks::default();
        checks.expect(
            first == EditOutcome::Propagated,
            "the first edit should land cleanly",
        );
        checks.expect(
            second == EditOutcome::ConflictOpened,
            "the stale-base edit did not open a conflict",
        );
        checks.expect(
            session.shared_field().server == "ship it friday",
            "the conflicting edit leaked to the shared value",
        );
        match session.conflict_record() {
            Some(record) => {
                checks.expect(
                    record.value_a == "ship it friday" && record.value_b == "hold for review",
                    "the conflict record does not carry both divergent values",
                );
            }
            None => checks.expect(false, "no conflict record was opened"),
        }

        let merged = session.resolve_conflict(Resolution::Merged(
            "ship friday after review".to_string(),
        ));
        checks.expect(merged.is_ok(), "resolution was rejected");
        checks.expect(
            session.sync_phase() == SyncPhase::Resolved,
            "phase did not move to Resolved",
        );
        let field = session.shared_field();
        checks.expect(
            field.client_a == "ship friday after review"
                && field.client_b == "ship friday after review"
                && field.server == "ship friday after review",
            "the merge did not converge all three copies",
        );

        session.run_for(RESOLVED_LINGER + Duration::from_millis(1));
        checks.expect(
            session.sync_phase() == SyncPhase::Idle && session.conflict_record().is_none(),
            "the resolved display never cleared",
        );

        (self.result(ScenarioId::ManualMergeStandoff, &session, &sink, checks), sink)
    }

    /// RLB-011: RetryStorm - doubling backoff until the budget runs out.
    fn run_retry_storm(&self) -> (ScenarioResult, SharedSink) {
        let config = ScenarioId::RetryStorm.config();
        let max_attempts = config.retry.max_attempts.unwrap_or(0);
        let (mut session, sink) = self.session(config);

        session.start_streaming();
        session.simulate_disconnect();
        session.run_for(Duration::from_secs(20));

        let mut checks = Checks::default();
        let scheduled: Vec<(u32, u64)> = sink
            .records()
            .iter()
            .filter_map(|r| match r.decision {
                Decision::RetryScheduled { attempt } => Some((attempt, r.at.as_millis() as u64)),
                _ => None,
            })
            .collect();

        let attempts: Vec<u32> = scheduled.iter().map(|(a, _)| *a).collect();
        checks.expect(
            attempts == (1..=max_attempts).collect::<Vec<u32>>(),
            format!("retry attempts ran {attempts:?}, expected 1..={max_attempts}"),
        );
        // Base 500ms doubling: scheduled at 0, 500, 1500, 3500, 7500
        let at_ms: Vec<u64> = scheduled.iter().map(|(_, at)| *at).collect();
        checks.expect(
            at_ms == vec![0, 500, 1500, 3500, 7500],
            format!("retry schedule ran at {at_ms:?}ms"),
        );
        checks.expect(
            sink.records().iter().any(|r| {
                matches!(r.decision, Decision::RetriesExhausted { attempts } if attempts == max_attempts)
            }),
            "the budget never reported exhaustion",
        );
        checks.expect(
            session.connection_state().link == LinkState::Disconnected,
            "the link is not parked Disconnected after giving up",
        );
        checks.expect(
            session.delivered_total() == 0,
            "traffic moved while the link was down",
        );

        (self.result(ScenarioId::RetryStorm, &session, &sink, checks), sink)
    }
}
