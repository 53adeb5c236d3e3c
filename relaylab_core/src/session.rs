//! The transport session: one simulated realtime connection.
//!
//! A session wires the generator, backpressure controller, delivery
//! buffer, reconnection manager, and conflict engine to one virtual
//! clock. Every timer in the system carries an [`EngineEvent`]
//! payload; the session pops due timers one at a time and dispatches
//! each payload to the owning component. Nothing runs between pops,
//! so a whole run is a single deterministic sequence of handler
//! calls.

use crate::backpressure::BackpressureController;
use crate::buffer::{DeliveryBuffer, BufferState, DEFAULT_CAPACITY};
use crate::config::ScenarioConfig;
use crate::conflict::{
    ConflictEngine, ConflictRecord, EditOutcome, Resolution, SharedField, SyncPhase, Writer,
};
use crate::error::{ConfigError, SessionError};
use crate::generator::{GeneratorOutcome, MessageGenerator};
use crate::message::{Message, MessageId};
use crate::metrics::{MetricsSnapshot, SessionMetrics};
use crate::reconnect::{ConnectionState, LinkEffect, LinkEvent, LinkState, ReconnectionManager};
use crate::sink::{Cause, Decision, DecisionRecord, EventSink};
use relaylab_env::{Entropy, Fired, SeededEntropy, TimerId, VirtualClock};
use std::time::Duration;
use uuid::Uuid;

/// How long a resolved conflict lingers before clearing back to idle.
pub const RESOLVED_LINGER: Duration = Duration::from_millis(1500);

/// Entropy stream tags; forked per concern so that a draw on one
/// stream never shifts another.
const STREAM_TRAFFIC: u64 = 0;
const STREAM_LINK: u64 = 1;
const STREAM_IDENTITY: u64 = 2;

/// Timer payload dispatched by the session loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// Produce (or flaky-drop) the next message
    GeneratorTick,

    /// Deliver the accumulated batch
    BatchFlush,

    /// A pending message's service delay elapsed
    ServiceDecay(MessageId),

    /// A scheduled reconnect attempt is due
    ReconnectAttempt,

    /// Clear the lingering resolved-conflict display state
    ClearResolved,
}

/// One simulated realtime transport connection.
pub struct TransportSession {
    id: Uuid,
    config: ScenarioConfig,
    clock: VirtualClock<EngineEvent>,
    traffic_entropy: Box<dyn Entropy>,
    link_entropy: Box<dyn Entropy>,
    generator: MessageGenerator,
    controller: BackpressureController,
    buffer: DeliveryBuffer,
    reconnect: ReconnectionManager,
    conflict: ConflictEngine,
    sink: Box<dyn EventSink>,
    metrics: SessionMetrics,
    streaming: bool,
    tick_timer: Option<TimerId>,
    clear_timer: Option<TimerId>,
    last_replay: Vec<Message>,
}

impl TransportSession {
    /// Builds a session from a validated configuration.
    ///
    /// All nondeterminism is derived from `seed`: the traffic and
    /// link entropy streams are independent forks, so scenarios that
    /// only touch one stream are insensitive to draws on the other.
    pub fn new(
        config: ScenarioConfig,
        seed: u64,
        sink: Box<dyn EventSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let master = SeededEntropy::new(seed);
        let mut identity = master.fork(STREAM_IDENTITY);
        let id = Uuid::from_u64_pair(identity.next_u64(), identity.next_u64());

        let start_down = config.network == crate::config::NetworkProfile::Disconnected;
        let mut metrics = SessionMetrics::default();
        metrics.recompute_latency(config.msg_rate_per_sec, config.payload_size);

        Ok(Self {
            id,
            clock: VirtualClock::new(),
            traffic_entropy: Box::new(master.fork(STREAM_TRAFFIC)),
            link_entropy: Box::new(master.fork(STREAM_LINK)),
            generator: MessageGenerator::new(config.protocol, config.payload_size),
            controller: BackpressureController::new(config.backpressure, config.batch_window_ms),
            buffer: DeliveryBuffer::new(
                DEFAULT_CAPACITY,
                config.ack_window_limit,
                config.replay_window,
            ),
            reconnect: ReconnectionManager::new(
                config.reconnect_strategy,
                config.retry,
                start_down,
            ),
            conflict: ConflictEngine::new(
                config.conflict_mode,
                config.sync_model,
                "title",
                "draft",
            ),
            sink,
            metrics,
            streaming: false,
            tick_timer: None,
            clear_timer: None,
            last_replay: Vec::new(),
            config,
        })
    }

    /// Stable session identity, derived from the seed.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Starts the generator. Idempotent; while the link is down the
    /// session is marked streaming but no tick is armed until resume.
    pub fn start_streaming(&mut self) {
        if self.streaming {
            return;
        }
        self.streaming = true;
        tracing::debug!(session = %self.id, "streaming started");
        if self.reconnect.state().link == LinkState::Connected {
            self.arm_tick();
        }
    }

    /// Stops the generator and cancels the batch flush timer. Staged
    /// messages stay staged for the next streaming interval.
    pub fn stop_streaming(&mut self) {
        if !self.streaming {
            return;
        }
        self.streaming = false;
        self.disarm_tick();
        self.controller.cancel_flush(&mut self.clock);
        tracing::debug!(session = %self.id, "streaming stopped");
    }

    /// Tears the link down. Depending on the reconnect strategy this
    /// arms a retry timer or leaves the session down until
    /// [`TransportSession::restore_link`].
    pub fn simulate_disconnect(&mut self) {
        let effects =
            self.reconnect
                .apply(LinkEvent::LinkDown, &mut self.clock, self.sink.as_mut());
        self.apply_link_effects(effects, Cause::LinkDown);
    }

    /// Restores the link by hand, e.g. after retries were exhausted.
    pub fn restore_link(&mut self) {
        let effects =
            self.reconnect
                .apply(LinkEvent::ManualRestore, &mut self.clock, self.sink.as_mut());
        self.apply_link_effects(effects, Cause::ManualRestore);
    }

    /// Acknowledges a delivered message, freeing its ack-window slot.
    /// Returns `false` if the id held no slot.
    pub fn acknowledge(&mut self, id: MessageId) -> bool {
        let cleared = self.buffer.ack(id);
        if cleared {
            self.sink.record(DecisionRecord {
                at: self.clock.now(),
                cause: Cause::Acknowledgment,
                decision: Decision::AckCleared,
                explanation: format!("{id} acknowledged, ack window slot freed"),
            });
        }
        cleared
    }

    /// Applies an edit from writer A to the shared field.
    pub fn edit_as_writer_a(&mut self, value: &str) -> EditOutcome {
        self.edit(Writer::A, value)
    }

    /// Applies an edit from writer B to the shared field.
    pub fn edit_as_writer_b(&mut self, value: &str) -> EditOutcome {
        self.edit(Writer::B, value)
    }

    fn edit(&mut self, writer: Writer, value: &str) -> EditOutcome {
        let now = self.clock.now();
        let outcome = self.conflict.edit(writer, value, now, self.sink.as_mut());
        // New activity supersedes a pending display-clear timer.
        if let Some(timer) = self.clear_timer.take() {
            self.clock.cancel(timer);
        }
        outcome
    }

    /// Resolves the open conflict. The resolved value converges both
    /// writers and the shared copy; the resolved display state clears
    /// itself after [`RESOLVED_LINGER`].
    pub fn resolve_conflict(&mut self, resolution: Resolution) -> Result<String, SessionError> {
        let now = self.clock.now();
        let resolved = self
            .conflict
            .resolve(resolution, now, self.sink.as_mut())?;
        if let Some(timer) = self.clear_timer.take() {
            self.clock.cancel(timer);
        }
        self.clear_timer = Some(self.clock.schedule(RESOLVED_LINGER, EngineEvent::ClearResolved));
        Ok(resolved)
    }

    /// Runs the session for `duration` of virtual time, firing every
    /// timer due in the window in deterministic order.
    pub fn run_for(&mut self, duration: Duration) {
        let target = self.clock.now() + duration;
        while let Some(deadline) = self.clock.next_deadline() {
            if deadline > target {
                break;
            }
            if let Some(fired) = self.clock.pop_next() {
                self.handle_event(fired);
            }
        }
        self.clock.advance_to(target);
    }

    /// Fires the single next due timer. Returns `false` when no
    /// timers are pending.
    pub fn step(&mut self) -> bool {
        match self.clock.pop_next() {
            Some(fired) => {
                self.handle_event(fired);
                true
            }
            None => false,
        }
    }

    /// Cancels every pending timer and stops streaming.
    pub fn shutdown(&mut self) {
        self.streaming = false;
        self.tick_timer = None;
        self.clear_timer = None;
        self.controller.cancel_flush(&mut self.clock);
        self.clock.cancel_all();
        tracing::debug!(session = %self.id, "session shut down");
    }

    // -- snapshots ---------------------------------------------------

    /// Buffer counters (depth, drops, ack window).
    pub fn buffer_state(&self) -> &BufferState {
        self.buffer.state()
    }

    /// Total messages delivered so far.
    pub fn delivered_total(&self) -> u64 {
        self.buffer.delivered_total()
    }

    /// Link state and attempt counter.
    pub fn connection_state(&self) -> ConnectionState {
        self.reconnect.state()
    }

    /// The open (or lingering resolved) conflict, if any.
    pub fn conflict_record(&self) -> Option<&ConflictRecord> {
        self.conflict.record()
    }

    /// Conflict phase.
    pub fn sync_phase(&self) -> SyncPhase {
        self.conflict.phase()
    }

    /// The shared field as each party sees it.
    pub fn shared_field(&self) -> &SharedField {
        self.conflict.values()
    }

    /// Messages re-sent on the most recent replaying reconnect.
    pub fn last_replay(&self) -> &[Message] {
        &self.last_replay
    }

    /// Current derived metrics.
    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    // -- event loop --------------------------------------------------

    fn handle_event(&mut self, fired: Fired<EngineEvent>) {
        match fired.event {
            EngineEvent::GeneratorTick => self.on_generator_tick(fired.id, fired.at),
            EngineEvent::BatchFlush => {
                self.controller
                    .flush(&mut self.buffer, &mut self.clock, self.sink.as_mut());
            }
            EngineEvent::ServiceDecay(id) => {
                if self.buffer.decay(id, fired.at) {
                    self.sink.record(DecisionRecord {
                        at: fired.at,
                        cause: Cause::ServiceDelayElapsed,
                        decision: Decision::Delivered,
                        explanation: format!("{id} serviced out of the pending buffer"),
                    });
                }
            }
            EngineEvent::ReconnectAttempt => self.on_reconnect_attempt(),
            EngineEvent::ClearResolved => {
                self.clear_timer = None;
                self.conflict.clear_resolved();
            }
        }
    }

    fn on_generator_tick(&mut self, timer: TimerId, at: Duration) {
        // A stale tick (superseded by stop/halt bookkeeping) is inert.
        if self.tick_timer != Some(timer) {
            return;
        }
        self.tick_timer = None;
        if !self.streaming || self.reconnect.state().link != LinkState::Connected {
            return;
        }
        self.arm_tick();

        let rate = self.config.msg_rate_per_sec;
        match self
            .generator
            .tick(self.config.network, self.traffic_entropy.as_mut(), at)
        {
            GeneratorOutcome::DroppedFlaky(msg) => {
                self.buffer.count_drop();
                self.metrics.record_drop(rate);
                self.sink.record(DecisionRecord {
                    at,
                    cause: Cause::FlakyNetwork,
                    decision: Decision::Dropped,
                    explanation: format!("{} lost on the flaky network", msg.id),
                });
            }
            GeneratorOutcome::Produced(msg) => {
                self.metrics.recompute_latency(rate, self.config.payload_size);
                let outcome = self.controller.admit(
                    msg,
                    &mut self.buffer,
                    &mut self.clock,
                    self.sink.as_mut(),
                );
                if outcome.dropped_one() {
                    self.metrics.record_drop(rate);
                }
            }
        }

        self.sink.snapshot(MetricsSnapshot {
            at,
            depth: self.buffer.depth(),
            dropped_pct: self.metrics.dropped_pct,
            latency_ms_estimate: self.metrics.latency_ms_estimate,
        });
    }

    fn on_reconnect_attempt(&mut self) {
        let success = self.link_entropy.chance(self.reconnect.success_chance());
        let effects = self.reconnect.apply(
            LinkEvent::RetryElapsed { success },
            &mut self.clock,
            self.sink.as_mut(),
        );
        self.apply_link_effects(effects, Cause::RetryTimerElapsed);
    }

    fn apply_link_effects(&mut self, effects: Vec<LinkEffect>, cause: Cause) {
        for effect in effects {
            match effect {
                LinkEffect::HaltTraffic => {
                    self.disarm_tick();
                    self.controller.cancel_flush(&mut self.clock);
                    self.sink.record(DecisionRecord {
                        at: self.clock.now(),
                        cause: Cause::LinkDown,
                        decision: Decision::TrafficHalted,
                        explanation: "link down, generator and flush timers cancelled".to_string(),
                    });
                }
                LinkEffect::Resume { replay } => {
                    if replay {
                        self.last_replay = self.buffer.replay_slice();
                        let anchor = self
                            .generator
                            .last_event_id()
                            .map(|id| id.to_string())
                            .unwrap_or_else(|| "none".to_string());
                        self.sink.record(DecisionRecord {
                            at: self.clock.now(),
                            cause,
                            decision: Decision::Replayed {
                                count: self.last_replay.len(),
                            },
                            explanation: format!(
                                "replayed {} delivered messages from last event id {anchor}",
                                self.last_replay.len()
                            ),
                        });
                    }
                    if self.streaming {
                        self.arm_tick();
                    }
                }
                // The manager already recorded the exhaustion; the
                // session just stays down.
                LinkEffect::GiveUp => {}
                // Executed inside the manager.
                LinkEffect::ScheduleRetry { .. } => {}
            }
        }
    }

    fn arm_tick(&mut self) {
        if self.tick_timer.is_none() {
            self.tick_timer = Some(
                self.clock
                    .schedule(self.config.tick_interval(), EngineEvent::GeneratorTick),
            );
        }
    }

    fn disarm_tick(&mut self) {
        if let Some(timer) = self.tick_timer.take() {
            self.clock.cancel(timer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        BackpressurePolicy, ConflictMode, NetworkProfile, ReconnectStrategy, RetryPolicy,
    };
    use crate::message::MessageStatus;
    use crate::sink::SharedSink;

    fn session_with(
        config: ScenarioConfig,
        seed: u64,
    ) -> (TransportSession, SharedSink) {
        let sink = SharedSink::new();
        let session = TransportSession::new(config, seed, Box::new(sink.clone()))
            .expect("config is valid");
        (session, sink)
    }

    #[test]
    fn test_steady_stream_delivers_at_the_configured_rate() {
        let (mut session, _sink) = session_with(ScenarioConfig::default(), 1);
        session.start_streaming();
        session.run_for(Duration::from_secs(1));

        // rate 10/s for 1s; the first tick lands at +100ms
        assert_eq!(session.delivered_total(), 10);
        assert_eq!(session.buffer_state().depth, 0);
        assert_eq!(session.buffer_state().dropped_count, 0);
        assert_eq!(session.metrics().dropped_pct, 0.0);
    }

    #[test]
    fn test_same_seed_same_run() {
        let config = ScenarioConfig {
            network: NetworkProfile::Flaky,
            ..ScenarioConfig::default()
        };

        let run = |seed| {
            let (mut session, sink) = session_with(config.clone(), seed);
            session.start_streaming();
            session.run_for(Duration::from_secs(5));
            (session.delivered_total(), session.buffer_state().dropped_count, sink.records().len())
        };

        assert_eq!(run(42), run(42));
        assert_ne!(run(42), run(43));
    }

    #[test]
    fn test_flaky_network_drops_raise_dropped_pct() {
        let config = ScenarioConfig {
            network: NetworkProfile::Flaky,
            ..ScenarioConfig::default()
        };
        let (mut session, sink) = session_with(config, 42);
        session.start_streaming();
        session.run_for(Duration::from_secs(10));

        let dropped = session.buffer_state().dropped_count;
        assert!(dropped > 0, "a flaky network must drop something in 100 ticks");
        assert!(session.metrics().dropped_pct > 0.0);
        assert_eq!(session.delivered_total() + dropped, 100);

        let flaky_drops = sink
            .records()
            .iter()
            .filter(|r| r.cause == Cause::FlakyNetwork)
            .count();
        assert_eq!(flaky_drops as u64, dropped);
    }

    #[test]
    fn test_batch_policy_flushes_as_a_unit() {
        let config = ScenarioConfig {
            backpressure: BackpressurePolicy::Batch,
            batch_window_ms: 500,
            ..ScenarioConfig::default()
        };
        let (mut session, sink) = session_with(config, 7);
        session.start_streaming();
        session.run_for(Duration::from_secs(2));

        let flushes: Vec<usize> = sink
            .records()
            .iter()
            .filter_map(|r| match r.decision {
                Decision::Flushed { count } => Some(count),
                _ => None,
            })
            .collect();
        assert!(!flushes.is_empty());
        // Window 500ms at 10 msg/s: each flush carries several messages
        assert!(flushes.iter().all(|&count| count > 1));
        let flushed_total: usize = flushes.iter().sum();
        assert_eq!(session.delivered_total() as usize, flushed_total);
    }

    #[test]
    fn test_throttle_depth_never_exceeds_threshold() {
        let config = ScenarioConfig {
            backpressure: BackpressurePolicy::Throttle,
            msg_rate_per_sec: 1000,
            ..ScenarioConfig::default()
        };
        let (mut session, sink) = session_with(config, 3);
        session.start_streaming();
        session.run_for(Duration::from_secs(1));

        for snapshot in sink.snapshots() {
            assert!(snapshot.depth <= crate::backpressure::THROTTLE_THRESHOLD);
        }
        // At 1000/s against a 100ms service delay, the throttle engages
        assert!(session.buffer_state().dropped_count > 0);
    }

    #[test]
    fn test_drop_old_depth_never_exceeds_capacity() {
        let config = ScenarioConfig {
            backpressure: BackpressurePolicy::DropOld,
            msg_rate_per_sec: 1000,
            ..ScenarioConfig::default()
        };
        let (mut session, sink) = session_with(config, 3);
        session.start_streaming();
        session.run_for(Duration::from_secs(1));

        for snapshot in sink.snapshots() {
            assert!(snapshot.depth <= DEFAULT_CAPACITY);
        }
        let evictions = sink
            .records()
            .iter()
            .filter(|r| matches!(r.decision, Decision::Evicted { .. }))
            .count();
        assert!(evictions > 0);
    }

    #[test]
    fn test_ack_window_stalls_without_acks() {
        let config = ScenarioConfig {
            backpressure: BackpressurePolicy::AckWindow,
            ack_window_limit: 5,
            ..ScenarioConfig::default()
        };
        let (mut session, _sink) = session_with(config, 9);
        session.start_streaming();
        session.run_for(Duration::from_secs(3));

        // Five admissions fill the window; everything after is dropped
        assert_eq!(session.buffer_state().ack_window.len(), 5);
        assert_eq!(session.delivered_total(), 5);
        assert_eq!(session.buffer_state().dropped_count, 30 - 5);
    }

    #[test]
    fn test_acknowledge_frees_a_window_slot() {
        let config = ScenarioConfig {
            backpressure: BackpressurePolicy::AckWindow,
            ack_window_limit: 5,
            ..ScenarioConfig::default()
        };
        let (mut session, _sink) = session_with(config, 9);
        session.start_streaming();
        session.run_for(Duration::from_secs(1));
        assert_eq!(session.buffer_state().ack_window.len(), 5);

        let held: Vec<MessageId> = session.buffer_state().ack_window.iter().copied().collect();
        assert!(session.acknowledge(held[0]));
        assert!(!session.acknowledge(held[0]));
        assert_eq!(session.buffer_state().ack_window.len(), 4);

        // The freed slot admits exactly one more message
        session.run_for(Duration::from_secs(1));
        assert_eq!(session.buffer_state().ack_window.len(), 5);
        assert_eq!(session.delivered_total(), 6);
    }

    #[test]
    fn test_disconnect_halts_traffic_and_reconnect_resumes_it() {
        let config = ScenarioConfig {
            reconnect_strategy: ReconnectStrategy::Reconnect,
            retry: RetryPolicy {
                success_chance: 1.0,
                ..RetryPolicy::default()
            },
            ..ScenarioConfig::default()
        };
        let (mut session, sink) = session_with(config, 5);
        session.start_streaming();
        session.run_for(Duration::from_secs(1));
        let delivered_before = session.delivered_total();

        session.simulate_disconnect();
        assert_eq!(session.connection_state().link, LinkState::Reconnecting);

        // Nothing is produced while down; the 2s retry fires and succeeds
        session.run_for(Duration::from_secs(3));
        assert_eq!(session.connection_state().link, LinkState::Connected);
        assert!(session.delivered_total() > delivered_before);

        let succeeded = sink
            .records()
            .iter()
            .any(|r| matches!(r.decision, Decision::ReconnectSucceeded { .. }));
        assert!(succeeded);
    }

    #[test]
    fn test_dead_air_without_strategy_until_manual_restore() {
        let config = ScenarioConfig {
            reconnect_strategy: ReconnectStrategy::None,
            ..ScenarioConfig::default()
        };
        let (mut session, sink) = session_with(config, 5);
        session.start_streaming();
        session.run_for(Duration::from_secs(1));
        let delivered_before = session.delivered_total();

        session.simulate_disconnect();
        session.run_for(Duration::from_secs(10));
        assert_eq!(session.connection_state().link, LinkState::Disconnected);
        assert_eq!(session.delivered_total(), delivered_before);
        assert!(!sink
            .records()
            .iter()
            .any(|r| matches!(r.decision, Decision::RetryScheduled { .. })));

        session.restore_link();
        session.run_for(Duration::from_secs(1));
        assert_eq!(session.connection_state().link, LinkState::Connected);
        assert!(session.delivered_total() > delivered_before);
    }

    #[test]
    fn test_replay_resends_recent_tail_in_order() {
        let config = ScenarioConfig {
            reconnect_strategy: ReconnectStrategy::ReconnectWithReplay,
            replay_window: 10,
            retry: RetryPolicy {
                success_chance: 1.0,
                ..RetryPolicy::default()
            },
            ..ScenarioConfig::default()
        };
        let (mut session, sink) = session_with(config, 11);
        session.start_streaming();
        session.run_for(Duration::from_secs(3));
        assert_eq!(session.delivered_total(), 30);

        session.simulate_disconnect();
        session.run_for(Duration::from_secs(3));
        assert_eq!(session.connection_state().link, LinkState::Connected);

        let replayed = session.last_replay();
        assert_eq!(replayed.len(), 10);
        // The tail is the ten most recently delivered, oldest first
        let ids: Vec<u64> = replayed.iter().map(|m| m.id.0).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
        assert!(replayed.iter().all(|m| m.status == MessageStatus::Delivered));

        assert!(sink
            .records()
            .iter()
            .any(|r| matches!(r.decision, Decision::Replayed { count: 10 })));
    }

    #[test]
    fn test_bounded_retries_give_up() {
        let config = ScenarioConfig {
            reconnect_strategy: ReconnectStrategy::Reconnect,
            retry: RetryPolicy {
                success_chance: 0.0,
                max_attempts: Some(3),
                ..RetryPolicy::default()
            },
            ..ScenarioConfig::default()
        };
        let (mut session, sink) = session_with(config, 5);
        session.start_streaming();
        session.simulate_disconnect();
        session.run_for(Duration::from_secs(30));

        assert_eq!(session.connection_state().link, LinkState::Disconnected);
        assert!(sink
            .records()
            .iter()
            .any(|r| matches!(r.decision, Decision::RetriesExhausted { attempts: 3 })));
    }

    #[test]
    fn test_conflict_through_the_session_facade() {
        let config = ScenarioConfig {
            conflict_mode: ConflictMode::ManualMerge,
            ..ScenarioConfig::default()
        };
        let (mut session, _sink) = session_with(config, 1);

        assert_eq!(session.edit_as_writer_a("alpha"), EditOutcome::Propagated);
        assert_eq!(session.edit_as_writer_b("beta"), EditOutcome::ConflictOpened);
        assert_eq!(session.sync_phase(), SyncPhase::ConflictDetected);

        let resolved = session
            .resolve_conflict(Resolution::KeepB)
            .expect("conflict is open");
        assert_eq!(resolved, "beta");
        assert_eq!(session.sync_phase(), SyncPhase::Resolved);

        // The resolved display clears itself after the linger window
        session.run_for(RESOLVED_LINGER + Duration::from_millis(1));
        assert_eq!(session.sync_phase(), SyncPhase::Idle);
        assert!(session.conflict_record().is_none());
        assert_eq!(session.shared_field().server, "beta");
    }

    #[test]
    fn test_resolve_without_open_conflict_errors() {
        let (mut session, _sink) = session_with(ScenarioConfig::default(), 1);
        assert_eq!(
            session.resolve_conflict(Resolution::KeepA),
            Err(SessionError::NoPendingConflict)
        );
    }

    #[test]
    fn test_stop_streaming_keeps_staged_batch() {
        let config = ScenarioConfig {
            backpressure: BackpressurePolicy::Batch,
            batch_window_ms: 2000,
            ..ScenarioConfig::default()
        };
        let (mut session, sink) = session_with(config, 7);
        session.start_streaming();
        session.run_for(Duration::from_millis(300));
        session.stop_streaming();

        // The flush timer is cancelled with the stream
        session.run_for(Duration::from_secs(5));
        assert_eq!(session.delivered_total(), 0);

        // Restarting re-arms a flush for the retained batch
        session.start_streaming();
        session.run_for(Duration::from_secs(3));
        let flushed: usize = sink
            .records()
            .iter()
            .filter_map(|r| match r.decision {
                Decision::Flushed { count } => Some(count),
                _ => None,
            })
            .sum();
        assert!(flushed >= 3);
    }
}
