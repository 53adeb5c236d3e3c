//! Backpressure controller.
//!
//! One message arrives per generator tick; the configured policy
//! decides whether it is delivered, staged, admitted, or dropped.
//! The policy set is closed: admission is a single `match` over
//! [`BackpressurePolicy`], so adding a policy is a compile error
//! until every arm exists.

use crate::buffer::DeliveryBuffer;
use crate::config::BackpressurePolicy;
use crate::message::{Message, MessageId};
use crate::session::EngineEvent;
use crate::sink::{Cause, Decision, DecisionRecord, EventSink};
use relaylab_env::{TimerId, VirtualClock};
use std::time::Duration;

/// Depth bound for the Throttle policy.
pub const THROTTLE_THRESHOLD: usize = 10;

/// How an admission was resolved. The session uses this to advance
/// the drop metrics; the full story goes to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitOutcome {
    /// Delivered immediately (None policy)
    Delivered,

    /// Staged for the next batch flush
    Batched,

    /// Admitted as pending
    Admitted,

    /// Dropped by the active policy
    Dropped,

    /// Oldest pending message evicted, newcomer admitted
    Evicted { victim: MessageId },
}

impl AdmitOutcome {
    /// True when the decision dropped a message (the newcomer or an
    /// evicted victim).
    pub fn dropped_one(&self) -> bool {
        matches!(self, AdmitOutcome::Dropped | AdmitOutcome::Evicted { .. })
    }
}

/// Admits, batches, throttles, evicts, or rate-limits generated
/// messages before they enter the buffer.
pub struct BackpressureController {
    policy: BackpressurePolicy,
    batch_window: Duration,
    flush_timer: Option<TimerId>,
}

impl BackpressureController {
    /// Creates a controller for the given policy.
    pub fn new(policy: BackpressurePolicy, batch_window_ms: u64) -> Self {
        Self {
            policy,
            batch_window: Duration::from_millis(batch_window_ms),
            flush_timer: None,
        }
    }

    /// Decides the fate of one generated message.
    pub fn admit(
        &mut self,
        msg: Message,
        buffer: &mut DeliveryBuffer,
        clock: &mut VirtualClock<EngineEvent>,
        sink: &mut dyn EventSink,
    ) -> AdmitOutcome {
        let now = clock.now();
        let id = msg.id;

        match self.policy {
            BackpressurePolicy::None => {
                buffer.deliver_now(msg, now);
                sink.record(DecisionRecord {
                    at: now,
                    cause: Cause::GeneratorTick,
                    decision: Decision::Delivered,
                    explanation: format!("{id}: no backpressure, delivered immediately"),
                });
                AdmitOutcome::Delivered
            }

            BackpressurePolicy::Batch => {
                buffer.stage(msg);
                if self.flush_timer.is_none() {
                    self.flush_timer =
                        Some(clock.schedule(self.batch_window, EngineEvent::BatchFlush));
                }
                sink.record(DecisionRecord {
                    at: now,
                    cause: Cause::GeneratorTick,
                    decision: Decision::Batched,
                    explanation: format!(
                        "{id}: staged, batch flushes {}ms after first member",
                        self.batch_window.as_millis()
                    ),
                });
                AdmitOutcome::Batched
            }

            BackpressurePolicy::Throttle => {
                let depth = buffer.depth();
                if depth < THROTTLE_THRESHOLD {
                    buffer.admit_pending(msg, clock);
                    sink.record(DecisionRecord {
                        at: now,
                        cause: Cause::GeneratorTick,
                        decision: Decision::Admitted,
                        explanation: format!(
                            "{id}: depth {depth} below throttle threshold {THROTTLE_THRESHOLD}"
                        ),
                    });
                    AdmitOutcome::Admitted
                } else {
                    buffer.count_drop();
                    sink.record(DecisionRecord {
                        at: now,
                        cause: Cause::ThrottleThreshold,
                        decision: Decision::Dropped,
                        explanation: format!(
                            "{id}: depth {depth} at throttle threshold {THROTTLE_THRESHOLD}, dropped"
                        ),
                    });
                    AdmitOutcome::Dropped
                }
            }

            BackpressurePolicy::DropOld => {
                let mut outcome = AdmitOutcome::Admitted;
                if buffer.depth() >= buffer.state().capacity {
                    if let Some(victim) = buffer.evict_oldest_pending(clock) {
                        sink.record(DecisionRecord {
                            at: now,
                            cause: Cause::BufferAtCapacity,
                            decision: Decision::Evicted { victim },
                            explanation: format!(
                                "buffer full, evicted oldest pending {victim} for {id}"
                            ),
                        });
                        outcome = AdmitOutcome::Evicted { victim };
                    }
                }
                buffer.admit_pending(msg, clock);
                sink.record(DecisionRecord {
                    at: now,
                    cause: Cause::GeneratorTick,
                    decision: Decision::Admitted,
                    explanation: format!("{id}: admitted as pending"),
                });
                outcome
            }

            BackpressurePolicy::AckWindow => {
                if buffer.try_reserve_ack(id) {
                    buffer.admit_pending(msg, clock);
                    sink.record(DecisionRecord {
                        at: now,
                        cause: Cause::GeneratorTick,
                        decision: Decision::Admitted,
                        explanation: format!(
                            "{id}: admitted, ack window {}/{}",
                            buffer.state().ack_window.len(),
                            buffer.state().ack_window_limit
                        ),
                    });
                    AdmitOutcome::Admitted
                } else {
                    buffer.count_drop();
                    sink.record(DecisionRecord {
                        at: now,
                        cause: Cause::AckWindowFull,
                        decision: Decision::Dropped,
                        explanation: format!(
                            "{id}: ack window full ({}), only an ack frees capacity",
                            buffer.state().ack_window_limit
                        ),
                    });
                    AdmitOutcome::Dropped
                }
            }
        }
    }

    /// Delivers the accumulated batch as a unit (flush timer fired).
    pub fn flush(
        &mut self,
        buffer: &mut DeliveryBuffer,
        clock: &mut VirtualClock<EngineEvent>,
        sink: &mut dyn EventSink,
    ) -> usize {
        self.flush_timer = None;
        let now = clock.now();
        let count = buffer.flush_staged(now);
        sink.record(DecisionRecord {
            at: now,
            cause: Cause::BatchWindowElapsed,
            decision: Decision::Flushed { count },
            explanation: format!("batch window elapsed, delivered {count} messages as a unit"),
        });
        count
    }

    /// Cancels a pending flush timer, leaving staged messages in
    /// place for the next streaming interval.
    pub fn cancel_flush(&mut self, clock: &mut VirtualClock<EngineEvent>) {
        if let Some(timer) = self.flush_timer.take() {
            clock.cancel(timer);
        }
    }
}
