//! Bounded delivery buffer and replay log.
//!
//! The buffer owns every non-terminal message in the system: pending
//! admissions waiting out the simulated service delay, and batch-
//! staged messages waiting for a flush. Depth counts both. Delivered
//! messages graduate into the replay ring; dropped ones only bump the
//! counter.

use crate::message::{Message, MessageId, MessageStatus};
use crate::session::EngineEvent;
use relaylab_env::{TimerId, VirtualClock};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;

/// Default buffer capacity (the DropOld eviction bound).
pub const DEFAULT_CAPACITY: usize = 20;

/// Simulated service delay before an admitted message decays out of
/// `Pending` into `Delivered`.
pub const SERVICE_DELAY: Duration = Duration::from_millis(100);

/// Snapshot of the buffer's externally visible state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferState {
    /// Messages currently pending or in flight
    pub depth: usize,

    /// Hard bound on `depth`, enforced only by the DropOld policy.
    /// Batch staging counts toward `depth` and may exceed it within
    /// a flush window; Batch has no drop path.
    pub capacity: usize,

    /// Messages dropped so far, by policy or by the flaky network
    pub dropped_count: u64,

    /// Unacknowledged message ids (AckWindow policy)
    pub ack_window: HashSet<MessageId>,

    /// Bound on `ack_window`
    pub ack_window_limit: usize,
}

struct PendingEntry {
    message: Message,
    decay_timer: TimerId,
}

/// Bounded holding area between the backpressure controller and the
/// (simulated) consumer.
pub struct DeliveryBuffer {
    state: BufferState,

    /// Admitted messages in arrival order (DropOld evicts the front)
    pending: VecDeque<PendingEntry>,

    /// Batch accumulator, delivered as a unit on flush
    staged: Vec<Message>,

    /// Delivered messages, oldest evicted beyond `replay_window`
    replay: VecDeque<Message>,
    replay_window: usize,

    delivered_total: u64,
}

impl DeliveryBuffer {
    /// Creates a buffer with the given bounds.
    pub fn new(capacity: usize, ack_window_limit: usize, replay_window: usize) -> Self {
        Self {
            state: BufferState {
                depth: 0,
                capacity,
                dropped_count: 0,
                ack_window: HashSet::new(),
                ack_window_limit,
            },
            pending: VecDeque::new(),
            staged: Vec::new(),
            replay: VecDeque::new(),
            replay_window,
            delivered_total: 0,
        }
    }

    /// Current externally visible state.
    pub fn state(&self) -> &BufferState {
        &self.state
    }

    /// Current depth (pending + staged).
    pub fn depth(&self) -> usize {
        self.state.depth
    }

    /// Total messages delivered over the session's lifetime.
    pub fn delivered_total(&self) -> u64 {
        self.delivered_total
    }

    /// Delivers a message immediately (the `None` policy path).
    pub fn deliver_now(&mut self, msg: Message, now: Duration) {
        self.deliver(msg, now);
    }

    /// Admits a message as `Pending` and schedules its service decay.
    pub fn admit_pending(&mut self, mut msg: Message, clock: &mut VirtualClock<EngineEvent>) {
        msg.status = MessageStatus::Pending;
        let decay_timer = clock.schedule(SERVICE_DELAY, EngineEvent::ServiceDecay(msg.id));
        self.pending.push_back(PendingEntry {
            message: msg,
            decay_timer,
        });
        self.state.depth += 1;
    }

    /// Stages a message in the batch accumulator.
    pub fn stage(&mut self, msg: Message) {
        // Status stays InFlight until the flush boundary
        self.staged.push(msg);
        self.state.depth += 1;
    }

    /// Delivers every staged message as a unit at `now`.
    ///
    /// Batches are all-or-nothing: every member gets the same
    /// delivery timestamp.
    pub fn flush_staged(&mut self, now: Duration) -> usize {
        let staged = std::mem::take(&mut self.staged);
        let count = staged.len();
        self.state.depth -= count;
        for msg in staged {
            self.deliver(msg, now);
        }
        count
    }

    /// Evicts the oldest pending message to make room, cancelling its
    /// decay timer. Returns the victim's id.
    pub fn evict_oldest_pending(
        &mut self,
        clock: &mut VirtualClock<EngineEvent>,
    ) -> Option<MessageId> {
        let entry = self.pending.pop_front()?;
        clock.cancel(entry.decay_timer);
        self.state.depth -= 1;
        self.state.dropped_count += 1;
        Some(entry.message.id)
    }

    /// Counts a drop that never entered the buffer (policy rejection
    /// or flaky-network loss).
    pub fn count_drop(&mut self) {
        self.state.dropped_count += 1;
    }

    /// Reserves an ack-window slot for `id` if one is free.
    pub fn try_reserve_ack(&mut self, id: MessageId) -> bool {
        if self.state.ack_window.len() < self.state.ack_window_limit {
            self.state.ack_window.insert(id);
            true
        } else {
            false
        }
    }

    /// Frees the ack-window slot held by `id`.
    ///
    /// The only way capacity comes back under the AckWindow policy.
    pub fn ack(&mut self, id: MessageId) -> bool {
        self.state.ack_window.remove(&id)
    }

    /// Service decay: moves a pending message to `Delivered`.
    ///
    /// Returns `false` if the message is no longer pending (it was
    /// evicted before its delay elapsed).
    pub fn decay(&mut self, id: MessageId, now: Duration) -> bool {
        let Some(pos) = self.pending.iter().position(|e| e.message.id == id) else {
            return false;
        };
        if let Some(entry) = self.pending.remove(pos) {
            self.state.depth -= 1;
            self.deliver(entry.message, now);
        }
        true
    }

    /// The retained delivery-history tail, oldest first.
    pub fn replay_slice(&self) -> Vec<Message> {
        self.replay.iter().cloned().collect()
    }

    fn deliver(&mut self, mut msg: Message, now: Duration) {
        msg.status = MessageStatus::Delivered;
        msg.delivered_at = Some(now);
        self.delivered_total += 1;

        if self.replay_window > 0 {
            if self.replay.len() == self.replay_window {
                self.replay.pop_front();
            }
            self.replay.push_back(msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Direction, PayloadSizeClass};

    fn msg(id: u64) -> Message {
        Message::new(
            MessageId(id),
            Duration::from_millis(id * 100),
            PayloadSizeClass::Small,
            Direction::ServerToClient,
        )
    }

    #[test]
    fn test_admit_schedules_decay_and_counts_depth() {
        let mut clock = VirtualClock::new();
        let mut buffer = DeliveryBuffer::new(DEFAULT_CAPACITY, 5, 10);

        buffer.admit_pending(msg(0), &mut clock);
        assert_eq!(buffer.depth(), 1);
        assert_eq!(clock.next_deadline(), Some(SERVICE_DELAY));
    }

    #[test]
    fn test_decay_delivers_and_frees_depth() {
        let mut clock = VirtualClock::new();
        let mut buffer = DeliveryBuffer::new(DEFAULT_CAPACITY, 5, 10);

        buffer.admit_pending(msg(0), &mut clock);
        let fired = clock.pop_next().unwrap();
        assert!(matches!(fired.event, EngineEvent::ServiceDecay(MessageId(0))));

        assert!(buffer.decay(MessageId(0), fired.at));
        assert_eq!(buffer.depth(), 0);
        assert_eq!(buffer.delivered_total(), 1);

        let replayed = buffer.replay_slice();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].status, MessageStatus::Delivered);
        assert_eq!(replayed[0].delivered_at, Some(fired.at));
    }

    #[test]
    fn test_decay_after_eviction_is_a_noop() {
        let mut clock = VirtualClock::new();
        let mut buffer = DeliveryBuffer::new(DEFAULT_CAPACITY, 5, 10);

        buffer.admit_pending(msg(0), &mut clock);
        assert_eq!(buffer.evict_oldest_pending(&mut clock), Some(MessageId(0)));
        assert_eq!(buffer.depth(), 0);
        assert_eq!(buffer.state().dropped_count, 1);

        // The eviction cancelled the decay timer
        assert_eq!(clock.pending(), 0);
        assert!(!buffer.decay(MessageId(0), Duration::from_millis(100)));
    }

    #[test]
    fn test_flush_delivers_all_staged_at_one_timestamp() {
        let mut buffer = DeliveryBuffer::new(DEFAULT_CAPACITY, 5, 10);
        for i in 0..5 {
            buffer.stage(msg(i));
        }
        assert_eq!(buffer.depth(), 5);

        let boundary = Duration::from_millis(500);
        assert_eq!(buffer.flush_staged(boundary), 5);
        assert_eq!(buffer.depth(), 0);

        for delivered in buffer.replay_slice() {
            assert_eq!(delivered.delivered_at, Some(boundary));
        }
    }

    #[test]
    fn test_batch_staging_may_exceed_capacity_without_drops() {
        let mut buffer = DeliveryBuffer::new(DEFAULT_CAPACITY, 5, 64);
        for i in 0..(DEFAULT_CAPACITY as u64 + 5) {
            buffer.stage(msg(i));
        }
        assert!(buffer.depth() > DEFAULT_CAPACITY);
        assert_eq!(buffer.state().dropped_count, 0);

        let flushed = buffer.flush_staged(Duration::from_millis(500));
        assert_eq!(flushed, DEFAULT_CAPACITY + 5);
        assert_eq!(buffer.depth(), 0);
    }

    #[test]
    fn test_ack_window_reservation_respects_limit() {
        let mut buffer = DeliveryBuffer::new(DEFAULT_CAPACITY, 2, 10);

        assert!(buffer.try_reserve_ack(MessageId(0)));
        assert!(buffer.try_reserve_ack(MessageId(1)));
        assert!(!buffer.try_reserve_ack(MessageId(2)));

        assert!(buffer.ack(MessageId(0)));
        assert!(buffer.try_reserve_ack(MessageId(2)));
        assert!(!buffer.ack(MessageId(0)));
    }

    #[test]
    fn test_replay_ring_keeps_newest_window() {
        let mut buffer = DeliveryBuffer::new(DEFAULT_CAPACITY, 5, 3);
        for i in 0..7 {
            buffer.deliver_now(msg(i), Duration::from_millis(i * 10));
        }

        let ids: Vec<u64> = buffer.replay_slice().iter().map(|m| m.id.0).collect();
        assert_eq!(ids, vec![4, 5, 6]);
        assert_eq!(buffer.delivered_total(), 7);
    }

    #[test]
    fn test_zero_replay_window_retains_nothing() {
        let mut buffer = DeliveryBuffer::new(DEFAULT_CAPACITY, 5, 0);
        buffer.deliver_now(msg(0), Duration::ZERO);
        assert!(buffer.replay_slice().is_empty());
        assert_eq!(buffer.delivered_total(), 1);
    }
}
