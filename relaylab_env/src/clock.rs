//! Deterministic virtual clock and timer queue.
//!
//! The clock is the only time source in the system. Timers are plain
//! data: the owner schedules an event payload for a deadline, and
//! later pops due timers one at a time, dispatching each payload
//! itself. Timers scheduled for the same deadline fire in the order
//! they were scheduled (monotonic sequence tie-break).

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};
use std::time::Duration;

/// Handle to a scheduled timer, used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// A timer that has fired.
#[derive(Debug, Clone)]
pub struct Fired<E> {
    /// The timer's handle
    pub id: TimerId,

    /// Virtual time at which the timer fired
    pub at: Duration,

    /// The scheduled payload
    pub event: E,
}

struct ScheduledTimer<E> {
    deadline: Duration,
    seq: u64,
    id: TimerId,
    event: E,
}

impl<E> PartialEq for ScheduledTimer<E> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl<E> Eq for ScheduledTimer<E> {}

impl<E> PartialOrd for ScheduledTimer<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for ScheduledTimer<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // (deadline, seq) - the seq guarantees FIFO for equal deadlines
        self.deadline
            .cmp(&other.deadline)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Deterministic time source and timer queue.
///
/// Generic over the timer payload type `E` so the domain engine can
/// schedule typed events without this crate knowing about them.
pub struct VirtualClock<E> {
    /// Current virtual time; never moves backward
    now: Duration,

    /// Pending timers, earliest (deadline, seq) first
    queue: BinaryHeap<Reverse<ScheduledTimer<E>>>,

    /// Cancelled timers, purged lazily when they reach the heap top
    cancelled: HashSet<TimerId>,

    /// Next timer id / FIFO sequence number
    next_seq: u64,
}

impl<E> VirtualClock<E> {
    /// Creates a new clock at virtual time zero.
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            queue: BinaryHeap::new(),
            cancelled: HashSet::new(),
            next_seq: 0,
        }
    }

    /// Returns the current virtual time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Schedules `event` to fire `delay` after the current time.
    pub fn schedule(&mut self, delay: Duration, event: E) -> TimerId {
        self.schedule_at(self.now + delay, event)
    }

    /// Schedules `event` to fire at an absolute virtual time.
    ///
    /// Deadlines in the past fire on the next pop without moving time
    /// backward.
    pub fn schedule_at(&mut self, deadline: Duration, event: E) -> TimerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        let id = TimerId(seq);

        tracing::trace!(?deadline, seq, "timer scheduled");
        self.queue.push(Reverse(ScheduledTimer {
            deadline,
            seq,
            id,
            event,
        }));
        id
    }

    /// Cancels a timer. Returns `true` if it was still pending.
    ///
    /// A cancelled timer never surfaces from [`VirtualClock::pop_next`].
    pub fn cancel(&mut self, id: TimerId) -> bool {
        if id.0 >= self.next_seq || self.cancelled.contains(&id) {
            return false;
        }
        // The timer may already have fired; inserting is still safe
        // because fired ids are never reused.
        let live = self.queue.iter().any(|Reverse(t)| t.id == id);
        if live {
            self.cancelled.insert(id);
        }
        live
    }

    /// Cancels every pending timer.
    pub fn cancel_all(&mut self) {
        self.queue.clear();
        self.cancelled.clear();
    }

    /// Returns the deadline of the earliest live timer.
    pub fn next_deadline(&mut self) -> Option<Duration> {
        self.purge_cancelled();
        self.queue.peek().map(|Reverse(t)| t.deadline)
    }

    /// Pops the earliest live timer, advancing `now` to its deadline.
    pub fn pop_next(&mut self) -> Option<Fired<E>> {
        self.purge_cancelled();
        let Reverse(timer) = self.queue.pop()?;
        if timer.deadline > self.now {
            self.now = timer.deadline;
        }
        Some(Fired {
            id: timer.id,
            at: self.now,
            event: timer.event,
        })
    }

    /// Advances `now` to `deadline` without firing anything.
    ///
    /// The caller is expected to have drained timers due before
    /// `deadline` first. Moving backward is a no-op.
    pub fn advance_to(&mut self, deadline: Duration) {
        if deadline > self.now {
            self.now = deadline;
        }
    }

    /// Returns the number of live pending timers.
    pub fn pending(&mut self) -> usize {
        self.purge_cancelled();
        self.queue.len()
    }

    fn purge_cancelled(&mut self) {
        while let Some(Reverse(t)) = self.queue.peek() {
            if self.cancelled.remove(&t.id) {
                self.queue.pop();
            } else {
                break;
            }
        }
    }
}

impl<E> Default for VirtualClock<E> {
    fn default() -> Self {
        Self::new()
    }
}
