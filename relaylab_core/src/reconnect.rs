//! Reconnection state machine.
//!
//! `Connected -> Disconnected -> Reconnecting -> Connected` as a pure
//! transition function; the manager wrapper owns the retry timer and
//! the sink reporting. Retry failures are recoverable outcomes, never
//! errors: the machine either loops into another attempt or, with a
//! bounded policy, parks in `Disconnected`.

use crate::config::{ReconnectStrategy, RetryPolicy};
use crate::session::EngineEvent;
use crate::sink::{Cause, Decision, DecisionRecord, EventSink};
use relaylab_env::{TimerId, VirtualClock};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Link position in the reconnect cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    Connected,
    Disconnected,
    Reconnecting,
}

/// Externally visible connection state.
///
/// Owned exclusively by the [`ReconnectionManager`]; transitions are
/// the only mutation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    /// Current link state
    pub link: LinkState,

    /// Attempts made in the current outage (reset on success)
    pub reconnect_attempts: u32,
}

impl ConnectionState {
    /// Creates the initial state.
    pub fn new(link: LinkState) -> Self {
        Self {
            link,
            reconnect_attempts: 0,
        }
    }

    /// True while a retry is in flight.
    pub fn is_reconnecting(&self) -> bool {
        self.link == LinkState::Reconnecting
    }
}

/// Input to the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The network went down (external input)
    LinkDown,

    /// The retry timer fired; the attempt's outcome was already drawn
    RetryElapsed { success: bool },

    /// External reconnect signal (the only recovery under strategy
    /// `None`, and a manual override while reconnecting)
    ManualRestore,
}

/// Side effect requested by a transition. The manager and session
/// execute these; the transition function stays pure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEffect {
    /// Cancel generator and batch timers
    HaltTraffic,

    /// Arm the retry timer
    ScheduleRetry { delay: Duration },

    /// Resume traffic; replay the delivery tail if asked
    Resume { replay: bool },

    /// Bounded retry budget exhausted; stay down
    GiveUp,
}

/// Pure transition function: `(state, event) -> (state, effects)`.
pub fn transition(
    state: ConnectionState,
    event: LinkEvent,
    strategy: ReconnectStrategy,
    retry: &RetryPolicy,
) -> (ConnectionState, Vec<LinkEffect>) {
    let replay = strategy == ReconnectStrategy::ReconnectWithReplay;

    match (state.link, event) {
        (LinkState::Connected, LinkEvent::LinkDown) => {
            if strategy == ReconnectStrategy::None {
                (
                    ConnectionState::new(LinkState::Disconnected),
                    vec![LinkEffect::HaltTraffic],
                )
            } else {
                // Reconnecting is entered automatically; the first
                // attempt counts from the moment the link drops.
                let attempts = state.reconnect_attempts + 1;
                (
                    ConnectionState {
                        link: LinkState::Reconnecting,
                        reconnect_attempts: attempts,
                    },
                    vec![
                        LinkEffect::HaltTraffic,
                        LinkEffect::ScheduleRetry {
                            delay: retry.delay_for(attempts),
                        },
                    ],
                )
            }
        }

        (LinkState::Reconnecting, LinkEvent::RetryElapsed { success: true }) => (
            ConnectionState::new(LinkState::Connected),
            vec![LinkEffect::Resume { replay }],
        ),

        (LinkState::Reconnecting, LinkEvent::RetryElapsed { success: false }) => {
            let exhausted = retry
                .max_attempts
                .is_some_and(|max| state.reconnect_attempts >= max);
            if exhausted {
                (
                    ConnectionState {
                        link: LinkState::Disconnected,
                        ..state
                    },
                    vec![LinkEffect::GiveUp],
                )
            } else {
                let attempts = state.reconnect_attempts + 1;
                (
                    ConnectionState {
                        link: LinkState::Reconnecting,
                        reconnect_attempts: attempts,
                    },
                    vec![LinkEffect::ScheduleRetry {
                        delay: retry.delay_for(attempts),
                    }],
                )
            }
        }

        (LinkState::Disconnected | LinkState::Reconnecting, LinkEvent::ManualRestore) => (
            ConnectionState::new(LinkState::Connected),
            vec![LinkEffect::Resume { replay }],
        ),

        // Everything else is a no-op: duplicate link-down signals,
        // restores while connected, stray retries after an override.
        _ => (state, vec![]),
    }
}

/// Supervises the link: applies transitions, owns the retry timer,
/// reports to the sink.
pub struct ReconnectionManager {
    state: ConnectionState,
    strategy: ReconnectStrategy,
    retry: RetryPolicy,
    retry_timer: Option<TimerId>,
}

impl ReconnectionManager {
    /// Creates a manager; `start_down` models a scenario that begins
    /// with the link already out.
    pub fn new(strategy: ReconnectStrategy, retry: RetryPolicy, start_down: bool) -> Self {
        let link = if start_down {
            LinkState::Disconnected
        } else {
            LinkState::Connected
        };
        Self {
            state: ConnectionState::new(link),
            strategy,
            retry,
            retry_timer: None,
        }
    }

    /// Current connection state snapshot.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Per-attempt success probability (drawn by the session so the
    /// transition stays pure).
    pub fn success_chance(&self) -> f64 {
        self.retry.success_chance
    }

    /// Applies a link event, executing timer effects locally.
    ///
    /// Returns the effects the session must act on (`HaltTraffic`,
    /// `Resume`); timer management stays in here.
    pub fn apply(
        &mut self,
        event: LinkEvent,
        clock: &mut VirtualClock<EngineEvent>,
        sink: &mut dyn EventSink,
    ) -> Vec<LinkEffect> {
        let (next, effects) = transition(self.state, event, self.strategy, &self.retry);
        let previous = self.state;
        self.state = next;

        // Any transition away from Reconnecting cancels the pending
        // retry; a stray late retry must never fire.
        if previous.link == LinkState::Reconnecting && next.link != LinkState::Reconnecting {
            self.cancel_retry(clock);
        }

        let mut for_session = Vec::new();
        for effect in effects {
            match effect {
                LinkEffect::ScheduleRetry { delay } => {
                    self.retry_timer = Some(clock.schedule(delay, EngineEvent::ReconnectAttempt));
                    sink.record(DecisionRecord {
                        at: clock.now(),
                        cause: cause_for(event),
                        decision: Decision::RetryScheduled {
                            attempt: next.reconnect_attempts,
                        },
                        explanation: format!(
                            "retry attempt {} scheduled in {}ms",
                            next.reconnect_attempts,
                            delay.as_millis()
                        ),
                    });
                }
                LinkEffect::GiveUp => {
                    sink.record(DecisionRecord {
                        at: clock.now(),
                        cause: Cause::RetryTimerElapsed,
                        decision: Decision::RetriesExhausted {
                            attempts: next.reconnect_attempts,
                        },
                        explanation: format!(
                            "gave up after {} attempts; waiting for an external restore",
                            next.reconnect_attempts
                        ),
                    });
                    for_session.push(effect);
                }
                LinkEffect::Resume { .. } => {
                    sink.record(DecisionRecord {
                        at: clock.now(),
                        cause: cause_for(event),
                        decision: Decision::ReconnectSucceeded {
                            attempts: previous.reconnect_attempts,
                        },
                        explanation: format!(
                            "link restored after {} attempts",
                            previous.reconnect_attempts
                        ),
                    });
                    for_session.push(effect);
                }
                LinkEffect::HaltTraffic => {
                    for_session.push(effect);
                }
            }
        }

        if matches!(event, LinkEvent::RetryElapsed { success: false })
            && next.link == LinkState::Reconnecting
        {
            sink.record(DecisionRecord {
                at: clock.now(),
                cause: Cause::RetryTimerElapsed,
                decision: Decision::ReconnectFailed {
                    attempt: previous.reconnect_attempts,
                },
                explanation: format!("attempt {} failed", previous.reconnect_attempts),
            });
        }

        for_session
    }

    /// Cancels the outstanding retry timer, if any.
    pub fn cancel_retry(&mut self, clock: &mut VirtualClock<EngineEvent>) {
        if let Some(timer) = self.retry_timer.take() {
            clock.cancel(timer);
        }
    }
}

fn cause_for(event: LinkEvent) -> Cause {
    match event {
        LinkEvent::LinkDown => Cause::LinkDown,
        LinkEvent::RetryElapsed { .. } => Cause::RetryTimerElapsed,
        LinkEvent::ManualRestore => Cause::ManualRestore,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::NullSink;

    fn retry() -> RetryPolicy {
        RetryPolicy::default()
    }

    #[test]
    fn test_link_down_with_strategy_none_stays_down() {
        let state = ConnectionState::new(LinkState::Connected);
        let (next, effects) =
            transition(state, LinkEvent::LinkDown, ReconnectStrategy::None, &retry());

        assert_eq!(next.link, LinkState::Disconnected);
        assert_eq!(next.reconnect_attempts, 0);
        assert_eq!(effects, vec![LinkEffect::HaltTraffic]);
    }

    #[test]
    fn test_link_down_enters_reconnecting_automatically() {
        let state = ConnectionState::new(LinkState::Connected);
        let (next, effects) = transition(
            state,
            LinkEvent::LinkDown,
            ReconnectStrategy::Reconnect,
            &retry(),
        );

        assert_eq!(next.link, LinkState::Reconnecting);
        assert_eq!(next.reconnect_attempts, 1);
        assert_eq!(
            effects,
            vec![
                LinkEffect::HaltTraffic,
                LinkEffect::ScheduleRetry {
                    delay: Duration::from_millis(2000)
                }
            ]
        );
    }

    #[test]
    fn test_failed_attempt_loops_with_incremented_count() {
        let state = ConnectionState {
            link: LinkState::Reconnecting,
            reconnect_attempts: 1,
        };
        let (next, effects) = transition(
            state,
            LinkEvent::RetryElapsed { success: false },
            ReconnectStrategy::Reconnect,
            &retry(),
        );

        assert_eq!(next.link, LinkState::Reconnecting);
        assert_eq!(next.reconnect_attempts, 2);
        assert!(matches!(effects[0], LinkEffect::ScheduleRetry { .. }));
    }

    #[test]
    fn test_success_resumes_with_replay_per_strategy() {
        let state = ConnectionState {
            link: LinkState::Reconnecting,
            reconnect_attempts: 3,
        };

        let (next, effects) = transition(
            state,
            LinkEvent::RetryElapsed { success: true },
            ReconnectStrategy::ReconnectWithReplay,
            &retry(),
        );
        assert_eq!(next.link, LinkState::Connected);
        assert_eq!(next.reconnect_attempts, 0);
        assert_eq!(effects, vec![LinkEffect::Resume { replay: true }]);

        let (_, effects) = transition(
            state,
            LinkEvent::RetryElapsed { success: true },
            ReconnectStrategy::Reconnect,
            &retry(),
        );
        assert_eq!(effects, vec![LinkEffect::Resume { replay: false }]);
    }

    #[test]
    fn test_bounded_retries_give_up() {
        let bounded = RetryPolicy {
            max_attempts: Some(3),
            ..retry()
        };
        let state = ConnectionState {
            link: LinkState::Reconnecting,
            reconnect_attempts: 3,
        };
        let (next, effects) = transition(
            state,
            LinkEvent::RetryElapsed { success: false },
            ReconnectStrategy::Reconnect,
            &bounded,
        );

        assert_eq!(next.link, LinkState::Disconnected);
        assert_eq!(effects, vec![LinkEffect::GiveUp]);
    }

    #[test]
    fn test_duplicate_link_down_is_a_noop() {
        let state = ConnectionState::new(LinkState::Disconnected);
        let (next, effects) = transition(
            state,
            LinkEvent::LinkDown,
            ReconnectStrategy::Reconnect,
            &retry(),
        );
        assert_eq!(next, state);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_manual_restore_cancels_pending_retry() {
        let mut clock = VirtualClock::new();
        let mut sink = NullSink;
        let mut manager =
            ReconnectionManager::new(ReconnectStrategy::Reconnect, retry(), false);

        manager.apply(LinkEvent::LinkDown, &mut clock, &mut sink);
        assert!(manager.state().is_reconnecting());
        assert_eq!(clock.pending(), 1);

        let effects = manager.apply(LinkEvent::ManualRestore, &mut clock, &mut sink);
        assert_eq!(manager.state().link, LinkState::Connected);
        assert_eq!(clock.pending(), 0);
        assert!(effects.contains(&LinkEffect::Resume { replay: false }));
    }
}
