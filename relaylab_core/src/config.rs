//! Scenario configuration.
//!
//! A `ScenarioConfig` is validated once and then immutable for the
//! duration of a simulation run; changing it means restarting the
//! relevant sub-state machine with a fresh session.

use crate::error::ConfigError;
use crate::message::PayloadSizeClass;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Transport protocol being taught. Presentational: it only decides
/// message direction, never delivery behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    /// Bidirectional; directions alternate
    WebSocket,

    /// Server push only
    Sse,

    /// Client pull only
    LongPolling,
}

/// Ambient network condition for the simulated link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkProfile {
    Stable,

    /// Each generated message is dropped with a fixed 30% chance
    Flaky,

    /// Link starts (or is forced) down; the generator never ticks
    Disconnected,
}

/// Backpressure policy applied between generator and buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackpressurePolicy {
    /// Admit and deliver immediately
    None,

    /// Accumulate and deliver as a unit at the batch window boundary
    Batch,

    /// Admit only below the depth threshold, drop the rest
    Throttle,

    /// Evict the oldest pending message when the buffer is full
    DropOld,

    /// Admit only while unacknowledged messages fit the ack window
    AckWindow,
}

/// Recovery behavior after the link goes down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconnectStrategy {
    /// No recovery; the session stays down until an external restore
    None,

    /// Retry until the link comes back
    Reconnect,

    /// Retry, then replay the tail of the delivery history
    ReconnectWithReplay,
}

/// How an edit lands on the editing writer's own copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncModel {
    /// Local value updates immediately, before propagation
    Optimistic,

    /// Local values only change through propagation
    ServerAuthoritative,
}

/// Conflict policy for the two-writer shared value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictMode {
    /// Propagate straight to the shared value, no detection
    None,

    /// Most recent edit overwrites everything
    LastWriteWins,

    /// Divergent concurrent edits open a conflict record
    ManualMerge,
}

/// Backoff shape for reconnect retries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Backoff {
    /// Same delay every attempt (the reference behavior)
    Fixed,

    /// Delay grows by `factor` per attempt, capped at `cap_ms`
    Exponential { factor: f64, cap_ms: u64 },
}

/// Reconnect retry policy.
///
/// The reference behavior retries indefinitely every 2 s with a 70%
/// success chance per attempt; all three knobs are configurable here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,

    /// Backoff shape across attempts
    pub backoff: Backoff,

    /// Per-attempt success probability
    pub success_chance: f64,

    /// Attempt bound; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ms = match self.backoff {
            Backoff::Fixed => self.base_delay_ms,
            Backoff::Exponential { factor, cap_ms } => {
                let scaled =
                    self.base_delay_ms as f64 * factor.powi(attempt.saturating_sub(1) as i32);
                (scaled as u64).min(cap_ms)
            }
        };
        Duration::from_millis(ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 2000,
            backoff: Backoff::Fixed,
            success_chance: 0.7,
            max_attempts: None,
        }
    }
}

/// Full configuration for one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Transport protocol (direction of generated messages)
    pub protocol: Protocol,

    /// Ambient network condition
    pub network: NetworkProfile,

    /// Generator rate, messages per simulated second (1..=1000)
    pub msg_rate_per_sec: u32,

    /// Payload size class of generated messages
    pub payload_size: PayloadSizeClass,

    /// Backpressure policy
    pub backpressure: BackpressurePolicy,

    /// Batch flush window in milliseconds (Batch policy only)
    pub batch_window_ms: u64,

    /// Recovery behavior after a disconnect
    pub reconnect_strategy: ReconnectStrategy,

    /// Delivered messages retained for replay (ring capacity)
    pub replay_window: usize,

    /// Bound on unacknowledged messages (AckWindow policy only)
    pub ack_window_limit: usize,

    /// Reconnect retry policy
    pub retry: RetryPolicy,

    /// How edits land on the editing writer's local copy
    pub sync_model: SyncModel,

    /// Conflict policy for the two-writer shared value
    pub conflict_mode: ConflictMode,
}

impl ScenarioConfig {
    /// Generator tick interval derived from the message rate.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.msg_rate_per_sec.max(1)))
    }

    /// Checks the configuration for internally inconsistent values.
    ///
    /// The core assumes a validated configuration everywhere else;
    /// this is the single gate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.msg_rate_per_sec == 0 || self.msg_rate_per_sec > 1000 {
            return Err(ConfigError::RateOutOfRange {
                got: self.msg_rate_per_sec,
            });
        }
        if self.backpressure == BackpressurePolicy::Batch && self.batch_window_ms == 0 {
            return Err(ConfigError::ZeroBatchWindow);
        }
        if self.reconnect_strategy == ReconnectStrategy::ReconnectWithReplay
            && self.replay_window == 0
        {
            return Err(ConfigError::ZeroReplayWindow);
        }
        if self.backpressure == BackpressurePolicy::AckWindow && self.ack_window_limit == 0 {
            return Err(ConfigError::ZeroAckWindowLimit);
        }
        if !(0.0..=1.0).contains(&self.retry.success_chance) {
            return Err(ConfigError::InvalidChance {
                got: self.retry.success_chance,
            });
        }
        Ok(())
    }
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::WebSocket,
            network: NetworkProfile::Stable,
            msg_rate_per_sec: 10,
            payload_size: PayloadSizeClass::Small,
            backpressure: BackpressurePolicy::None,
            batch_window_ms: 500,
            reconnect_strategy: ReconnectStrategy::Reconnect,
            replay_window: 10,
            ack_window_limit: 5,
            retry: RetryPolicy::default(),
            sync_model: SyncModel::Optimistic,
            conflict_mode: ConflictMode::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ScenarioConfig::default().validate().is_ok());
    }

    #[test]
    fn test_tick_interval_from_rate() {
        let mut config = ScenarioConfig::default();
        config.msg_rate_per_sec = 10;
        assert_eq!(config.tick_interval(), Duration::from_millis(100));

        config.msg_rate_per_sec = 1000;
        assert_eq!(config.tick_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_rejects_zero_rate() {
        let mut config = ScenarioConfig::default();
        config.msg_rate_per_sec = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RateOutOfRange { got: 0 })
        ));
    }

    #[test]
    fn test_rejects_zero_batch_window_under_batch() {
        let mut config = ScenarioConfig::default();
        config.batch_window_ms = 0;
        // Irrelevant while the policy is None
        assert!(config.validate().is_ok());

        config.backpressure = BackpressurePolicy::Batch;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroBatchWindow)));
    }

    #[test]
    fn test_rejects_zero_replay_window_when_replaying() {
        let mut config = ScenarioConfig::default();
        config.reconnect_strategy = ReconnectStrategy::ReconnectWithReplay;
        config.replay_window = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroReplayWindow)
        ));
    }

    #[test]
    fn test_retry_delay_fixed_and_exponential() {
        let fixed = RetryPolicy::default();
        assert_eq!(fixed.delay_for(1), Duration::from_millis(2000));
        assert_eq!(fixed.delay_for(5), Duration::from_millis(2000));

        let expo = RetryPolicy {
            base_delay_ms: 1000,
            backoff: Backoff::Exponential {
                factor: 2.0,
                cap_ms: 5000,
            },
            ..RetryPolicy::default()
        };
        assert_eq!(expo.delay_for(1), Duration::from_millis(1000));
        assert_eq!(expo.delay_for(2), Duration::from_millis(2000));
        assert_eq!(expo.delay_for(3), Duration::from_millis(4000));
        // Capped
        assert_eq!(expo.delay_for(4), Duration::from_millis(5000));
    }
}
