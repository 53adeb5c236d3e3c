//! Error types for the simulation core.
//!
//! Domain "failures" (dropped messages, failed retries, open
//! conflicts) are modeled outcomes reported through the sink, never
//! errors. `Result` is reserved for configuration rejection and API
//! misuse.

use thiserror::Error;

/// Rejected scenario configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// Generator rate must be in 1..=1000 messages per second
    #[error("message rate {got} is out of range (1..=1000)")]
    RateOutOfRange { got: u32 },

    /// Batch policy with a zero flush window would never deliver
    #[error("batch window must be non-zero under the Batch policy")]
    ZeroBatchWindow,

    /// Replay strategy with nothing retained to replay
    #[error("replay window must be non-zero under ReconnectWithReplay")]
    ZeroReplayWindow,

    /// AckWindow policy with a zero limit admits nothing
    #[error("ack window limit must be non-zero under the AckWindow policy")]
    ZeroAckWindowLimit,

    /// Probabilities must be in 0.0..=1.0
    #[error("retry success chance {got} is not a probability")]
    InvalidChance { got: f64 },
}

/// API misuse against a live session.
#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    /// `resolve_conflict` with no conflict open
    #[error("no conflict is pending resolution")]
    NoPendingConflict,
}
