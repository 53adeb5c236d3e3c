//! relaylab Core - Realtime Transport Simulation Engine
//!
//! This library simulates one realtime client/server connection well
//! enough to study three delivery problems in isolation:
//! 1. **Backpressure**: a producer outrunning its consumer, handled by
//!    five interchangeable policies (batch, throttle, drop-old,
//!    ack-window, or none)
//! 2. **Reconnection**: link loss, retry loops with configurable
//!    backoff, and replay of the delivered tail on recovery
//! 3. **Conflict resolution**: two writers over one shared value, with
//!    last-write-wins or manual-merge semantics
//!
//! Everything runs against the virtual clock and seeded entropy from
//! `relaylab_env`, so a session run is a pure function of its
//! configuration and seed. Every consequential choice the engine makes
//! is reported to an [`EventSink`] as a (cause, decision, explanation)
//! record.
//!
//! [`TransportSession`] is the facade; the modules underneath are the
//! individual machines it coordinates.

pub mod backpressure;
pub mod buffer;
pub mod config;
pub mod conflict;
pub mod error;
pub mod generator;
pub mod message;
pub mod metrics;
pub mod reconnect;
pub mod session;
pub mod sink;

// Re-export the session-level surface for convenience
pub use config::{
    Backoff, BackpressurePolicy, ConflictMode, NetworkProfile, Protocol, ReconnectStrategy,
    RetryPolicy, ScenarioConfig, SyncModel,
};
pub use conflict::{EditOutcome, Resolution, SyncPhase, Writer};
pub use error::{ConfigError, SessionError};
pub use message::{Message, MessageId, MessageStatus, PayloadSizeClass};
pub use metrics::{MetricsSnapshot, SessionMetrics};
pub use reconnect::{ConnectionState, LinkState};
pub use session::{EngineEvent, TransportSession};
pub use sink::{
    Cause, Decision, DecisionRecord, EventSink, MemorySink, NullSink, SharedSink, TracingSink,
};
