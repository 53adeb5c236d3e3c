//! Synthetic message model.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Unique identifier for a simulated message.
///
/// Monotonic per session; later ids were generated later. The last
/// delivered id anchors replay continuity after a reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

/// Payload size class of a simulated message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadSizeClass {
    Small,
    Medium,
    Large,
}

impl PayloadSizeClass {
    /// Latency multiplier for this size class.
    pub fn multiplier(&self) -> f64 {
        match self {
            PayloadSizeClass::Small => 1.0,
            PayloadSizeClass::Medium => 2.0,
            PayloadSizeClass::Large => 3.0,
        }
    }
}

/// Logical direction of a simulated message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    ServerToClient,
    ClientToServer,
}

/// Lifecycle status of a message.
///
/// `Delivered` and `Dropped` are terminal; the buffer never moves a
/// message out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageStatus {
    /// Admitted and waiting for simulated service
    Pending,

    /// Generated, or staged in a batch accumulator
    InFlight,

    /// Delivered (terminal)
    Delivered,

    /// Dropped by policy or by the flaky network (terminal)
    Dropped,
}

impl MessageStatus {
    /// Returns true for `Delivered` or `Dropped`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MessageStatus::Delivered | MessageStatus::Dropped)
    }
}

/// A synthetic message flowing through the simulated transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique id, monotonic per session
    pub id: MessageId,

    /// Virtual time at which the generator produced the message
    pub created_at: Duration,

    /// Payload size class (drives the latency estimate)
    pub payload: PayloadSizeClass,

    /// Logical direction, derived from the configured protocol
    pub direction: Direction,

    /// Current lifecycle status
    pub status: MessageStatus,

    /// Virtual time of delivery, set exactly once
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<Duration>,
}

impl Message {
    /// Creates a freshly generated message.
    pub fn new(
        id: MessageId,
        created_at: Duration,
        payload: PayloadSizeClass,
        direction: Direction,
    ) -> Self {
        Self {
            id,
            created_at,
            payload,
            direction,
            status: MessageStatus::InFlight,
            delivered_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_multipliers() {
        assert_eq!(PayloadSizeClass::Small.multiplier(), 1.0);
        assert_eq!(PayloadSizeClass::Medium.multiplier(), 2.0);
        assert_eq!(PayloadSizeClass::Large.multiplier(), 3.0);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!MessageStatus::Pending.is_terminal());
        assert!(!MessageStatus::InFlight.is_terminal());
        assert!(MessageStatus::Delivered.is_terminal());
        assert!(MessageStatus::Dropped.is_terminal());
    }

    #[test]
    fn test_message_id_ordering_is_generation_order() {
        assert!(MessageId(1) < MessageId(2));
        assert_eq!(MessageId(7).to_string(), "msg-7");
    }
}
