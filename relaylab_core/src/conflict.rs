//! Two-writer conflict resolution state machine.
//!
//! Two logical writers edit one shared field. Depending on the
//! configured mode an edit propagates immediately (None,
//! LastWriteWins) or opens a conflict record when the writers have
//! diverged (ManualMerge). An open conflict blocks automatic
//! propagation on the field until a resolution is supplied; nothing
//! else is affected.

use crate::config::{ConflictMode, SyncModel};
use crate::error::SessionError;
use crate::sink::{Cause, Decision, DecisionRecord, EventSink};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One of the two logical writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Writer {
    A,
    B,
}

impl Writer {
    /// The other writer.
    pub fn other(self) -> Writer {
        match self {
            Writer::A => Writer::B,
            Writer::B => Writer::A,
        }
    }
}

/// Phase of the conflict state machine.
///
/// `Resolved` is a short-lived display state; the session clears it
/// back to `Idle` on a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhase {
    Idle,
    ConflictDetected,
    Resolved,
}

/// An open (or just-resolved) conflict on the shared field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Field both writers edited
    pub field: String,

    /// Writer A's divergent value
    pub value_a: String,

    /// Writer B's divergent value
    pub value_b: String,

    /// Set once a resolution has been applied
    pub resolved: bool,

    /// The resolution, while the record lingers in display state
    pub resolved_value: Option<String>,
}

/// Caller-supplied conflict resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Resolution {
    /// Keep writer A's value
    KeepA,

    /// Keep writer B's value
    KeepB,

    /// Use a hand-merged value
    Merged(String),
}

/// How an edit landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// Propagated to the shared value
    Propagated,

    /// Divergence detected, conflict opened
    ConflictOpened,

    /// A conflict is already open on this field; the edit only
    /// updated that writer's side of it
    Blocked,
}

/// The shared field as each party sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedField {
    /// Writer A's local value
    pub client_a: String,

    /// Writer B's local value
    pub client_b: String,

    /// The shared/server value
    pub server: String,
}

/// State machine handling concurrent edits from two logical writers.
pub struct ConflictEngine {
    mode: ConflictMode,
    sync_model: SyncModel,
    phase: SyncPhase,
    values: SharedField,
    record: Option<ConflictRecord>,
    field: String,
}

impl ConflictEngine {
    /// Creates an engine over one named shared field.
    pub fn new(mode: ConflictMode, sync_model: SyncModel, field: &str, initial: &str) -> Self {
        Self {
            mode,
            sync_model,
            phase: SyncPhase::Idle,
            values: SharedField {
                client_a: initial.to_string(),
                client_b: initial.to_string(),
                server: initial.to_string(),
            },
            record: None,
            field: field.to_string(),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Current values as each party sees them.
    pub fn values(&self) -> &SharedField {
        &self.values
    }

    /// The open or just-resolved conflict record, if any.
    pub fn record(&self) -> Option<&ConflictRecord> {
        self.record.as_ref()
    }

    /// Applies an edit from one writer.
    pub fn edit(
        &mut self,
        writer: Writer,
        value: &str,
        now: Duration,
        sink: &mut dyn EventSink,
    ) -> EditOutcome {
        // A lingering Resolved display yields to new activity.
        if self.phase == SyncPhase::Resolved {
            self.clear_resolved();
        }

        match self.mode {
            ConflictMode::None => {
                // Straight to the shared value; the other writer's
                // local copy is not refreshed.
                self.set_local(writer, value);
                self.values.server = value.to_string();
                self.emit_propagated(writer, value, now, sink);
                EditOutcome::Propagated
            }

            ConflictMode::LastWriteWins => {
                self.values.client_a = value.to_string();
                self.values.client_b = value.to_string();
                self.values.server = value.to_string();
                self.emit_propagated(writer, value, now, sink);
                EditOutcome::Propagated
            }

            ConflictMode::ManualMerge => {
                if self.phase == SyncPhase::ConflictDetected {
                    // Blocked: the edit refreshes that writer's side
                    // of the open record only.
                    if self.sync_model == SyncModel::Optimistic {
                        self.set_local(writer, value);
                    }
                    if let Some(record) = self.record.as_mut() {
                        match writer {
                            Writer::A => record.value_a = value.to_string(),
                            Writer::B => record.value_b = value.to_string(),
                        }
                    }
                    return EditOutcome::Blocked;
                }

                // An edit from a stale base is the concurrency signal:
                // this writer has not seen the current shared value.
                let stale_base = self.local(writer) != self.values.server;
                let agrees = value == self.local(writer.other());
                if stale_base && !agrees {
                    // Under Optimistic sync the conflicting edit lands
                    // locally; under ServerAuthoritative it is held in
                    // the record only and the local copy stays on the
                    // shared value until resolution.
                    if self.sync_model == SyncModel::Optimistic {
                        self.set_local(writer, value);
                    }
                    let (value_a, value_b) = match writer {
                        Writer::A => (value.to_string(), self.values.client_b.clone()),
                        Writer::B => (self.values.client_a.clone(), value.to_string()),
                    };
                    self.phase = SyncPhase::ConflictDetected;
                    self.record = Some(ConflictRecord {
                        field: self.field.clone(),
                        value_a: value_a.clone(),
                        value_b: value_b.clone(),
                        resolved: false,
                        resolved_value: None,
                    });
                    sink.record(DecisionRecord {
                        at: now,
                        cause: Cause::ConcurrentEdit,
                        decision: Decision::ConflictOpened {
                            field: self.field.clone(),
                        },
                        explanation: format!(
                            "writers diverged on '{}' ('{value_a}' vs '{value_b}'), propagation blocked",
                            self.field
                        ),
                    });
                    EditOutcome::ConflictOpened
                } else {
                    // Clean edit. The other writer is left stale on
                    // purpose: its next edit arrives from a stale
                    // base and opens the conflict.
                    self.set_local(writer, value);
                    self.values.server = value.to_string();
                    self.emit_propagated(writer, value, now, sink);
                    EditOutcome::Propagated
                }
            }
        }
    }

    /// Resolves the open conflict; shared and both local values take
    /// the resolution.
    pub fn resolve(
        &mut self,
        resolution: Resolution,
        now: Duration,
        sink: &mut dyn EventSink,
    ) -> Result<String, SessionError> {
        let record = self
            .record
            .as_mut()
            .filter(|r| !r.resolved)
            .ok_or(SessionError::NoPendingConflict)?;

        let resolved = match resolution {
            Resolution::KeepA => record.value_a.clone(),
            Resolution::KeepB => record.value_b.clone(),
            Resolution::Merged(value) => value,
        };

        record.resolved = true;
        record.resolved_value = Some(resolved.clone());
        self.values.client_a = resolved.clone();
        self.values.client_b = resolved.clone();
        self.values.server = resolved.clone();
        self.phase = SyncPhase::Resolved;

        sink.record(DecisionRecord {
            at: now,
            cause: Cause::ManualResolution,
            decision: Decision::ConflictResolved {
                field: self.field.clone(),
            },
            explanation: format!("'{}' resolved to '{}'", self.field, resolved),
        });
        Ok(resolved)
    }

    /// Clears the short-lived `Resolved` display state.
    pub fn clear_resolved(&mut self) {
        if self.phase == SyncPhase::Resolved {
            self.phase = SyncPhase::Idle;
            self.record = None;
        }
    }

    fn local(&self, writer: Writer) -> &str {
        match writer {
            Writer::A => &self.values.client_a,
            Writer::B => &self.values.client_b,
        }
    }

    fn set_local(&mut self, writer: Writer, value: &str) {
        match writer {
            Writer::A => self.values.client_a = value.to_string(),
            Writer::B => self.values.client_b = value.to_string(),
        }
    }

    fn emit_propagated(
        &self,
        writer: Writer,
        value: &str,
        now: Duration,
        sink: &mut dyn EventSink,
    ) {
        sink.record(DecisionRecord {
            at: now,
            cause: Cause::ConcurrentEdit,
            decision: Decision::Propagated,
            explanation: format!("writer {writer:?} set '{}' to '{value}'", self.field),
        });
    }
}
