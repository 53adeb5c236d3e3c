//! JSON report writer.
//!
//! Serializes a scenario run, including the full decision log and
//! metrics timeline, for offline inspection or diffing two seeds.

use crate::runner::{ScenarioResult, ScenarioStats};

use relaylab_core::metrics::MetricsSnapshot;
use relaylab_core::{DecisionRecord, SharedSink};
use serde::Serialize;
use std::fs::File;
use std::io::Write;

/// Complete record of one scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Whether every property check held
    pub passed: bool,

    /// Final virtual time in milliseconds
    pub final_time_ms: u64,

    /// Violated checks, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// End-of-run counters
    pub stats: ScenarioStats,

    /// Every decision the engine recorded, in order
    pub decisions: Vec<DecisionRecord>,

    /// Per-tick metrics timeline
    pub metrics: Vec<MetricsSnapshot>,
}

impl RunReport {
    /// Builds a report from a scenario result and its sink.
    pub fn new(result: &ScenarioResult, sink: &SharedSink) -> Self {
        Self {
            scenario: result.scenario.name().to_string(),
            seed: result.seed,
            passed: result.passed,
            final_time_ms: result.final_time_ms,
            failure_reason: result.failure_reason.clone(),
            stats: result.stats.clone(),
            decisions: sink.records(),
            metrics: sink.snapshots(),
        }
    }

    /// Writes the report as pretty JSON.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
