//! Scenario catalogue for the transport engine.

use relaylab_core::config::{
    Backoff, BackpressurePolicy, ConflictMode, NetworkProfile, ReconnectStrategy, RetryPolicy,
    ScenarioConfig,
};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// RLB-001: Stable network, no backpressure, everything delivers
    SteadyStream,

    /// RLB-002: Flaky network at full rate, drop accounting
    FlakyFirehose,

    /// RLB-003: Batch policy, deliveries only at flush boundaries
    BatchBoundary,

    /// RLB-004: Throttle policy under a producer burst
    ThrottleSqueeze,

    /// RLB-005: Drop-oldest policy under a producer burst
    DropOldChurn,

    /// RLB-006: Ack window fills and stalls without acknowledgments
    AckWindowStall,

    /// RLB-007: Disconnect, retry, and replay the delivered tail
    ReplayAfterOutage,

    /// RLB-008: No reconnect strategy, down until manual restore
    DeadAir,

    /// RLB-009: Two writers under last-write-wins
    LastWriteWins,

    /// RLB-010: Two writers under manual merge, open and resolve
    ManualMergeStandoff,

    /// RLB-011: Every retry fails until the bounded budget runs out
    RetryStorm,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::SteadyStream,
            ScenarioId::FlakyFirehose,
            ScenarioId::BatchBoundary,
            ScenarioId::ThrottleSqueeze,
            ScenarioId::DropOldChurn,
            ScenarioId::AckWindowStall,
            ScenarioId::ReplayAfterOutage,
            ScenarioId::DeadAir,
            ScenarioId::LastWriteWins,
            ScenarioId::ManualMergeStandoff,
            ScenarioId::RetryStorm,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::SteadyStream => "steady_stream",
            ScenarioId::FlakyFirehose => "flaky_firehose",
            ScenarioId::BatchBoundary => "batch_boundary",
            ScenarioId::ThrottleSqueeze => "throttle_squeeze",
            ScenarioId::DropOldChurn => "drop_old_churn",
            ScenarioId::AckWindowStall => "ack_window_stall",
            ScenarioId::ReplayAfterOutage => "replay_after_outage",
            ScenarioId::DeadAir => "dead_air",
            ScenarioId::LastWriteWins => "last_write_wins",
            ScenarioId::ManualMergeStandoff => "manual_merge_standoff",
            ScenarioId::RetryStorm => "retry_storm",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::SteadyStream => "Stable link at 10 msg/s, exact delivery accounting",
            ScenarioId::FlakyFirehose => "30% random loss, drop counters must balance",
            ScenarioId::BatchBoundary => "500ms batch windows, deliveries arrive as units",
            ScenarioId::ThrottleSqueeze => "1000 msg/s burst, depth pinned at the throttle threshold",
            ScenarioId::DropOldChurn => "1000 msg/s burst, oldest pending evicted at capacity",
            ScenarioId::AckWindowStall => "Unacked window of 5 stalls; one ack admits one more",
            ScenarioId::ReplayAfterOutage => "Retry succeeds, last 10 delivered replayed in order",
            ScenarioId::DeadAir => "No strategy: silence until a manual restore",
            ScenarioId::LastWriteWins => "Concurrent edits, second writer wins everywhere",
            ScenarioId::ManualMergeStandoff => "Concurrent edits block the field until merged",
            ScenarioId::RetryStorm => "Every retry fails, bounded budget gives up cleanly",
        }
    }

    /// Baseline configuration the scenario runs against.
    pub fn config(&self) -> ScenarioConfig {
        let base = ScenarioConfig::default();
        match self {
            ScenarioId::SteadyStream => base,
            ScenarioId::FlakyFirehose => ScenarioConfig {
                network: NetworkProfile::Flaky,
                ..base
            },
            ScenarioId::BatchBoundary => ScenarioConfig {
                backpressure: BackpressurePolicy::Batch,
                batch_window_ms: 500,
                ..base
            },
            ScenarioId::ThrottleSqueeze => ScenarioConfig {
                backpressure: BackpressurePolicy::Throttle,
                msg_rate_per_sec: 1000,
                ..base
            },
            ScenarioId::DropOldChurn => ScenarioConfig {
                backpressure: BackpressurePolicy::DropOld,
                msg_rate_per_sec: 1000,
                ..base
            },
            ScenarioId::AckWindowStall => ScenarioConfig {
                backpressure: BackpressurePolicy::AckWindow,
                ack_window_limit: 5,
                ..base
            },
            ScenarioId::ReplayAfterOutage => ScenarioConfig {
                reconnect_strategy: ReconnectStrategy::ReconnectWithReplay,
                replay_window: 10,
                retry: RetryPolicy {
                    success_chance: 1.0,
                    ..RetryPolicy::default()
                },
                ..base
            },
            ScenarioId::DeadAir => ScenarioConfig {
                reconnect_strategy: ReconnectStrategy::None,
                ..base
            },
            ScenarioId::LastWriteWins => ScenarioConfig {
                conflict_mode: ConflictMode::LastWriteWins,
                ..base
            },
            ScenarioId::ManualMergeStandoff => ScenarioConfig {
                conflict_mode: ConflictMode::ManualMerge,
                ..base
            },
            ScenarioId::RetryStorm => ScenarioConfig {
                reconnect_strategy: ReconnectStrategy::Reconnect,
                retry: RetryPolicy {
                    base_delay_ms: 500,
                    backoff: Backoff::Exponential {
                        factor: 2.0,
                        cap_ms: 8000,
                    },
                    success_chance: 0.0,
                    max_attempts: Some(5),
                },
                ..base
            },
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "steady_stream" | "steadystream" | "rlb-001" => Ok(ScenarioId::SteadyStream),
            "flaky_firehose" | "flakyfirehose" | "rlb-002" => Ok(ScenarioId::FlakyFirehose),
            "batch_boundary" | "batchboundary" | "rlb-003" => Ok(ScenarioId::BatchBoundary),
            "throttle_squeeze" | "throttlesqueeze" | "rlb-004" => Ok(ScenarioId::ThrottleSqueeze),
            "drop_old_churn" | "dropoldchurn" | "rlb-005" => Ok(ScenarioId::DropOldChurn),
            "ack_window_stall" | "ackwindowstall" | "rlb-006" => Ok(ScenarioId::AckWindowStall),
            "replay_after_outage" | "replayafteroutage" | "rlb-007" => {
                Ok(ScenarioId::ReplayAfterOutage)
            }
            "dead_air" | "deadair" | "rlb-008" => Ok(ScenarioId::DeadAir),
            "last_write_wins" | "lastwritewins" | "rlb-009" => Ok(ScenarioId::LastWriteWins),
            "manual_merge_standoff" | "manualmergestandoff" | "rlb-010" => {
                Ok(ScenarioId::ManualMergeStandoff)
            }
            "retry_storm" | "retrystorm" | "rlb-011" => Ok(ScenarioId::RetryStorm),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_scenario_config_validates() {
        for scenario in ScenarioId::all() {
            assert!(
                scenario.config().validate().is_ok(),
                "{} ships an invalid config",
                scenario
            );
        }
    }

    #[test]
    fn test_names_round_trip() {
        for scenario in ScenarioId::all() {
            let parsed: ScenarioId = scenario.name().parse().unwrap();
            assert_eq!(parsed, scenario);
        }
    }

    #[test]
    fn test_unknown_name_is_rejected() {
        assert!("chaos_storm".parse::<ScenarioId>().is_err());
    }
}
