//! relaylab Scenario Harness
//!
//! Deterministic end-to-end scenarios for the transport engine. Each
//! scenario drives one `TransportSession` through a scripted sequence
//! of streaming intervals, faults, and operator actions, then checks
//! the recorded decision log against the delivery property the
//! scenario demonstrates.
//!
//! A run is a pure function of `(scenario, seed)`: rerunning a failed
//! seed reproduces the failure exactly, and an exported report
//! carries the full decision log for offline inspection.
//!
//! # Usage
//!
//! ```
//! use relaylab_sim::{ScenarioId, ScenarioRunner};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::SteadyStream);
//! assert!(result.passed);
//! ```

pub mod report;
pub mod runner;
pub mod scenarios;

pub use report::RunReport;
pub use runner::{ScenarioResult, ScenarioRunner, ScenarioStats};
pub use scenarios::ScenarioId;
