//! Transport Session Demo - Flaky Link with Outage and Replay
//! ===========================================================
//!
//! Demonstrates:
//! - A session streaming 20 msg/s over a flaky link (30% loss)
//! - A mid-run outage with automatic reconnect and tail replay
//! - A two-writer manual-merge conflict, resolved by merging
//! - Decision records and metrics captured through a shared sink
//!
//! Run:
//! ```bash
//! cargo run --example transport_demo
//! ```

use relaylab_core::{
    BackpressurePolicy, ConflictMode, NetworkProfile, ReconnectStrategy, Resolution,
    ScenarioConfig, SharedSink, TransportSession,
};
use std::time::Duration;

fn main() {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(tracing::Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    let config = ScenarioConfig {
        network: NetworkProfile::Flaky,
        msg_rate_per_sec: 20,
        backpressure: BackpressurePolicy::DropOld,
        reconnect_strategy: ReconnectStrategy::ReconnectWithReplay,
        replay_window: 10,
        conflict_mode: ConflictMode::ManualMerge,
        ..ScenarioConfig::default()
    };

    let sink = SharedSink::new();
    let mut session = TransportSession::new(config, 42, Box::new(sink.clone()))
        .expect("demo config is valid");

    println!("Session {} starting", session.id());

    // Five seconds of flaky streaming
    session.start_streaming();
    session.run_for(Duration::from_secs(5));
    println!(
        "after 5s: delivered={} dropped={} depth={}",
        session.delivered_total(),
        session.buffer_state().dropped_count,
        session.buffer_state().depth,
    );

    // Pull the link, let the retry timers bring it back
    session.simulate_disconnect();
    session.run_for(Duration::from_secs(5));
    println!(
        "after outage: connection={:?} replayed_tail={}",
        session.connection_state(),
        session.last_replay().len(),
    );

    // Two writers collide on the shared field
    session.edit_as_writer_a("ship it friday");
    session.edit_as_writer_b("hold for review");
    if let Some(record) = session.conflict_record() {
        println!(
            "conflict on '{}': '{}' vs '{}'",
            record.field, record.value_a, record.value_b
        );
    }
    let merged = session
        .resolve_conflict(Resolution::Merged("ship friday after review".into()))
        .expect("a conflict is open");
    println!("resolved to '{merged}'");

    session.run_for(Duration::from_secs(2));
    session.shutdown();

    let records = sink.records();
    println!(
        "done at t={:?}: {} decision records, {} metric snapshots",
        session.now(),
        records.len(),
        sink.snapshots().len(),
    );
    for record in records.iter().rev().take(5).rev() {
        println!("  [{:>6}ms] {}", record.at.as_millis(), record.explanation);
    }
}
