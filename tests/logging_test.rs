//! Diagnostics file routing
//!
//! Kept in its own test binary since it installs the global subscriber.

use serde_json::json;

use kiosk_ingest::config::RuntimeConfig;
use kiosk_ingest::logging::{
    init_tracing, RejectSink, Rejection, TracingRejectSink, DIAGNOSTICS_TARGET,
};

#[test]
fn test_diagnostics_written_to_file() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("diagnostics.log");

    let runtime = RuntimeConfig {
        log_level: "info".to_string(),
        environment: "development".to_string(),
    };
    init_tracing(&runtime, Some(path.as_path())).expect("Failed to init tracing");

    TracingRejectSink.reject(&Rejection::new(
        json!({"site": "9", "val": 2, "invalid": ["invalid site"]}),
        vec!["invalid site".to_string()],
    ));
    tracing::info!(target: DIAGNOSTICS_TARGET, partition = 0, "Reached end of partition");
    tracing::info!("Regular log line");

    let contents = std::fs::read_to_string(&path).expect("Diagnostics file should exist");

    assert!(contents.contains("Rejected interaction"));
    assert!(contents.contains("invalid site"));
    assert!(contents.contains("Reached end of partition"));
    assert!(!contents.contains("Regular log line"));
}
