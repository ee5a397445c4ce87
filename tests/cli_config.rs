//! CLI Configuration Tests
//!
//! Config and fixture files as read by the command-line tool:
//! - Defaults for omitted fields
//! - Validation failures carry the config error code
//! - Fixtures deploy streams, rules, templates and macros

use std::fs;

use sensorgate::cli::{CliErrorCode, Config, Fixture};
use sensorgate::observability::Severity;
use sensorgate::planner::{PlannerConfig, QueryRequest};
use sensorgate::policy::Resolution;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

// =============================================================================
// Config Files
// =============================================================================

#[test]
fn test_empty_config_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let config = Config::load(&write(&dir, "sg.json", "{}")).unwrap();

    assert_eq!(config.planner, PlannerConfig::default());
    assert_eq!(config.planner.max_window_secs, 604_800);
    assert_eq!(config.planner.store_call_timeout_ms, 30_000);
    assert_eq!(config.log_severity().unwrap(), Severity::Warn);
}

#[test]
fn test_partial_config() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "sg.json",
        r#"{"planner": {"max_window_secs": 3600, "default_limit": 100}, "log_level": "TRACE"}"#,
    );
    let config = Config::load(&path).unwrap();

    assert_eq!(config.planner.max_window_secs, 3600);
    assert_eq!(config.planner.store_call_timeout_ms, 30_000);
    assert_eq!(config.planner.effective_limit(None), Some(100));
    assert_eq!(config.log_severity().unwrap(), Severity::Trace);
}

#[test]
fn test_invalid_configs() {
    let dir = TempDir::new().unwrap();
    for (name, content) in [
        ("zero_window.json", r#"{"planner": {"max_window_secs": 0}}"#),
        ("zero_timeout.json", r#"{"planner": {"store_call_timeout_ms": 0}}"#),
        ("bad_level.json", r#"{"log_level": "loud"}"#),
        ("not_json.json", "max_window_secs = 10"),
    ] {
        let err = Config::load(&write(&dir, name, content)).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError, "{}", name);
    }
}

#[test]
fn test_missing_config_file() {
    let dir = TempDir::new().unwrap();
    let err = Config::load(&dir.path().join("absent.json")).unwrap_err();
    assert_eq!(err.code_str(), "SG_CLI_CONFIG_ERROR");
}

// =============================================================================
// Fixture Files
// =============================================================================

const FIXTURE: &str = r#"{
    "streams": [
        {
            "owner": "alice",
            "name": "env",
            "channels": [{"name": "temp", "type": "float"}, {"name": "place", "type": "text"}],
            "tuples": [
                ["2013-03-04 10:00:00", 20, "home"],
                ["2013-03-04 10:30:00", 27, "office"],
                [1362394800, 23, "home"]
            ]
        }
    ],
    "rules": [
        {"owner": "alice", "template_name": "where", "target_users": ["bob"],
         "condition": "place = '$(PLACE)'", "action": "allow"}
    ],
    "instantiations": [
        {"owner": "alice", "template_name": "where", "priority": 1,
         "parameters": {"PLACE": "home"}}
    ],
    "macros": [
        {"owner": "alice", "name": "WARM", "value": "temp > 21"}
    ]
}"#;

#[tokio::test]
async fn test_fixture_deploys() {
    let dir = TempDir::new().unwrap();
    let fixture = Fixture::load(&write(&dir, "fixture.json", FIXTURE)).unwrap();
    let gate = fixture.deploy(PlannerConfig::default()).await.unwrap();

    let decision = gate.resolve_access("alice", "env", "bob").await.unwrap();
    assert_eq!(decision.resolution, Resolution::Allow("( place = 'home' )".into()));

    let rows = gate
        .read(QueryRequest::new("bob", "alice", "env").with_filter("$(WARM)"))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].values[0].as_f64(), Some(23.0));
}

#[tokio::test]
async fn test_fixture_with_bad_rule() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "fixture.json",
        r#"{"rules": [{"owner": "alice", "action": "maybe"}]}"#,
    );
    let err = Fixture::load(&path)
        .unwrap()
        .deploy(PlannerConfig::default())
        .await
        .err()
        .unwrap();
    assert_eq!(err.code(), &CliErrorCode::FixtureError);
}
