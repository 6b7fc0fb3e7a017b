//! ---
//! ems_section: "15-testing-qa-runbook"
//! ems_subsection: "integration-tests"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Configuration discovery tests."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::path::PathBuf;

use gridscope_common::config::AppConfig;
use tempfile::tempdir;

#[test]
fn first_existing_candidate_wins() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing.toml");
    let present = dir.path().join("gridscope.toml");
    fs::write(&present, "[diagram]\ncache_capacity = 8\n").unwrap();

    let loaded = AppConfig::load_with_source(&[missing, present.clone()]).unwrap();
    assert_eq!(loaded.source, Some(present));
    assert_eq!(loaded.config.diagram.cache_capacity, 8);
}

#[test]
fn defaults_apply_when_no_candidate_exists() {
    let dir = tempdir().unwrap();
    let loaded = AppConfig::load_with_source(&[dir.path().join("nope.toml")]).unwrap();
    assert!(loaded.source.is_none());
    assert_eq!(
        loaded.config.snapshot.path,
        PathBuf::from("target/snapshots/network.json")
    );
}

#[test]
fn invalid_candidate_is_reported() {
    let dir = tempdir().unwrap();
    let broken = dir.path().join("broken.toml");
    fs::write(&broken, "[api\nlisten = ").unwrap();
    let err = AppConfig::load_with_source(&[broken]).unwrap_err();
    assert!(err.to_string().contains("failed to parse config file"));
}
