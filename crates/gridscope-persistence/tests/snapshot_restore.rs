//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "tests"
//! ems_type: "test"
//! ems_scope: "code"
//! ems_description: "Snapshot save, verify, and restore against parsed fixtures."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fs;

use gridscope_model::{parse, NetworkDocument};
use gridscope_persistence::{
    load_snapshot, restore_network, save_snapshot, verify_snapshot, PersistenceError,
};
use tempfile::tempdir;

const NODE_BREAKER: &str = include_str!("../../gridscope-model/tests/data/node_breaker.xiidm");
const TWO_LEVELS: &str = include_str!("../../gridscope-model/tests/data/two_levels.xiidm");

#[test]
fn restored_network_matches_parsed_network() {
    let dir = tempdir().unwrap();
    for (name, source) in [("two_levels", TWO_LEVELS), ("node_breaker", NODE_BREAKER)] {
        for extension in ["json", "cbor"] {
            let path = dir.path().join(format!("{name}.{extension}"));
            let network = parse(source.as_bytes()).unwrap();
            save_snapshot(&network, &path).unwrap();
            assert!(verify_snapshot(&path));

            let restored = restore_network(&path).unwrap();
            assert_eq!(restored.document(), network.document(), "{name}.{extension}");
            assert_eq!(restored.element_count(), network.element_count());
            assert!(restored.version() > network.version());
        }
    }
}

#[test]
fn missing_snapshot_is_an_io_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.json");
    assert!(!verify_snapshot(&path));
    assert!(matches!(load_snapshot(&path), Err(PersistenceError::Io(_))));
}

#[test]
fn truncated_snapshot_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("network.json");
    save_snapshot(&parse(TWO_LEVELS.as_bytes()).unwrap(), &path).unwrap();
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

    assert!(!verify_snapshot(&path));
    assert!(matches!(load_snapshot(&path), Err(PersistenceError::Json(_))));
}

#[test]
fn snapshot_with_broken_references_fails_rebuild() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("network.json");
    save_snapshot(&parse(TWO_LEVELS.as_bytes()).unwrap(), &path).unwrap();

    // Rewrite the payload consistently (hash included) but drop VL2, which L1 references.
    let mut envelope: serde_json::Value =
        serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    let mut document: NetworkDocument =
        serde_json::from_value(envelope["network"].take()).unwrap();
    document.substations[0]
        .voltage_levels
        .retain(|level| level.id != "VL2");
    envelope["hash"] = serde_json::json!(sha256_hex(&serde_json::to_vec(&document).unwrap()));
    envelope["network"] = serde_json::to_value(&document).unwrap();
    fs::write(&path, serde_json::to_vec(&envelope).unwrap()).unwrap();

    assert!(verify_snapshot(&path));
    assert!(matches!(
        restore_network(&path),
        Err(PersistenceError::Model(_))
    ));
}

fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(bytes))
}
