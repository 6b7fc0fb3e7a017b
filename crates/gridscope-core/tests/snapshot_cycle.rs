//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "tests"
//! ems_type: "test"
//! ems_scope: "code"
//! ems_description: "Upload, background snapshot, and restore into a fresh service."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use gridscope_common::AppConfig;
use gridscope_core::{restore_snapshot, SnapshotWriter, TopologyService};
use gridscope_persistence::{verify_snapshot, PersistenceMetrics};
use gridscope_store::ChangeCause;
use prometheus::Registry;
use tempfile::tempdir;

const TWO_LEVELS: &str = include_str!("../../gridscope-model/tests/data/two_levels.xiidm");

async fn wait_for(path: &std::path::Path) {
    for _ in 0..100 {
        if verify_snapshot(path) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("snapshot {} never appeared", path.display());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn uploaded_network_survives_a_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("network.json");
    let registry = Arc::new(Registry::new());
    let metrics = Arc::new(PersistenceMetrics::new(Arc::clone(&registry)).unwrap());

    let first = TopologyService::from_config(&AppConfig::default(), None).unwrap();
    let writer = SnapshotWriter::spawn(
        Arc::clone(first.store()),
        path.clone(),
        Some(Arc::clone(&metrics)),
    );
    let uploaded = first.upload(TWO_LEVELS.as_bytes().to_vec()).await.unwrap();
    wait_for(&path).await;
    writer.shutdown().await;

    let second = TopologyService::from_config(&AppConfig::default(), None).unwrap();
    let mut events = second.subscribe();
    let restored = restore_snapshot(second.store(), &path, Some(&metrics))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(restored.document(), uploaded.document());
    assert!(restored.version() > uploaded.version());
    let event = events.next().await.unwrap();
    assert_eq!(event.cause, ChangeCause::Restored);
    assert_eq!(event.version, restored.version());

    let ids: Vec<_> = second
        .voltage_levels_of("S1")
        .unwrap()
        .into_iter()
        .map(|vl| vl.id)
        .collect();
    assert_eq!(ids, vec!["VL1", "VL2"]);
}

#[tokio::test]
async fn missing_snapshot_restores_nothing() {
    let dir = tempdir().unwrap();
    let service = TopologyService::from_config(&AppConfig::default(), None).unwrap();
    let restored = restore_snapshot(service.store(), &dir.path().join("absent.cbor"), None)
        .await
        .unwrap();
    assert!(restored.is_none());
    assert!(service.network().is_err());
}

#[tokio::test]
async fn corrupt_snapshot_is_reported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("network.json");
    std::fs::write(&path, b"{\"version\":1").unwrap();
    let service = TopologyService::from_config(&AppConfig::default(), None).unwrap();
    let err = restore_snapshot(service.store(), &path, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "Persistence");
    assert!(service.network().is_err());
}
