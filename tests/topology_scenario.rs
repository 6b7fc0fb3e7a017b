//! ---
//! ems_section: "15-testing-qa-runbook"
//! ems_subsection: "integration-tests"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Integration and validation tests for the gridscope stack."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use gridscope_common::AppConfig;
use gridscope_core::TopologyService;
use gridscope_diagram::DiagramError;
use gridscope_model::EquipmentKind;
use gridscope_store::ChangeCause;

const FULL: &str = r#"<network id="scenario">
    <substation id="S1">
        <voltageLevel id="VL1" nominalV="400"><busBreakerTopology><bus id="B1"/></busBreakerTopology></voltageLevel>
        <voltageLevel id="VL2" nominalV="225"><busBreakerTopology><bus id="B2"/></busBreakerTopology></voltageLevel>
    </substation>
    <line id="L1" voltageLevelId1="VL1" bus1="B1" voltageLevelId2="VL2" bus2="B2"/>
</network>"#;

const WITHOUT_VL2: &str = r#"<network id="scenario">
    <substation id="S1">
        <voltageLevel id="VL1" nominalV="400"><busBreakerTopology><bus id="B1"/></busBreakerTopology></voltageLevel>
    </substation>
</network>"#;

fn ids<T>(items: Vec<T>, id: impl Fn(&T) -> &str) -> Vec<String> {
    items.iter().map(|item| id(item).to_owned()).collect()
}

fn service() -> TopologyService {
    TopologyService::from_config(&AppConfig::default(), None).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_level_substation_scenario() {
    let service = service();
    let mut events = service.subscribe();
    let first = service.upload(FULL.as_bytes().to_vec()).await.unwrap();

    assert_eq!(ids(service.substations().unwrap(), |s| &s.id), vec!["S1"]);
    assert_eq!(
        ids(service.voltage_levels_of("S1").unwrap(), |vl| &vl.id),
        vec!["VL1", "VL2"]
    );

    let artifact = service.diagram("VL1").await.unwrap();
    assert_eq!(artifact.network_version, first.version());
    let line = artifact.metadata.element("L1").unwrap();
    assert_eq!(line.kind, EquipmentKind::Line);
    assert_eq!(line.remote_voltage_level_id.as_deref(), Some("VL2"));
    assert!(artifact.svg.contains(&format!("id=\"{}\"", line.svg_id)));

    // Served from cache the second time.
    let again = service.diagram("VL1").await.unwrap();
    assert!(Arc::ptr_eq(&artifact, &again));
    assert_eq!(service.diagram_renders(), 1);

    service.diagram("VL2").await.unwrap();
    assert_eq!(service.diagram_renders(), 2);

    // Readers running while the smaller network replaces the first one only
    // ever see one of the two complete networks.
    let stop = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();
    for _ in 0..4 {
        let service = service.clone();
        let stop = Arc::clone(&stop);
        readers.push(tokio::spawn(async move {
            let mut reads = 0u32;
            loop {
                let network = service.network().unwrap();
                let levels = ids(service.voltage_levels_of("S1").unwrap(), |vl| &vl.id);
                assert!(
                    levels == ["VL1", "VL2"] || levels == ["VL1"],
                    "partial view: {levels:?}"
                );
                let has_line = network.branch("L1").is_some();
                assert_eq!(has_line, network.voltage_level("VL2").is_some());
                reads += 1;
                if stop.load(Ordering::Acquire) {
                    break reads;
                }
                tokio::task::yield_now().await;
            }
        }));
    }
    let uploader = {
        let service = service.clone();
        tokio::spawn(async move { service.upload(WITHOUT_VL2.as_bytes().to_vec()).await })
    };
    let second = uploader.await.unwrap().unwrap();
    stop.store(true, Ordering::Release);
    for reader in futures::future::join_all(readers).await {
        assert!(reader.unwrap() > 0);
    }

    assert!(second.version() > first.version());
    assert_eq!(
        ids(service.voltage_levels_of("S1").unwrap(), |vl| &vl.id),
        vec!["VL1"]
    );
    let err = service.diagram("VL2").await.unwrap_err();
    assert_eq!(err.kind(), "NotFound");
    assert!(matches!(
        err,
        gridscope_core::ServiceError::Diagram(DiagramError::NotFound(ref id)) if id == "VL2"
    ));

    // VL1 exists in both versions and must be rendered afresh.
    let fresh = service.diagram("VL1").await.unwrap();
    assert_eq!(fresh.network_version, second.version());
    assert!(fresh.metadata.element("L1").is_none());
    assert_eq!(service.diagram_renders(), 3);

    let announced: Vec<_> = [events.next().await.unwrap(), events.next().await.unwrap()]
        .into_iter()
        .map(|event| (event.version, event.cause))
        .collect();
    assert_eq!(
        announced,
        vec![
            (first.version(), ChangeCause::Uploaded),
            (second.version(), ChangeCause::Uploaded)
        ]
    );
}

#[tokio::test]
async fn unknown_voltage_level_is_not_found_everywhere() {
    let service = service();
    service.upload(FULL.as_bytes().to_vec()).await.unwrap();

    assert!(service.voltage_levels_of("VL1").unwrap_err().is_not_found());
    assert!(service.equipment_of("S1").unwrap_err().is_not_found());
    assert!(service.diagram("S1").await.unwrap_err().is_not_found());
    assert!(service.diagram_metadata("nope").await.unwrap_err().is_not_found());
    assert_eq!(service.diagram_renders(), 0);
}
