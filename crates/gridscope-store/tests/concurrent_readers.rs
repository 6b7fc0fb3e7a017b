//! ---
//! ems_section: "04-topology-store"
//! ems_subsection: "tests"
//! ems_type: "test"
//! ems_scope: "code"
//! ems_description: "Replace/read linearizability under concurrent readers."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use gridscope_model::parse;
use gridscope_store::{list_voltage_levels, ChangeNotifier, TopologyStore};

fn document(id: &str, levels: usize) -> String {
    let mut xml = format!(r#"<network id="{id}"><substation id="S">"#);
    for n in 0..levels {
        xml.push_str(&format!(
            r#"<voltageLevel id="VL{n}" nominalV="20"><busBreakerTopology><bus id="B{n}"/></busBreakerTopology></voltageLevel>"#
        ));
    }
    xml.push_str("</substation></network>");
    xml
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_observe_a_half_swapped_network() {
    let store = Arc::new(TopologyStore::new(ChangeNotifier::new(8)));
    store.replace(parse(document("small", 1).as_bytes()).unwrap());
    let done = Arc::new(AtomicBool::new(false));

    let mut readers = Vec::new();
    for _ in 0..4 {
        let store = Arc::clone(&store);
        let done = Arc::clone(&done);
        readers.push(tokio::spawn(async move {
            let mut last_seen = 0;
            let mut reads = 0u64;
            loop {
                let before = store.current_version().unwrap();
                let network = store.current().unwrap();
                assert!(network.version() >= before);
                assert!(network.version().get() >= last_seen);
                last_seen = network.version().get();

                let expected = if network.id() == "small" { 1 } else { 3 };
                assert_eq!(list_voltage_levels(&network).len(), expected);
                reads += 1;
                if done.load(Ordering::Relaxed) {
                    break reads;
                }
                tokio::task::yield_now().await;
            }
        }));
    }

    for round in 0..200 {
        let (id, levels) = if round % 2 == 0 { ("large", 3) } else { ("small", 1) };
        let network = parse(document(id, levels).as_bytes()).unwrap();
        let version = network.version();
        let installed = store.replace(network);
        assert_eq!(installed.version(), version);
        tokio::task::yield_now().await;
    }
    done.store(true, Ordering::Relaxed);

    for reader in readers {
        assert!(reader.await.unwrap() > 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn replace_then_current_returns_the_same_network() {
    let store = TopologyStore::default();
    for _ in 0..20 {
        let network = parse(document("n", 2).as_bytes()).unwrap();
        let installed = store.replace(network);
        let current = store.current().unwrap();
        assert!(Arc::ptr_eq(&installed, &current));
        assert_eq!(store.current_version(), Some(current.version()));
    }
}

#[tokio::test]
async fn every_replace_publishes_exactly_one_event() {
    let store = TopologyStore::default();
    let mut subscription = store.subscribe();
    let mut versions = Vec::new();
    for _ in 0..3 {
        versions.push(store.replace(parse(document("n", 1).as_bytes()).unwrap()).version());
    }
    for expected in versions {
        assert_eq!(subscription.next().await.unwrap().version, expected);
    }
}
