//! ---
//! ems_section: "06-diagram-rendering"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Diagram layout, SVG rendering, and artifact caching."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use gridscope_model::VersionToken;
use gridscope_store::TopologyStore;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::artifact::DiagramArtifact;
use crate::error::{DiagramError, Result};
use crate::metrics::DiagramMetrics;
use crate::renderer::DiagramRenderer;

/// Default bound on stored artifacts.
pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    version: VersionToken,
    voltage_level_id: String,
}

type Slot = Arc<OnceCell<Arc<DiagramArtifact>>>;

#[derive(Default)]
struct Entries {
    /// Version whose entries are live; everything else is stale.
    version: Option<VersionToken>,
    slots: HashMap<CacheKey, Slot>,
    /// Insertion order, used for capacity eviction.
    order: VecDeque<CacheKey>,
}

impl Entries {
    fn prune_stale(&mut self, current: VersionToken) -> usize {
        if self.version == Some(current) {
            return 0;
        }
        self.version = Some(current);
        let before = self.slots.len();
        self.slots.retain(|key, _| key.version == current);
        self.order.retain(|key| key.version == current);
        before - self.slots.len()
    }

    /// Drop the oldest ready entry other than `keep` until within `capacity`.
    /// Entries still rendering are kept so their waiters stay coalesced.
    fn enforce_capacity(&mut self, capacity: usize, keep: &CacheKey) {
        while self.slots.len() > capacity {
            let victim = self.order.iter().position(|key| {
                key != keep
                    && self
                        .slots
                        .get(key)
                        .map_or(true, |slot| slot.initialized())
            });
            let Some(position) = victim else {
                break;
            };
            if let Some(key) = self.order.remove(position) {
                self.slots.remove(&key);
            }
        }
    }
}

/// Memoizes rendered diagrams keyed by (network version, voltage level).
///
/// Concurrent requests for one key share a single render. Entries of older
/// network versions are never returned and are dropped on the first lookup
/// after the store moves on. A failed render leaves the key empty so the
/// next request retries.
pub struct DiagramCache {
    store: Arc<TopologyStore>,
    renderer: Arc<dyn DiagramRenderer>,
    entries: Mutex<Entries>,
    capacity: usize,
    renders: AtomicU64,
    metrics: Option<DiagramMetrics>,
}

impl DiagramCache {
    pub fn new(store: Arc<TopologyStore>, renderer: Arc<dyn DiagramRenderer>) -> Self {
        Self {
            store,
            renderer,
            entries: Mutex::new(Entries::default()),
            capacity: DEFAULT_CAPACITY,
            renders: AtomicU64::new(0),
            metrics: None,
        }
    }

    /// Bound the number of stored artifacts (at least one).
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn with_metrics(mut self, metrics: DiagramMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Artifact for `voltage_level_id` in the current network, rendering it on a miss.
    ///
    /// The network snapshot is taken once at the start; a replace that lands
    /// while the render runs does not affect this call.
    pub async fn get_or_render(&self, voltage_level_id: &str) -> Result<Arc<DiagramArtifact>> {
        let network = self.store.current()?;
        if network.voltage_level(voltage_level_id).is_none() {
            return Err(DiagramError::NotFound(voltage_level_id.to_owned()));
        }
        let key = CacheKey {
            version: network.version(),
            voltage_level_id: voltage_level_id.to_owned(),
        };

        let slot = {
            let mut entries = self.entries.lock();
            // A snapshot that is already outdated renders without being stored.
            if self.store.current_version() == Some(key.version) {
                let pruned = entries.prune_stale(key.version);
                if pruned > 0 {
                    debug!(pruned, version = %key.version, "dropped stale diagram entries");
                }
            }
            match entries.slots.get(&key) {
                Some(slot) => Arc::clone(slot),
                None => {
                    let slot: Slot = Arc::new(OnceCell::new());
                    if entries.version == Some(key.version) {
                        entries.slots.insert(key.clone(), Arc::clone(&slot));
                        entries.order.push_back(key.clone());
                        entries.enforce_capacity(self.capacity, &key);
                    }
                    slot
                }
            }
        };

        if let Some(artifact) = slot.get() {
            if let Some(metrics) = &self.metrics {
                metrics.record_hit();
            }
            return Ok(Arc::clone(artifact));
        }

        let mut rendered_here = false;
        let flag = &mut rendered_here;
        let renderer = Arc::clone(&self.renderer);
        let renders = &self.renders;
        let metrics = self.metrics.as_ref();
        let level_id = key.voltage_level_id.clone();
        let outcome = slot
            .get_or_try_init(move || async move {
                *flag = true;
                renders.fetch_add(1, Ordering::Relaxed);
                if let Some(metrics) = metrics {
                    metrics.record_miss();
                }
                let started = Instant::now();
                let rendered = tokio::task::spawn_blocking(move || {
                    renderer.render(&network, &level_id).map(Arc::new)
                })
                .await
                .map_err(DiagramError::from)
                .and_then(|result| result);
                let elapsed = started.elapsed();
                match &rendered {
                    Ok(artifact) => {
                        if let Some(metrics) = metrics {
                            metrics.record_render("single_line", elapsed.as_secs_f64());
                        }
                        debug!(
                            voltage_level = %artifact.voltage_level_id,
                            version = %artifact.network_version,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "diagram cached"
                        );
                    }
                    Err(err) => {
                        if let Some(metrics) = metrics {
                            metrics.record_render_failed("single_line");
                        }
                        warn!(error = %err, "diagram render failed");
                    }
                }
                rendered
            })
            .await
            .map(Arc::clone);

        if !rendered_here && outcome.is_ok() {
            if let Some(metrics) = &self.metrics {
                metrics.record_coalesced();
            }
        }
        outcome
    }

    /// Number of renders started since creation.
    pub fn render_count(&self) -> u64 {
        self.renders.load(Ordering::Relaxed)
    }

    /// Number of stored entries, ready or in flight.
    pub fn len(&self) -> usize {
        self.entries.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
