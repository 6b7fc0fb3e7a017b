//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Primary orchestration and lifecycle management."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Instant;

use gridscope_common::AppConfig;
use gridscope_diagram::{
    render_area, AreaDiagram, AreaRequest, DiagramArtifact, DiagramCache, DiagramMetadata,
    DiagramMetrics, DiagramRenderer, SingleLineRenderer,
};
use gridscope_model::{parse, Network};
use gridscope_store::{
    equipment_of, list_substations, list_voltage_levels, voltage_levels_of, ChangeNotifier,
    EquipmentSummary, Subscription, SubstationSummary, TopologyStore, VoltageLevelSummary,
};
use prometheus::Registry;
use tracing::{info, warn};

use crate::error::ServiceResult;

/// Entry point used by the transport for every topology operation.
#[derive(Clone)]
pub struct TopologyService {
    store: Arc<TopologyStore>,
    diagrams: Arc<DiagramCache>,
}

impl TopologyService {
    pub fn new(store: Arc<TopologyStore>, diagrams: Arc<DiagramCache>) -> Self {
        Self { store, diagrams }
    }

    /// Build a service from configuration, registering diagram metrics when a
    /// registry is supplied.
    pub fn from_config(
        config: &AppConfig,
        registry: Option<Arc<Registry>>,
    ) -> anyhow::Result<Self> {
        let renderer: Arc<dyn DiagramRenderer> = Arc::new(SingleLineRenderer);
        Self::with_renderer(config, registry, renderer)
    }

    pub fn with_renderer(
        config: &AppConfig,
        registry: Option<Arc<Registry>>,
        renderer: Arc<dyn DiagramRenderer>,
    ) -> anyhow::Result<Self> {
        let store = Arc::new(TopologyStore::new(ChangeNotifier::new(
            config.notifier.capacity,
        )));
        let mut cache = DiagramCache::new(Arc::clone(&store), renderer)
            .with_capacity(config.diagram.cache_capacity);
        if let Some(registry) = registry {
            cache = cache.with_metrics(DiagramMetrics::new(registry)?);
        }
        Ok(Self::new(store, Arc::new(cache)))
    }

    pub fn store(&self) -> &Arc<TopologyStore> {
        &self.store
    }

    /// Parse `document` off the async runtime and make it the current network.
    ///
    /// A rejected document leaves the current network untouched.
    pub async fn upload(&self, document: Vec<u8>) -> ServiceResult<Arc<Network>> {
        let started = Instant::now();
        let bytes = document.len();
        let parsed = tokio::task::spawn_blocking(move || parse(&document)).await?;
        let network = match parsed {
            Ok(network) => network,
            Err(err) => {
                warn!(bytes, error = %err, kind = err.kind(), "upload rejected");
                return Err(err.into());
            }
        };
        let network = self.store.replace(network);
        info!(
            network_id = %network.id(),
            version = %network.version(),
            elements = network.element_count(),
            bytes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "network uploaded"
        );
        Ok(network)
    }

    pub fn network(&self) -> ServiceResult<Arc<Network>> {
        Ok(self.store.current()?)
    }

    pub fn substations(&self) -> ServiceResult<Vec<SubstationSummary>> {
        Ok(list_substations(&*self.network()?))
    }

    pub fn voltage_levels(&self) -> ServiceResult<Vec<VoltageLevelSummary>> {
        Ok(list_voltage_levels(&*self.network()?))
    }

    pub fn voltage_levels_of(&self, substation_id: &str) -> ServiceResult<Vec<VoltageLevelSummary>> {
        Ok(voltage_levels_of(&*self.network()?, substation_id)?)
    }

    pub fn equipment_of(&self, voltage_level_id: &str) -> ServiceResult<Vec<EquipmentSummary>> {
        Ok(equipment_of(&*self.network()?, voltage_level_id)?)
    }

    /// Single-line diagram of a voltage level, from the cache when possible.
    pub async fn diagram(&self, voltage_level_id: &str) -> ServiceResult<Arc<DiagramArtifact>> {
        Ok(self.diagrams.get_or_render(voltage_level_id).await?)
    }

    pub async fn diagram_metadata(&self, voltage_level_id: &str) -> ServiceResult<DiagramMetadata> {
        let artifact = self.diagram(voltage_level_id).await?;
        Ok(artifact.metadata.clone())
    }

    /// Area diagram for `request`. Rendered on every call.
    pub async fn area(&self, request: AreaRequest) -> ServiceResult<AreaDiagram> {
        let network = self.network()?;
        let diagram =
            tokio::task::spawn_blocking(move || render_area(&network, &request)).await??;
        Ok(diagram)
    }

    pub fn subscribe(&self) -> Subscription {
        self.store.subscribe()
    }

    pub fn diagram_renders(&self) -> u64 {
        self.diagrams.render_count()
    }
}

impl std::fmt::Debug for TopologyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopologyService")
            .field("version", &self.store.current_version())
            .finish_non_exhaustive()
    }
}
