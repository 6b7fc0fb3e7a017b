//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Primary orchestration and lifecycle management."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use gridscope_model::Network;
use gridscope_persistence::{restore_network, save_snapshot, PersistenceMetrics};
use gridscope_store::{ChangeCause, TopologyStore};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::ServiceResult;

/// Rebuild the network stored at `path` and install it as the current one.
///
/// Returns `Ok(None)` when no snapshot exists yet.
pub async fn restore_snapshot(
    store: &TopologyStore,
    path: &Path,
    metrics: Option<&PersistenceMetrics>,
) -> ServiceResult<Option<Arc<Network>>> {
    if !path.exists() {
        debug!(path = %path.display(), "no snapshot to restore");
        return Ok(None);
    }
    let started = Instant::now();
    let source = path.to_path_buf();
    let network = tokio::task::spawn_blocking(move || restore_network(&source)).await??;
    let network = store.restore(network);
    if let Some(metrics) = metrics {
        metrics.record_restore();
    }
    info!(
        path = %path.display(),
        network_id = %network.id(),
        version = %network.version(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "network restored from snapshot"
    );
    Ok(Some(network))
}

/// Background task persisting the current network after every upload.
///
/// The snapshot always reflects the store at write time, so events missed by a
/// lagging writer only cost skipped intermediate writes.
#[derive(Debug)]
pub struct SnapshotWriter {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SnapshotWriter {
    /// Subscribe to `store` and start writing snapshots to `path`.
    ///
    /// Must be called before the first replace that should be persisted.
    pub fn spawn(
        store: Arc<TopologyStore>,
        path: PathBuf,
        metrics: Option<Arc<PersistenceMetrics>>,
    ) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let mut events = store.subscribe();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        debug!("snapshot writer shutdown");
                        break;
                    }
                    event = events.next() => {
                        let Some(event) = event else {
                            break;
                        };
                        if event.cause == ChangeCause::Restored {
                            debug!(version = %event.version, "restored network already on disk");
                            continue;
                        }
                        persist_current(&store, &path, metrics.as_deref()).await;
                    }
                }
            }
        });
        Self { shutdown, task }
    }

    /// Stop the writer after any write in progress completes.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            error!(error = %err, "snapshot writer join error");
        }
    }
}

async fn persist_current(store: &TopologyStore, path: &Path, metrics: Option<&PersistenceMetrics>) {
    let network = match store.current() {
        Ok(network) => network,
        Err(err) => {
            warn!(error = %err, "change event without a current network");
            return;
        }
    };
    let network_id = network.id().to_owned();
    let target = path.to_path_buf();
    let started = Instant::now();
    let written = tokio::task::spawn_blocking(move || save_snapshot(&network, &target)).await;
    match written {
        Ok(Ok(info)) => {
            if let Some(metrics) = metrics {
                metrics.record_snapshot_saved(
                    &network_id,
                    info.bytes,
                    started.elapsed().as_secs_f64(),
                );
            }
            debug!(network_id = %network_id, path = %info.path.display(), "snapshot saved");
        }
        Ok(Err(err)) => {
            if let Some(metrics) = metrics {
                metrics.record_snapshot_failed(&network_id);
            }
            warn!(network_id = %network_id, path = %path.display(), error = %err, "failed to persist snapshot");
        }
        Err(err) => {
            if let Some(metrics) = metrics {
                metrics.record_snapshot_failed(&network_id);
            }
            error!(network_id = %network_id, error = %err, "snapshot task panicked");
        }
    }
}
