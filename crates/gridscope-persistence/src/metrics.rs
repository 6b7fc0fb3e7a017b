//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Persistence abstractions and storage bindings."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;

use prometheus::{self, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

use crate::Result;

/// Metrics published by the persistence subsystem.
#[derive(Clone)]
pub struct PersistenceMetrics {
    snapshots_saved: IntCounterVec,
    snapshots_failed: IntCounterVec,
    snapshot_bytes: IntCounterVec,
    write_duration: HistogramVec,
    restores: IntCounter,
}

impl PersistenceMetrics {
    /// Register all persistence metrics with the provided registry.
    pub fn new(registry: Arc<Registry>) -> Result<Self> {
        let snapshots_saved = IntCounterVec::new(
            Opts::new(
                "gridscope_snapshots_saved_total",
                "Total number of network snapshots successfully persisted",
            ),
            &["network_id"],
        )?;
        registry.register(Box::new(snapshots_saved.clone()))?;

        let snapshots_failed = IntCounterVec::new(
            Opts::new(
                "gridscope_snapshots_failed_total",
                "Total number of network snapshot persist operations that failed",
            ),
            &["network_id"],
        )?;
        registry.register(Box::new(snapshots_failed.clone()))?;

        let snapshot_bytes = IntCounterVec::new(
            Opts::new(
                "gridscope_snapshot_bytes_total",
                "Total bytes written to network snapshot files",
            ),
            &["network_id"],
        )?;
        registry.register(Box::new(snapshot_bytes.clone()))?;

        let histogram_opts = HistogramOpts::new(
            "gridscope_snapshot_write_duration_seconds",
            "Duration spent encoding and writing a network snapshot",
        )
        .buckets(prometheus::exponential_buckets(0.001, 2.0, 12)?);
        let write_duration = HistogramVec::new(histogram_opts, &["network_id"])?;
        registry.register(Box::new(write_duration.clone()))?;

        let restores = IntCounter::new(
            "gridscope_snapshot_restores_total",
            "Total number of networks restored from a snapshot",
        )?;
        registry.register(Box::new(restores.clone()))?;

        Ok(Self {
            snapshots_saved,
            snapshots_failed,
            snapshot_bytes,
            write_duration,
            restores,
        })
    }

    /// Record a successful snapshot of `network_id`.
    pub fn record_snapshot_saved(&self, network_id: &str, bytes: usize, seconds: f64) {
        self.snapshots_saved.with_label_values(&[network_id]).inc();
        self.snapshot_bytes
            .with_label_values(&[network_id])
            .inc_by(bytes as u64);
        self.write_duration
            .with_label_values(&[network_id])
            .observe(seconds);
    }

    /// Record a failed snapshot persist attempt.
    pub fn record_snapshot_failed(&self, network_id: &str) {
        self.snapshots_failed.with_label_values(&[network_id]).inc();
    }

    /// Record a network restored on start.
    pub fn record_restore(&self) {
        self.restores.inc();
    }
}

impl std::fmt::Debug for PersistenceMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_exported() {
        let registry = Arc::new(Registry::new());
        let metrics = PersistenceMetrics::new(Arc::clone(&registry)).unwrap();
        metrics.record_snapshot_saved("grid", 128, 0.002);
        metrics.record_snapshot_failed("grid");
        metrics.record_restore();

        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_owned())
            .collect();
        for expected in [
            "gridscope_snapshots_saved_total",
            "gridscope_snapshots_failed_total",
            "gridscope_snapshot_bytes_total",
            "gridscope_snapshot_write_duration_seconds",
            "gridscope_snapshot_restores_total",
        ] {
            assert!(names.iter().any(|name| name == expected), "{expected}");
        }
    }

    #[test]
    fn double_registration_is_an_error() {
        let registry = Arc::new(Registry::new());
        PersistenceMetrics::new(Arc::clone(&registry)).unwrap();
        assert!(PersistenceMetrics::new(registry).is_err());
    }
}
