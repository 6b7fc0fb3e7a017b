//! ---
//! ems_section: "06-diagram-rendering"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Diagram layout, SVG rendering, and artifact caching."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;

use prometheus::{self, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

/// Metrics published by the diagram pipeline.
#[derive(Clone)]
pub struct DiagramMetrics {
    renders: IntCounterVec,
    render_failures: IntCounterVec,
    render_duration: HistogramVec,
    cache_hits: IntCounter,
    cache_misses: IntCounter,
    coalesced_waits: IntCounter,
}

impl DiagramMetrics {
    /// Register all diagram metrics with the provided registry.
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        let renders = IntCounterVec::new(
            Opts::new("gridscope_diagram_renders_total", "Diagrams rendered"),
            &["diagram"],
        )?;
        registry.register(Box::new(renders.clone()))?;

        let render_failures = IntCounterVec::new(
            Opts::new(
                "gridscope_diagram_render_failures_total",
                "Diagram renders that returned an error",
            ),
            &["diagram"],
        )?;
        registry.register(Box::new(render_failures.clone()))?;

        let histogram_opts = HistogramOpts::new(
            "gridscope_diagram_render_duration_seconds",
            "Wall time spent rendering one diagram",
        )
        .buckets(prometheus::exponential_buckets(0.0005, 2.0, 14)?);
        let render_duration = HistogramVec::new(histogram_opts, &["diagram"])?;
        registry.register(Box::new(render_duration.clone()))?;

        let cache_hits = IntCounter::new(
            "gridscope_diagram_cache_hits_total",
            "Diagram requests served from a ready cache entry",
        )?;
        registry.register(Box::new(cache_hits.clone()))?;

        let cache_misses = IntCounter::new(
            "gridscope_diagram_cache_misses_total",
            "Diagram requests that started a render",
        )?;
        registry.register(Box::new(cache_misses.clone()))?;

        let coalesced_waits = IntCounter::new(
            "gridscope_diagram_cache_coalesced_total",
            "Diagram requests that waited on a render started by another request",
        )?;
        registry.register(Box::new(coalesced_waits.clone()))?;

        Ok(Self {
            renders,
            render_failures,
            render_duration,
            cache_hits,
            cache_misses,
            coalesced_waits,
        })
    }

    pub fn record_render(&self, diagram: &str, seconds: f64) {
        self.renders.with_label_values(&[diagram]).inc();
        self.render_duration
            .with_label_values(&[diagram])
            .observe(seconds);
    }

    pub fn record_render_failed(&self, diagram: &str) {
        self.render_failures.with_label_values(&[diagram]).inc();
    }

    pub fn record_hit(&self) {
        self.cache_hits.inc();
    }

    pub fn record_miss(&self) {
        self.cache_misses.inc();
    }

    pub fn record_coalesced(&self) {
        self.coalesced_waits.inc();
    }
}

impl std::fmt::Debug for DiagramMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagramMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_appear_in_the_registry() {
        let registry = Arc::new(Registry::new());
        let metrics = DiagramMetrics::new(Arc::clone(&registry)).unwrap();
        metrics.record_render("single_line", 0.01);
        metrics.record_hit();

        let names: Vec<_> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_owned())
            .collect();
        assert!(names.contains(&"gridscope_diagram_renders_total".to_owned()));
        assert!(names.contains(&"gridscope_diagram_cache_hits_total".to_owned()));
    }

    #[test]
    fn double_registration_fails() {
        let registry = Arc::new(Registry::new());
        DiagramMetrics::new(Arc::clone(&registry)).unwrap();
        assert!(DiagramMetrics::new(registry).is_err());
    }
}
