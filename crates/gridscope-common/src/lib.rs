//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the topology service."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Shared primitives for the gridscope workspace: configuration loading and
//! tracing initialisation consumed by the daemon and its tests.

pub mod config;
pub mod logging;

pub use config::{
    ApiConfig, AppConfig, DiagramConfig, LoadedAppConfig, LoggingConfig, MetricsConfig,
    NotifierConfig, SnapshotConfig,
};
pub use logging::{init_tracing, LogFormat};
