//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Primary orchestration and lifecycle management."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Topology service facade: upload → parse → replace → notify, with diagram
//! lookups through the cache and snapshots written in the background.

pub mod error;
pub mod integration_persistence;
pub mod service;

pub use error::{ServiceError, ServiceResult};
pub use integration_persistence::{restore_snapshot, SnapshotWriter};
pub use service::TopologyService;
