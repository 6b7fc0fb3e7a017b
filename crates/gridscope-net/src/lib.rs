//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Network connectivity and edge adapters."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! HTTP surface of the topology service: uploads, topology and diagram
//! queries, change and health streams, and Prometheus metrics.
#![warn(missing_docs)]

pub mod error;
pub mod rest;
pub mod sse;

pub use error::ApiError;
pub use rest::{RestApiBuilder, RestApiHandle};
