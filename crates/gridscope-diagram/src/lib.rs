//! ---
//! ems_section: "06-diagram-rendering"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Diagram layout, SVG rendering, and artifact caching."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Single-line diagrams per voltage level, the cache that memoizes them per
//! network version, and network area diagrams.

pub mod area;
pub mod artifact;
pub mod cache;
mod draw;
pub mod error;
mod layout;
pub mod metrics;
pub mod renderer;

pub use area::{render_area, AreaDiagram, AreaEdge, AreaMetadata, AreaNode, AreaRequest};
pub use artifact::{
    BoundingBox, DiagramArtifact, DiagramMetadata, Direction, ElementMetadata, Point,
    WireMetadata,
};
pub use cache::{DiagramCache, DEFAULT_CAPACITY};
pub use error::{DiagramError, Result};
pub use metrics::DiagramMetrics;
pub use renderer::{DiagramRenderer, SingleLineRenderer};
