//! ---
//! ems_section: "06-diagram-rendering"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Diagram layout, SVG rendering, and artifact caching."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use gridscope_store::StoreError;

/// Result alias used throughout the diagram crate.
pub type Result<T> = std::result::Result<T, DiagramError>;

/// Failures while producing a diagram.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiagramError {
    #[error("no network loaded")]
    NoNetworkLoaded,
    #[error("voltage level '{0}' not found")]
    NotFound(String),
    /// The layout could not be computed for this voltage level.
    #[error("layout failed: {0}")]
    Layout(String),
    /// The render task panicked or was cancelled.
    #[error("render task failed: {0}")]
    Task(String),
}

impl DiagramError {
    pub fn kind(&self) -> &'static str {
        match self {
            DiagramError::NoNetworkLoaded => "NoNetworkLoaded",
            DiagramError::NotFound(_) => "NotFound",
            DiagramError::Layout(_) => "Layout",
            DiagramError::Task(_) => "Task",
        }
    }
}

impl From<StoreError> for DiagramError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NoNetworkLoaded => DiagramError::NoNetworkLoaded,
            StoreError::NotFound { id, .. } => DiagramError::NotFound(id),
        }
    }
}

impl From<tokio::task::JoinError> for DiagramError {
    fn from(err: tokio::task::JoinError) -> Self {
        DiagramError::Task(err.to_string())
    }
}
