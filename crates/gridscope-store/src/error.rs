//! ---
//! ems_section: "04-topology-store"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Active network slot, change fan-out, and query views."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---

/// Result alias used throughout the store crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Failures of store reads and query lookups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No network has been uploaded or restored yet.
    #[error("no network loaded")]
    NoNetworkLoaded,
    /// The id is absent from the current network.
    #[error("{what} '{id}' not found")]
    NotFound { what: &'static str, id: String },
}

impl StoreError {
    pub(crate) fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            id: id.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::NoNetworkLoaded => "NoNetworkLoaded",
            StoreError::NotFound { .. } => "NotFound",
        }
    }
}
