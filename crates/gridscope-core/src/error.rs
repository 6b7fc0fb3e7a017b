//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Primary orchestration and lifecycle management."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use gridscope_diagram::DiagramError;
use gridscope_model::ModelError;
use gridscope_persistence::PersistenceError;
use gridscope_store::StoreError;
use thiserror::Error;

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Every failure a service operation can surface to the transport.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Diagram(#[from] DiagramError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("background task failed: {0}")]
    Task(String),
}

impl ServiceError {
    /// Stable name of the underlying error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Model(err) => err.kind(),
            ServiceError::Store(err) => err.kind(),
            ServiceError::Diagram(err) => err.kind(),
            ServiceError::Persistence(_) => "Persistence",
            ServiceError::Task(_) => "Task",
        }
    }

    /// True for the "nothing there" kinds: no network yet, or an unknown id.
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind(), "NoNetworkLoaded" | "NotFound")
    }

    /// True when the uploaded document itself was rejected.
    pub fn is_rejected_document(&self) -> bool {
        matches!(self, ServiceError::Model(_))
    }
}

impl From<tokio::task::JoinError> for ServiceError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServiceError::Task(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_pass_through() {
        let err = ServiceError::from(ModelError::DuplicateId("X".into()));
        assert_eq!(err.kind(), "DuplicateId");
        assert!(err.is_rejected_document());

        let err = ServiceError::from(StoreError::NoNetworkLoaded);
        assert!(err.is_not_found());

        let err = ServiceError::from(DiagramError::Layout("boom".into()));
        assert_eq!(err.kind(), "Layout");
        assert!(!err.is_not_found());
    }
}
