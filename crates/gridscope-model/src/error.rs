//! ---
//! ems_section: "02-grid-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Network model, identifiers, and document parsing."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---

/// Result alias used throughout the model crate.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Reasons a document or network document is rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// The document cannot be decoded into a network at all.
    #[error("malformed document: {0}")]
    MalformedDocument(String),
    /// An element references an id that does not resolve in the same network.
    #[error("element '{element}' references unknown id '{reference}'")]
    ReferentialIntegrity { element: String, reference: String },
    /// Two elements share the same identifier.
    #[error("duplicate id '{0}'")]
    DuplicateId(String),
}

impl ModelError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedDocument(message.into())
    }

    pub(crate) fn dangling(element: impl Into<String>, reference: impl Into<String>) -> Self {
        Self::ReferentialIntegrity {
            element: element.into(),
            reference: reference.into(),
        }
    }

    /// Stable machine-readable kind, used by transports when reporting the error.
    pub fn kind(&self) -> &'static str {
        match self {
            ModelError::MalformedDocument(_) => "MalformedDocument",
            ModelError::ReferentialIntegrity { .. } => "ReferentialIntegrity",
            ModelError::DuplicateId(_) => "DuplicateId",
        }
    }
}

impl From<quick_xml::Error> for ModelError {
    fn from(err: quick_xml::Error) -> Self {
        ModelError::MalformedDocument(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for ModelError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        ModelError::MalformedDocument(err.to_string())
    }
}
