//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Network connectivity and edge adapters."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gridscope_core::ServiceError;
use serde_json::json;
use tracing::{debug, warn};

/// Errors returned by the HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Failure reported by the topology service.
    #[error(transparent)]
    Service(#[from] ServiceError),
    /// The request itself could not be used.
    #[error("{0}")]
    BadRequest(String),
    /// The upload body exceeded the configured limit.
    #[error("upload exceeds the {limit} byte limit")]
    PayloadTooLarge {
        /// Configured limit in bytes.
        limit: usize,
    },
}

impl ApiError {
    /// HTTP status the error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Service(err) if err.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::Service(err) if err.is_rejected_document() => StatusCode::BAD_REQUEST,
            ApiError::Service(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    /// Error kind reported in the `error` field of the body.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Service(err) => err.kind(),
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::PayloadTooLarge { .. } => "PayloadTooLarge",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            warn!(%status, kind = self.kind(), error = %message, "request failed");
        } else {
            debug!(%status, kind = self.kind(), error = %message, "request rejected");
        }
        (
            status,
            Json(json!({ "error": self.kind(), "message": message })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridscope_core::ServiceError;
    use gridscope_diagram::DiagramError;

    #[test]
    fn kinds_map_to_statuses() {
        let not_found = ApiError::from(ServiceError::from(DiagramError::NotFound("VL9".into())));
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
        assert_eq!(not_found.kind(), "NotFound");

        let layout = ApiError::from(ServiceError::from(DiagramError::Layout("x".into())));
        assert_eq!(layout.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let missing = ApiError::BadRequest("No file found in the request".into());
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::PayloadTooLarge { limit: 1 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }
}
