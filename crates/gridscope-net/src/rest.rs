//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Network connectivity and edge adapters."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Query, Request, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use gridscope_core::TopologyService;
use gridscope_diagram::AreaRequest;
use prometheus::{Registry, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::sse;

/// Header carrying the diagram metadata next to a raw SVG body.
pub const METADATA_HEADER: &str = "x-diagram-metadata";

const DEFAULT_MAX_UPLOAD_BYTES: usize = 500 * 1024 * 1024;
const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(10);

/// Shared state injected into the axum handlers.
struct ApiState {
    service: TopologyService,
    metrics: Option<Arc<Registry>>,
    heartbeat: Duration,
    max_upload_bytes: usize,
}

/// Builder used to configure and spawn the HTTP API server.
#[derive(Clone)]
pub struct RestApiBuilder {
    listen: SocketAddr,
    service: TopologyService,
    metrics: Option<Arc<Registry>>,
    heartbeat: Duration,
    max_upload_bytes: usize,
}

impl RestApiBuilder {
    /// Construct a new builder serving `service` on `listen`.
    pub fn new(listen: SocketAddr, service: TopologyService) -> Self {
        Self {
            listen,
            service,
            metrics: None,
            heartbeat: DEFAULT_HEARTBEAT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    /// Attach a Prometheus registry exposed at `/metrics`.
    pub fn with_metrics_registry(mut self, registry: Arc<Registry>) -> Self {
        self.metrics = Some(registry);
        self
    }

    /// Interval between `/health` heartbeats.
    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Largest accepted upload body.
    pub fn with_max_upload_bytes(mut self, limit: usize) -> Self {
        self.max_upload_bytes = limit;
        self
    }

    fn router(self) -> Router {
        let limit = self.max_upload_bytes;
        let state = ApiState {
            service: self.service,
            metrics: self.metrics,
            heartbeat: self.heartbeat,
            max_upload_bytes: limit,
        };
        Router::new()
            .route("/health", get(get_health))
            .route("/metrics", get(get_metrics))
            .route("/api/v1/events", get(get_events))
            .route("/api/v1/config/iidm", get(get_network).post(post_network))
            .route("/api/v1/network/substations", get(get_substations))
            .route(
                "/api/v1/network/substations/:id/voltage-levels",
                get(get_substation_levels),
            )
            .route("/api/v1/network/voltage-levels", get(get_voltage_levels))
            .route(
                "/api/v1/network/voltage-levels/:id/equipment",
                get(get_equipment),
            )
            .route("/api/v1/network/diagram/line/:id", get(get_single_line))
            .route(
                "/api/v1/network/diagram/line/:id/metadata",
                get(get_single_line_metadata),
            )
            .route("/api/v1/network/diagram/area", get(get_area))
            .layer(DefaultBodyLimit::max(limit))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::new(state))
    }

    /// Spawn the API server and return a handle that can be awaited for shutdown.
    pub async fn spawn(self) -> anyhow::Result<RestApiHandle> {
        let listener = TcpListener::bind(self.listen).await?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "rest api listening");

        let router = self.router();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let server = axum::serve(listener, router).with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        });
        let task = tokio::spawn(async move {
            if let Err(err) = server.await {
                warn!(error = %err, "rest api server exited with error");
            }
        });

        Ok(RestApiHandle {
            address: local_addr,
            task,
            shutdown: shutdown_tx,
        })
    }
}

/// Handle returned from [`RestApiBuilder::spawn`] allowing the caller to await server completion.
pub struct RestApiHandle {
    address: SocketAddr,
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl RestApiHandle {
    /// Retrieve the socket address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Request graceful shutdown and wait for the server task to finish.
    ///
    /// Open event streams keep the server alive until their clients disconnect.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(()) => Ok(()),
            Err(join) => Err(anyhow::anyhow!(join)),
        }
    }
}

async fn get_health(State(state): State<Arc<ApiState>>) -> Response {
    sse::health_stream(state.heartbeat)
}

async fn get_events(State(state): State<Arc<ApiState>>) -> Response {
    sse::change_stream(&state.service)
}

async fn get_metrics(State(state): State<Arc<ApiState>>) -> Response {
    let Some(registry) = &state.metrics else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics registry unavailable",
        )
            .into_response();
    };

    let encoder = TextEncoder::new();
    let families = registry.gather();
    match encoder.encode_to_string(&families) {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(err) => {
            warn!(error = %err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn post_network(
    State(state): State<Arc<ApiState>>,
    request: Request,
) -> Result<Response, ApiError> {
    let document = read_document(request, state.max_upload_bytes).await?;
    let network = state.service.upload(document).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "IIDM file loaded", "version": network.version() })),
    )
        .into_response())
}

/// Upload body: the `file` field of a multipart form, or the raw body.
async fn read_document(request: Request, limit: usize) -> Result<Vec<u8>, ApiError> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    let too_large = |status: StatusCode, text: String| {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge { limit }
        } else {
            ApiError::BadRequest(text)
        }
    };

    let document = if is_multipart {
        let mut form = Multipart::from_request(request, &())
            .await
            .map_err(|rejection| too_large(rejection.status(), rejection.body_text()))?;
        let mut file = None;
        while let Some(field) = form
            .next_field()
            .await
            .map_err(|err| too_large(err.status(), err.body_text()))?
        {
            if field.name() == Some("file") {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| too_large(err.status(), err.body_text()))?;
                file = Some(bytes.to_vec());
                break;
            }
        }
        file.unwrap_or_default()
    } else {
        Bytes::from_request(request, &())
            .await
            .map_err(|rejection| too_large(rejection.status(), rejection.body_text()))?
            .to_vec()
    };

    if document.is_empty() {
        return Err(ApiError::BadRequest("No file found in the request".into()));
    }
    Ok(document)
}

async fn get_network(State(state): State<Arc<ApiState>>) -> Result<Response, ApiError> {
    let network = state.service.network()?;
    Ok(Json(network.as_ref()).into_response())
}

async fn get_substations(State(state): State<Arc<ApiState>>) -> Result<Response, ApiError> {
    Ok(Json(state.service.substations()?).into_response())
}

async fn get_voltage_levels(State(state): State<Arc<ApiState>>) -> Result<Response, ApiError> {
    Ok(Json(state.service.voltage_levels()?).into_response())
}

async fn get_substation_levels(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    Ok(Json(state.service.voltage_levels_of(&id)?).into_response())
}

async fn get_equipment(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    Ok(Json(state.service.equipment_of(&id)?).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct FormatQuery {
    #[serde(default)]
    format: Option<String>,
}

impl FormatQuery {
    fn wants(&self, format: &str) -> bool {
        self.format.as_deref() == Some(format)
    }
}

async fn get_single_line(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Query(query): Query<FormatQuery>,
) -> Result<Response, ApiError> {
    let artifact = state.service.diagram(&id).await?;
    if query.wants("json") {
        return Ok(Json(json!({ "svg": &artifact.svg, "metadata": &artifact.metadata })).into_response());
    }

    let mut headers = svg_headers(&format!("inline; filename={id}_diagram.svg"));
    match serde_json::to_string(&artifact.metadata)
        .ok()
        .and_then(|metadata| HeaderValue::from_str(&metadata).ok())
    {
        Some(value) => {
            headers.insert(METADATA_HEADER, value);
        }
        None => warn!(
            voltage_level = %id,
            "diagram metadata is not a valid header value; omitting {METADATA_HEADER}"
        ),
    }
    Ok((headers, artifact.svg.clone()).into_response())
}

async fn get_single_line_metadata(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    Ok(Json(state.service.diagram_metadata(&id).await?).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct AreaQuery {
    #[serde(default)]
    center: Option<String>,
    #[serde(default)]
    depth: Option<u32>,
    #[serde(default)]
    low: Option<f64>,
    #[serde(default)]
    high: Option<f64>,
    #[serde(default)]
    format: Option<String>,
}

impl AreaQuery {
    fn request(&self) -> AreaRequest {
        let defaults = AreaRequest::default();
        AreaRequest {
            center: self.center.clone().filter(|center| !center.is_empty()),
            depth: self.depth.unwrap_or(defaults.depth),
            low_nominal_kv: self.low,
            high_nominal_kv: self.high,
        }
    }
}

async fn get_area(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<AreaQuery>,
) -> Result<Response, ApiError> {
    let diagram = state.service.area(query.request()).await?;
    if query.format.as_deref() == Some("svg") {
        let headers = svg_headers("inline; filename=area_diagram.svg");
        return Ok((headers, diagram.svg).into_response());
    }
    Ok(Json(diagram).into_response())
}

fn svg_headers(disposition: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("image/svg+xml"));
    if let Ok(value) = HeaderValue::from_str(disposition) {
        headers.insert(CONTENT_DISPOSITION, value);
    }
    headers
}
