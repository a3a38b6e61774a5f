//! HTTP request handlers
//!
//! POST bodies arrive as raw bytes and are decoded here so that a malformed
//! body maps to `400 {"error"}` instead of the extractor's plain-text reply.

use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use swarm_api::{
    AttachRequest, DaemonStatusResponse, DeployRequest, DeploymentModel, ErrorResponse,
    MountRequest, ParseRequest, StatusResponse, SubvolumeRequest, UnitRequest,
};
use tracing::{error, info};

use crate::compose;
use crate::errors::SwarmError;
use crate::server::state::ServerState;
use crate::telemetry::hostname;
use crate::utils::version_info;

/// Error outcome of a request
#[derive(Debug)]
pub enum ApiError {
    /// Body could not be decoded
    BadRequest(String),
    /// No such route or method
    NotFound(String),
    /// The operation itself failed
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (code, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<SwarmError> for ApiError {
    fn from(e: SwarmError) -> Self {
        error!("Request failed: {}", e);
        ApiError::Internal(e.to_string())
    }
}

fn decode<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))
}

/// Fallback for unknown routes and methods
pub async fn not_found_handler() -> ApiError {
    ApiError::NotFound("Not found".to_string())
}

pub async fn status_handler(State(state): State<Arc<ServerState>>) -> Json<DaemonStatusResponse> {
    state.metrics.record_request("/status");

    Json(DaemonStatusResponse {
        status: "ok".to_string(),
        pid: std::process::id(),
        version: version_info().version,
        state: state.state().await.to_string(),
        started_at: state.started_at.to_rfc3339(),
        uptime_secs: state.uptime_secs(),
        hostname: hostname(),
    })
}

pub async fn metrics_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    state.metrics.record_request("/metrics");

    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

pub async fn parse_handler(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<Json<DeploymentModel>, ApiError> {
    state.metrics.record_request("/compose/parse");

    let request: ParseRequest = decode(&body)?;
    let model = compose::parse(Path::new(&request.file)).await?;
    Ok(Json(model))
}

pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<Json<StatusResponse>, ApiError> {
    state.metrics.record_request("/deploy");

    let request: DeployRequest = decode(&body)?;
    let model = compose::parse(Path::new(&request.compose)).await?;
    let report = state
        .orchestrator
        .deploy_with_report(
            &model,
            &request.auth,
            request.sdn_network.as_deref(),
            request.create_sdn,
        )
        .await?;

    let status = report.status();
    state.metrics.record_deploy(status);
    match report.failed_step() {
        Some(step) => info!(compose = %request.compose, step = %step.kind, subject = %step.subject, status, "Deploy aborted"),
        None => info!(compose = %request.compose, steps = report.steps.len(), "Deploy succeeded"),
    }

    Ok(Json(StatusResponse { status }))
}

pub async fn start_handler(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<Json<StatusResponse>, ApiError> {
    state.metrics.record_request("/start");

    let request: UnitRequest = decode(&body)?;
    let status = state.orchestrator.start_unit(&request.auth, &request.vmid).await;
    Ok(Json(StatusResponse { status }))
}

pub async fn stop_handler(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<Json<StatusResponse>, ApiError> {
    state.metrics.record_request("/stop");

    let request: UnitRequest = decode(&body)?;
    let status = state.orchestrator.stop_unit(&request.auth, &request.vmid).await;
    Ok(Json(StatusResponse { status }))
}

pub async fn attach_handler(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<Json<StatusResponse>, ApiError> {
    state.metrics.record_request("/network/attach");

    let request: AttachRequest = decode(&body)?;
    let status = state
        .orchestrator
        .network()
        .attach_to_sdn(
            &request.auth,
            &request.vmid,
            &request.network,
            request.tags.as_deref(),
            request.vlan,
        )
        .await?;
    Ok(Json(StatusResponse { status }))
}

pub async fn subvolume_handler(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<Json<StatusResponse>, ApiError> {
    state.metrics.record_request("/storage/subvolume");

    let request: SubvolumeRequest = decode(&body)?;
    let status = state
        .orchestrator
        .storage()
        .create_subvolume(&request.auth, &request.subvolume, &request.options)
        .await;
    Ok(Json(StatusResponse { status }))
}

pub async fn mount_handler(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<Json<StatusResponse>, ApiError> {
    state.metrics.record_request("/storage/mount");

    let request: MountRequest = decode(&body)?;
    let status = state
        .orchestrator
        .storage()
        .mount(
            &request.auth,
            &request.vmid,
            &request.target,
            &request.subvolume,
            request.mode.as_deref(),
            &request.options,
        )
        .await;
    Ok(Json(StatusResponse { status }))
}
