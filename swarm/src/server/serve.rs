//! HTTP server over the daemon's unix socket

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::errors::SwarmError;
use crate::filesys::file::File;
use crate::server::handlers::{
    attach_handler, deploy_handler, metrics_handler, mount_handler, not_found_handler,
    parse_handler, start_handler, status_handler, stop_handler, subvolume_handler,
};
use crate::server::state::ServerState;

/// Build the daemon's router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health
        .route("/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
        // Deployment
        .route("/compose/parse", post(parse_handler))
        .route("/deploy", post(deploy_handler))
        // Units
        .route("/start", post(start_handler))
        .route("/stop", post(stop_handler))
        // Network and storage
        .route("/network/attach", post(attach_handler))
        .route("/storage/subvolume", post(subvolume_handler))
        .route("/storage/mount", post(mount_handler))
        .fallback(not_found_handler)
        .method_not_allowed_fallback(not_found_handler)
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind the socket, replacing a stale one, and restrict it to the owner
pub async fn bind(socket: &File) -> Result<UnixListener, SwarmError> {
    socket.delete().await?;

    let listener = UnixListener::bind(socket.path()).map_err(|e| {
        SwarmError::Lifecycle(format!(
            "failed to bind {}: {}",
            socket.path().display(),
            e
        ))
    })?;
    socket.set_permissions_600().await?;

    info!(socket = %socket.path().display(), "Bound daemon socket");
    Ok(listener)
}

/// Serve requests on `listener` until the returned task is aborted
pub fn serve(listener: UnixListener, state: Arc<ServerState>) -> JoinHandle<Result<(), SwarmError>> {
    let app = router(state);
    tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .map_err(|e| SwarmError::Internal(format!("server error: {}", e)))
    })
}
