//! Client retry behaviour against a stub server on a unix socket

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use proxmox_swarm::client::{ClientOptions, DaemonClient};
use proxmox_swarm::errors::SwarmError;
use serde_json::{json, Value};
use tokio::net::UnixListener;
use tokio::task::JoinHandle;

#[derive(Default)]
struct Hits {
    failing: AtomicUsize,
    missing: AtomicUsize,
}

async fn failing(State(hits): State<Arc<Hits>>) -> (StatusCode, Json<Value>) {
    hits.failing.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "Compose file missing services definition"})),
    )
}

async fn missing(State(hits): State<Arc<Hits>>) -> (StatusCode, Json<Value>) {
    hits.missing.fetch_add(1, Ordering::SeqCst);
    (StatusCode::NOT_FOUND, Json(json!({"error": "Not found"})))
}

fn stub_server(socket: &Path, hits: Arc<Hits>) -> JoinHandle<()> {
    let listener = UnixListener::bind(socket).unwrap();
    let app = Router::new()
        .route("/deploy", post(failing))
        .fallback(missing)
        .with_state(hits);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    })
}

fn client(socket: &Path, max_attempts: u32) -> DaemonClient {
    DaemonClient::new(
        socket,
        ClientOptions {
            max_attempts,
            base_delay: Duration::from_millis(5),
        },
    )
}

#[tokio::test]
async fn test_server_error_is_retried_then_surfaced_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("daemon.sock");
    let hits = Arc::new(Hits::default());
    let server = stub_server(&socket, hits.clone());

    let result: Result<Value, _> = client(&socket, 3)
        .call(http::Method::POST, "/deploy", Some(&json!({"compose": "/x.yml"})))
        .await;

    match result {
        Err(SwarmError::Daemon { code, message }) => {
            assert_eq!(code, 500);
            assert_eq!(message, "Compose file missing services definition");
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(hits.failing.load(Ordering::SeqCst), 3);
    server.abort();
}

#[tokio::test]
async fn test_client_error_is_sent_once() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("daemon.sock");
    let hits = Arc::new(Hits::default());
    let server = stub_server(&socket, hits.clone());

    let result: Result<Value, _> = client(&socket, 3)
        .call(http::Method::GET, "/nowhere", None::<&()>)
        .await;

    assert!(matches!(result, Err(SwarmError::Daemon { code: 404, .. })));
    assert_eq!(hits.missing.load(Ordering::SeqCst), 1);
    assert_eq!(hits.failing.load(Ordering::SeqCst), 0);
    server.abort();
}
