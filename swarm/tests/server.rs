//! Router tests driven through `tower::ServiceExt::oneshot`

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use proxmox_swarm::app::lifecycle::{DaemonEvent, DaemonFsm};
use proxmox_swarm::server::{router, ServerState};
use proxmox_swarm::telemetry::SwarmMetrics;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tower::ServiceExt;

use common::{strings, RecordingBackend, STACK_YAML};

fn app(backend: Arc<RecordingBackend>) -> Router {
    let mut fsm = DaemonFsm::new();
    fsm.process(DaemonEvent::Start).unwrap();
    fsm.process(DaemonEvent::Bound).unwrap();

    let state = ServerState::new(backend, SwarmMetrics::shared(), Arc::new(RwLock::new(fsm)));
    router(Arc::new(state))
}

async fn send(app: Router, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let code = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (code, bytes.to_vec())
}

fn as_json(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (code, body) = send(app(Arc::default()), Method::GET, "/nope", None).await;
    assert_eq!(code, StatusCode::NOT_FOUND);
    assert_eq!(as_json(&body), json!({"error": "Not found"}));
}

#[tokio::test]
async fn test_wrong_method_is_404() {
    let (code, body) = send(app(Arc::default()), Method::GET, "/deploy", None).await;
    assert_eq!(code, StatusCode::NOT_FOUND);
    assert!(as_json(&body)["error"].is_string());
}

#[tokio::test]
async fn test_malformed_body_is_400() {
    let backend = Arc::new(RecordingBackend::new());
    let (code, body) = send(app(backend.clone()), Method::POST, "/start", Some("{not json")).await;

    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert!(as_json(&body)["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid request body"));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_start_reports_backend_status() {
    let backend = Arc::new(RecordingBackend::new().fail_on("start", "101", 3));
    let (code, body) = send(
        app(backend.clone()),
        Method::POST,
        "/start",
        Some(r#"{"vmid": "101", "auth": {"host": "pve"}}"#),
    )
    .await;

    assert_eq!(code, StatusCode::OK);
    assert_eq!(as_json(&body), json!({"status": 3}));
    assert_eq!(backend.calls()[0].host.as_deref(), Some("pve"));
}

#[tokio::test]
async fn test_status_reports_listening() {
    let (code, body) = send(app(Arc::default()), Method::GET, "/status", None).await;

    assert_eq!(code, StatusCode::OK);
    let status = as_json(&body);
    assert_eq!(status["status"], "ok");
    assert_eq!(status["state"], "listening");
    assert_eq!(status["pid"], std::process::id());
    assert!(status["startedAt"].is_string());
}

#[tokio::test]
async fn test_parse_returns_model() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stack.yml");
    std::fs::write(&path, STACK_YAML).unwrap();

    let request = json!({"file": path}).to_string();
    let (code, body) = send(app(Arc::default()), Method::POST, "/compose/parse", Some(&request)).await;

    assert_eq!(code, StatusCode::OK);
    let model = as_json(&body);
    assert_eq!(model["services"]["web"]["image"], "nginx:1.25");
    assert_eq!(model["volumes"]["cache"]["external"], true);
}

#[tokio::test]
async fn test_deploy_missing_file_is_500() {
    let backend = Arc::new(RecordingBackend::new());
    let request = json!({"compose": "/definitely/not/here.yml"}).to_string();
    let (code, body) = send(app(backend.clone()), Method::POST, "/deploy", Some(&request)).await;

    assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(as_json(&body)["error"].as_str().unwrap().contains("here.yml"));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_storage_routes() {
    let backend = Arc::new(RecordingBackend::new());

    let (code, _) = send(
        app(backend.clone()),
        Method::POST,
        "/storage/subvolume",
        Some(r#"{"subvolume": "vol/a", "options": {"quota": "5G", "force": "1"}}"#),
    )
    .await;
    assert_eq!(code, StatusCode::OK);

    let (code, _) = send(
        app(backend.clone()),
        Method::POST,
        "/storage/mount",
        Some(r#"{"vmid": "101", "target": "/a", "subvolume": "vol/a", "mode": "rw"}"#),
    )
    .await;
    assert_eq!(code, StatusCode::OK);

    assert_eq!(
        backend.argvs(),
        vec![
            strings(&["cephfs", "subvolume", "create", "vol/a", "--quota", "5G"]),
            strings(&["cephfs", "mount", "101", "/a", "vol/a", "--mode", "rw"]),
        ]
    );
}

#[tokio::test]
async fn test_attach_with_invalid_vlan_is_500() {
    let backend = Arc::new(RecordingBackend::new());
    let (code, body) = send(
        app(backend.clone()),
        Method::POST,
        "/network/attach",
        Some(r#"{"vmid": "101", "network": "overlay", "vlan": 5000}"#),
    )
    .await;

    assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        as_json(&body)["error"],
        "VLAN must be an integer between 1 and 4094"
    );
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_metrics_count_requests() {
    let backend = Arc::new(RecordingBackend::new());
    let app = app(backend);

    send(app.clone(), Method::POST, "/start", Some(r#"{"vmid": "7"}"#)).await;
    let (code, body) = send(app, Method::GET, "/metrics", None).await;

    assert_eq!(code, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("proxmox_swarm_requests_total{route=\"/start\"} 1"));
    assert!(text.contains("proxmox_swarm_backend_calls_total{command=\"start\"} 1"));
}
