//! Daemon client
//!
//! Speaks HTTP/1.1 to the daemon over its unix socket. Connection failures
//! and 5xx replies are retried with a linear backoff; 4xx replies are
//! returned immediately. A 5xx that outlasts the retries is reported as the
//! daemon's error, while a daemon that never answered is a transport error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use http::{header, Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Serialize;
use swarm_api::{
    AttachRequest, DaemonStatusResponse, DeployRequest, DeploymentModel, ErrorResponse,
    MountRequest, ParseRequest, StatusResponse, SubvolumeRequest, UnitRequest,
};
use tokio::net::UnixStream;
use tracing::{debug, warn};

use crate::app::settings::Settings;
use crate::errors::SwarmError;
use crate::runtime::RuntimeLayout;
use crate::utils::calc_linear_backoff;

/// Retry policy
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Delay unit; attempt `n` is followed by `n × base_delay`
    pub base_delay: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl ClientOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_attempts: settings.client.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.client.base_delay_ms),
        }
    }
}

/// Why a single attempt failed
enum AttemptError {
    /// No usable reply from the daemon
    Unreachable(String),
    /// The daemon answered with a 5xx
    ServerError { code: u16, message: String },
    /// Returned to the caller as-is
    Fatal(SwarmError),
}

impl AttemptError {
    fn describe(&self) -> String {
        match self {
            AttemptError::Unreachable(reason) => reason.clone(),
            AttemptError::ServerError { code, message } => format!("{}: {}", code, message),
            AttemptError::Fatal(e) => e.to_string(),
        }
    }
}

/// Client for the daemon socket
#[derive(Debug, Clone)]
pub struct DaemonClient {
    socket_path: PathBuf,
    options: ClientOptions,
}

impl DaemonClient {
    pub fn new(socket_path: impl Into<PathBuf>, options: ClientOptions) -> Self {
        Self {
            socket_path: socket_path.into(),
            options,
        }
    }

    /// Client for the daemon of `layout`
    pub fn for_layout(layout: &RuntimeLayout, options: ClientOptions) -> Self {
        Self::new(layout.socket_file().path(), options)
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub async fn status(&self) -> Result<DaemonStatusResponse, SwarmError> {
        self.call(Method::GET, "/status", None::<&()>).await
    }

    /// Prometheus text from `/metrics`
    pub async fn metrics(&self) -> Result<String, SwarmError> {
        let bytes = self.call_raw(Method::GET, "/metrics", None).await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| SwarmError::Transport(format!("metrics are not UTF-8: {}", e)))
    }

    pub async fn parse(&self, request: &ParseRequest) -> Result<DeploymentModel, SwarmError> {
        self.call(Method::POST, "/compose/parse", Some(request)).await
    }

    pub async fn deploy(&self, request: &DeployRequest) -> Result<StatusResponse, SwarmError> {
        self.call(Method::POST, "/deploy", Some(request)).await
    }

    pub async fn start(&self, request: &UnitRequest) -> Result<StatusResponse, SwarmError> {
        self.call(Method::POST, "/start", Some(request)).await
    }

    pub async fn stop(&self, request: &UnitRequest) -> Result<StatusResponse, SwarmError> {
        self.call(Method::POST, "/stop", Some(request)).await
    }

    pub async fn attach_network(&self, request: &AttachRequest) -> Result<StatusResponse, SwarmError> {
        self.call(Method::POST, "/network/attach", Some(request)).await
    }

    pub async fn create_subvolume(
        &self,
        request: &SubvolumeRequest,
    ) -> Result<StatusResponse, SwarmError> {
        self.call(Method::POST, "/storage/subvolume", Some(request)).await
    }

    pub async fn mount(&self, request: &MountRequest) -> Result<StatusResponse, SwarmError> {
        self.call(Method::POST, "/storage/mount", Some(request)).await
    }

    /// Send a request and decode the JSON reply
    pub async fn call<P, T>(&self, method: Method, path: &str, payload: Option<&P>) -> Result<T, SwarmError>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = payload.map(serde_json::to_vec).transpose()?;
        let bytes = self.call_raw(method, path, body).await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| SwarmError::Transport(format!("undecodable response from {}: {}", path, e)))
    }

    /// Send a request with retries and return the successful body
    pub async fn call_raw(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Bytes, SwarmError> {
        let max_attempts = self.options.max_attempts.max(1);
        let mut attempt = 1;

        let last_error = loop {
            let error = match self.attempt(method.clone(), path, body.clone()).await {
                Ok(bytes) => return Ok(bytes),
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(error) => error,
            };
            warn!(attempt, max_attempts, path, "Daemon request failed: {}", error.describe());

            if attempt >= max_attempts {
                break error;
            }
            tokio::time::sleep(calc_linear_backoff(self.options.base_delay, attempt)).await;
            attempt += 1;
        };

        match last_error {
            AttemptError::ServerError { code, message } => Err(SwarmError::Daemon { code, message }),
            other => Err(SwarmError::Transport(format!(
                "{} {} failed after {} attempts: {}",
                method,
                path,
                max_attempts,
                other.describe()
            ))),
        }
    }

    async fn attempt(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Bytes, AttemptError> {
        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            AttemptError::Unreachable(format!("connect {}: {}", self.socket_path.display(), e))
        })?;

        let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| AttemptError::Unreachable(format!("handshake: {}", e)))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("Daemon connection closed: {}", e);
            }
        });

        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header(header::HOST, "localhost");
        if body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        let request = builder
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| AttemptError::Fatal(SwarmError::Internal(e.to_string())))?;

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| AttemptError::Unreachable(format!("request: {}", e)))?;
        let code = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| AttemptError::Unreachable(format!("response body: {}", e)))?
            .to_bytes();

        classify(code, bytes)
    }
}

fn classify(code: StatusCode, bytes: Bytes) -> Result<Bytes, AttemptError> {
    if code.is_success() {
        return Ok(bytes);
    }

    let message = serde_json::from_slice::<ErrorResponse>(&bytes)
        .map(|body| body.error)
        .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());

    if code.is_server_error() {
        Err(AttemptError::ServerError {
            code: code.as_u16(),
            message,
        })
    } else {
        Err(AttemptError::Fatal(SwarmError::Daemon {
            code: code.as_u16(),
            message,
        }))
    }
}

/// Turn a non-zero reported status into a typed error
pub fn ensure_success(operation: &str, response: &StatusResponse) -> Result<(), SwarmError> {
    crate::backend::check_status(operation, response.status)
}
