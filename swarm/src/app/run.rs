//! Daemon run loop
//!
//! Claims the pid file, binds the socket, serves until the shutdown future
//! resolves, then removes both runtime files. In-flight requests are
//! dropped on shutdown.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::lifecycle::{DaemonEvent, DaemonFsm};
use crate::app::options::DaemonOptions;
use crate::errors::SwarmError;
use crate::filesys::file::File;
use crate::runtime::PidLock;
use crate::server::{self, ServerState};
use crate::telemetry::SwarmMetrics;

/// Run the daemon in the foreground until `shutdown_signal` resolves
pub async fn run(
    options: DaemonOptions,
    shutdown_signal: impl Future<Output = ()>,
) -> Result<(), SwarmError> {
    info!("Initializing proxmox-swarm daemon...");

    let lifecycle = Arc::new(RwLock::new(DaemonFsm::new()));
    transition(&lifecycle, DaemonEvent::Start).await?;

    let mut shutdown_manager = ShutdownManager::new(lifecycle.clone());

    if let Err(e) = init(&options, lifecycle.clone(), &mut shutdown_manager).await {
        error!("Failed to start daemon: {}", e);
        transition(&lifecycle, DaemonEvent::Failed(e.to_string())).await?;
        shutdown_manager.shutdown().await?;
        return Err(e);
    }
    transition(&lifecycle, DaemonEvent::Bound).await?;
    info!(
        socket = %options.layout.socket_file().path().display(),
        pid = std::process::id(),
        "Daemon listening"
    );

    let outcome = tokio::select! {
        _ = shutdown_signal => {
            info!("Shutdown signal received, shutting down...");
            transition(&lifecycle, DaemonEvent::Shutdown).await?;
            Ok(())
        }
        reason = shutdown_manager.server_exited() => {
            error!("Server stopped unexpectedly: {}", reason);
            transition(&lifecycle, DaemonEvent::Failed(reason.clone())).await?;
            Err(SwarmError::Internal(reason))
        }
    };

    shutdown_manager.shutdown().await?;
    outcome
}

async fn transition(lifecycle: &RwLock<DaemonFsm>, event: DaemonEvent) -> Result<(), SwarmError> {
    lifecycle
        .write()
        .await
        .process(event)
        .map_err(SwarmError::Lifecycle)
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &DaemonOptions,
    lifecycle: Arc<RwLock<DaemonFsm>>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), SwarmError> {
    options.layout.setup().await?;

    let pid_lock = PidLock::acquire(options.layout.pid_file().path()).await?;
    info!(pid = pid_lock.pid(), path = %pid_lock.path().display(), "Acquired pid file");
    shutdown_manager.with_pid_lock(pid_lock)?;

    let socket = options.layout.socket_file();
    let listener = server::bind(&socket).await?;
    shutdown_manager.with_socket(socket)?;

    let state = ServerState::new(options.backend.clone(), SwarmMetrics::shared(), lifecycle);
    let handle = server::serve(listener, Arc::new(state));
    shutdown_manager.with_server_handle(handle)?;

    Ok(())
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    lifecycle: Arc<RwLock<DaemonFsm>>,
    pid_lock: Option<PidLock>,
    socket: Option<File>,
    server_handle: Option<JoinHandle<Result<(), SwarmError>>>,
}

impl ShutdownManager {
    fn new(lifecycle: Arc<RwLock<DaemonFsm>>) -> Self {
        Self {
            lifecycle,
            pid_lock: None,
            socket: None,
            server_handle: None,
        }
    }

    fn with_pid_lock(&mut self, pid_lock: PidLock) -> Result<(), SwarmError> {
        if self.pid_lock.is_some() {
            return Err(SwarmError::Lifecycle("pid_lock already set".to_string()));
        }
        self.pid_lock = Some(pid_lock);
        Ok(())
    }

    fn with_socket(&mut self, socket: File) -> Result<(), SwarmError> {
        if self.socket.is_some() {
            return Err(SwarmError::Lifecycle("socket already set".to_string()));
        }
        self.socket = Some(socket);
        Ok(())
    }

    fn with_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), SwarmError>>,
    ) -> Result<(), SwarmError> {
        if self.server_handle.is_some() {
            return Err(SwarmError::Lifecycle("server_handle already set".to_string()));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    /// Resolves when the server task ends on its own; pending if none is running
    async fn server_exited(&mut self) -> String {
        let Some(handle) = self.server_handle.as_mut() else {
            return std::future::pending().await;
        };
        let reason = match handle.await {
            Ok(Ok(())) => "server exited".to_string(),
            Ok(Err(e)) => e.to_string(),
            Err(e) => e.to_string(),
        };
        self.server_handle = None;
        reason
    }

    async fn shutdown(&mut self) -> Result<(), SwarmError> {
        info!("Shutting down proxmox-swarm daemon...");

        // 1. Stop serving
        if let Some(handle) = self.server_handle.take() {
            handle.abort();
            let _ = handle.await;
        }

        // 2. Socket file
        if let Some(socket) = self.socket.take() {
            if let Err(e) = socket.delete().await {
                warn!("Failed to remove socket file: {}", e);
            }
        }

        // 3. Pid file
        if let Some(pid_lock) = self.pid_lock.take() {
            pid_lock.release();
        }

        transition(&self.lifecycle, DaemonEvent::Exited).await?;
        info!("Shutdown complete");
        Ok(())
    }
}
