//! Server state

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::app::lifecycle::{DaemonFsm, DaemonState};
use crate::backend::Backend;
use crate::deploy::Orchestrator;
use crate::telemetry::{InstrumentedBackend, SwarmMetrics};

/// Server state shared across handlers
pub struct ServerState {
    pub orchestrator: Orchestrator,
    pub metrics: Arc<SwarmMetrics>,
    pub lifecycle: Arc<RwLock<DaemonFsm>>,
    pub started_at: DateTime<Utc>,
    started: Instant,
}

impl ServerState {
    /// Build the state around `backend`; every backend call is metered
    pub fn new(
        backend: Arc<dyn Backend>,
        metrics: Arc<SwarmMetrics>,
        lifecycle: Arc<RwLock<DaemonFsm>>,
    ) -> Self {
        let backend: Arc<dyn Backend> = Arc::new(InstrumentedBackend::new(backend, metrics.clone()));
        Self {
            orchestrator: Orchestrator::new(backend),
            metrics,
            lifecycle,
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub async fn state(&self) -> DaemonState {
        self.lifecycle.read().await.state()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}
