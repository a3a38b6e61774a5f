//! Application configuration options

use std::sync::Arc;
use std::time::Duration;

use crate::app::settings::Settings;
use crate::backend::{Backend, ProxmoxCli};
use crate::runtime::RuntimeLayout;

/// Options for running the daemon in the foreground
#[derive(Clone)]
pub struct DaemonOptions {
    /// Runtime directory holding the pid file and socket
    pub layout: RuntimeLayout,

    /// Backend every operation is issued against
    pub backend: Arc<dyn Backend>,
}

impl DaemonOptions {
    pub fn from_settings(layout: RuntimeLayout, settings: &Settings) -> Self {
        Self {
            layout,
            backend: Arc::new(ProxmoxCli::new(settings.backend.executable.clone())),
        }
    }
}

impl std::fmt::Debug for DaemonOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonOptions")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

/// Options for `daemon start|stop`
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Wait for the pid file after spawning
    pub start_timeout: Duration,

    /// Wait for the process to exit after SIGTERM
    pub stop_timeout: Duration,

    /// Fallback re-check interval while waiting
    pub poll_interval: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl SupervisorOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            start_timeout: Duration::from_secs(settings.lifecycle.start_timeout_secs),
            stop_timeout: Duration::from_secs(settings.lifecycle.stop_timeout_secs),
            ..Default::default()
        }
    }
}
