//! Settings file management

use std::env;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::proxmox::DEFAULT_EXECUTABLE;
use crate::errors::SwarmError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Environment variable overriding `log_level`
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Environment variable overriding `backend.executable`
pub const BACKEND_ENV: &str = "PROXMOX_SWARM_BACKEND";

/// Daemon and client settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,

    #[serde(default)]
    pub backend: BackendSettings,

    #[serde(default)]
    pub client: ClientSettings,

    #[serde(default)]
    pub lifecycle: LifecycleSettings,
}

impl Settings {
    /// Read settings from `file` when it exists, then apply environment overrides
    pub async fn load(file: &File) -> Result<Self, SwarmError> {
        let mut settings = if file.exists().await {
            debug!(path = %file.path().display(), "Loading settings");
            file.read_json::<Settings>()
                .await
                .map_err(|e| SwarmError::Config(format!("{}: {}", file.path().display(), e)))?
        } else {
            Settings::default()
        };
        settings.apply_env_overrides(|key| env::var(key).ok())?;
        Ok(settings)
    }

    /// Apply overrides looked up through `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), SwarmError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(LOG_LEVEL_ENV).filter(|v| !v.is_empty()) {
            self.log_level = level.parse().map_err(SwarmError::Config)?;
        }
        if let Some(executable) = lookup(BACKEND_ENV).filter(|v| !v.is_empty()) {
            self.backend.executable = executable;
        }
        Ok(())
    }
}

/// Backend tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Executable name or path of the control tool
    #[serde(default = "default_executable")]
    pub executable: String,
}

fn default_executable() -> String {
    DEFAULT_EXECUTABLE.to_string()
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            executable: default_executable(),
        }
    }
}

/// Daemon client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Retry delay unit in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

/// Daemon supervision settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleSettings {
    #[serde(default = "default_timeout_secs")]
    pub start_timeout_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub stop_timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    5
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            start_timeout_secs: default_timeout_secs(),
            stop_timeout_secs: default_timeout_secs(),
        }
    }
}
