//! Error types for proxmox-swarm

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for proxmox-swarm
#[derive(Error, Debug)]
pub enum SwarmError {
    #[error("Failed to read compose file at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML in {origin}: {reason}")]
    Format { origin: String, reason: String },

    #[error("{0}")]
    Schema(String),

    #[error("{0}")]
    Validation(String),

    #[error("Backend {operation} exited with status {status}")]
    Backend { operation: String, status: i32 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Daemon rejected request ({code}): {message}")]
    Daemon { code: u16, message: String },

    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SwarmError {
    /// Errors caused by the descriptor itself rather than the environment
    pub fn is_descriptor_error(&self) -> bool {
        matches!(
            self,
            SwarmError::Read { .. } | SwarmError::Format { .. } | SwarmError::Schema(_)
        )
    }
}
