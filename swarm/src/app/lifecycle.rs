//! Finite state machine for the daemon process lifecycle

use serde::{Deserialize, Serialize};

/// Daemon state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonState {
    /// Not running
    Stopped,

    /// Claiming the pid file and binding the socket
    Starting,

    /// Accepting requests
    Listening,

    /// Shutting down and removing runtime files
    Stopping,
}

impl DaemonState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DaemonState::Stopped => "stopped",
            DaemonState::Starting => "starting",
            DaemonState::Listening => "listening",
            DaemonState::Stopping => "stopping",
        }
    }
}

impl std::fmt::Display for DaemonState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Daemon lifecycle event
#[derive(Debug, Clone)]
pub enum DaemonEvent {
    /// Begin startup
    Start,

    /// Socket bound and serving
    Bound,

    /// Termination requested
    Shutdown,

    /// Runtime files removed
    Exited,

    /// Startup or serving failed
    Failed(String),
}

/// Daemon FSM
#[derive(Debug, Clone)]
pub struct DaemonFsm {
    state: DaemonState,
    error: Option<String>,
}

impl DaemonFsm {
    /// Create a new FSM in stopped state
    pub fn new() -> Self {
        Self {
            state: DaemonState::Stopped,
            error: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> DaemonState {
        self.state
    }

    /// Get the last failure, if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DaemonEvent) -> Result<(), String> {
        let new_state = match (&self.state, &event) {
            (DaemonState::Stopped, DaemonEvent::Start) => {
                self.error = None;
                DaemonState::Starting
            }

            (DaemonState::Starting, DaemonEvent::Bound) => DaemonState::Listening,
            (DaemonState::Starting, DaemonEvent::Failed(err)) => {
                self.error = Some(err.clone());
                DaemonState::Stopping
            }

            (DaemonState::Listening, DaemonEvent::Shutdown) => DaemonState::Stopping,
            (DaemonState::Listening, DaemonEvent::Failed(err)) => {
                self.error = Some(err.clone());
                DaemonState::Stopping
            }

            (DaemonState::Stopping, DaemonEvent::Exited) => DaemonState::Stopped,

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for DaemonFsm {
    fn default() -> Self {
        Self::new()
    }
}
