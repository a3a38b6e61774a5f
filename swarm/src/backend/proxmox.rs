//! Proxmox control tool invoker

use std::process::ExitStatus;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tokio::process::Command;
use tracing::{debug, error, warn};

use crate::backend::{Backend, Credentials, RunOptions};

/// Default executable name, resolved through `PATH`
pub const DEFAULT_EXECUTABLE: &str = "proxmox";

/// Environment variables carrying the credential triple
pub const HOST_ENV: &str = "PROXMOX_HOST";
pub const USER_ENV: &str = "PROXMOX_USER";
pub const PASSWORD_ENV: &str = "PROXMOX_PASSWORD";

/// Status reported when the tool could not be launched or was killed by a signal
pub const LAUNCH_FAILURE_STATUS: i32 = 1;

/// Runs the external control tool as a child process
#[derive(Debug, Clone)]
pub struct ProxmoxCli {
    executable: String,
}

impl ProxmoxCli {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// Build the command without spawning it
    pub fn command(
        &self,
        sub_command: &str,
        args: &[String],
        credentials: &Credentials,
        options: &RunOptions,
    ) -> Command {
        let mut command = Command::new(&self.executable);
        command
            .arg(sub_command)
            .args(args)
            .args(options.to_flags());

        if let Some(host) = &credentials.host {
            command.env(HOST_ENV, host);
        }
        if let Some(user) = &credentials.user {
            command.env(USER_ENV, user);
        }
        if let Some(password) = &credentials.password {
            command.env(PASSWORD_ENV, password.expose_secret());
        }

        command
    }
}

impl Default for ProxmoxCli {
    fn default() -> Self {
        Self::new(DEFAULT_EXECUTABLE)
    }
}

#[async_trait]
impl Backend for ProxmoxCli {
    async fn run(
        &self,
        sub_command: &str,
        args: &[String],
        credentials: &Credentials,
        options: &RunOptions,
    ) -> i32 {
        debug!(
            executable = %self.executable,
            sub_command,
            ?args,
            "Invoking backend"
        );

        let status = self
            .command(sub_command, args, credentials, options)
            .status()
            .await;

        match status {
            Ok(status) => exit_code(sub_command, status),
            Err(e) => {
                error!("Failed to launch {}: {}", self.executable, e);
                LAUNCH_FAILURE_STATUS
            }
        }
    }
}

fn exit_code(sub_command: &str, status: ExitStatus) -> i32 {
    match status.code() {
        Some(code) => {
            if code != 0 {
                debug!(sub_command, code, "Backend exited with non-zero status");
            }
            code
        }
        None => {
            warn!(sub_command, "Backend terminated by signal");
            LAUNCH_FAILURE_STATUS
        }
    }
}
