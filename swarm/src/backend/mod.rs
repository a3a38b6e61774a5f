//! Backend invoker
//!
//! Every provisioning action ends up as one invocation of the external
//! control tool. Its exit status is the whole contract: zero is success,
//! anything else is passed back up unchanged.

pub mod proxmox;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::errors::SwarmError;

pub use proxmox::ProxmoxCli;
pub use swarm_api::Credentials;

/// Extra flags appended after the positional arguments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Emitted as `-p <mapping>` in order
    pub ports: Vec<String>,

    /// Emitted as `-e KEY=VALUE` in order
    pub environment: IndexMap<String, String>,
}

impl RunOptions {
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty() && self.environment.is_empty()
    }

    /// Render the options as trailing command line flags
    pub fn to_flags(&self) -> Vec<String> {
        let mut flags = Vec::with_capacity(2 * (self.ports.len() + self.environment.len()));
        for port in &self.ports {
            flags.push("-p".to_string());
            flags.push(port.clone());
        }
        for (key, value) in &self.environment {
            flags.push("-e".to_string());
            flags.push(format!("{}={}", key, value));
        }
        flags
    }
}

/// Backend trait for testability
#[async_trait]
pub trait Backend: Send + Sync {
    /// Run `<tool> <sub_command> <args...> <option flags...>` and return its exit status
    async fn run(
        &self,
        sub_command: &str,
        args: &[String],
        credentials: &Credentials,
        options: &RunOptions,
    ) -> i32;

    /// Shorthand for the `sdn` verb family
    async fn sdn(&self, args: &[String], credentials: &Credentials) -> i32 {
        self.run("sdn", args, credentials, &RunOptions::default())
            .await
    }
}

/// Convert a backend exit status into a typed error
pub fn check_status(operation: &str, status: i32) -> Result<(), SwarmError> {
    if status == 0 {
        Ok(())
    } else {
        Err(SwarmError::Backend {
            operation: operation.to_string(),
            status,
        })
    }
}
