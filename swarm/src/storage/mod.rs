//! Storage operations
//!
//! Subvolume and mount management through the backend's `cephfs` verbs.
//! Caller-supplied options pass through a fixed allow-list per operation
//! kind; anything else is dropped with a warning.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::backend::{Backend, Credentials, RunOptions};

/// Backend sub-command for every storage call
pub const SUB_COMMAND: &str = "cephfs";

/// Option keys the backend understands for storage calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageOption {
    Size,
    Mode,
    Uid,
    Gid,
    Quota,
    Rw,
    Ro,
}

impl StorageOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageOption::Size => "size",
            StorageOption::Mode => "mode",
            StorageOption::Uid => "uid",
            StorageOption::Gid => "gid",
            StorageOption::Quota => "quota",
            StorageOption::Rw => "rw",
            StorageOption::Ro => "ro",
        }
    }
}

impl FromStr for StorageOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "size" => Ok(StorageOption::Size),
            "mode" => Ok(StorageOption::Mode),
            "uid" => Ok(StorageOption::Uid),
            "gid" => Ok(StorageOption::Gid),
            "quota" => Ok(StorageOption::Quota),
            "rw" => Ok(StorageOption::Rw),
            "ro" => Ok(StorageOption::Ro),
            _ => Err(format!("Unknown storage option: {}", s)),
        }
    }
}

/// Operation families sharing one allow-list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Subvolume create and remove
    Subvolume,
    /// Mount and unmount
    Mount,
}

impl OperationKind {
    pub fn allowed(&self) -> &'static [StorageOption] {
        match self {
            OperationKind::Subvolume => &[
                StorageOption::Size,
                StorageOption::Mode,
                StorageOption::Uid,
                StorageOption::Gid,
                StorageOption::Quota,
            ],
            OperationKind::Mount => &[
                StorageOption::Uid,
                StorageOption::Gid,
                StorageOption::Rw,
                StorageOption::Ro,
                StorageOption::Quota,
            ],
        }
    }

    pub fn allows(&self, option: StorageOption) -> bool {
        self.allowed().contains(&option)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Subvolume => write!(f, "subvolume"),
            OperationKind::Mount => write!(f, "mount"),
        }
    }
}

/// Why an option was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Not a storage option at all
    Unknown,
    /// A storage option, but not for this operation
    NotAllowed(OperationKind),
}

/// An option dropped at the storage boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedOption {
    pub key: String,
    pub reason: RejectReason,
}

impl fmt::Display for RejectedOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            RejectReason::Unknown => write!(f, "unknown option '{}'", self.key),
            RejectReason::NotAllowed(kind) => {
                write!(f, "option '{}' is not supported for {} operations", self.key, kind)
            }
        }
    }
}

/// Result of filtering a caller's options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteredOptions {
    /// `--key value` pairs in input order
    pub flags: Vec<String>,
    pub rejected: Vec<RejectedOption>,
}

/// Split options into backend flags and rejections
pub fn filter_options(kind: OperationKind, options: &IndexMap<String, String>) -> FilteredOptions {
    let mut filtered = FilteredOptions::default();

    for (key, value) in options {
        match key.parse::<StorageOption>() {
            Ok(option) if kind.allows(option) => {
                filtered.flags.push(format!("--{}", option.as_str()));
                filtered.flags.push(value.clone());
            }
            Ok(_) => filtered.rejected.push(RejectedOption {
                key: key.clone(),
                reason: RejectReason::NotAllowed(kind),
            }),
            Err(_) => filtered.rejected.push(RejectedOption {
                key: key.clone(),
                reason: RejectReason::Unknown,
            }),
        }
    }

    filtered
}

/// Storage operations against the backend
pub struct StorageOps {
    backend: Arc<dyn Backend>,
}

impl StorageOps {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// `cephfs subvolume create <path> [--k v]...`
    pub async fn create_subvolume(
        &self,
        credentials: &Credentials,
        subvolume: &str,
        options: &IndexMap<String, String>,
    ) -> i32 {
        let args = vec![
            "subvolume".to_string(),
            "create".to_string(),
            subvolume.to_string(),
        ];
        self.invoke(OperationKind::Subvolume, args, options, credentials)
            .await
    }

    /// `cephfs mount <unit> <target> <path> [--mode m] [--k v]...`
    pub async fn mount(
        &self,
        credentials: &Credentials,
        unit_id: &str,
        target: &str,
        subvolume: &str,
        mode: Option<&str>,
        options: &IndexMap<String, String>,
    ) -> i32 {
        let mut args = vec![
            "mount".to_string(),
            unit_id.to_string(),
            target.to_string(),
            subvolume.to_string(),
        ];
        if let Some(mode) = mode.filter(|m| !m.is_empty()) {
            args.push("--mode".to_string());
            args.push(mode.to_string());
        }
        self.invoke(OperationKind::Mount, args, options, credentials)
            .await
    }

    /// `cephfs umount <unit> <target> [--k v]...`
    pub async fn unmount(
        &self,
        credentials: &Credentials,
        unit_id: &str,
        target: &str,
        options: &IndexMap<String, String>,
    ) -> i32 {
        let args = vec![
            "umount".to_string(),
            unit_id.to_string(),
            target.to_string(),
        ];
        self.invoke(OperationKind::Mount, args, options, credentials)
            .await
    }

    /// `cephfs subvolume rm <path> [--k v]...`
    pub async fn remove_subvolume(
        &self,
        credentials: &Credentials,
        subvolume: &str,
        options: &IndexMap<String, String>,
    ) -> i32 {
        let args = vec![
            "subvolume".to_string(),
            "rm".to_string(),
            subvolume.to_string(),
        ];
        self.invoke(OperationKind::Subvolume, args, options, credentials)
            .await
    }

    async fn invoke(
        &self,
        kind: OperationKind,
        mut args: Vec<String>,
        options: &IndexMap<String, String>,
        credentials: &Credentials,
    ) -> i32 {
        let filtered = filter_options(kind, options);
        for rejected in &filtered.rejected {
            warn!(option = %rejected.key, operation = %kind, "Ignoring storage option: {}", rejected);
        }
        args.extend(filtered.flags);

        debug!(?args, "Storage call");
        self.backend
            .run(SUB_COMMAND, &args, credentials, &RunOptions::default())
            .await
    }
}
