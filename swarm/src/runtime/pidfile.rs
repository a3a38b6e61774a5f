//! Single-instance lock through a pid file

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::errors::SwarmError;

/// Check whether a process with `pid` exists
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        // exists, owned by someone else
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

fn parse_pid(contents: &str) -> Option<u32> {
    contents.trim().parse().ok()
}

/// Read the pid recorded in `path`, if any
pub async fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path)
        .await
        .ok()
        .and_then(|contents| parse_pid(&contents))
}

/// Pid recorded in `path` when that process is still alive.
/// A file naming a dead or unreadable pid is removed.
pub async fn live_pid(path: &Path) -> Option<u32> {
    match read_pid(path).await {
        Some(pid) if is_process_alive(pid) => Some(pid),
        _ => {
            remove_stale(path).await;
            None
        }
    }
}

async fn remove_stale(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed stale pid file"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), "Failed to remove stale pid file: {}", e),
    }
}

/// Held while this process owns the pid file. Dropping it removes the file
/// if it still names this process.
#[derive(Debug)]
pub struct PidLock {
    path: PathBuf,
    pid: u32,
}

impl PidLock {
    /// Claim the pid file for the current process
    pub async fn acquire(path: impl Into<PathBuf>) -> Result<Self, SwarmError> {
        let path = path.into();
        let pid = std::process::id();

        if Self::try_create(&path, pid).await? {
            return Ok(Self { path, pid });
        }

        if let Some(existing) = read_pid(&path).await {
            if existing != pid && is_process_alive(existing) {
                return Err(SwarmError::Lifecycle(format!(
                    "daemon already running (pid {})",
                    existing
                )));
            }
        }

        remove_stale(&path).await;
        if Self::try_create(&path, pid).await? {
            Ok(Self { path, pid })
        } else {
            Err(SwarmError::Lifecycle(format!(
                "pid file {} was claimed concurrently",
                path.display()
            )))
        }
    }

    /// Atomically create the file; `false` when it already exists
    async fn try_create(path: &Path, pid: u32) -> Result<bool, SwarmError> {
        match OpenOptions::new().write(true).create_new(true).open(path).await {
            Ok(mut file) => {
                file.write_all(format!("{}\n", pid).as_bytes()).await?;
                file.flush().await?;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Remove the pid file now
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for PidLock {
    // runs outside any async context, so std::fs
    fn drop(&mut self) {
        let recorded = std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|contents| parse_pid(&contents));
        if recorded == Some(self.pid) {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), "Failed to remove pid file: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A pid that is very unlikely to exist
    const DEAD_PID: u32 = 4_000_000;

    #[test]
    fn test_own_process_is_alive() {
        assert!(is_process_alive(std::process::id()));
        assert!(!is_process_alive(0));
        assert!(!is_process_alive(DEAD_PID));
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.pid");

        let lock = PidLock::acquire(&path).await.unwrap();
        assert_eq!(read_pid(&path).await, Some(std::process::id()));

        lock.release();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_stale_pid_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        std::fs::write(&path, format!("{}\n", DEAD_PID)).unwrap();

        let _lock = PidLock::acquire(&path).await.unwrap();
        assert_eq!(read_pid(&path).await, Some(std::process::id()));
    }

    #[tokio::test]
    async fn test_garbage_pid_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        std::fs::write(&path, "not a pid").unwrap();

        let _lock = PidLock::acquire(&path).await.unwrap();
        assert_eq!(read_pid(&path).await, Some(std::process::id()));
    }

    #[tokio::test]
    async fn test_live_pid_blocks_acquire() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        // pid 1 is always alive
        std::fs::write(&path, "1\n").unwrap();

        match PidLock::acquire(&path).await {
            Err(SwarmError::Lifecycle(message)) => {
                assert_eq!(message, "daemon already running (pid 1)")
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(read_pid(&path).await, Some(1));
    }

    #[tokio::test]
    async fn test_live_pid_removes_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        std::fs::write(&path, format!("{}", DEAD_PID)).unwrap();

        assert_eq!(live_pid(&path).await, None);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_drop_keeps_foreign_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.pid");

        let lock = PidLock::acquire(&path).await.unwrap();
        std::fs::write(&path, "1\n").unwrap();
        drop(lock);

        assert_eq!(read_pid(&path).await, Some(1));
    }
}
