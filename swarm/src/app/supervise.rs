//! Daemon supervision from the command surface
//!
//! `daemon start` spawns the current executable as `daemon run` in its own
//! process group and waits for the pid file to appear. `daemon stop` sends
//! SIGTERM and waits for the process to go away.

use std::path::Path;
use std::process::Stdio;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::{info, warn};

use crate::app::options::SupervisorOptions;
use crate::errors::SwarmError;
use crate::runtime::pidfile::{is_process_alive, live_pid, read_pid};
use crate::runtime::{wait_until, RuntimeLayout, WaitOptions, WaitOutcome};

/// Whether a daemon is recorded and alive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonStatus {
    Running(u32),
    NotRunning,
}

/// Outcome of `daemon start`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started(u32),
    AlreadyRunning(u32),
}

/// Outcome of `daemon stop`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped(u32),
    NotRunning,
}

/// Report the recorded daemon, removing a stale pid file
pub async fn daemon_status(layout: &RuntimeLayout) -> DaemonStatus {
    match live_pid(layout.pid_file().path()).await {
        Some(pid) => DaemonStatus::Running(pid),
        None => DaemonStatus::NotRunning,
    }
}

/// Spawn a background daemon and wait for it to record its pid
pub async fn start_daemon(
    layout: &RuntimeLayout,
    options: &SupervisorOptions,
) -> Result<StartOutcome, SwarmError> {
    if let DaemonStatus::Running(pid) = daemon_status(layout).await {
        return Ok(StartOutcome::AlreadyRunning(pid));
    }
    layout.setup().await?;

    let executable = std::env::current_exe()?;
    let child = tokio::process::Command::new(&executable)
        .arg("--runtime-dir")
        .arg(&layout.base_dir)
        .args(["daemon", "run"])
        .process_group(0)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| SwarmError::Lifecycle(format!("failed to spawn daemon: {}", e)))?;
    info!(pid = ?child.id(), executable = %executable.display(), "Spawned daemon");

    let pid_file = layout.pid_file();
    let pid_path = pid_file.path();
    let outcome = wait_until(
        move || async move { read_pid(pid_path).await.is_some_and(is_process_alive) },
        &layout.base_dir,
        wait_options(options.start_timeout, options),
    )
    .await;

    match (outcome, read_pid(pid_path).await) {
        (WaitOutcome::Ready, Some(pid)) => Ok(StartOutcome::Started(pid)),
        _ => Err(SwarmError::Lifecycle("failed to start daemon".to_string())),
    }
}

/// Signal the recorded daemon to stop and wait for it to exit
pub async fn stop_daemon(
    layout: &RuntimeLayout,
    options: &SupervisorOptions,
) -> Result<StopOutcome, SwarmError> {
    let pid_file = layout.pid_file();
    let Some(pid) = live_pid(pid_file.path()).await else {
        return Ok(StopOutcome::NotRunning);
    };

    send_sigterm(pid)?;
    info!(pid, "Sent SIGTERM to daemon");

    let outcome = wait_until(
        move || async move { !is_process_alive(pid) },
        pid_parent(pid_file.path()),
        wait_options(options.stop_timeout, options),
    )
    .await;

    if outcome == WaitOutcome::TimedOut {
        return Err(SwarmError::Lifecycle(format!(
            "daemon (pid {}) did not exit within {:?}",
            pid, options.stop_timeout
        )));
    }

    if read_pid(pid_file.path()).await == Some(pid) {
        warn!(pid, "Daemon left its pid file behind, removing it");
        pid_file.delete().await?;
    }
    Ok(StopOutcome::Stopped(pid))
}

fn send_sigterm(pid: u32) -> Result<(), SwarmError> {
    let raw = i32::try_from(pid)
        .map_err(|_| SwarmError::Lifecycle(format!("invalid pid {}", pid)))?;
    kill(Pid::from_raw(raw), Signal::SIGTERM)
        .map_err(|e| SwarmError::Lifecycle(format!("failed to signal pid {}: {}", pid, e)))
}

fn pid_parent(pid_file: &Path) -> &Path {
    pid_file.parent().unwrap_or(pid_file)
}

fn wait_options(timeout: std::time::Duration, options: &SupervisorOptions) -> WaitOptions {
    WaitOptions {
        timeout,
        poll_interval: options.poll_interval,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_status_without_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RuntimeLayout::new(dir.path());
        assert_eq!(daemon_status(&layout).await, DaemonStatus::NotRunning);
    }

    #[tokio::test]
    async fn test_status_removes_stale_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RuntimeLayout::new(dir.path());
        std::fs::write(layout.pid_file().path(), "4000000\n").unwrap();

        assert_eq!(daemon_status(&layout).await, DaemonStatus::NotRunning);
        assert!(!layout.pid_file().path().exists());
    }

    #[tokio::test]
    async fn test_status_reports_live_pid() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RuntimeLayout::new(dir.path());
        let pid = std::process::id();
        std::fs::write(layout.pid_file().path(), format!("{}\n", pid)).unwrap();

        assert_eq!(daemon_status(&layout).await, DaemonStatus::Running(pid));
    }

    #[tokio::test]
    async fn test_stop_when_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RuntimeLayout::new(dir.path());
        let outcome = stop_daemon(&layout, &SupervisorOptions::default()).await.unwrap();
        assert_eq!(outcome, StopOutcome::NotRunning);
    }

    #[tokio::test]
    async fn test_stop_terminates_process() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RuntimeLayout::new(dir.path());

        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id();
        std::fs::write(layout.pid_file().path(), format!("{}\n", pid)).unwrap();

        // reap the child so it does not linger as a zombie
        let reaper = std::thread::spawn(move || child.wait());

        let outcome = stop_daemon(&layout, &SupervisorOptions::default()).await.unwrap();
        assert_eq!(outcome, StopOutcome::Stopped(pid));
        assert!(!layout.pid_file().path().exists());
        reaper.join().unwrap().unwrap();
    }
}
