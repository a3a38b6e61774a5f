//! Waiting for filesystem state
//!
//! Waits wake on `notify` events for a directory and on a periodic tick,
//! whichever comes first, so a missed event only costs one poll interval.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    pub timeout: Duration,
    /// Fallback re-check interval
    pub poll_interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl WaitOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    TimedOut,
}

/// Wait until `condition` holds or the timeout elapses.
///
/// `condition` is re-evaluated on every wake-up. Dropping the returned
/// future cancels the wait and its watcher.
pub async fn wait_until<F, Fut>(mut condition: F, watch_dir: &Path, options: WaitOptions) -> WaitOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    if condition().await {
        return WaitOutcome::Ready;
    }

    let (tx, mut events) = mpsc::unbounded_channel();
    // kept alive for the duration of the wait
    let _watcher = match watch(watch_dir, tx) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!(dir = %watch_dir.display(), "Filesystem watch unavailable, polling: {}", e);
            None
        }
    };

    let deadline = time::sleep(options.timeout);
    tokio::pin!(deadline);

    let mut ticker = time::interval(options.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                return if condition().await { WaitOutcome::Ready } else { WaitOutcome::TimedOut };
            }
            _ = ticker.tick() => {}
            Some(()) = events.recv() => {}
        }

        if condition().await {
            return WaitOutcome::Ready;
        }
    }
}

fn watch(dir: &Path, tx: mpsc::UnboundedSender<()>) -> notify::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        if event.is_ok() {
            let _ = tx.send(());
        }
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}
