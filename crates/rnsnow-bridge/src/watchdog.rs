//! Liveness monitoring.
//!
//! Every long-running pump calls [`Watchdog::feed`] once per iteration. If no
//! feed arrives within the timeout the reset action runs; on a device that is
//! a hard reset, on a host the process exits and its supervisor restarts it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::error;

pub trait Watchdog: Send + Sync {
    fn feed(&self);
}

/// A watchdog that never fires.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopWatchdog;

impl Watchdog for NoopWatchdog {
    fn feed(&self) {}
}

/// Software watchdog running as a task on the current runtime.
#[derive(Debug)]
pub struct SoftWatchdog {
    last_feed: Arc<Mutex<Instant>>,
    timeout: Duration,
    monitor: JoinHandle<()>,
}

impl SoftWatchdog {
    /// Start monitoring. `on_expire` runs once, with the timeout, when feeding stops.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F>(timeout: Duration, on_expire: F) -> Self
    where
        F: FnOnce(Duration) + Send + 'static,
    {
        let last_feed = Arc::new(Mutex::new(Instant::now()));
        let monitor = tokio::spawn(monitor(Arc::clone(&last_feed), timeout, on_expire));
        Self {
            last_feed,
            timeout,
            monitor,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether the reset action has already run.
    pub fn expired(&self) -> bool {
        self.monitor.is_finished()
    }
}

impl Watchdog for SoftWatchdog {
    fn feed(&self) {
        *lock(&self.last_feed) = Instant::now();
    }
}

impl Drop for SoftWatchdog {
    fn drop(&mut self) {
        self.monitor.abort();
    }
}

async fn monitor<F>(last_feed: Arc<Mutex<Instant>>, timeout: Duration, on_expire: F)
where
    F: FnOnce(Duration) + Send + 'static,
{
    loop {
        let deadline = *lock(&last_feed) + timeout;
        if Instant::now() >= deadline {
            error!(timeout_ms = timeout.as_millis() as u64, "watchdog expired");
            on_expire(timeout);
            return;
        }
        tokio::time::sleep_until(deadline).await;
    }
}

fn lock(mutex: &Mutex<Instant>) -> std::sync::MutexGuard<'_, Instant> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
