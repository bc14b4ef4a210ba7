//! Idle-triggered flushing of resident tiles
//!
//! A background task wakes every interval and drops all resident tiles once
//! the cache has gone untouched for longer than the interval. Bursts of
//! activity keep pushing the deadline forward, so the flush only fires after
//! a genuine idle window.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use super::tile_cache::{CacheShared, TileCache};

impl TileCache {
    /// Start the auto-flush scheduler, restarting it if already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enable_auto_flush(&self) {
        let interval = *self.auto_flush_interval.lock().unwrap();
        let mut task = self.flush_task.lock().unwrap();
        if let Some(old) = task.take() {
            old.abort();
        }
        *task = Some(spawn_flush_task(self.shared.clone(), interval));
    }

    /// Stop the auto-flush scheduler. Idempotent.
    pub fn disable_auto_flush(&self) {
        if let Some(task) = self.flush_task.lock().unwrap().take() {
            task.abort();
        }
    }

    /// Whether the auto-flush scheduler is currently running
    pub fn auto_flush_enabled(&self) -> bool {
        self.flush_task.lock().unwrap().is_some()
    }

    /// Change the auto-flush period and idle window.
    ///
    /// Cancels and restarts a running scheduler. A zero interval is ignored.
    pub fn set_auto_flush_interval(&self, interval: Duration) {
        if interval.is_zero() {
            return;
        }
        *self.auto_flush_interval.lock().unwrap() = interval;
        if self.auto_flush_enabled() {
            self.enable_auto_flush();
        }
    }

    /// Current auto-flush period
    pub fn auto_flush_interval(&self) -> Duration {
        *self.auto_flush_interval.lock().unwrap()
    }
}

fn spawn_flush_task(shared: Arc<CacheShared>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if shared.idle() <= interval {
                continue;
            }
            let flushed = {
                let mut state = shared.state.lock().unwrap();
                state.flush_resident()
            };
            if flushed > 0 {
                debug!("Auto-flush dropped {} resident tiles after idle window", flushed);
            }
        }
    })
}
