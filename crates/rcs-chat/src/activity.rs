// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Session inactivity tracking.
//!
//! Every media-plane exchange refreshes the last-activity timestamp; when
//! the idle timeout elapses the session is aborted. The watcher task is
//! bound to the session lifetime and stops on shutdown.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Tracks last activity and waits out the idle timeout.
pub struct ActivityManager {
    last_activity: Mutex<Instant>,
    timeout: Duration,
    shutdown: Notify,
}

impl ActivityManager {
    pub fn new(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            last_activity: Mutex::new(Instant::now()),
            timeout,
            shutdown: Notify::new(),
        })
    }

    /// Refreshes the last-activity timestamp.
    pub fn update(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Stops a pending [`wait_idle`](Self::wait_idle).
    pub fn stop(&self) {
        self.shutdown.notify_waiters();
    }

    /// Resolves `true` when the session has been idle for the configured
    /// timeout, `false` when stopped first. A zero timeout never fires.
    pub async fn wait_idle(&self) -> bool {
        if self.timeout.is_zero() {
            self.shutdown.notified().await;
            return false;
        }
        loop {
            let elapsed = self.last_activity.lock().elapsed();
            if elapsed >= self.timeout {
                return true;
            }
            let remaining = self.timeout - elapsed;
            tokio::select! {
                _ = tokio::time::sleep(remaining) => {}
                _ = self.shutdown.notified() => return false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_after_idle_timeout() {
        let manager = ActivityManager::new(Duration::from_secs(5));
        assert!(manager.wait_idle().await);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_defers_the_timeout() {
        let manager = ActivityManager::new(Duration::from_secs(5));
        let watcher = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.wait_idle().await })
        };

        tokio::time::sleep(Duration::from_secs(3)).await;
        manager.update();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!watcher.is_finished());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(watcher.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_the_wait() {
        let manager = ActivityManager::new(Duration::from_secs(60));
        let watcher = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.wait_idle().await })
        };
        tokio::task::yield_now().await;
        manager.stop();
        assert!(!watcher.await.unwrap());
    }
}
