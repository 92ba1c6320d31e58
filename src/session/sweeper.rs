//! Background TTL sweep for the session agent cache.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::cache::SessionAgentCache;

/// Handle to a running sweeper task.
#[derive(Debug)]
pub struct SweeperHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to exit.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "session sweeper exited abnormally");
        }
    }
}

/// Spawn a task that calls [`SessionAgentCache::sweep`] every `interval`.
pub fn spawn_sweeper(cache: SessionAgentCache, interval: Duration) -> SweeperHandle {
    let token = CancellationToken::new();
    let task_token = token.clone();
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = task_token.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = cache.sweep().await;
                    if evicted > 0 {
                        tracing::info!(evicted, remaining = cache.len(), "session sweep");
                    } else {
                        tracing::trace!(remaining = cache.len(), "session sweep");
                    }
                }
            }
        }
        tracing::debug!("session sweeper stopped");
    });
    SweeperHandle { token, task }
}
