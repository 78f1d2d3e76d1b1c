//! Detached background work.
//!
//! Work spawned here runs after the caller has moved on: the caller never
//! awaits it and never sees its outcome. Failures are logged at `warn` and
//! dropped. A [`TaskTracker`] keeps count of what is still in flight so
//! tests and graceful shutdown can wait for it.

use std::fmt::Display;
use std::future::Future;

use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Spawner for fire-and-forget tasks.
///
/// Cloning is cheap; clones share one tracker.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work` on the tokio runtime without waiting for it.
    ///
    /// An `Err` from `work` is logged with `label` and swallowed.
    pub fn spawn<F, E>(&self, label: &'static str, work: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.tracker.spawn(async move {
            match work.await {
                Ok(()) => debug!(task = label, "background task finished"),
                Err(e) => warn!(task = label, error = %e, "background task failed"),
            }
        });
    }

    /// Number of spawned tasks that have not finished.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Waits until every task spawned so far has finished, then accepts new
    /// work again.
    ///
    /// Not safe to call from two places at once: one caller's reopen can
    /// leave the other's wait pending until the tracker is closed again,
    /// which may be never. Only shutdown and tests call it, one at a time.
    pub async fn settle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
