//! Background work that must not hold up the response.
//!
//! Tasks run detached from the request that scheduled them. Their errors are
//! logged, never returned to a client. Shutdown drains whatever is still
//! outstanding so failures are still reported before the process exits.

use std::future::Future;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

#[derive(Clone, Default)]
pub struct DeferredTasks {
    tracker: TaskTracker,
}

impl DeferredTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `work`; an `Err` is logged under `label`.
    pub fn defer<F>(&self, label: &'static str, work: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.tracker.spawn(async move {
            match work.await {
                Ok(()) => debug!("deferred task `{}` completed", label),
                Err(err) => warn!(task = label, error = %err, "deferred task failed"),
            }
        });
    }

    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every task scheduled so far has finished.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
