//! Fire-and-forget background work.
//!
//! Handlers hand side effects (notifications and the like) to the runner and
//! return immediately. Failures and panics stay inside the task boundary and
//! are logged. Every task is tracked so draining can wait for them.

use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use tokio_util::task::TaskTracker;

use crate::observability::metrics;

/// Runs and tracks background tasks.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTaskRunner {
    tracker: TaskTracker,
}

impl BackgroundTaskRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task` and return without waiting for it.
    pub fn run<F, E>(&self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.tracker.spawn(async move {
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => {
                    tracing::debug!(task = name, "Background task finished");
                    metrics::record_background_task("ok");
                }
                Ok(Err(e)) => {
                    tracing::error!(task = name, error = %e, "Background task failed");
                    metrics::record_background_task("error");
                }
                Err(payload) => {
                    tracing::error!(
                        task = name,
                        panic = %panic_message(payload.as_ref()),
                        "Background task panicked"
                    );
                    metrics::record_background_task("panic");
                }
            }
        });
    }

    /// Number of tasks still running.
    pub fn outstanding(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every outstanding task, giving up after `limit`.
    ///
    /// Tasks scheduled while waiting are waited for too. Returns `false` if
    /// the limit elapsed first.
    pub async fn close_and_wait(&self, limit: Duration) -> bool {
        self.tracker.close();
        tokio::time::timeout(limit, self.tracker.wait()).await.is_ok()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
