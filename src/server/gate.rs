//! Shutdown gate: tracks in-flight tasks and refuses new ones once closed.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct Gate {
    tracker: TaskTracker,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` under the gate, or fail with `GateClosed`.
    pub fn spawn<F>(&self, task: F) -> Result<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self.tracker.is_closed() {
            return Err(Error::GateClosed);
        }
        Ok(self.tracker.spawn(task))
    }

    /// Refuse new tasks and wait for every tracked task to finish.
    pub async fn close(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
