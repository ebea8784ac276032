//! Tracked background tasks and the settle barrier.
//!
//! Work that must not race entry teardown (webhook-triggered refreshes,
//! delayed subscriptions, entry setup after a flow) is spawned through a
//! [`TaskTracker`]. [`TaskTracker::block_till_done`] waits until every tracked
//! task has finished, including tasks spawned by tasks that were being
//! awaited.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::{AbortHandle, JoinHandle};

/// Handle to the set of tracked tasks. Cloning shares the set.
#[derive(Clone, Debug, Default)]
pub struct TaskTracker {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl TaskTracker {
    /// Scheduler turns granted to freshly woken tasks before the pending set
    /// is inspected.
    const SETTLE_YIELDS: usize = 8;

    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a tracked task on the current Tokio runtime.
    ///
    /// Aborting the task through the returned handle also releases it from
    /// the barrier.
    pub fn spawn<F>(&self, future: F) -> AbortHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        let abort = handle.abort_handle();
        let mut handles = self.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        abort
    }

    /// Returns the number of tracked tasks that have not finished yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().iter().filter(|h| !h.is_finished()).count()
    }

    /// Waits until all tracked tasks have completed.
    ///
    /// Timers that already fired get a chance to run (and spawn tracked work)
    /// before the set is checked, so this is safe to call right after
    /// advancing a paused clock.
    pub async fn block_till_done(&self) {
        loop {
            for _ in 0..Self::SETTLE_YIELDS {
                tokio::task::yield_now().await;
            }

            let batch = std::mem::take(&mut *self.lock());
            if batch.is_empty() {
                break;
            }

            for handle in batch {
                if let Err(err) = handle.await {
                    if err.is_panic() {
                        tracing::error!("Tracked task panicked: {}", err);
                    }
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
