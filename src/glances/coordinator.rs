//! Periodic Glances data refresh.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::task::AbortHandle;

use super::api::{GlancesApi, GlancesError, GlancesUserInput};

/// Keeps the latest snapshot of one Glances server.
pub struct GlancesCoordinator {
    api: Arc<dyn GlancesApi>,
    target: GlancesUserInput,
    data: Mutex<Option<Value>>,
    timer: Mutex<Option<AbortHandle>>,
}

impl std::fmt::Debug for GlancesCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlancesCoordinator")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl GlancesCoordinator {
    /// Interval between refreshes.
    pub const UPDATE_INTERVAL: Duration = Duration::from_secs(60);

    /// Creates a coordinator without data.
    #[must_use]
    pub fn new(api: Arc<dyn GlancesApi>, target: GlancesUserInput) -> Self {
        Self {
            api,
            target,
            data: Mutex::new(None),
            timer: Mutex::new(None),
        }
    }

    /// Fetches a fresh snapshot.
    ///
    /// # Errors
    ///
    /// Returns the API error; the previous snapshot is kept.
    pub async fn refresh(&self) -> Result<(), GlancesError> {
        let data = self.api.get_ha_sensor_data(&self.target).await?;
        *self.data.lock().unwrap_or_else(PoisonError::into_inner) = Some(data);
        Ok(())
    }

    /// Returns the latest snapshot.
    #[must_use]
    pub fn data(&self) -> Option<Value> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Starts refreshing every [`Self::UPDATE_INTERVAL`].
    ///
    /// The timer task holds a reference to the coordinator until
    /// [`stop`](Self::stop) is called.
    pub fn start(self: &Arc<Self>) {
        let coordinator = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let period = GlancesCoordinator::UPDATE_INTERVAL;
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                interval.tick().await;
                if let Err(err) = coordinator.refresh().await {
                    tracing::warn!(
                        "Error fetching Glances data from {}: {}",
                        coordinator.target.title(),
                        err
                    );
                }
            }
        });

        let previous = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle.abort_handle());
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Stops the refresh timer.
    pub fn stop(&self) {
        if let Some(handle) = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}
