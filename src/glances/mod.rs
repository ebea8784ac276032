//! Glances system monitor integration.
//!
//! # Overview
//!
//! - [`GlancesFlow`]: the config flow collecting connection parameters
//! - [`GlancesApi`] / [`GlancesClient`]: access to a Glances server
//! - [`GlancesCoordinator`]: keeps the latest snapshot of each configured server
//! - [`GlancesIntegration`]: plugs the above into a [`Hub`]
//!
//! An entry's data is the submitted [`GlancesUserInput`]; its title is
//! `host:port`. One entry per host and port is allowed.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use hub_integrations::glances::GlancesIntegration;
//! use hub_integrations::Hub;
//!
//! let hub = Hub::builder()
//!     .integration(Arc::new(GlancesIntegration::new()))
//!     .build();
//! assert!(hub.entries("glances").is_empty());
//! ```

mod api;
mod config_flow;
mod coordinator;

pub use api::{GlancesApi, GlancesClient, GlancesError, GlancesUserInput};
pub use config_flow::{GlancesFlow, GlancesStep};
pub use coordinator::GlancesCoordinator;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::entries::ConfigEntry;
use crate::flow::{FlowContext, FlowError, FlowHandler};
use crate::hub::{Hub, Integration, SetupError};
use crate::BoxFuture;

/// Integration domain.
pub const DOMAIN: &str = "glances";

/// The Glances integration.
pub struct GlancesIntegration {
    api: Arc<dyn GlancesApi>,
    coordinators: Mutex<HashMap<String, Arc<GlancesCoordinator>>>,
}

impl std::fmt::Debug for GlancesIntegration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlancesIntegration")
            .field("coordinators", &self.lock().len())
            .finish_non_exhaustive()
    }
}

impl Default for GlancesIntegration {
    fn default() -> Self {
        Self::new()
    }
}

impl GlancesIntegration {
    /// Creates the integration with the HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self::with_api(Arc::new(GlancesClient::new()))
    }

    /// Creates the integration with a custom API implementation.
    #[must_use]
    pub fn with_api(api: Arc<dyn GlancesApi>) -> Self {
        Self {
            api,
            coordinators: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the coordinator of a loaded entry.
    #[must_use]
    pub fn coordinator(&self, entry_id: &str) -> Option<Arc<GlancesCoordinator>> {
        self.lock().get(entry_id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<GlancesCoordinator>>> {
        self.coordinators
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn setup(&self, entry: &ConfigEntry) -> Result<(), SetupError> {
        let target = GlancesUserInput::from_value(Value::Object(entry.data.clone())).map_err(
            |e| SetupError::InvalidEntry {
                message: e.to_string(),
            },
        )?;

        let coordinator = Arc::new(GlancesCoordinator::new(Arc::clone(&self.api), target));
        coordinator.refresh().await.map_err(|err| match err {
            GlancesError::Authorization => SetupError::AuthFailed {
                message: err.to_string(),
            },
            other => SetupError::NotReady {
                message: other.to_string(),
            },
        })?;

        coordinator.start();
        if let Some(previous) = self.lock().insert(entry.entry_id.clone(), coordinator) {
            previous.stop();
        }
        tracing::info!("Glances entry {} set up", entry.title);
        Ok(())
    }
}

impl Integration for GlancesIntegration {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    fn create_flow(
        &self,
        _hub: &Hub,
        _flow_id: &str,
        _context: &FlowContext,
    ) -> Result<Box<dyn FlowHandler>, FlowError> {
        Ok(Box::new(GlancesFlow::new(Arc::clone(&self.api))))
    }

    fn setup_entry<'a>(
        &'a self,
        _hub: &'a Hub,
        entry: &'a ConfigEntry,
    ) -> BoxFuture<'a, Result<(), SetupError>> {
        Box::pin(self.setup(entry))
    }

    fn unload_entry<'a>(&'a self, _hub: &'a Hub, entry_id: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if let Some(coordinator) = self.lock().remove(entry_id) {
                coordinator.stop();
            }
        })
    }
}
