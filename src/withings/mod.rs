//! Withings health data integration.
//!
//! # Overview
//!
//! - [`validate_config_schema`]: validates the static `withings` block
//! - [`WithingsFlow`]: links an account through OAuth, and relinks it on reauth
//! - [`WithingsApi`] / [`WithingsClient`]: access to the Withings health API
//! - [`WithingsOAuth`]: the Withings OAuth 2.0 endpoints
//! - [`DataManager`]: per-entry refresh, polling and push subscriptions
//! - [`WithingsWebhookHandler`]: receives push notifications
//! - [`WithingsIntegration`]: plugs the above into a [`Hub`]
//!
//! # Modes
//!
//! With `use_webhook = false` an entry polls every ten minutes and never
//! touches the remote subscription API. With `use_webhook = true` the entry's
//! webhook is registered at setup, remote subscriptions are established after
//! [`HubConfig::webhook_subscribe_delay`](crate::HubConfig::webhook_subscribe_delay),
//! and every accepted push triggers a refresh.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use hub_integrations::withings::WithingsIntegration;
//! use hub_integrations::Hub;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let hub = Hub::builder()
//!     .integration(Arc::new(WithingsIntegration::new()))
//!     .build();
//!
//! hub.async_setup(&json!({
//!     "withings": {"client_id": "my_client_id", "client_secret": "my_client_secret"}
//! }))
//! .await
//! .unwrap();
//! assert!(hub.entries("withings").is_empty());
//! # });
//! ```

mod api;
mod config_flow;
mod data_manager;
mod entry;
mod oauth;
mod schema;
mod webhook;

pub use api::{
    ApiError, Measure, MeasureGetMeasResponse, MeasureGroup, NotifySubscription, WithingsApi,
    WithingsClient,
};
pub use config_flow::{WithingsFlow, WithingsStep, STEP_AUTH};
pub use data_manager::DataManager;
pub use entry::{migrate, use_webhook_option, WithingsEntryData, CURRENT_VERSION};
pub use oauth::WithingsOAuth;
pub use schema::{validate_config_schema, WithingsConfig};
pub use webhook::{parse_notification, NotificationCode, WithingsWebhookHandler};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::auth::oauth::OAuthProvider;
use crate::entries::{ConfigEntry, EntryUpdate};
use crate::flow::{FlowContext, FlowError, FlowHandler};
use crate::hub::{Hub, Integration, SetupError};
use crate::BoxFuture;

/// Integration domain.
pub const DOMAIN: &str = "withings";

/// Withings notification categories (`appli` codes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NotifyAppli {
    /// Weight and body composition.
    Weight,
    /// Heart rate and blood pressure.
    Circulatory,
    /// Activity.
    Activity,
    /// Sleep.
    Sleep,
    /// User account changes.
    User,
    /// The user got into bed.
    BedIn,
    /// The user got out of bed.
    BedOut,
    /// Sleep sensor setup finished.
    InflateDone,
}

impl NotifyAppli {
    /// Numeric code used by the API.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Weight => 1,
            Self::Circulatory => 4,
            Self::Activity => 16,
            Self::Sleep => 44,
            Self::User => 46,
            Self::BedIn => 50,
            Self::BedOut => 51,
            Self::InflateDone => 52,
        }
    }
}

impl TryFrom<i64> for NotifyAppli {
    /// The unknown code.
    type Error = i64;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Weight),
            4 => Ok(Self::Circulatory),
            16 => Ok(Self::Activity),
            44 => Ok(Self::Sleep),
            46 => Ok(Self::User),
            50 => Ok(Self::BedIn),
            51 => Ok(Self::BedOut),
            52 => Ok(Self::InflateDone),
            other => Err(other),
        }
    }
}

/// Categories subscribed in webhook mode.
pub const SUBSCRIBE_APPLIS: [NotifyAppli; 4] = [
    NotifyAppli::Weight,
    NotifyAppli::Circulatory,
    NotifyAppli::Activity,
    NotifyAppli::Sleep,
];

/// Categories always revoked in webhook mode.
pub const EXCLUDE_APPLIS: [NotifyAppli; 2] = [NotifyAppli::BedIn, NotifyAppli::BedOut];

/// The Withings integration.
pub struct WithingsIntegration {
    api: Arc<dyn WithingsApi>,
    oauth_override: Option<Arc<dyn OAuthProvider>>,
    config: Mutex<Option<WithingsConfig>>,
    oauth: Mutex<Option<Arc<dyn OAuthProvider>>>,
    managers: Mutex<HashMap<String, Arc<DataManager>>>,
}

impl std::fmt::Debug for WithingsIntegration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WithingsIntegration")
            .field("config", &*lock(&self.config))
            .field("managers", &lock(&self.managers).len())
            .finish_non_exhaustive()
    }
}

impl Default for WithingsIntegration {
    fn default() -> Self {
        Self::new()
    }
}

impl WithingsIntegration {
    /// Creates the integration with the HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self::with_api(Arc::new(WithingsClient::new()))
    }

    /// Creates the integration with a custom API implementation.
    #[must_use]
    pub fn with_api(api: Arc<dyn WithingsApi>) -> Self {
        Self {
            api,
            oauth_override: None,
            config: Mutex::new(None),
            oauth: Mutex::new(None),
            managers: Mutex::new(HashMap::new()),
        }
    }

    /// Uses `provider` instead of the one built from static configuration.
    #[must_use]
    pub fn with_oauth_provider(mut self, provider: Arc<dyn OAuthProvider>) -> Self {
        *lock(&self.oauth) = Some(Arc::clone(&provider));
        self.oauth_override = Some(provider);
        self
    }

    /// Returns the validated static configuration, if any.
    #[must_use]
    pub fn config(&self) -> Option<WithingsConfig> {
        lock(&self.config).clone()
    }

    /// Returns the data manager of a loaded entry.
    #[must_use]
    pub fn data_manager(&self, entry_id: &str) -> Option<Arc<DataManager>> {
        lock(&self.managers).get(entry_id).cloned()
    }

    fn oauth(&self) -> Option<Arc<dyn OAuthProvider>> {
        lock(&self.oauth).clone()
    }

    fn apply_config(&self, config: &Value) -> Result<(), SetupError> {
        let Some(config) = validate_config_schema(config)? else {
            return Ok(());
        };

        if self.oauth_override.is_none() {
            let provider = WithingsOAuth::new(config.client_id.clone(), config.client_secret.clone());
            *lock(&self.oauth) = Some(Arc::new(provider));
        }
        tracing::debug!("Withings configured, use_webhook={}", config.use_webhook);
        *lock(&self.config) = Some(config);
        Ok(())
    }

    async fn setup(&self, hub: &Hub, entry: &ConfigEntry) -> Result<(), SetupError> {
        let data = WithingsEntryData::from_entry(entry)?;
        let use_webhook = use_webhook_option(entry);
        let webhook_url = if use_webhook {
            hub.webhook_url(&data.webhook_id)
        } else {
            None
        };

        let manager = Arc::new(DataManager::new(
            hub.downgrade(),
            entry.entry_id.clone(),
            Arc::clone(&self.api),
            self.oauth(),
            data.token,
            use_webhook,
            webhook_url,
        ));

        if use_webhook {
            let handler = WithingsWebhookHandler::new(Arc::clone(&manager), hub.tasks().clone());
            hub.register_webhook(&data.webhook_id, DOMAIN, &entry.entry_id, Arc::new(handler))?;
        }

        manager.refresh().await.map_err(|err| {
            if err.is_auth_error() {
                SetupError::AuthFailed {
                    message: err.to_string(),
                }
            } else {
                SetupError::NotReady {
                    message: err.to_string(),
                }
            }
        })?;

        manager.start(hub.tasks(), hub.config().webhook_subscribe_delay());
        if let Some(previous) = lock(&self.managers).insert(entry.entry_id.clone(), manager) {
            previous.stop();
        }
        tracing::info!(
            "Withings entry {} set up ({})",
            entry.title,
            if use_webhook { "webhook" } else { "polling" }
        );
        Ok(())
    }
}

impl Integration for WithingsIntegration {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    fn async_setup<'a>(
        &'a self,
        _hub: &'a Hub,
        config: &'a Value,
    ) -> BoxFuture<'a, Result<(), SetupError>> {
        let result = self.apply_config(config);
        Box::pin(async move { result })
    }

    fn create_flow(
        &self,
        hub: &Hub,
        flow_id: &str,
        context: &FlowContext,
    ) -> Result<Box<dyn FlowHandler>, FlowError> {
        let use_webhook = self.config().is_some_and(|c| c.use_webhook);
        Ok(Box::new(WithingsFlow::new(
            flow_id,
            context.clone(),
            hub.config().clone(),
            self.oauth(),
            use_webhook,
        )))
    }

    fn migrate_entry(&self, entry: &ConfigEntry) -> Result<Option<EntryUpdate>, SetupError> {
        migrate(entry, self.config().map(|c| c.use_webhook))
    }

    fn setup_entry<'a>(
        &'a self,
        hub: &'a Hub,
        entry: &'a ConfigEntry,
    ) -> BoxFuture<'a, Result<(), SetupError>> {
        Box::pin(self.setup(hub, entry))
    }

    fn unload_entry<'a>(&'a self, _hub: &'a Hub, entry_id: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let manager = lock(&self.managers).remove(entry_id);
            if let Some(manager) = manager {
                manager.shutdown().await;
            }
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
