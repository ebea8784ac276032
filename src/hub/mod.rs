//! The hub host: integrations, config entries, flows, webhooks and tasks.
//!
//! # Overview
//!
//! - [`Hub`]: cheap-to-clone handle to the host state
//! - [`HubBuilder`]: registers integrations and the [`HubConfig`]
//! - [`Integration`]: the trait every integration implements
//! - [`TaskTracker`]: tracked background tasks and the settle barrier
//! - [`SetupError`] / [`HubError`]: failure reporting
//!
//! Hub state sits behind short, synchronous critical sections. No lock is
//! held while an integration, a flow or a webhook handler runs.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use hub_integrations::flow::{FlowContext, FlowResult};
//! use hub_integrations::glances::GlancesIntegration;
//! use hub_integrations::Hub;
//!
//! # tokio_test::block_on(async {
//! let hub = Hub::builder()
//!     .integration(Arc::new(GlancesIntegration::new()))
//!     .build();
//!
//! let result = hub.flow_init("glances", FlowContext::user()).await.unwrap();
//! assert!(matches!(result, FlowResult::Form { ref step_id, .. } if step_id == "user"));
//! assert_eq!(hub.flow_progress().len(), 1);
//! # });
//! ```

mod errors;
mod http;
mod integration;
mod tasks;

pub use errors::{HubError, SetupError};
pub use integration::Integration;
pub use tasks::TaskTracker;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tokio::task::AbortHandle;

use crate::auth::oauth::StateClaims;
use crate::config::{HubConfig, WebhookId};
use crate::entries::{ConfigEntries, ConfigEntry, EntryError, EntryState, EntryUpdate, Source};
use crate::flow::{FlowContext, FlowError, FlowManager, FlowProgress, FlowResult, FlowStep};
use crate::webhooks::{
    WebhookError, WebhookHandler, WebhookRegistry, WebhookRequest, WebhookResponse,
};

struct HubInner {
    config: HubConfig,
    integrations: HashMap<&'static str, Arc<dyn Integration>>,
    entries: Mutex<ConfigEntries>,
    flows: Mutex<FlowManager>,
    webhooks: Mutex<WebhookRegistry>,
    tasks: TaskTracker,
}

/// Handle to the hub. Cloning shares the same state.
///
/// # Thread Safety
///
/// `Hub` is `Send + Sync` and can be moved into spawned tasks and axum
/// handlers.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

// Verify Hub is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Hub>();
};

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut domains: Vec<_> = self.inner.integrations.keys().collect();
        domains.sort_unstable();
        f.debug_struct("Hub")
            .field("config", &self.inner.config)
            .field("integrations", &domains)
            .field("entries", &self.lock_entries().len())
            .field("webhooks", &self.lock_webhooks().len())
            .finish_non_exhaustive()
    }
}

/// Non-owning handle to a [`Hub`], held by per-entry state so it does not
/// keep the hub alive.
#[derive(Clone, Debug, Default)]
pub struct WeakHub {
    inner: Weak<HubInner>,
}

impl WeakHub {
    /// Returns the hub if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Hub> {
        self.inner.upgrade().map(|inner| Hub { inner })
    }
}

/// Builder for [`Hub`].
#[derive(Default)]
pub struct HubBuilder {
    config: Option<HubConfig>,
    integrations: Vec<Arc<dyn Integration>>,
}

impl std::fmt::Debug for HubBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubBuilder")
            .field("config", &self.config)
            .field("integrations", &self.integrations.len())
            .finish()
    }
}

impl HubBuilder {
    /// Creates a builder with the default [`HubConfig`] and no integrations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the host configuration.
    #[must_use]
    pub fn config(mut self, config: HubConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Registers an integration. A later registration for the same domain
    /// replaces an earlier one.
    #[must_use]
    pub fn integration(mut self, integration: Arc<dyn Integration>) -> Self {
        self.integrations.push(integration);
        self
    }

    /// Builds the hub.
    #[must_use]
    pub fn build(self) -> Hub {
        let integrations = self
            .integrations
            .into_iter()
            .map(|integration| (integration.domain(), integration))
            .collect();

        Hub {
            inner: Arc::new(HubInner {
                config: self.config.unwrap_or_default(),
                integrations,
                entries: Mutex::new(ConfigEntries::new()),
                flows: Mutex::new(FlowManager::default()),
                webhooks: Mutex::new(WebhookRegistry::new()),
                tasks: TaskTracker::new(),
            }),
        }
    }
}

impl Hub {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> HubBuilder {
        HubBuilder::new()
    }

    /// Returns the host configuration.
    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Returns a non-owning handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakHub {
        WeakHub {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Returns the hub's task tracker.
    #[must_use]
    pub fn tasks(&self) -> &TaskTracker {
        &self.inner.tasks
    }

    /// Spawns a tracked task.
    pub fn spawn<F>(&self, future: F) -> AbortHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.tasks.spawn(future)
    }

    /// Waits until every tracked task has finished.
    pub async fn block_till_done(&self) {
        self.inner.tasks.block_till_done().await;
    }

    /// Returns the number of unfinished tracked tasks.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.inner.tasks.pending()
    }

    /// Returns the integration registered for `domain`.
    #[must_use]
    pub fn integration(&self, domain: &str) -> Option<Arc<dyn Integration>> {
        self.inner.integrations.get(domain).cloned()
    }

    fn integration_for(&self, domain: &str) -> Result<Arc<dyn Integration>, HubError> {
        self.integration(domain)
            .ok_or_else(|| HubError::UnknownIntegration {
                domain: domain.to_string(),
            })
    }

    /// Hands the static configuration to every integration.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    pub async fn async_setup(&self, config: &Value) -> Result<(), HubError> {
        let mut integrations: Vec<_> = self.inner.integrations.values().cloned().collect();
        integrations.sort_by_key(|i| i.domain());
        for integration in integrations {
            integration.async_setup(self, config).await?;
        }
        Ok(())
    }

    // Entry store

    /// Stores an entry without setting it up and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`EntryError::AlreadyConfigured`] on a unique id clash.
    pub fn add_entry(&self, entry: ConfigEntry) -> Result<String, HubError> {
        let entry_id = entry.entry_id.clone();
        self.lock_entries().insert(entry)?;
        Ok(entry_id)
    }

    /// Returns a snapshot of an entry.
    #[must_use]
    pub fn entry(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.lock_entries().get(entry_id).cloned()
    }

    /// Returns snapshots of all entries of a domain, in insertion order.
    #[must_use]
    pub fn entries(&self, domain: &str) -> Vec<ConfigEntry> {
        self.lock_entries()
            .for_domain(domain)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Applies an update to a stored entry.
    ///
    /// # Errors
    ///
    /// Returns an [`EntryError`] for unknown entries or unique id clashes.
    pub fn update_entry(&self, entry_id: &str, update: EntryUpdate) -> Result<(), HubError> {
        self.lock_entries().update(entry_id, update)?;
        Ok(())
    }

    // Entry lifecycle

    /// Migrates and sets up an entry, recording the resulting state.
    ///
    /// Setting up a loaded entry does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Setup`] when the integration fails; the entry is
    /// then left in the state given by [`SetupError::entry_state`].
    pub async fn setup_entry(&self, entry_id: &str) -> Result<(), HubError> {
        let entry = self.entry(entry_id).ok_or_else(|| EntryError::UnknownEntry {
            entry_id: entry_id.to_string(),
        })?;
        if entry.state == EntryState::Loaded {
            return Ok(());
        }
        let integration = self.integration_for(&entry.domain)?;

        match self.try_setup(integration.as_ref(), entry).await {
            Ok(()) => {
                self.lock_entries().set_state(entry_id, EntryState::Loaded)?;
                Ok(())
            }
            Err(err) => {
                tracing::warn!("Setup of entry {} failed: {}", entry_id, err);
                self.lock_webhooks().unregister_entry(entry_id);
                self.lock_entries().set_state(entry_id, err.entry_state())?;
                Err(err.into())
            }
        }
    }

    async fn try_setup(
        &self,
        integration: &dyn Integration,
        mut entry: ConfigEntry,
    ) -> Result<(), SetupError> {
        if let Some(update) = integration.migrate_entry(&entry)? {
            tracing::info!(
                "Migrating {} entry {} to version {}",
                entry.domain,
                entry.entry_id,
                update.version.unwrap_or(entry.version)
            );
            self.lock_entries()
                .update(&entry.entry_id, update)
                .map_err(|e| SetupError::Migration {
                    message: e.to_string(),
                })?;
            entry = self
                .entry(&entry.entry_id)
                .ok_or_else(|| SetupError::Migration {
                    message: format!("entry {} disappeared", entry.entry_id),
                })?;
        }

        integration.setup_entry(self, &entry).await
    }

    /// Unloads an entry and releases its webhooks.
    ///
    /// # Errors
    ///
    /// Returns [`EntryError::UnknownEntry`] for a missing entry.
    pub async fn unload_entry(&self, entry_id: &str) -> Result<(), HubError> {
        let entry = self.entry(entry_id).ok_or_else(|| EntryError::UnknownEntry {
            entry_id: entry_id.to_string(),
        })?;

        if entry.state == EntryState::Loaded {
            let integration = self.integration_for(&entry.domain)?;
            integration.unload_entry(self, entry_id).await;
        }
        self.lock_webhooks().unregister_entry(entry_id);
        self.lock_entries().set_state(entry_id, EntryState::NotLoaded)?;
        Ok(())
    }

    /// Unloads and sets up an entry again.
    ///
    /// # Errors
    ///
    /// Returns the unload or setup failure.
    pub async fn reload_entry(&self, entry_id: &str) -> Result<(), HubError> {
        self.unload_entry(entry_id).await?;
        self.setup_entry(entry_id).await
    }

    /// Unloads an entry, aborts its flows and deletes it.
    ///
    /// # Errors
    ///
    /// Returns [`EntryError::UnknownEntry`] for a missing entry.
    pub async fn remove_entry(&self, entry_id: &str) -> Result<ConfigEntry, HubError> {
        self.unload_entry(entry_id).await?;
        self.lock_flows().finish_for_entry(entry_id);
        Ok(self.lock_entries().remove(entry_id)?)
    }

    fn spawn_entry_task(&self, entry_id: String, reload: bool) {
        let hub = self.clone();
        self.inner.tasks.spawn(async move {
            let result = if reload {
                hub.reload_entry(&entry_id).await
            } else {
                hub.setup_entry(&entry_id).await
            };
            if let Err(err) = result {
                tracing::debug!("Background setup of {} ended with: {}", entry_id, err);
            }
        });
    }

    // Config flows

    /// Starts a config flow and runs its first step.
    ///
    /// A reauth flow for an entry that already has one in progress aborts
    /// with `already_in_progress`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::UnknownHandler`] for an unregistered domain, or
    /// the handler's error.
    pub async fn flow_init(
        &self,
        domain: &str,
        context: FlowContext,
    ) -> Result<FlowResult, FlowError> {
        let integration = self
            .integration(domain)
            .ok_or_else(|| FlowError::UnknownHandler {
                domain: domain.to_string(),
            })?;

        let flow_id = FlowManager::new_flow_id();
        let flow = integration.create_flow(self, &flow_id, &context)?;

        {
            let mut flows = self.lock_flows();
            let duplicate_reauth = context.source == Source::Reauth
                && context
                    .entry_id
                    .as_deref()
                    .is_some_and(|entry_id| flows.reauth_in_progress(domain, entry_id));
            if duplicate_reauth {
                return Ok(FlowResult::Abort {
                    flow_id,
                    handler: domain.to_string(),
                    reason: "already_in_progress".to_string(),
                });
            }
            flows.insert(flow_id.clone(), domain.to_string(), context, flow);
        }

        tracing::debug!("Started {} flow {}", domain, flow_id);
        self.run_step(&flow_id, None).await
    }

    /// Submits input to the current step of a flow.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::UnknownFlow`] for finished or unknown flows,
    /// [`FlowError::Busy`] if a step is running, or the handler's error.
    pub async fn flow_configure(
        &self,
        flow_id: &str,
        input: Value,
    ) -> Result<FlowResult, FlowError> {
        self.run_step(flow_id, Some(input)).await
    }

    /// Lists flows waiting for input, oldest first.
    #[must_use]
    pub fn flow_progress(&self) -> Vec<FlowProgress> {
        self.lock_flows().progress()
    }

    /// Starts a reauth flow for an entry.
    ///
    /// # Errors
    ///
    /// Returns [`EntryError::UnknownEntry`] for a missing entry or the flow
    /// failure.
    pub async fn start_reauth(&self, entry_id: &str) -> Result<FlowResult, HubError> {
        let entry = self.entry(entry_id).ok_or_else(|| EntryError::UnknownEntry {
            entry_id: entry_id.to_string(),
        })?;
        Ok(self
            .flow_init(&entry.domain, FlowContext::reauth(entry_id))
            .await?)
    }

    /// Routes an OAuth authorization code to the flow named in `state`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::OAuth`] for a state not signed by this hub, or the
    /// flow failure.
    pub async fn oauth_callback(&self, code: &str, state: &str) -> Result<FlowResult, HubError> {
        let claims = StateClaims::decode(state, self.inner.config.jwt_secret())?;
        let input = serde_json::json!({ "code": code, "state": state });
        Ok(self.flow_configure(&claims.flow_id, input).await?)
    }

    async fn run_step(&self, flow_id: &str, input: Option<Value>) -> Result<FlowResult, FlowError> {
        let (mut flow, handler, context) = self.lock_flows().checkout(flow_id)?;
        let entries = self.entries(&handler);

        let outcome = flow.step(input, &entries).await;
        let step = match outcome {
            Ok(step) => step,
            Err(err) => {
                self.lock_flows().checkin(flow_id, flow, None);
                return Err(err);
            }
        };

        let flow_id = flow_id.to_string();
        match step {
            FlowStep::Form { step_id, errors } => {
                self.lock_flows().checkin(&flow_id, flow, Some(step_id));
                Ok(FlowResult::Form {
                    flow_id,
                    handler,
                    step_id: step_id.to_string(),
                    errors,
                })
            }
            FlowStep::External { step_id, url } => {
                self.lock_flows().checkin(&flow_id, flow, Some(step_id));
                Ok(FlowResult::ExternalStep {
                    flow_id,
                    handler,
                    step_id: step_id.to_string(),
                    url,
                })
            }
            FlowStep::CreateEntry(new_entry) => {
                self.lock_flows().finish(&flow_id);

                let mut entry =
                    ConfigEntry::new(&handler, new_entry.title, Value::Object(new_entry.data))
                        .with_source(context.source);
                entry.unique_id = new_entry.unique_id;
                entry.options = new_entry.options;
                let created = FlowResult::CreateEntry {
                    flow_id: flow_id.clone(),
                    handler: handler.clone(),
                    entry_id: entry.entry_id.clone(),
                    title: entry.title.clone(),
                    data: entry.data.clone(),
                };
                let entry_id = entry.entry_id.clone();

                let inserted = self.lock_entries().insert(entry);
                if let Err(err) = inserted {
                    tracing::debug!("Flow {} not stored: {}", flow_id, err);
                    return Ok(FlowResult::Abort {
                        flow_id,
                        handler,
                        reason: "already_configured".to_string(),
                    });
                }

                tracing::info!("Flow {} created {} entry {}", flow_id, handler, entry_id);
                self.spawn_entry_task(entry_id, false);
                Ok(created)
            }
            FlowStep::UpdateEntry {
                entry_id,
                data,
                reason,
            } => {
                self.lock_flows().finish(&flow_id);
                let update = EntryUpdate {
                    data: Some(data),
                    ..EntryUpdate::default()
                };
                self.lock_entries().update(&entry_id, update)?;
                self.spawn_entry_task(entry_id, true);
                Ok(FlowResult::Abort {
                    flow_id,
                    handler,
                    reason: reason.to_string(),
                })
            }
            FlowStep::Abort { reason } => {
                self.lock_flows().finish(&flow_id);
                Ok(FlowResult::Abort {
                    flow_id,
                    handler,
                    reason: reason.to_string(),
                })
            }
        }
    }

    // Webhooks

    /// Registers a webhook handler for an entry.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError::AlreadyRegistered`] if the id is taken.
    pub fn register_webhook(
        &self,
        webhook_id: &WebhookId,
        domain: &str,
        entry_id: &str,
        handler: Arc<dyn WebhookHandler>,
    ) -> Result<(), WebhookError> {
        self.lock_webhooks()
            .register(webhook_id.as_ref(), domain, entry_id, handler)
    }

    /// Returns the public URL of a webhook, if an external URL is configured.
    #[must_use]
    pub fn webhook_url(&self, webhook_id: &WebhookId) -> Option<String> {
        self.inner.config.webhook_url(webhook_id)
    }

    /// Returns `true` if a handler is registered under `webhook_id`.
    #[must_use]
    pub fn has_webhook(&self, webhook_id: &str) -> bool {
        self.lock_webhooks().route(webhook_id).is_some()
    }

    /// Dispatches a request to the handler registered under `webhook_id`.
    ///
    /// Unknown ids get an empty `200 OK`.
    pub async fn handle_webhook(
        &self,
        webhook_id: &str,
        request: WebhookRequest,
    ) -> WebhookResponse {
        let handler = self.lock_webhooks().handler(webhook_id);
        let Some(handler) = handler else {
            tracing::warn!("Received message for unregistered webhook {}", webhook_id);
            return WebhookResponse::empty();
        };
        handler.handle(request).await
    }

    fn lock_entries(&self) -> MutexGuard<'_, ConfigEntries> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_flows(&self) -> MutexGuard<'_, FlowManager> {
        self.inner
            .flows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_webhooks(&self) -> MutexGuard<'_, WebhookRegistry> {
        self.inner
            .webhooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
