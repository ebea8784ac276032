//! Webhook registry mapping webhook ids to handlers.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use hub_integrations::BoxFuture;
//! use hub_integrations::webhooks::{
//!     WebhookHandler, WebhookMethod, WebhookRegistry, WebhookRequest, WebhookResponse,
//! };
//!
//! struct Ok200;
//!
//! impl WebhookHandler for Ok200 {
//!     fn handle<'a>(&'a self, _request: WebhookRequest) -> BoxFuture<'a, WebhookResponse> {
//!         Box::pin(async { WebhookResponse::message("Success", 0) })
//!     }
//! }
//!
//! let mut registry = WebhookRegistry::new();
//! registry.register("abc", "withings", "entry-1", Arc::new(Ok200)).unwrap();
//! assert!(registry.handler("abc").is_some());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use super::errors::WebhookError;
use super::types::WebhookHandler;

/// A single webhook registration.
#[derive(Clone)]
pub struct WebhookRoute {
    /// Domain of the integration owning the webhook.
    pub domain: String,
    /// Config entry the webhook belongs to.
    pub entry_id: String,
    /// Handler invoked for every request.
    pub handler: Arc<dyn WebhookHandler>,
}

impl std::fmt::Debug for WebhookRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookRoute")
            .field("domain", &self.domain)
            .field("entry_id", &self.entry_id)
            .field("handler", &"<handler>")
            .finish()
    }
}

/// Registry of webhook routes, keyed by webhook id.
///
/// # Thread Safety
///
/// `WebhookRegistry` is `Send + Sync`; the hub keeps it behind a mutex and
/// clones the handler out before awaiting it.
#[derive(Debug, Default)]
pub struct WebhookRegistry {
    routes: HashMap<String, WebhookRoute>,
}

// Verify WebhookRegistry is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<WebhookRegistry>();
};

impl WebhookRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under `webhook_id`.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError::AlreadyRegistered`] if the id is taken.
    pub fn register(
        &mut self,
        webhook_id: impl Into<String>,
        domain: impl Into<String>,
        entry_id: impl Into<String>,
        handler: Arc<dyn WebhookHandler>,
    ) -> Result<(), WebhookError> {
        let webhook_id = webhook_id.into();
        if self.routes.contains_key(&webhook_id) {
            return Err(WebhookError::AlreadyRegistered { webhook_id });
        }

        let domain = domain.into();
        tracing::debug!("Registering webhook {} for {}", webhook_id, domain);
        self.routes.insert(
            webhook_id,
            WebhookRoute {
                domain,
                entry_id: entry_id.into(),
                handler,
            },
        );
        Ok(())
    }

    /// Removes the registration for `webhook_id`.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError::NotRegistered`] if nothing is registered.
    pub fn unregister(&mut self, webhook_id: &str) -> Result<WebhookRoute, WebhookError> {
        self.routes
            .remove(webhook_id)
            .ok_or_else(|| WebhookError::NotRegistered {
                webhook_id: webhook_id.to_string(),
            })
    }

    /// Removes every registration owned by `entry_id`.
    pub fn unregister_entry(&mut self, entry_id: &str) {
        self.routes.retain(|_, route| route.entry_id != entry_id);
    }

    /// Returns the route for `webhook_id`.
    #[must_use]
    pub fn route(&self, webhook_id: &str) -> Option<&WebhookRoute> {
        self.routes.get(webhook_id)
    }

    /// Returns a shared handle to the handler for `webhook_id`.
    #[must_use]
    pub fn handler(&self, webhook_id: &str) -> Option<Arc<dyn WebhookHandler>> {
        self.routes.get(webhook_id).map(|r| Arc::clone(&r.handler))
    }

    /// Returns the number of registered webhooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
