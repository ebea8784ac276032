//! Webhook-specific error types.

use thiserror::Error;

/// Error type for webhook registration.
///
/// # Example
///
/// ```rust
/// use hub_integrations::webhooks::WebhookError;
///
/// let error = WebhookError::AlreadyRegistered { webhook_id: "abc".to_string() };
/// assert!(error.to_string().contains("abc"));
/// ```
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WebhookError {
    /// A handler is already registered under this id.
    ///
    /// Webhook ids are unique per hub; registering twice means an entry was
    /// set up without being unloaded first.
    #[error("Webhook '{webhook_id}' is already registered")]
    AlreadyRegistered {
        /// The clashing webhook id.
        webhook_id: String,
    },

    /// No handler is registered under this id.
    #[error("Webhook '{webhook_id}' is not registered")]
    NotRegistered {
        /// The unknown webhook id.
        webhook_id: String,
    },
}
