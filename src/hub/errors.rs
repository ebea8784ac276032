//! Error types for hub operations and entry setup.

use thiserror::Error;

use crate::auth::oauth::OAuthError;
use crate::entries::{EntryError, EntryState};
use crate::error::ConfigError;
use crate::flow::FlowError;
use crate::webhooks::WebhookError;

/// Why an integration could not set up a config entry.
///
/// The variant decides the state the entry is left in; see
/// [`SetupError::entry_state`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SetupError {
    /// A transient failure; setup may succeed later.
    #[error("Integration not ready: {message}")]
    NotReady {
        /// What failed.
        message: String,
    },

    /// Stored credentials were rejected.
    #[error("Authentication failed: {message}")]
    AuthFailed {
        /// What failed.
        message: String,
    },

    /// The entry data cannot be used.
    #[error("Invalid config entry: {message}")]
    InvalidEntry {
        /// What is wrong with the entry.
        message: String,
    },

    /// The entry could not be migrated to the current version.
    #[error("Migration failed: {message}")]
    Migration {
        /// Why migration failed.
        message: String,
    },

    /// Static configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A webhook could not be registered.
    #[error(transparent)]
    Webhook(#[from] WebhookError),
}

impl SetupError {
    /// Entry state recorded after this failure.
    #[must_use]
    pub const fn entry_state(&self) -> EntryState {
        match self {
            Self::NotReady { .. } => EntryState::SetupRetry,
            Self::Migration { .. } => EntryState::MigrationError,
            _ => EntryState::SetupError,
        }
    }
}

/// Errors returned by [`Hub`](crate::Hub) operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HubError {
    /// No integration is registered for the domain.
    #[error("Integration '{domain}' is not registered")]
    UnknownIntegration {
        /// The requested domain.
        domain: String,
    },

    /// Entry store failure.
    #[error(transparent)]
    Entry(#[from] EntryError),

    /// Config flow failure.
    #[error(transparent)]
    Flow(#[from] FlowError),

    /// Entry setup failure.
    #[error(transparent)]
    Setup(#[from] SetupError),

    /// Static configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The OAuth callback could not be matched to a flow.
    #[error(transparent)]
    OAuth(#[from] OAuthError),
}
