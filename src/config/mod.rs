//! Configuration types for the hub host.
//!
//! # Overview
//!
//! - [`HubConfig`]: Host-wide settings shared by every integration
//! - [`HubConfigBuilder`]: A builder for constructing [`HubConfig`] instances
//! - [`HostUrl`]: A validated base URL under which the hub is reachable
//! - [`ClientId`] / [`ClientSecret`]: Validated OAuth application credentials
//! - [`WebhookId`]: An opaque, randomly generated webhook id
//!
//! Static per-integration configuration is validated by the integrations
//! themselves (see [`crate::withings::validate_config_schema`]).
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use hub_integrations::{HubConfig, HostUrl};
//!
//! let config = HubConfig::builder()
//!     .external_url(HostUrl::new("http://example.local:8123").unwrap())
//!     .webhook_subscribe_delay(Duration::ZERO)
//!     .build();
//!
//! assert_eq!(config.webhook_subscribe_delay(), Duration::ZERO);
//! ```

mod newtypes;

pub use newtypes::{ClientId, ClientSecret, HostUrl, WebhookId};

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::time::Duration;

/// Path prefix under which webhooks are served.
pub const WEBHOOK_PATH_PREFIX: &str = "/api/webhook";

/// Path of the OAuth redirect endpoint.
pub const OAUTH_CALLBACK_PATH: &str = "/auth/external/callback";

/// Host-wide configuration.
///
/// # Thread Safety
///
/// `HubConfig` is `Clone`, `Send`, and `Sync`.
#[derive(Clone)]
pub struct HubConfig {
    external_url: Option<HostUrl>,
    webhook_subscribe_delay: Duration,
    jwt_secret: String,
}

impl std::fmt::Debug for HubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubConfig")
            .field("external_url", &self.external_url)
            .field("webhook_subscribe_delay", &self.webhook_subscribe_delay)
            .field("jwt_secret", &"*****")
            .finish()
    }
}

impl HubConfig {
    /// Default delay between entry setup and remote webhook subscription.
    pub const DEFAULT_WEBHOOK_SUBSCRIBE_DELAY: Duration = Duration::from_secs(30);

    const JWT_SECRET_LENGTH: usize = 48;

    /// Creates a new builder for constructing a `HubConfig`.
    #[must_use]
    pub fn builder() -> HubConfigBuilder {
        HubConfigBuilder::new()
    }

    /// Returns the externally reachable base URL, if configured.
    #[must_use]
    pub const fn external_url(&self) -> Option<&HostUrl> {
        self.external_url.as_ref()
    }

    /// Returns how long webhook subscription is deferred after entry setup.
    #[must_use]
    pub const fn webhook_subscribe_delay(&self) -> Duration {
        self.webhook_subscribe_delay
    }

    /// Returns the secret used to sign OAuth state tokens.
    #[must_use]
    pub fn jwt_secret(&self) -> &str {
        &self.jwt_secret
    }

    /// Returns the public URL of a webhook, if an external URL is configured.
    #[must_use]
    pub fn webhook_url(&self, webhook_id: &WebhookId) -> Option<String> {
        self.external_url
            .as_ref()
            .map(|base| base.join(&format!("{WEBHOOK_PATH_PREFIX}/{webhook_id}")))
    }

    /// Returns the OAuth redirect URI, if an external URL is configured.
    #[must_use]
    pub fn oauth_redirect_uri(&self) -> Option<String> {
        self.external_url
            .as_ref()
            .map(|base| base.join(OAUTH_CALLBACK_PATH))
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        HubConfigBuilder::new().build()
    }
}

// Verify HubConfig is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<HubConfig>();
};

/// Builder for constructing [`HubConfig`] instances.
///
/// # Defaults
///
/// - `external_url`: `None`
/// - `webhook_subscribe_delay`: 30 seconds
/// - `jwt_secret`: 48 random alphanumeric characters
#[derive(Debug, Default)]
pub struct HubConfigBuilder {
    external_url: Option<HostUrl>,
    webhook_subscribe_delay: Option<Duration>,
    jwt_secret: Option<String>,
}

impl HubConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the externally reachable base URL.
    #[must_use]
    pub fn external_url(mut self, url: HostUrl) -> Self {
        self.external_url = Some(url);
        self
    }

    /// Sets the delay before webhook subscriptions are established.
    #[must_use]
    pub const fn webhook_subscribe_delay(mut self, delay: Duration) -> Self {
        self.webhook_subscribe_delay = Some(delay);
        self
    }

    /// Sets the OAuth state signing secret.
    #[must_use]
    pub fn jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.jwt_secret = Some(secret.into());
        self
    }

    /// Builds the [`HubConfig`], filling in defaults.
    #[must_use]
    pub fn build(self) -> HubConfig {
        let jwt_secret = self.jwt_secret.unwrap_or_else(|| {
            rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(HubConfig::JWT_SECRET_LENGTH)
                .map(char::from)
                .collect()
        });

        HubConfig {
            external_url: self.external_url,
            webhook_subscribe_delay: self
                .webhook_subscribe_delay
                .unwrap_or(HubConfig::DEFAULT_WEBHOOK_SUBSCRIBE_DELAY),
            jwt_secret,
        }
    }
}
