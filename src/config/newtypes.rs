//! Validated newtype wrappers for configuration values.
//!
//! These wrappers validate their contents on construction so that invalid
//! credentials, URLs or webhook ids are rejected before they reach a config
//! entry or an outbound request.

use crate::error::ConfigError;
use rand::Rng;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A validated OAuth client id.
///
/// # Example
///
/// ```rust
/// use hub_integrations::ClientId;
///
/// let id = ClientId::new("my_client_id").unwrap();
/// assert_eq!(id.as_ref(), "my_client_id");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientId(String);

impl ClientId {
    /// Creates a new validated client id.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyClientId`] if the id is empty.
    pub fn new(id: impl Into<String>) -> Result<Self, ConfigError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ConfigError::EmptyClientId);
        }
        Ok(Self(id))
    }
}

impl AsRef<str> for ClientId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A validated OAuth client secret.
///
/// The `Debug` implementation masks the value so the secret never ends up in
/// logs.
///
/// ```rust
/// use hub_integrations::ClientSecret;
///
/// let secret = ClientSecret::new("my_client_secret").unwrap();
/// assert_eq!(format!("{:?}", secret), "ClientSecret(*****)");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct ClientSecret(String);

impl ClientSecret {
    /// Creates a new validated client secret.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyClientSecret`] if the secret is empty.
    pub fn new(secret: impl Into<String>) -> Result<Self, ConfigError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(ConfigError::EmptyClientSecret);
        }
        Ok(Self(secret))
    }
}

impl AsRef<str> for ClientSecret {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ClientSecret(*****)")
    }
}

/// A validated base URL under which the hub is reachable.
///
/// Trailing slashes are dropped so paths can be appended with [`HostUrl::join`].
///
/// # Example
///
/// ```rust
/// use hub_integrations::HostUrl;
///
/// let url = HostUrl::new("http://example.local:8123/").unwrap();
/// assert_eq!(url.scheme(), "http");
/// assert_eq!(url.host_name(), Some("example.local"));
/// assert_eq!(url.join("/api/webhook/abc"), "http://example.local:8123/api/webhook/abc");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostUrl {
    url: String,
    // Byte range of the host inside `url`; the scheme ends three bytes earlier.
    host: std::ops::Range<usize>,
}

impl HostUrl {
    /// Parses and normalizes a base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHostUrl`] if the URL has no scheme or no host.
    pub fn new(url: impl Into<String>) -> Result<Self, ConfigError> {
        let url: String = url.into();
        let url = url.trim().trim_end_matches('/').to_string();
        let invalid = || ConfigError::InvalidHostUrl { url: url.clone() };

        let (scheme, rest) = url.split_once("://").ok_or_else(invalid)?;
        let valid_scheme = !scheme.is_empty() && scheme.bytes().all(|b| b.is_ascii_alphabetic());
        let authority_len = rest.find([':', '/', '?', '#']).unwrap_or(rest.len());
        if !valid_scheme || authority_len == 0 {
            return Err(invalid());
        }

        let start = scheme.len() + "://".len();
        Ok(Self {
            host: start..start + authority_len,
            url,
        })
    }

    /// The URL scheme, e.g. `http`.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.url[..self.host.start - "://".len()]
    }

    #[must_use]
    pub fn host_name(&self) -> Option<&str> {
        Some(&self.url[self.host.clone()]).filter(|host| !host.is_empty())
    }

    /// Appends an absolute path to the base URL.
    #[must_use]
    pub fn join(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.url)
        } else {
            format!("{}/{path}", self.url)
        }
    }
}

impl AsRef<str> for HostUrl {
    fn as_ref(&self) -> &str {
        &self.url
    }
}

/// An opaque webhook id: 32 random bytes rendered as 64 lowercase hex chars.
///
/// The id is the only secret protecting a webhook endpoint, so it is always
/// generated from the thread-local CSPRNG.
///
/// ```rust
/// use hub_integrations::WebhookId;
///
/// let id = WebhookId::generate();
/// assert_eq!(id.as_ref().len(), 64);
/// assert!(WebhookId::new(id.as_ref()).is_ok());
/// assert!(WebhookId::new("not-hex").is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WebhookId(String);

impl WebhookId {
    const LENGTH: usize = 64;

    /// Generates a fresh random webhook id.
    #[must_use]
    pub fn generate() -> Self {
        let bytes: [u8; 32] = rand::thread_rng().gen();
        let id = bytes.iter().map(|b| format!("{b:02x}")).collect();
        Self(id)
    }

    /// Wraps an existing id after validating its format.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidWebhookId`] for anything other than 64
    /// lowercase hex characters.
    pub fn new(id: impl Into<String>) -> Result<Self, ConfigError> {
        let id = id.into();
        let valid = id.len() == Self::LENGTH
            && id
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        if !valid {
            return Err(ConfigError::InvalidWebhookId { id });
        }
        Ok(Self(id))
    }
}

impl AsRef<str> for WebhookId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WebhookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for WebhookId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for WebhookId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(de::Error::custom)
    }
}
