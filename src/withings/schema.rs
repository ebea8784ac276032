//! Static configuration schema for the Withings integration.
//!
//! The accepted shape is:
//!
//! ```json
//! { "withings": { "client_id": "...", "client_secret": "...", "use_webhook": false } }
//! ```

use serde_json::Value;

use super::DOMAIN;
use crate::config::{ClientId, ClientSecret};
use crate::error::ConfigError;

const CONF_CLIENT_ID: &str = "client_id";
const CONF_CLIENT_SECRET: &str = "client_secret";
const CONF_USE_WEBHOOK: &str = "use_webhook";

const KNOWN_KEYS: [&str; 3] = [CONF_CLIENT_ID, CONF_CLIENT_SECRET, CONF_USE_WEBHOOK];

/// Validated static Withings configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WithingsConfig {
    /// OAuth client id of the Withings developer application.
    pub client_id: ClientId,
    /// OAuth client secret of the Withings developer application.
    pub client_secret: ClientSecret,
    /// Receive push notifications instead of polling every ten minutes.
    pub use_webhook: bool,
}

/// Validates the `withings` block of the static configuration.
///
/// Returns `Ok(None)` when the configuration has no `withings` key.
///
/// # Errors
///
/// Returns a [`ConfigError`] naming the offending key for missing or empty
/// credentials, a non-boolean `use_webhook` or unknown keys.
///
/// # Example
///
/// ```rust
/// use hub_integrations::withings::validate_config_schema;
/// use serde_json::json;
///
/// let config = validate_config_schema(&json!({
///     "withings": {"client_id": "my_client_id", "client_secret": "my_client_secret"}
/// }))
/// .unwrap()
/// .unwrap();
/// assert!(!config.use_webhook);
///
/// assert!(validate_config_schema(&json!({})).unwrap().is_none());
/// assert!(validate_config_schema(&json!({
///     "withings": {"client_id": "", "client_secret": "my_client_secret"}
/// }))
/// .is_err());
/// ```
pub fn validate_config_schema(config: &Value) -> Result<Option<WithingsConfig>, ConfigError> {
    let Some(block) = config.get(DOMAIN) else {
        return Ok(None);
    };

    let block = block.as_object().ok_or_else(|| ConfigError::InvalidType {
        domain: DOMAIN,
        key: DOMAIN.to_string(),
        expected: "a mapping",
    })?;

    if let Some(unknown) = block.keys().find(|k| !KNOWN_KEYS.contains(&k.as_str())) {
        return Err(ConfigError::UnknownKey {
            domain: DOMAIN,
            key: unknown.clone(),
        });
    }

    let client_id = ClientId::new(required_string(block, CONF_CLIENT_ID)?)?;
    let client_secret = ClientSecret::new(required_string(block, CONF_CLIENT_SECRET)?)?;

    let use_webhook = match block.get(CONF_USE_WEBHOOK) {
        None => false,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => {
            return Err(ConfigError::InvalidType {
                domain: DOMAIN,
                key: CONF_USE_WEBHOOK.to_string(),
                expected: "a boolean",
            })
        }
    };

    Ok(Some(WithingsConfig {
        client_id,
        client_secret,
        use_webhook,
    }))
}

fn required_string<'a>(
    block: &'a serde_json::Map<String, Value>,
    key: &'static str,
) -> Result<&'a str, ConfigError> {
    match block.get(key) {
        None => Err(ConfigError::MissingKey {
            domain: DOMAIN,
            key,
        }),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(ConfigError::InvalidType {
            domain: DOMAIN,
            key: key.to_string(),
            expected: "a string",
        }),
    }
}
