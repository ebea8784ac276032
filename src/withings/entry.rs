//! Withings config entry data and its migrations.
//!
//! Current (version 2) layout:
//!
//! ```json
//! {
//!   "data":    {"token": {...}, "profile": "henk", "webhook_id": "<64 hex chars>"},
//!   "options": {"use_webhook": false},
//!   "unique_id": "<userid>"
//! }
//! ```
//!
//! Older entries may lack `webhook_id` or `unique_id` and may carry
//! `use_webhook` in `data`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::oauth::OAuthToken;
use crate::config::WebhookId;
use crate::entries::{ConfigEntry, EntryUpdate, JsonMap};
use crate::hub::SetupError;

pub(crate) const CONF_TOKEN: &str = "token";
pub(crate) const CONF_PROFILE: &str = "profile";
pub(crate) const CONF_WEBHOOK_ID: &str = "webhook_id";
pub(crate) const CONF_USE_WEBHOOK: &str = "use_webhook";

/// Version written by [`migrate`].
pub const CURRENT_VERSION: u32 = 2;

/// Typed view of a Withings entry's data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WithingsEntryData {
    /// OAuth token of the account.
    pub token: OAuthToken,
    /// Display name of the account profile.
    pub profile: String,
    /// Id of the entry's webhook.
    pub webhook_id: WebhookId,
}

impl WithingsEntryData {
    /// Reads the data of a (migrated) entry.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::InvalidEntry`] if a field is missing or malformed.
    pub fn from_entry(entry: &ConfigEntry) -> Result<Self, SetupError> {
        serde_json::from_value(Value::Object(entry.data.clone())).map_err(|e| {
            SetupError::InvalidEntry {
                message: format!("Withings entry {}: {e}", entry.entry_id),
            }
        })
    }

    /// Serializes the data back into an entry payload.
    #[must_use]
    pub fn to_map(&self) -> JsonMap {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => JsonMap::new(),
        }
    }
}

/// Reads the `use_webhook` option, defaulting to polling.
#[must_use]
pub fn use_webhook_option(entry: &ConfigEntry) -> bool {
    entry
        .options
        .get(CONF_USE_WEBHOOK)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Computes the update bringing `entry` to the current layout.
///
/// `static_use_webhook` is the flag from static configuration; when present
/// it overrides the entry option. Returns `Ok(None)` if the entry is already
/// current.
///
/// # Errors
///
/// Returns [`SetupError::Migration`] if the entry has no unique id and its
/// token carries no usable `userid`.
pub fn migrate(
    entry: &ConfigEntry,
    static_use_webhook: Option<bool>,
) -> Result<Option<EntryUpdate>, SetupError> {
    let mut update = EntryUpdate::default();
    let mut data = entry.data.clone();
    let mut options = entry.options.clone();

    if !data.contains_key(CONF_WEBHOOK_ID) {
        data.insert(
            CONF_WEBHOOK_ID.to_string(),
            Value::String(WebhookId::generate().to_string()),
        );
    }

    if entry.unique_id.is_none() {
        update.unique_id = Some(userid_from_data(&data).ok_or_else(|| SetupError::Migration {
            message: format!("Withings entry {} has no token userid", entry.entry_id),
        })?);
    }

    if let Some(legacy) = data.remove(CONF_USE_WEBHOOK) {
        if !options.contains_key(CONF_USE_WEBHOOK) {
            options.insert(
                CONF_USE_WEBHOOK.to_string(),
                Value::Bool(legacy.as_bool().unwrap_or(false)),
            );
        }
    }
    if !options.contains_key(CONF_USE_WEBHOOK) {
        options.insert(CONF_USE_WEBHOOK.to_string(), Value::Bool(false));
    }
    if let Some(flag) = static_use_webhook {
        options.insert(CONF_USE_WEBHOOK.to_string(), Value::Bool(flag));
    }

    if data != entry.data {
        update.data = Some(data);
    }
    if options != entry.options {
        update.options = Some(options);
    }
    if entry.version < CURRENT_VERSION {
        update.version = Some(CURRENT_VERSION);
    }

    if update.is_empty() {
        Ok(None)
    } else {
        Ok(Some(update))
    }
}

fn userid_from_data(data: &JsonMap) -> Option<String> {
    match data.get(CONF_TOKEN)?.get("userid")? {
        Value::Number(n) => n.as_i64().map(|id| id.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
