//! OAuth access tokens as stored in config entries.

use crate::entries::JsonMap;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// An OAuth token issued by a vendor.
///
/// Fields the crate does not interpret are kept in `extra` so a token
/// survives a load/store round trip unchanged.
///
/// # Example
///
/// ```rust
/// use hub_integrations::auth::oauth::OAuthToken;
/// use serde_json::json;
///
/// let token: OAuthToken = serde_json::from_value(json!({
///     "userid": "123",
///     "access_token": "abc",
///     "csrf_token": "kept",
/// })).unwrap();
///
/// assert_eq!(token.userid, 123);
/// assert_eq!(token.extra["csrf_token"], "kept");
/// assert!(!format!("{:?}", token).contains("abc"));
/// ```
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    /// Vendor account id. Accepts a number or a numeric string.
    #[serde(deserialize_with = "deserialize_userid")]
    pub userid: i64,

    /// Bearer token for API calls.
    #[serde(default)]
    pub access_token: String,

    /// Token used to obtain a new access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Expiration timestamp (Unix seconds). `None` never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,

    /// Granted scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Token type, normally `Bearer`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Fields not interpreted by this crate.
    #[serde(flatten)]
    pub extra: JsonMap,
}

impl OAuthToken {
    /// Tokens this close to expiry are treated as expired.
    pub const EXPIRY_MARGIN_SECS: i64 = 20;

    /// Creates a token with only an account id and an access token.
    #[must_use]
    pub fn new(userid: i64, access_token: impl Into<String>) -> Self {
        Self {
            userid,
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            scope: None,
            token_type: None,
            extra: JsonMap::new(),
        }
    }

    /// Returns `true` if the token expires within the margin of `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at < now + Self::EXPIRY_MARGIN_SECS)
    }

    /// Returns `true` if the token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp())
    }

    /// Returns the token as a JSON value for persistence.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthToken")
            .field("userid", &self.userid)
            .field("access_token", &"*****")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "*****"))
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

fn deserialize_userid<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| de::Error::custom("userid must be an integer")),
        Value::String(s) => s
            .parse()
            .map_err(|_| de::Error::custom(format!("userid '{s}' is not numeric"))),
        other => Err(de::Error::custom(format!("invalid userid: {other}"))),
    }
}
