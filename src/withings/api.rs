//! Withings health API access.
//!
//! Every Withings endpoint answers HTTP 200 with an envelope
//! `{"status": <int>, "body": {...}}`; a non-zero `status` is the actual error.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::NotifyAppli;
use crate::BoxFuture;

/// Errors returned by the Withings API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The access token was rejected (HTTP or envelope status 401).
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Server message.
        message: String,
    },

    /// The account's authorization is no longer valid.
    #[error("Authentication failed with status {status}")]
    AuthFailed {
        /// Envelope status code.
        status: i64,
    },

    /// The request did not complete.
    #[error("Connection error: {message}")]
    Connection {
        /// Transport error description.
        message: String,
    },

    /// Any other non-zero envelope status.
    #[error("Withings API returned status {status}")]
    Status {
        /// Envelope status code.
        status: i64,
    },

    /// The response could not be decoded.
    #[error("Invalid response: {message}")]
    Parse {
        /// Decoder message.
        message: String,
    },
}

impl ApiError {
    /// Envelope statuses meaning the authorization is gone.
    pub const AUTH_FAILED_STATUSES: [i64; 4] = [100, 101, 102, 200];

    /// Maps a non-zero envelope status to an error.
    #[must_use]
    pub fn from_status(status: i64) -> Self {
        match status {
            401 => Self::Unauthorized {
                message: "Invalid access token".to_string(),
            },
            s if Self::AUTH_FAILED_STATUSES.contains(&s) => Self::AuthFailed { status: s },
            s => Self::Status { status: s },
        }
    }

    /// Returns `true` for errors that require the user to reauthenticate.
    #[must_use]
    pub const fn is_auth_error(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::AuthFailed { .. })
    }
}

/// A notification subscription as listed by the API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifySubscription {
    /// Notification category code.
    pub appli: i64,
    /// Callback URL receiving the notifications.
    pub callbackurl: String,
    /// Subscription comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Expiration timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
}

#[derive(Deserialize)]
struct NotifyListBody {
    #[serde(default)]
    profiles: Vec<NotifySubscription>,
}

/// A single measurement inside a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measure {
    /// Raw integer value.
    pub value: i64,
    /// Measure type, e.g. 1 for weight.
    #[serde(rename = "type")]
    pub measure_type: i32,
    /// Power of ten applied to `value`.
    pub unit: i32,
}

impl Measure {
    /// Returns `value * 10^unit`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn scaled(&self) -> f64 {
        self.value as f64 * 10f64.powi(self.unit)
    }
}

/// Measurements taken together.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureGroup {
    /// Group id.
    pub grpid: i64,
    /// Timestamp of the measurements.
    pub date: i64,
    /// 1 for real measurements, 2 for user objectives.
    #[serde(default)]
    pub category: i64,
    /// Measurements of the group.
    #[serde(default)]
    pub measures: Vec<Measure>,
}

/// Body of a `getmeas` response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureGetMeasResponse {
    /// Server timestamp of the response; pass back as `lastupdate`.
    #[serde(default)]
    pub updatetime: i64,
    /// Account timezone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Changed measure groups.
    #[serde(default)]
    pub measuregrps: Vec<MeasureGroup>,
}

/// Access to the Withings API on behalf of one account.
///
/// The access token is passed per call so one implementation can serve every
/// config entry.
pub trait WithingsApi: Send + Sync {
    /// Subscribes `callback_url` to a notification category.
    fn notify_subscribe<'a>(
        &'a self,
        access_token: &'a str,
        callback_url: &'a str,
        appli: NotifyAppli,
    ) -> BoxFuture<'a, Result<(), ApiError>>;

    /// Revokes a subscription of `callback_url`.
    fn notify_revoke<'a>(
        &'a self,
        access_token: &'a str,
        callback_url: &'a str,
        appli: NotifyAppli,
    ) -> BoxFuture<'a, Result<(), ApiError>>;

    /// Lists every subscription of the account.
    fn notify_list<'a>(
        &'a self,
        access_token: &'a str,
    ) -> BoxFuture<'a, Result<Vec<NotifySubscription>, ApiError>>;

    /// Fetches measurements changed since `last_update`.
    fn measure_get_meas<'a>(
        &'a self,
        access_token: &'a str,
        last_update: Option<i64>,
    ) -> BoxFuture<'a, Result<MeasureGetMeasResponse, ApiError>>;
}

#[derive(Deserialize)]
struct Envelope {
    status: i64,
    #[serde(default)]
    body: Value,
    #[serde(default)]
    error: Option<String>,
}

/// [`WithingsApi`] over HTTP.
///
/// # Example
///
/// ```rust
/// use hub_integrations::withings::WithingsClient;
///
/// let client = WithingsClient::new();
/// assert_eq!(client.base_url(), "https://wbsapi.withings.net");
/// ```
#[derive(Clone, Debug)]
pub struct WithingsClient {
    client: reqwest::Client,
    base_url: String,
}

impl Default for WithingsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WithingsClient {
    /// Production API endpoint.
    pub const DEFAULT_BASE_URL: &'static str = "https://wbsapi.withings.net";

    /// Creates a client for the production API.
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(Self::DEFAULT_BASE_URL)
    }

    /// Creates a client for another endpoint.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Returns the API endpoint.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        path: &str,
        access_token: &str,
        params: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .form(params)
            .send()
            .await
            .map_err(|e| ApiError::Connection {
                message: format!("Network error: {e}"),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized {
                message: format!("HTTP {}", status.as_u16()),
            });
        }
        if !status.is_success() {
            return Err(ApiError::Connection {
                message: format!("HTTP {}", status.as_u16()),
            });
        }

        let envelope: Envelope = response.json().await.map_err(|e| ApiError::Parse {
            message: e.to_string(),
        })?;

        if envelope.status != 0 {
            tracing::debug!(
                "Withings {} returned status {}: {}",
                path,
                envelope.status,
                envelope.error.as_deref().unwrap_or("")
            );
            return Err(ApiError::from_status(envelope.status));
        }

        serde_json::from_value(envelope.body).map_err(|e| ApiError::Parse {
            message: e.to_string(),
        })
    }

    async fn notify_action(
        &self,
        action: &str,
        access_token: &str,
        callback_url: &str,
        appli: NotifyAppli,
    ) -> Result<(), ApiError> {
        let params = [
            ("action", action.to_string()),
            ("callbackurl", callback_url.to_string()),
            ("appli", appli.code().to_string()),
        ];
        self.call::<Value>("/notify", access_token, &params)
            .await
            .map(|_| ())
    }
}

impl WithingsApi for WithingsClient {
    fn notify_subscribe<'a>(
        &'a self,
        access_token: &'a str,
        callback_url: &'a str,
        appli: NotifyAppli,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(self.notify_action("subscribe", access_token, callback_url, appli))
    }

    fn notify_revoke<'a>(
        &'a self,
        access_token: &'a str,
        callback_url: &'a str,
        appli: NotifyAppli,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(self.notify_action("revoke", access_token, callback_url, appli))
    }

    fn notify_list<'a>(
        &'a self,
        access_token: &'a str,
    ) -> BoxFuture<'a, Result<Vec<NotifySubscription>, ApiError>> {
        Box::pin(async move {
            let params = [("action", "list".to_string())];
            let body: NotifyListBody = self.call("/notify", access_token, &params).await?;
            Ok(body.profiles)
        })
    }

    fn measure_get_meas<'a>(
        &'a self,
        access_token: &'a str,
        last_update: Option<i64>,
    ) -> BoxFuture<'a, Result<MeasureGetMeasResponse, ApiError>> {
        Box::pin(async move {
            let mut params = vec![("action", "getmeas".to_string())];
            if let Some(last_update) = last_update {
                params.push(("lastupdate", last_update.to_string()));
            }
            self.call("/measure", access_token, &params).await
        })
    }
}
