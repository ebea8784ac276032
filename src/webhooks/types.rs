//! Request, response and handler types for inbound webhooks.
//!
//! These types are independent of the HTTP server: the router in
//! [`crate::hub`] converts server requests into a [`WebhookRequest`] and a
//! [`WebhookResponse`] back into a server response.

use std::collections::HashMap;

use serde_json::Value;

use crate::BoxFuture;

/// HTTP method of an inbound webhook request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookMethod {
    /// `GET`
    Get,
    /// `HEAD`
    Head,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// Any other method, upper-cased.
    Other(String),
}

impl WebhookMethod {
    /// Parses a method name, case-insensitively.
    #[must_use]
    pub fn parse(method: &str) -> Self {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Self::Get,
            "HEAD" => Self::Head,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            other => Self::Other(other.to_string()),
        }
    }
}

/// An inbound webhook request.
///
/// The body is kept as raw bytes; [`WebhookRequest::params`] decodes it.
///
/// # Example
///
/// ```rust
/// use hub_integrations::webhooks::{WebhookMethod, WebhookRequest};
///
/// let request = WebhookRequest::new(WebhookMethod::Post, b"userid=0&appli=1".to_vec())
///     .with_content_type("application/x-www-form-urlencoded");
///
/// let params = request.params().unwrap();
/// assert_eq!(params.get("appli").map(String::as_str), Some("1"));
/// ```
#[derive(Clone, Debug)]
pub struct WebhookRequest {
    method: WebhookMethod,
    content_type: Option<String>,
    body: Vec<u8>,
}

impl WebhookRequest {
    /// Creates a request with the given method and raw body.
    #[must_use]
    pub const fn new(method: WebhookMethod, body: Vec<u8>) -> Self {
        Self {
            method,
            content_type: None,
            body,
        }
    }

    /// Sets the `Content-Type` header value.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Returns the request method.
    #[must_use]
    pub const fn method(&self) -> &WebhookMethod {
        &self.method
    }

    /// Returns the raw body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns `true` when the request carries a non-empty body.
    #[must_use]
    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }

    /// Decodes the body into flat string parameters.
    ///
    /// JSON object bodies (by content type, or by a leading `{`) are flattened
    /// with scalars rendered as strings and `null` values dropped; anything
    /// else is decoded as `application/x-www-form-urlencoded`. Returns `None`
    /// when the body cannot be decoded.
    #[must_use]
    pub fn params(&self) -> Option<HashMap<String, String>> {
        let text = std::str::from_utf8(&self.body).ok()?;
        let is_json = self
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("application/json"))
            || text.trim_start().starts_with('{');

        if is_json {
            parse_json_params(text)
        } else {
            parse_form_params(text)
        }
    }
}

fn parse_json_params(text: &str) -> Option<HashMap<String, String>> {
    let Value::Object(map) = serde_json::from_str::<Value>(text).ok()? else {
        return None;
    };

    let params = map
        .into_iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Value::Null => return None,
                Value::String(s) => s,
                other => other.to_string(),
            };
            Some((key, value))
        })
        .collect();
    Some(params)
}

fn parse_form_params(text: &str) -> Option<HashMap<String, String>> {
    let mut params = HashMap::new();
    for pair in text.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = urlencoding::decode(&key.replace('+', " ")).ok()?.into_owned();
        let value = urlencoding::decode(&value.replace('+', " ")).ok()?.into_owned();
        params.insert(key, value);
    }
    Some(params)
}

/// Response returned to the webhook caller.
#[derive(Clone, Debug, PartialEq)]
pub struct WebhookResponse {
    /// HTTP status code.
    pub status: u16,
    /// Optional JSON body.
    pub body: Option<Value>,
}

impl WebhookResponse {
    /// `200 OK` without a body.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            status: 200,
            body: None,
        }
    }

    /// `200 OK` with `{"message": ..., "code": ...}`.
    #[must_use]
    pub fn message(message: &str, code: i64) -> Self {
        Self {
            status: 200,
            body: Some(serde_json::json!({ "message": message, "code": code })),
        }
    }

    /// Returns the numeric `code` field of the body, if any.
    #[must_use]
    pub fn code(&self) -> Option<i64> {
        self.body.as_ref()?.get("code")?.as_i64()
    }
}

/// Handles requests delivered to one registered webhook.
///
/// Handlers must answer quickly; long-running work belongs in a tracked task.
pub trait WebhookHandler: Send + Sync {
    /// Handles one request and produces the response.
    fn handle<'a>(&'a self, request: WebhookRequest) -> BoxFuture<'a, WebhookResponse>;
}
