//! Inbound Withings push notifications.
//!
//! Withings disables a callback URL that answers with an HTTP error, so every
//! outcome is reported as `200 OK` with a `{"message", "code"}` body.

use std::sync::Arc;

use super::data_manager::DataManager;
use super::NotifyAppli;
use crate::hub::TaskTracker;
use crate::webhooks::{WebhookHandler, WebhookMethod, WebhookRequest, WebhookResponse};
use crate::BoxFuture;

/// Result codes reported to the notification sender.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationCode {
    /// The notification was accepted.
    Success,
    /// The request used a method other than `POST`.
    InvalidMethod,
    /// The request had no body.
    NoBody,
    /// The body has no usable `appli` parameter.
    MissingAppli,
    /// `appli` is not a known notification category.
    InvalidAppli,
}

impl NotificationCode {
    /// Numeric code sent to the caller.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Success => 0,
            Self::InvalidMethod => 2,
            Self::NoBody => 12,
            Self::MissingAppli => 20,
            Self::InvalidAppli => 21,
        }
    }

    /// Message sent to the caller.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::InvalidMethod => "Invalid method",
            Self::NoBody => "No request body",
            Self::MissingAppli => "Parameter appli not provided",
            Self::InvalidAppli => "Invalid appli provided",
        }
    }

    /// Builds the response carrying this code.
    #[must_use]
    pub fn response(self) -> WebhookResponse {
        WebhookResponse::message(self.message(), self.code())
    }
}

/// Validates a notification body.
///
/// `userid` is informational only: it may be absent or malformed without
/// affecting the outcome.
///
/// # Errors
///
/// Returns the [`NotificationCode`] to report when the body is empty or its
/// `appli` parameter is missing, not an integer or unknown.
///
/// # Example
///
/// ```rust
/// use hub_integrations::webhooks::{WebhookMethod, WebhookRequest};
/// use hub_integrations::withings::{parse_notification, NotificationCode, NotifyAppli};
///
/// let ok = WebhookRequest::new(WebhookMethod::Post, b"userid=GG&appli=44".to_vec());
/// assert_eq!(parse_notification(&ok), Ok(NotifyAppli::Sleep));
///
/// let unknown = WebhookRequest::new(WebhookMethod::Post, b"appli=99".to_vec());
/// assert_eq!(parse_notification(&unknown), Err(NotificationCode::InvalidAppli));
/// ```
pub fn parse_notification(request: &WebhookRequest) -> Result<NotifyAppli, NotificationCode> {
    if !request.has_body() {
        return Err(NotificationCode::NoBody);
    }

    let params = request.params().ok_or(NotificationCode::MissingAppli)?;
    if params.is_empty() {
        return Err(NotificationCode::NoBody);
    }
    tracing::debug!(
        "Withings notification for userid {:?}",
        params.get("userid")
    );

    let appli: i64 = params
        .get("appli")
        .and_then(|raw| raw.trim().parse().ok())
        .ok_or(NotificationCode::MissingAppli)?;

    NotifyAppli::try_from(appli).map_err(|_| NotificationCode::InvalidAppli)
}

/// Webhook handler of one Withings entry.
#[derive(Debug)]
pub struct WithingsWebhookHandler {
    data_manager: Arc<DataManager>,
    tasks: TaskTracker,
}

impl WithingsWebhookHandler {
    /// Creates a handler refreshing `data_manager` as a tracked task.
    #[must_use]
    pub const fn new(data_manager: Arc<DataManager>, tasks: TaskTracker) -> Self {
        Self {
            data_manager,
            tasks,
        }
    }

    fn dispatch(&self, request: &WebhookRequest) -> WebhookResponse {
        match request.method() {
            WebhookMethod::Head => return WebhookResponse::empty(),
            WebhookMethod::Post => {}
            _ => return NotificationCode::InvalidMethod.response(),
        }

        let appli = match parse_notification(request) {
            Ok(appli) => appli,
            Err(code) => {
                tracing::debug!("Rejected Withings notification: {}", code.message());
                return code.response();
            }
        };

        tracing::debug!(
            "Withings notification {:?} for entry {}",
            appli,
            self.data_manager.entry_id()
        );
        let data_manager = Arc::clone(&self.data_manager);
        self.tasks.spawn(async move {
            if data_manager.refresh().await.is_err() {
                tracing::trace!("Withings push refresh of {} failed", data_manager.entry_id());
            }
        });

        NotificationCode::Success.response()
    }
}

impl WebhookHandler for WithingsWebhookHandler {
    fn handle<'a>(&'a self, request: WebhookRequest) -> BoxFuture<'a, WebhookResponse> {
        let response = self.dispatch(&request);
        Box::pin(async move { response })
    }
}
