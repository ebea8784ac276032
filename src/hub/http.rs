//! HTTP surface of the hub.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};

use super::Hub;
use crate::config::{OAUTH_CALLBACK_PATH, WEBHOOK_PATH_PREFIX};
use crate::webhooks::{WebhookMethod, WebhookRequest};

impl Hub {
    /// Builds the router serving webhooks and the OAuth callback.
    ///
    /// - `{WEBHOOK_PATH_PREFIX}/{webhook_id}`: any method, dispatched with
    ///   [`Hub::handle_webhook`]
    /// - `OAUTH_CALLBACK_PATH`: `GET ?code=..&state=..`, forwarded to
    ///   [`Hub::oauth_callback`]
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route(&format!("{WEBHOOK_PATH_PREFIX}/{{webhook_id}}"), any(webhook_route))
            .route(OAUTH_CALLBACK_PATH, get(oauth_callback_route))
            .with_state(self.clone())
    }
}

async fn webhook_route(
    State(hub): State<Hub>,
    Path(webhook_id): Path<String>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut request = WebhookRequest::new(WebhookMethod::parse(method.as_str()), body.to_vec());
    if let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    {
        request = request.with_content_type(content_type);
    }

    let response = hub.handle_webhook(&webhook_id, request).await;
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
    match response.body {
        Some(body) => (status, Json(body)).into_response(),
        None => status.into_response(),
    }
}

async fn oauth_callback_route(
    State(hub): State<Hub>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let (Some(code), Some(state)) = (params.get("code"), params.get("state")) else {
        return (StatusCode::BAD_REQUEST, "Missing code or state parameter").into_response();
    };

    match hub.oauth_callback(code, state).await {
        Ok(result) => {
            tracing::debug!("OAuth callback advanced flow {}", result.flow_id());
            (
                StatusCode::OK,
                "Authorization complete, you may close this window.",
            )
                .into_response()
        }
        Err(err) => {
            tracing::warn!("OAuth callback rejected: {}", err);
            (StatusCode::BAD_REQUEST, err.to_string()).into_response()
        }
    }
}
