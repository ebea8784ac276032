//! Withings OAuth 2.0 endpoints.
//!
//! Withings deviates from RFC 6749 in two ways: the token endpoint expects an
//! extra `action=requesttoken` form field, and it wraps the token in the same
//! `{"status", "body"}` envelope as the rest of the API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::oauth::{
    build_authorize_url, AuthorizeRequest, OAuthError, OAuthProvider, OAuthToken,
};
use crate::config::{ClientId, ClientSecret};
use crate::BoxFuture;

const AUTHORIZATION_CODE_GRANT_TYPE: &str = "authorization_code";

const REFRESH_TOKEN_GRANT_TYPE: &str = "refresh_token";

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    action: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_uri: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<&'a str>,
}

#[derive(Deserialize)]
struct TokenEnvelope {
    status: i64,
    #[serde(default)]
    body: Value,
    #[serde(default)]
    error: Option<String>,
}

enum Grant {
    Exchange,
    Refresh,
}

impl Grant {
    fn error(&self, status: i64, message: String) -> OAuthError {
        match self {
            Self::Exchange => OAuthError::TokenExchangeFailed { status, message },
            Self::Refresh => OAuthError::TokenRefreshFailed { status, message },
        }
    }
}

/// [`OAuthProvider`] for Withings accounts.
///
/// # Example
///
/// ```rust
/// use hub_integrations::auth::oauth::OAuthProvider;
/// use hub_integrations::withings::WithingsOAuth;
/// use hub_integrations::{ClientId, ClientSecret};
///
/// let oauth = WithingsOAuth::new(
///     ClientId::new("my_client_id").unwrap(),
///     ClientSecret::new("my_client_secret").unwrap(),
/// );
/// let url = oauth.authorize_url("https://hub/auth/external/callback", "state");
/// assert!(url.starts_with("https://account.withings.com/oauth2_user/authorize2?"));
/// assert!(url.contains("client_id=my_client_id"));
/// ```
#[derive(Clone, Debug)]
pub struct WithingsOAuth {
    client: reqwest::Client,
    client_id: ClientId,
    client_secret: ClientSecret,
    authorize_url: String,
    token_url: String,
}

impl WithingsOAuth {
    /// Authorization endpoint.
    pub const AUTHORIZE_URL: &'static str = "https://account.withings.com/oauth2_user/authorize2";

    /// Token endpoint.
    pub const TOKEN_URL: &'static str = "https://wbsapi.withings.net/v2/oauth2";

    /// Scopes requested for every account.
    pub const SCOPE: &'static str = "user.info,user.metrics,user.activity,user.sleepevents";

    /// Creates a provider for the production endpoints.
    #[must_use]
    pub fn new(client_id: ClientId, client_secret: ClientSecret) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id,
            client_secret,
            authorize_url: Self::AUTHORIZE_URL.to_string(),
            token_url: Self::TOKEN_URL.to_string(),
        }
    }

    /// Replaces both endpoints.
    #[must_use]
    pub fn with_endpoints(
        mut self,
        authorize_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        self.authorize_url = authorize_url.into();
        self.token_url = token_url.into();
        self
    }

    async fn request_token(
        &self,
        grant: Grant,
        request: TokenRequest<'_>,
    ) -> Result<OAuthToken, OAuthError> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&request)
            .send()
            .await
            .map_err(|e| grant.error(0, format!("Network error: {e}")))?;

        let status = i64::from(response.status().as_u16());

        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(grant.error(status, error_body));
        }

        let envelope: TokenEnvelope = response
            .json()
            .await
            .map_err(|e| grant.error(status, format!("Failed to parse token response: {e}")))?;

        if envelope.status != 0 {
            return Err(grant.error(
                envelope.status,
                envelope.error.unwrap_or_else(|| "Token request rejected".to_string()),
            ));
        }

        let mut token: OAuthToken = serde_json::from_value(envelope.body)
            .map_err(|e| grant.error(status, format!("Failed to parse token response: {e}")))?;

        if let Some(expires_in) = token.extra.remove("expires_in").and_then(|v| v.as_i64()) {
            token.expires_at = Some(chrono::Utc::now().timestamp() + expires_in);
        }

        Ok(token)
    }
}

impl OAuthProvider for WithingsOAuth {
    fn authorize_url(&self, redirect_uri: &str, state: &str) -> String {
        build_authorize_url(
            &self.authorize_url,
            &AuthorizeRequest {
                client_id: self.client_id.as_ref(),
                redirect_uri,
                scope: Self::SCOPE,
                state,
            },
        )
    }

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        redirect_uri: &'a str,
    ) -> BoxFuture<'a, Result<OAuthToken, OAuthError>> {
        Box::pin(async move {
            let request = TokenRequest {
                action: "requesttoken",
                client_id: self.client_id.as_ref(),
                client_secret: self.client_secret.as_ref(),
                grant_type: AUTHORIZATION_CODE_GRANT_TYPE,
                code: Some(code),
                redirect_uri: Some(redirect_uri),
                refresh_token: None,
            };
            self.request_token(Grant::Exchange, request).await
        })
    }

    fn refresh_token<'a>(
        &'a self,
        token: &'a OAuthToken,
    ) -> BoxFuture<'a, Result<OAuthToken, OAuthError>> {
        Box::pin(async move {
            let refresh_token = token
                .refresh_token
                .as_deref()
                .ok_or(OAuthError::MissingRefreshToken)?;

            let request = TokenRequest {
                action: "requesttoken",
                client_id: self.client_id.as_ref(),
                client_secret: self.client_secret.as_ref(),
                grant_type: REFRESH_TOKEN_GRANT_TYPE,
                code: None,
                redirect_uri: None,
                refresh_token: Some(refresh_token),
            };
            self.request_token(Grant::Refresh, request).await
        })
    }
}
