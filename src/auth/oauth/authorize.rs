//! Authorization URL construction for the OAuth authorization code flow.

/// Parameters of an authorization request.
#[derive(Clone, Debug)]
pub struct AuthorizeRequest<'a> {
    /// OAuth client id.
    pub client_id: &'a str,
    /// Where the authorization server sends the user back to.
    pub redirect_uri: &'a str,
    /// Space or comma separated scopes, in the vendor's format.
    pub scope: &'a str,
    /// Signed state (see [`StateClaims`](super::StateClaims)).
    pub state: &'a str,
}

/// Builds the URL the user is sent to in order to grant access.
///
/// # Example
///
/// ```rust
/// use hub_integrations::auth::oauth::{build_authorize_url, AuthorizeRequest};
///
/// let url = build_authorize_url(
///     "https://account.withings.com/oauth2_user/authorize2",
///     &AuthorizeRequest {
///         client_id: "my_client_id",
///         redirect_uri: "https://hub.example.com/auth/external/callback",
///         scope: "user.info,user.metrics",
///         state: "abc",
///     },
/// );
///
/// assert!(url.starts_with("https://account.withings.com/oauth2_user/authorize2?"));
/// assert!(url.contains("response_type=code"));
/// assert!(url.contains("redirect_uri=https%3A%2F%2Fhub.example.com%2Fauth%2Fexternal%2Fcallback"));
/// ```
#[must_use]
pub fn build_authorize_url(endpoint: &str, request: &AuthorizeRequest<'_>) -> String {
    let params = [
        ("response_type", "code"),
        ("client_id", request.client_id),
        ("redirect_uri", request.redirect_uri),
        ("state", request.state),
        ("scope", request.scope),
    ];

    let query_string = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    format!("{endpoint}?{query_string}")
}
