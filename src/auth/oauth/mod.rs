//! OAuth 2.0 authorization code flow support.
//!
//! Integrations that authenticate against a cloud account use this module to
//! drive the authorization code grant from inside a config flow:
//!
//! 1. **Authorization**: the flow signs a [`StateClaims`] JWT naming itself and
//!    sends the user to the URL produced by [`OAuthProvider::authorize_url`].
//! 2. **Callback**: the hub's callback route decodes the state, finds the flow
//!    and hands it the authorization code.
//! 3. **Exchange**: the flow calls [`OAuthProvider::exchange_code`] and stores
//!    the resulting [`OAuthToken`] in the config entry.
//! 4. **Refresh**: coordinators call [`OAuthProvider::refresh_token`] when the
//!    stored token has expired.
//!
//! The state is signed with the hub secret, so the callback needs no
//! server-side session store.
//!
//! # Example
//!
//! ```rust
//! use hub_integrations::auth::oauth::{OAuthToken, StateClaims};
//!
//! let state = StateClaims::new("flow-1", "https://hub/auth/external/callback")
//!     .encode("hub-secret")
//!     .unwrap();
//! assert_eq!(StateClaims::decode(&state, "hub-secret").unwrap().flow_id, "flow-1");
//!
//! let token = OAuthToken::new(123, "access");
//! assert!(!token.is_expired());
//! ```

mod authorize;
mod error;
mod state;
mod token;

pub use authorize::{build_authorize_url, AuthorizeRequest};
pub use error::OAuthError;
pub use state::StateClaims;
pub use token::OAuthToken;

use crate::BoxFuture;

/// An OAuth 2.0 authorization server.
///
/// Implementations hold the client credentials; callers only pass the values
/// that change per request.
pub trait OAuthProvider: Send + Sync {
    /// Returns the URL that starts an authorization for `state`.
    fn authorize_url(&self, redirect_uri: &str, state: &str) -> String;

    /// Exchanges an authorization code for a token.
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        redirect_uri: &'a str,
    ) -> BoxFuture<'a, Result<OAuthToken, OAuthError>>;

    /// Obtains a fresh access token using the token's refresh token.
    fn refresh_token<'a>(
        &'a self,
        token: &'a OAuthToken,
    ) -> BoxFuture<'a, Result<OAuthToken, OAuthError>>;
}
