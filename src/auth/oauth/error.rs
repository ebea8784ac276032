//! OAuth-specific error types.
//!
//! # Error Types
//!
//! - [`OAuthError::MissingHostConfig`]: no external URL to build a redirect URI
//! - [`OAuthError::InvalidState`]: the `state` parameter failed verification
//! - [`OAuthError::TokenExchangeFailed`]: exchanging an authorization code failed
//! - [`OAuthError::TokenRefreshFailed`]: refreshing an access token failed
//! - [`OAuthError::MissingRefreshToken`]: a refresh was needed but impossible
//!
//! # Example
//!
//! ```rust
//! use hub_integrations::auth::oauth::OAuthError;
//!
//! let error = OAuthError::TokenExchangeFailed {
//!     status: 503,
//!     message: "invalid code".to_string(),
//! };
//! assert!(error.to_string().contains("503"));
//! ```

use thiserror::Error;

/// Errors that can occur during OAuth operations.
///
/// # Thread Safety
///
/// `OAuthError` is `Send + Sync`, making it safe to use across async boundaries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OAuthError {
    /// The hub has no external URL, so no redirect URI can be built.
    #[error("An external URL must be configured on the hub for OAuth")]
    MissingHostConfig,

    /// The `state` parameter could not be verified.
    ///
    /// Either the signature is wrong, the state expired, or it belongs to
    /// a different flow.
    #[error("Invalid OAuth state: {reason}")]
    InvalidState {
        /// Why verification failed.
        reason: String,
    },

    /// Exchanging an authorization code for a token failed.
    ///
    /// `status` is the HTTP status for transport-level failures and the
    /// vendor status code for envelope-level failures. It is `0` when the
    /// request never reached the server.
    #[error("Token exchange failed with status {status}: {message}")]
    TokenExchangeFailed {
        /// The HTTP or vendor status code.
        status: i64,
        /// The error message from the response.
        message: String,
    },

    /// Refreshing an access token failed.
    #[error("Token refresh failed with status {status}: {message}")]
    TokenRefreshFailed {
        /// The HTTP or vendor status code.
        status: i64,
        /// The error message from the response.
        message: String,
    },

    /// The token has expired and carries no refresh token.
    #[error("Access token expired and no refresh token is available")]
    MissingRefreshToken,
}
