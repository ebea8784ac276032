//! Signed OAuth `state` parameter.
//!
//! The state sent to the authorization server is a short-lived HS256 JWT
//! signed with the hub secret. It carries the id of the config flow that
//! started the authorization, so the callback endpoint can route the code
//! back to that flow without any server-side session storage.
//!
//! # Example
//!
//! ```rust
//! use hub_integrations::auth::oauth::StateClaims;
//!
//! let claims = StateClaims::new("flow-1", "https://hub.example.com/auth/external/callback");
//! let token = claims.encode("secret").unwrap();
//!
//! let decoded = StateClaims::decode(&token, "secret").unwrap();
//! assert_eq!(decoded.flow_id, "flow-1");
//! assert!(StateClaims::decode(&token, "other-secret").is_err());
//! ```

use crate::auth::oauth::OAuthError;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Claims carried by the OAuth state JWT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateClaims {
    /// Config flow awaiting the authorization code.
    pub flow_id: String,
    /// Redirect URI used for the authorization request.
    pub redirect_uri: String,
    /// Random nonce so two states for the same flow never collide.
    pub nonce: String,
    /// Expiration timestamp (Unix seconds).
    pub exp: i64,
}

// Verify StateClaims is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<StateClaims>();
};

impl StateClaims {
    /// How long a state stays valid, in seconds.
    pub const LIFETIME_SECS: i64 = 20 * 60;

    const NONCE_LENGTH: usize = 15;

    /// Creates claims for `flow_id` expiring [`Self::LIFETIME_SECS`] from now.
    #[must_use]
    pub fn new(flow_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(Self::NONCE_LENGTH)
            .map(char::from)
            .collect();

        Self {
            flow_id: flow_id.into(),
            redirect_uri: redirect_uri.into(),
            nonce,
            exp: chrono::Utc::now().timestamp() + Self::LIFETIME_SECS,
        }
    }

    /// Signs the claims into a compact JWT.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::InvalidState`] if signing fails.
    pub fn encode(&self, secret: &str) -> Result<String, OAuthError> {
        encode(
            &Header::new(Algorithm::HS256),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| OAuthError::InvalidState {
            reason: format!("Error encoding state: {e}"),
        })
    }

    /// Verifies and decodes a state JWT.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::InvalidState`] for a bad signature, an expired
    /// state or malformed claims.
    pub fn decode(token: &str, secret: &str) -> Result<Self, OAuthError> {
        let validation = Validation::new(Algorithm::HS256);
        let key = DecodingKey::from_secret(secret.as_bytes());

        decode::<Self>(token, &key, &validation)
            .map(|data| data.claims)
            .map_err(|e| OAuthError::InvalidState {
                reason: format!("Error decoding state: {e}"),
            })
    }
}
