//! Authentication support shared by cloud integrations.
//!
//! - [`oauth`]: OAuth 2.0 authorization code flow, signed state and tokens
//!
//! Local-network integrations (such as Glances) authenticate with plain
//! credentials stored in their entry data and do not use this module.

pub mod oauth;

pub use oauth::{OAuthError, OAuthProvider, OAuthToken};
