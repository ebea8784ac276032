//! Error types for hub configuration.
//!
//! This module contains the error type used by the static configuration
//! schema and by the validated newtypes in [`crate::config`].
//!
//! # Error Handling
//!
//! All configuration constructors return `Result<T, ConfigError>` so invalid
//! configuration is rejected before anything is applied.
//!
//! # Example
//!
//! ```rust
//! use hub_integrations::{ClientId, ConfigError};
//!
//! let result = ClientId::new("");
//! assert!(matches!(result, Err(ConfigError::EmptyClientId)));
//! ```

use thiserror::Error;

/// Errors that can occur while validating configuration.
///
/// Each variant carries enough context to point at the offending key.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// OAuth client id cannot be empty.
    #[error("Client id cannot be empty. Please provide the client id issued by the vendor.")]
    EmptyClientId,

    /// OAuth client secret cannot be empty.
    #[error("Client secret cannot be empty. Please provide the client secret issued by the vendor.")]
    EmptyClientSecret,

    /// A required key is missing from a configuration block.
    #[error("Missing required key '{key}' in '{domain}' configuration.")]
    MissingKey {
        /// The integration domain being validated.
        domain: &'static str,
        /// The missing key.
        key: &'static str,
    },

    /// A key holds a value of the wrong type.
    #[error("Invalid value for '{key}' in '{domain}' configuration: expected {expected}.")]
    InvalidType {
        /// The integration domain being validated.
        domain: &'static str,
        /// The offending key.
        key: String,
        /// Human readable description of the expected type.
        expected: &'static str,
    },

    /// A configuration block contains a key the schema does not know.
    #[error("Unknown key '{key}' in '{domain}' configuration.")]
    UnknownKey {
        /// The integration domain being validated.
        domain: &'static str,
        /// The unexpected key.
        key: String,
    },

    /// A required builder field was never set.
    #[error("Missing required field: '{field}'. This field must be set before building the configuration.")]
    MissingRequiredField {
        /// The name of the missing field.
        field: &'static str,
    },

    /// Host URL is invalid.
    #[error("Invalid host URL '{url}'. Please provide a valid URL with scheme (e.g., 'http://hub.local:8123').")]
    InvalidHostUrl {
        /// The invalid URL that was provided.
        url: String,
    },

    /// Webhook id is not a 64 character lowercase hex string.
    #[error("Invalid webhook id '{id}'. Expected 64 lowercase hexadecimal characters.")]
    InvalidWebhookId {
        /// The rejected id.
        id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_client_id_error_message() {
        let message = ConfigError::EmptyClientId.to_string();
        assert!(message.contains("Client id cannot be empty"));
    }

    #[test]
    fn test_invalid_type_error_names_key_and_domain() {
        let error = ConfigError::InvalidType {
            domain: "withings",
            key: "use_webhook".to_string(),
            expected: "a boolean",
        };
        let message = error.to_string();
        assert!(message.contains("use_webhook"));
        assert!(message.contains("withings"));
        assert!(message.contains("a boolean"));
    }

    #[test]
    fn test_missing_required_field_error_message() {
        let error = ConfigError::MissingRequiredField {
            field: "external_url",
        };
        let message = error.to_string();
        assert!(message.contains("external_url"));
        assert!(message.contains("must be set"));
    }

    #[test]
    fn test_error_implements_std_error() {
        let error = ConfigError::EmptyClientSecret;
        let _: &dyn std::error::Error = &error;
    }
}
