use crate::entries::EntryError;
use thiserror::Error;

/// Errors raised while driving a config flow.
///
/// Expected outcomes such as a duplicate account or a failed credential check
/// are not errors; they are reported through
/// [`FlowResult`](super::FlowResult). A `FlowError` means the caller did
/// something the flow cannot handle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// No flow with this id is in progress.
    #[error("Unknown flow '{flow_id}'")]
    UnknownFlow {
        /// The id that was looked up.
        flow_id: String,
    },

    /// No integration is registered for the domain.
    #[error("No config flow handler for '{domain}'")]
    UnknownHandler {
        /// The requested domain.
        domain: String,
    },

    /// The flow is already processing a step.
    #[error("Flow '{flow_id}' is busy")]
    Busy {
        /// The busy flow.
        flow_id: String,
    },

    /// The submitted step input does not match the step schema.
    #[error("Invalid flow input: {message}")]
    InvalidInput {
        /// What was wrong with the input.
        message: String,
    },

    /// Applying the flow result to the entry store failed.
    #[error(transparent)]
    Entry(#[from] EntryError),
}

impl FlowError {
    /// Shorthand for [`FlowError::InvalidInput`].
    #[must_use]
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }
}
