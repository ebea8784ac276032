//! Config flows: multi-step wizards that create or repair config entries.
//!
//! # Overview
//!
//! - [`FlowHandler`]: the state machine an integration implements
//! - [`FlowStep`]: what a handler asks the hub to do after a step
//! - [`FlowResult`]: what the caller of [`Hub::flow_init`](crate::Hub::flow_init)
//!   and [`Hub::flow_configure`](crate::Hub::flow_configure) sees
//! - [`FlowContext`]: how and for which entry a flow was started
//! - [`FlowError`]: misuse of the flow API
//!
//! A handler only decides; the hub applies. When a handler returns
//! [`FlowStep::CreateEntry`] the hub stores the entry (aborting with
//! `already_configured` on a unique id clash) and schedules its setup. When it
//! returns [`FlowStep::UpdateEntry`] the hub rewrites the entry data, reloads
//! the entry and aborts the flow with the given reason.
//!
//! # Result Shape
//!
//! ```rust
//! use hub_integrations::flow::FlowResult;
//!
//! let result = FlowResult::Abort {
//!     flow_id: "f1".to_string(),
//!     handler: "glances".to_string(),
//!     reason: "already_configured".to_string(),
//! };
//! let json = serde_json::to_value(&result).unwrap();
//! assert_eq!(json["type"], "abort");
//! assert_eq!(json["reason"], "already_configured");
//! ```

mod errors;
mod manager;

pub use errors::FlowError;
pub(crate) use manager::FlowManager;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entries::{ConfigEntry, JsonMap, Source};
use crate::BoxFuture;

/// Step id of the form shown first in user-initiated flows.
pub const STEP_USER: &str = "user";

/// Step id of the confirmation form shown first in reauth flows.
pub const STEP_REAUTH_CONFIRM: &str = "reauth_confirm";

/// How and for which entry a flow was started.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowContext {
    /// What started the flow.
    pub source: Source,
    /// Entry being repaired, for reauth flows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
}

impl FlowContext {
    /// Context of a flow started by a user.
    #[must_use]
    pub fn user() -> Self {
        Self::default()
    }

    /// Context of a reauth flow for `entry_id`.
    #[must_use]
    pub fn reauth(entry_id: impl Into<String>) -> Self {
        Self {
            source: Source::Reauth,
            entry_id: Some(entry_id.into()),
        }
    }
}

/// Result of a flow step as returned to the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowResult {
    /// The flow shows a form and waits for input.
    Form {
        /// Flow id.
        flow_id: String,
        /// Integration domain.
        handler: String,
        /// Step the input belongs to.
        step_id: String,
        /// Errors of the previous submission, keyed by field (`base` for the form).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        errors: Option<BTreeMap<String, String>>,
    },
    /// The user must complete a step on an external site.
    ExternalStep {
        /// Flow id.
        flow_id: String,
        /// Integration domain.
        handler: String,
        /// Step the external site returns to.
        step_id: String,
        /// Where to send the user.
        url: String,
    },
    /// The flow finished and created an entry.
    CreateEntry {
        /// Flow id.
        flow_id: String,
        /// Integration domain.
        handler: String,
        /// Id of the created entry.
        entry_id: String,
        /// Title of the created entry.
        title: String,
        /// Data of the created entry.
        data: JsonMap,
    },
    /// The flow ended without creating an entry.
    Abort {
        /// Flow id.
        flow_id: String,
        /// Integration domain.
        handler: String,
        /// Machine readable reason, e.g. `already_configured`.
        reason: String,
    },
}

impl FlowResult {
    /// Returns the flow id.
    #[must_use]
    pub fn flow_id(&self) -> &str {
        match self {
            Self::Form { flow_id, .. }
            | Self::ExternalStep { flow_id, .. }
            | Self::CreateEntry { flow_id, .. }
            | Self::Abort { flow_id, .. } => flow_id,
        }
    }

    /// Returns the step id of a form or external step.
    #[must_use]
    pub fn step_id(&self) -> Option<&str> {
        match self {
            Self::Form { step_id, .. } | Self::ExternalStep { step_id, .. } => Some(step_id),
            _ => None,
        }
    }

    /// Returns the abort reason.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Abort { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// Returns the form errors.
    #[must_use]
    pub fn errors(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::Form { errors, .. } => errors.as_ref(),
            _ => None,
        }
    }
}

/// An entry a flow asks the hub to create.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewEntry {
    /// Entry title.
    pub title: String,
    /// Identity used for duplicate detection.
    pub unique_id: Option<String>,
    /// Entry data.
    pub data: JsonMap,
    /// Entry options.
    pub options: JsonMap,
}

/// Outcome of one handler step.
#[derive(Clone, Debug, PartialEq)]
pub enum FlowStep {
    /// Show a form.
    Form {
        /// Step id of the form.
        step_id: &'static str,
        /// Errors to display.
        errors: Option<BTreeMap<String, String>>,
    },
    /// Send the user to an external URL; the flow resumes at `step_id`.
    External {
        /// Step that receives the external result.
        step_id: &'static str,
        /// Where to send the user.
        url: String,
    },
    /// Create an entry and finish.
    CreateEntry(NewEntry),
    /// Replace an entry's data, reload it and finish with `reason`.
    UpdateEntry {
        /// Entry to update.
        entry_id: String,
        /// New data payload.
        data: JsonMap,
        /// Abort reason reported to the caller.
        reason: &'static str,
    },
    /// Finish without an entry.
    Abort {
        /// Machine readable reason.
        reason: &'static str,
    },
}

impl FlowStep {
    /// A form without errors.
    #[must_use]
    pub const fn form(step_id: &'static str) -> Self {
        Self::Form {
            step_id,
            errors: None,
        }
    }

    /// A form with a single form-level error.
    #[must_use]
    pub fn form_error(step_id: &'static str, error: &str) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert("base".to_string(), error.to_string());
        Self::Form {
            step_id,
            errors: Some(errors),
        }
    }

    /// An abort.
    #[must_use]
    pub const fn abort(reason: &'static str) -> Self {
        Self::Abort { reason }
    }
}

/// A config flow state machine.
///
/// The hub calls [`step`](Self::step) once with `None` when the flow starts
/// and then once per submission. `entries` holds the current entries of the
/// handler's domain, for duplicate detection.
pub trait FlowHandler: Send {
    /// Advances the flow.
    fn step<'a>(
        &'a mut self,
        input: Option<Value>,
        entries: &'a [ConfigEntry],
    ) -> BoxFuture<'a, Result<FlowStep, FlowError>>;
}

/// A flow in progress, as listed by [`Hub::flow_progress`](crate::Hub::flow_progress).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FlowProgress {
    /// Flow id.
    pub flow_id: String,
    /// Integration domain.
    pub handler: String,
    /// Step the flow is waiting on.
    pub step_id: String,
    /// How the flow was started.
    pub context: FlowContext,
}
