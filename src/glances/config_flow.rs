//! Config flow for Glances.

use std::sync::Arc;

use serde_json::Value;

use super::api::{GlancesApi, GlancesError, GlancesUserInput};
use crate::entries::{ConfigEntry, JsonMap};
use crate::flow::{FlowError, FlowHandler, FlowStep, NewEntry, STEP_USER};
use crate::BoxFuture;

/// States of the Glances flow. There is a single form that is re-shown until
/// the server accepts the input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GlancesStep {
    /// Collecting connection parameters.
    User,
}

/// Config flow collecting and verifying Glances connection parameters.
pub struct GlancesFlow {
    api: Arc<dyn GlancesApi>,
    step: GlancesStep,
}

impl GlancesFlow {
    /// Creates a flow that verifies input through `api`.
    #[must_use]
    pub fn new(api: Arc<dyn GlancesApi>) -> Self {
        Self {
            api,
            step: GlancesStep::User,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> GlancesStep {
        self.step
    }

    async fn step_user(
        &mut self,
        input: Option<Value>,
        entries: &[ConfigEntry],
    ) -> Result<FlowStep, FlowError> {
        let Some(input) = input else {
            return Ok(FlowStep::form(STEP_USER));
        };
        let input = GlancesUserInput::from_value(input)?;

        if is_configured(&input, entries) {
            return Ok(FlowStep::abort("already_configured"));
        }

        match self.api.get_ha_sensor_data(&input).await {
            Ok(_) => {}
            Err(GlancesError::Authorization) => {
                return Ok(FlowStep::form_error(STEP_USER, "invalid_auth"));
            }
            Err(err) => {
                tracing::debug!("Glances server {} not reachable: {}", input.title(), err);
                return Ok(FlowStep::form_error(STEP_USER, "cannot_connect"));
            }
        }

        let data = match serde_json::to_value(&input) {
            Ok(Value::Object(map)) => map,
            _ => JsonMap::new(),
        };

        Ok(FlowStep::CreateEntry(NewEntry {
            title: input.title(),
            unique_id: None,
            data,
            options: JsonMap::new(),
        }))
    }
}

impl FlowHandler for GlancesFlow {
    fn step<'a>(
        &'a mut self,
        input: Option<Value>,
        entries: &'a [ConfigEntry],
    ) -> BoxFuture<'a, Result<FlowStep, FlowError>> {
        Box::pin(async move {
            match self.step {
                GlancesStep::User => self.step_user(input, entries).await,
            }
        })
    }
}

/// An entry for the same host and port already exists.
fn is_configured(input: &GlancesUserInput, entries: &[ConfigEntry]) -> bool {
    entries.iter().any(|entry| {
        let host = entry.data.get("host").and_then(Value::as_str);
        let port = entry
            .data
            .get("port")
            .and_then(Value::as_u64)
            .unwrap_or(u64::from(GlancesUserInput::DEFAULT_PORT));
        host == Some(input.host.as_str()) && port == u64::from(input.port)
    })
}
