//! Config flow for Withings accounts.
//!
//! ```text
//!  reauth ──► reauth_confirm ──┐
//!                              ▼
//!  user ─────────────────────► user ──► (external authorize) ──► auth ──► create / update
//! ```
//!
//! The external step hands the user to Withings with a signed state naming
//! this flow. The hub's OAuth callback route decodes the state and submits
//! `{"code", "state"}` to the `auth` step.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::entry::{CONF_PROFILE, CONF_TOKEN, CONF_USE_WEBHOOK, CONF_WEBHOOK_ID};
use crate::auth::oauth::{OAuthProvider, StateClaims};
use crate::config::{HubConfig, WebhookId};
use crate::entries::{ConfigEntry, JsonMap, Source};
use crate::flow::{
    FlowContext, FlowError, FlowHandler, FlowStep, NewEntry, STEP_REAUTH_CONFIRM, STEP_USER,
};
use crate::BoxFuture;

/// Step id of the step receiving the authorization code.
pub const STEP_AUTH: &str = "auth";

/// Title and profile name of entries created by the flow.
const DEFAULT_TITLE: &str = "Withings";

/// States of the Withings flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WithingsStep {
    /// Reauth only: waiting for the user to confirm.
    ReauthConfirm,
    /// About to send the user to Withings.
    User,
    /// Waiting for the authorization code.
    Auth,
}

#[derive(Deserialize)]
struct AuthInput {
    code: String,
    state: String,
}

/// Config flow linking a Withings account.
pub struct WithingsFlow {
    flow_id: String,
    context: FlowContext,
    hub_config: HubConfig,
    oauth: Option<Arc<dyn OAuthProvider>>,
    use_webhook: bool,
    step: WithingsStep,
}

impl WithingsFlow {
    /// Creates a flow.
    ///
    /// `oauth` is `None` when no client credentials are configured; the flow
    /// then aborts with `missing_credentials`. `use_webhook` becomes the
    /// option of a created entry.
    #[must_use]
    pub fn new(
        flow_id: impl Into<String>,
        context: FlowContext,
        hub_config: HubConfig,
        oauth: Option<Arc<dyn OAuthProvider>>,
        use_webhook: bool,
    ) -> Self {
        let step = if context.source == Source::Reauth {
            WithingsStep::ReauthConfirm
        } else {
            WithingsStep::User
        };
        Self {
            flow_id: flow_id.into(),
            context,
            hub_config,
            oauth,
            use_webhook,
            step,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> WithingsStep {
        self.step
    }

    fn step_user(&mut self) -> FlowStep {
        let Some(oauth) = &self.oauth else {
            return FlowStep::abort("missing_credentials");
        };
        let Some(redirect_uri) = self.hub_config.oauth_redirect_uri() else {
            return FlowStep::abort("no_url_available");
        };

        let state = match StateClaims::new(&self.flow_id, &redirect_uri)
            .encode(self.hub_config.jwt_secret())
        {
            Ok(state) => state,
            Err(err) => {
                tracing::error!("Could not sign OAuth state: {}", err);
                return FlowStep::abort("oauth_error");
            }
        };

        self.step = WithingsStep::Auth;
        FlowStep::External {
            step_id: STEP_AUTH,
            url: oauth.authorize_url(&redirect_uri, &state),
        }
    }

    async fn step_auth(
        &mut self,
        input: Option<Value>,
        entries: &[ConfigEntry],
    ) -> Result<FlowStep, FlowError> {
        let Some(input) = input else {
            return Err(FlowError::invalid_input("authorization code required"));
        };
        let input: AuthInput = serde_json::from_value(input).map_err(FlowError::invalid_input)?;

        let claims = match StateClaims::decode(&input.state, self.hub_config.jwt_secret()) {
            Ok(claims) if claims.flow_id == self.flow_id => claims,
            Ok(_) => return Ok(FlowStep::abort("invalid_state")),
            Err(err) => {
                tracing::debug!("Rejected OAuth state: {}", err);
                return Ok(FlowStep::abort("invalid_state"));
            }
        };

        let Some(oauth) = &self.oauth else {
            return Ok(FlowStep::abort("missing_credentials"));
        };
        let token = match oauth.exchange_code(&input.code, &claims.redirect_uri).await {
            Ok(token) => token,
            Err(err) => {
                tracing::warn!("Withings token exchange failed: {}", err);
                return Ok(FlowStep::abort("oauth_error"));
            }
        };
        let unique_id = token.userid.to_string();

        if self.context.source == Source::Reauth {
            let Some(entry) = self
                .context
                .entry_id
                .as_deref()
                .and_then(|id| entries.iter().find(|e| e.entry_id == id))
            else {
                return Ok(FlowStep::abort("reauth_entry_missing"));
            };
            if entry.unique_id.as_deref() != Some(unique_id.as_str()) {
                return Ok(FlowStep::abort("wrong_account"));
            }

            let mut data = entry.data.clone();
            data.insert(CONF_TOKEN.to_string(), token.to_value());
            return Ok(FlowStep::UpdateEntry {
                entry_id: entry.entry_id.clone(),
                data,
                reason: "reauth_successful",
            });
        }

        if entries
            .iter()
            .any(|e| e.unique_id.as_deref() == Some(unique_id.as_str()))
        {
            return Ok(FlowStep::abort("already_configured"));
        }

        let mut data = JsonMap::new();
        data.insert(CONF_TOKEN.to_string(), token.to_value());
        data.insert(CONF_PROFILE.to_string(), Value::String(DEFAULT_TITLE.to_string()));
        data.insert(
            CONF_WEBHOOK_ID.to_string(),
            Value::String(WebhookId::generate().to_string()),
        );

        let mut options = JsonMap::new();
        options.insert(CONF_USE_WEBHOOK.to_string(), Value::Bool(self.use_webhook));

        Ok(FlowStep::CreateEntry(NewEntry {
            title: DEFAULT_TITLE.to_string(),
            unique_id: Some(unique_id),
            data,
            options,
        }))
    }
}

impl FlowHandler for WithingsFlow {
    fn step<'a>(
        &'a mut self,
        input: Option<Value>,
        entries: &'a [ConfigEntry],
    ) -> BoxFuture<'a, Result<FlowStep, FlowError>> {
        Box::pin(async move {
            match self.step {
                WithingsStep::ReauthConfirm => {
                    if input.is_none() {
                        return Ok(FlowStep::form(STEP_REAUTH_CONFIRM));
                    }
                    self.step = WithingsStep::User;
                    Ok(self.step_user())
                }
                WithingsStep::User => Ok(self.step_user()),
                WithingsStep::Auth => self.step_auth(input, entries).await,
            }
        })
    }
}
