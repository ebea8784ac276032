use serde_json::Value;

use super::{Hub, SetupError};
use crate::entries::{ConfigEntry, EntryUpdate};
use crate::flow::{FlowContext, FlowError, FlowHandler};
use crate::BoxFuture;

/// A pluggable integration.
///
/// The hub owns integrations for its whole lifetime and calls them from
/// arbitrary tasks, so they must be `Send + Sync` and keep per-entry state
/// behind their own locks.
///
/// # Example
///
/// ```rust
/// use hub_integrations::{BoxFuture, Hub, Integration, SetupError};
/// use hub_integrations::entries::ConfigEntry;
/// use hub_integrations::flow::{FlowContext, FlowError, FlowHandler};
///
/// struct Demo;
///
/// impl Integration for Demo {
///     fn domain(&self) -> &'static str {
///         "demo"
///     }
///
///     fn create_flow(
///         &self,
///         _hub: &Hub,
///         _flow_id: &str,
///         _context: &FlowContext,
///     ) -> Result<Box<dyn FlowHandler>, FlowError> {
///         Err(FlowError::UnknownHandler { domain: "demo".to_string() })
///     }
///
///     fn setup_entry<'a>(
///         &'a self,
///         _hub: &'a Hub,
///         _entry: &'a ConfigEntry,
///     ) -> BoxFuture<'a, Result<(), SetupError>> {
///         Box::pin(async { Ok(()) })
///     }
///
///     fn unload_entry<'a>(&'a self, _hub: &'a Hub, _entry_id: &'a str) -> BoxFuture<'a, ()> {
///         Box::pin(async {})
///     }
/// }
/// ```
pub trait Integration: Send + Sync {
    /// Integration domain, e.g. `"withings"`.
    fn domain(&self) -> &'static str;

    /// Validates and applies static configuration.
    ///
    /// `config` is the whole static configuration; integrations pick their
    /// own key out of it and do nothing when it is absent.
    fn async_setup<'a>(
        &'a self,
        _hub: &'a Hub,
        _config: &'a Value,
    ) -> BoxFuture<'a, Result<(), SetupError>> {
        Box::pin(async { Ok(()) })
    }

    /// Creates the state machine of a new config flow.
    ///
    /// # Errors
    ///
    /// Returns a [`FlowError`] if the integration cannot start a flow for
    /// this context.
    fn create_flow(
        &self,
        hub: &Hub,
        flow_id: &str,
        context: &FlowContext,
    ) -> Result<Box<dyn FlowHandler>, FlowError>;

    /// Returns the update that brings an entry to the current version, if any.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Migration`] for entries that cannot be migrated.
    fn migrate_entry(&self, _entry: &ConfigEntry) -> Result<Option<EntryUpdate>, SetupError> {
        Ok(None)
    }

    /// Sets up a config entry.
    fn setup_entry<'a>(
        &'a self,
        hub: &'a Hub,
        entry: &'a ConfigEntry,
    ) -> BoxFuture<'a, Result<(), SetupError>>;

    /// Tears down everything `setup_entry` created.
    fn unload_entry<'a>(&'a self, hub: &'a Hub, entry_id: &'a str) -> BoxFuture<'a, ()>;
}
