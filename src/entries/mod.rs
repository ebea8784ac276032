//! Config entries: the persisted records describing configured integrations.
//!
//! A [`ConfigEntry`] is created by a config flow (or by hand, for imported or
//! restored entries) and stored in a [`ConfigEntries`] collection owned by the
//! [`Hub`](crate::Hub). The collection enforces the one invariant that every
//! integration relies on: at most one entry per `(domain, unique_id)`.
//!
//! # Example
//!
//! ```rust
//! use hub_integrations::entries::{ConfigEntries, ConfigEntry, EntryError};
//! use serde_json::json;
//!
//! let mut entries = ConfigEntries::new();
//! let entry = ConfigEntry::new("withings", "henk", json!({"profile": "henk"}))
//!     .with_unique_id("123");
//! entries.insert(entry.clone()).unwrap();
//!
//! let duplicate = ConfigEntry::new("withings", "henk", json!({})).with_unique_id("123");
//! assert!(matches!(
//!     entries.insert(duplicate),
//!     Err(EntryError::AlreadyConfigured { .. })
//! ));
//! ```

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// JSON object used for entry data and options payloads.
pub type JsonMap = serde_json::Map<String, Value>;

/// How a config entry (or a config flow) was started.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Started interactively by a user.
    #[default]
    User,
    /// Started because stored credentials stopped working.
    Reauth,
    /// Created from static configuration.
    Import,
}

impl Source {
    /// Returns the wire name of the source.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Reauth => "reauth",
            Self::Import => "import",
        }
    }
}

/// Runtime state of a config entry. Not persisted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EntryState {
    /// Not set up yet, or unloaded.
    #[default]
    NotLoaded,
    /// Set up and running.
    Loaded,
    /// Setup failed and will not be retried without user action.
    SetupError,
    /// Setup failed on a transient error.
    SetupRetry,
    /// The stored entry could not be migrated to the current version.
    MigrationError,
}

/// A persisted integration instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Hub-generated identifier.
    pub entry_id: String,
    /// Integration domain, e.g. `"withings"`.
    pub domain: String,
    /// Display title.
    pub title: String,
    /// Schema version of `data`/`options`.
    pub version: u32,
    /// Integration-defined identity used for duplicate detection.
    pub unique_id: Option<String>,
    /// Credentials and connection data.
    pub data: JsonMap,
    /// User-tunable options.
    pub options: JsonMap,
    /// How the entry was created.
    pub source: Source,
    /// Runtime state.
    #[serde(skip)]
    pub state: EntryState,
}

impl ConfigEntry {
    const ID_LENGTH: usize = 26;

    /// Creates a version 1 entry with a fresh `entry_id`.
    ///
    /// `data` is expected to be a JSON object; any other value yields an empty
    /// data payload.
    #[must_use]
    pub fn new(domain: impl Into<String>, title: impl Into<String>, data: Value) -> Self {
        Self {
            entry_id: generate_id(Self::ID_LENGTH),
            domain: domain.into(),
            title: title.into(),
            version: 1,
            unique_id: None,
            data: into_map(data),
            options: JsonMap::new(),
            source: Source::User,
            state: EntryState::NotLoaded,
        }
    }

    /// Sets the unique id.
    #[must_use]
    pub fn with_unique_id(mut self, unique_id: impl Into<String>) -> Self {
        self.unique_id = Some(unique_id.into());
        self
    }

    /// Sets the options payload.
    #[must_use]
    pub fn with_options(mut self, options: Value) -> Self {
        self.options = into_map(options);
        self
    }

    /// Sets the schema version.
    #[must_use]
    pub const fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Sets the source.
    #[must_use]
    pub const fn with_source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }
}

/// A partial update applied to a stored entry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntryUpdate {
    /// Replacement data payload.
    pub data: Option<JsonMap>,
    /// Replacement options payload.
    pub options: Option<JsonMap>,
    /// Replacement unique id.
    pub unique_id: Option<String>,
    /// Replacement title.
    pub title: Option<String>,
    /// Replacement schema version.
    pub version: Option<u32>,
}

impl EntryUpdate {
    /// Returns `true` when the update changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.data.is_none()
            && self.options.is_none()
            && self.unique_id.is_none()
            && self.title.is_none()
            && self.version.is_none()
    }
}

/// Errors raised by the entry store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EntryError {
    /// Another entry of the same domain already has this unique id.
    #[error("An entry for '{domain}' with unique id '{unique_id}' is already configured")]
    AlreadyConfigured {
        /// The integration domain.
        domain: String,
        /// The clashing unique id.
        unique_id: String,
    },

    /// No entry with the given id exists.
    #[error("Unknown config entry '{entry_id}'")]
    UnknownEntry {
        /// The id that was looked up.
        entry_id: String,
    },
}

/// In-memory store of config entries, in insertion order.
#[derive(Debug, Default)]
pub struct ConfigEntries {
    entries: Vec<ConfigEntry>,
}

impl ConfigEntries {
    /// Creates an empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds an entry.
    ///
    /// # Errors
    ///
    /// Returns [`EntryError::AlreadyConfigured`] if another entry of the same
    /// domain carries the same unique id.
    pub fn insert(&mut self, entry: ConfigEntry) -> Result<(), EntryError> {
        if let Some(unique_id) = &entry.unique_id {
            if self.find_by_unique_id(&entry.domain, unique_id).is_some() {
                return Err(EntryError::AlreadyConfigured {
                    domain: entry.domain,
                    unique_id: unique_id.clone(),
                });
            }
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Looks up an entry by id.
    #[must_use]
    pub fn get(&self, entry_id: &str) -> Option<&ConfigEntry> {
        self.entries.iter().find(|e| e.entry_id == entry_id)
    }

    /// Looks up an entry by `(domain, unique_id)`.
    #[must_use]
    pub fn find_by_unique_id(&self, domain: &str, unique_id: &str) -> Option<&ConfigEntry> {
        self.entries
            .iter()
            .find(|e| e.domain == domain && e.unique_id.as_deref() == Some(unique_id))
    }

    /// Returns all entries of a domain.
    #[must_use]
    pub fn for_domain(&self, domain: &str) -> Vec<&ConfigEntry> {
        self.entries.iter().filter(|e| e.domain == domain).collect()
    }

    /// Returns the number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Applies an update to a stored entry.
    ///
    /// # Errors
    ///
    /// Returns [`EntryError::UnknownEntry`] for a missing entry and
    /// [`EntryError::AlreadyConfigured`] if the new unique id clashes with
    /// another entry of the same domain.
    pub fn update(&mut self, entry_id: &str, update: EntryUpdate) -> Result<(), EntryError> {
        let index = self.index_of(entry_id)?;

        if let Some(unique_id) = &update.unique_id {
            let domain = &self.entries[index].domain;
            let clash = self.entries.iter().any(|e| {
                e.entry_id != entry_id
                    && &e.domain == domain
                    && e.unique_id.as_deref() == Some(unique_id.as_str())
            });
            if clash {
                return Err(EntryError::AlreadyConfigured {
                    domain: domain.clone(),
                    unique_id: unique_id.clone(),
                });
            }
        }

        let entry = &mut self.entries[index];
        if let Some(data) = update.data {
            entry.data = data;
        }
        if let Some(options) = update.options {
            entry.options = options;
        }
        if let Some(unique_id) = update.unique_id {
            entry.unique_id = Some(unique_id);
        }
        if let Some(title) = update.title {
            entry.title = title;
        }
        if let Some(version) = update.version {
            entry.version = version;
        }
        Ok(())
    }

    /// Records the runtime state of an entry.
    ///
    /// # Errors
    ///
    /// Returns [`EntryError::UnknownEntry`] for a missing entry.
    pub fn set_state(&mut self, entry_id: &str, state: EntryState) -> Result<(), EntryError> {
        let index = self.index_of(entry_id)?;
        self.entries[index].state = state;
        Ok(())
    }

    /// Removes an entry and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`EntryError::UnknownEntry`] for a missing entry.
    pub fn remove(&mut self, entry_id: &str) -> Result<ConfigEntry, EntryError> {
        let index = self.index_of(entry_id)?;
        Ok(self.entries.remove(index))
    }

    fn index_of(&self, entry_id: &str) -> Result<usize, EntryError> {
        self.entries
            .iter()
            .position(|e| e.entry_id == entry_id)
            .ok_or_else(|| EntryError::UnknownEntry {
                entry_id: entry_id.to_string(),
            })
    }
}

/// Generates a random alphanumeric identifier.
pub(crate) fn generate_id(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

fn into_map(value: Value) -> JsonMap {
    match value {
        Value::Object(map) => map,
        _ => JsonMap::new(),
    }
}
