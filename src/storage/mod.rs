//! Storage module for Recall
//!
//! Holds the in-memory item store and the persistence backends. Backends
//! move the whole learner state (`learningWords`, `wordStats`, `srsDay`,
//! `practiceMode`, `session`) as one unit; raw loads stay untyped so the
//! migrator can repair old or damaged data before anything reads it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::StorageBackend;
use crate::error::StoreError;
use crate::migrate::StoredRecord;
use crate::scheduler::DayCounters;
use crate::session::{PracticeMode, SessionQueue};

pub mod items;
pub mod json_store;
pub mod memory_store;
pub mod sqlite_store;

pub use items::{item_id, ItemStore, LearningItem};
pub use json_store::JsonFileStore;
pub use memory_store::MemoryStore;
pub use sqlite_store::SqliteStore;

/// Top-level keys of the persisted layout
pub const STATE_KEYS: [&str; 5] = ["learningWords", "wordStats", "srsDay", "practiceMode", "session"];

/// State as read back from a backend, before migration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawState {
    #[serde(default)]
    pub learning_words: Value,
    #[serde(default)]
    pub word_stats: Value,
    #[serde(default)]
    pub srs_day: Value,
    #[serde(default)]
    pub practice_mode: Value,
    #[serde(default)]
    pub session: Value,
}

/// State in the current layout, as written by the engine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub learning_words: Vec<LearningItem>,
    pub word_stats: BTreeMap<String, StoredRecord>,
    pub srs_day: DayCounters,
    pub practice_mode: PracticeMode,
    pub session: Option<SessionQueue>,
}

/// A place the learner state can be loaded from and saved to
pub trait StateStore {
    /// Read the last saved state, or `None` if nothing was ever saved
    fn load(&self) -> Result<Option<RawState>, StoreError>;

    /// Durably replace the saved state
    fn save(&self, state: &PersistedState) -> Result<(), StoreError>;

    /// Human-readable location, for status output
    fn describe(&self) -> String;
}

impl<S: StateStore + ?Sized> StateStore for std::sync::Arc<S> {
    fn load(&self) -> Result<Option<RawState>, StoreError> {
        (**self).load()
    }

    fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        (**self).save(state)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// File name used by each backend inside the data directory
pub fn state_file_name(backend: StorageBackend) -> &'static str {
    match backend {
        StorageBackend::Json => "state.json",
        StorageBackend::Sqlite => "state.sqlite",
    }
}

/// Open the configured backend inside `data_dir`
pub fn open_store(data_dir: &Path, backend: StorageBackend) -> Result<Box<dyn StateStore>, StoreError> {
    let path = data_dir.join(state_file_name(backend));
    debug!("Opening {:?} store at {:?}", backend, path);
    Ok(match backend {
        StorageBackend::Json => Box::new(JsonFileStore::new(path)),
        StorageBackend::Sqlite => Box::new(SqliteStore::open(&path)?),
    })
}

/// Resolve the data directory
///
/// Order: explicit override, `RECALL_HOME`, `./.recall` when present,
/// then `~/.recall`.
pub fn get_data_dir(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }

    if let Some(home) = std::env::var_os("RECALL_HOME") {
        return Ok(PathBuf::from(home));
    }

    // Check for .recall directory in current project first
    let cwd = std::env::current_dir()?;
    let project_dir = cwd.join(".recall");
    if project_dir.exists() {
        return Ok(project_dir);
    }

    // Fall back to home directory
    let home = dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
    Ok(home.join(".recall"))
}
