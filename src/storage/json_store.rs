//! Single-file JSON backend

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{PersistedState, RawState, StateStore};
use crate::error::StoreError;

/// Learner state in one pretty-printed JSON document
///
/// Saves go to a sibling temp file that is then renamed over the target,
/// so a crash mid-write leaves the previous state intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where an unparseable state file is moved before starting fresh
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".corrupt");
        self.path.with_file_name(name)
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<Option<RawState>, StoreError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) => {
                let backup = self.backup_path();
                warn!("Unreadable state in {:?}: {}", self.path, e);
                std::fs::rename(&self.path, &backup)?;
                warn!("Moved it to {:?}; starting with empty state", backup);
                Err(StoreError::Corrupt {
                    backup: backup.display().to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        let json = serde_json::to_string_pretty(state)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!("Saved state to {:?}", self.path);
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
