//! In-process backend for tests and embedding

use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{PersistedState, RawState, StateStore};
use crate::error::StoreError;

/// Keeps the last saved state as JSON in memory
///
/// Saves can be made to fail on demand, which lets callers exercise the
/// persistence-failure path without touching the filesystem.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<Option<Value>>,
    fail_saves: AtomicBool,
    save_count: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with a raw state, e.g. an old-layout document
    pub fn with_raw(raw: Value) -> Self {
        Self {
            saved: Mutex::new(Some(raw)),
            ..Self::default()
        }
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    /// Last successfully saved document
    pub fn snapshot(&self) -> Option<Value> {
        match self.saved.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<Option<RawState>, StoreError> {
        match self.snapshot() {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "saves disabled",
            )));
        }
        let value = serde_json::to_value(state)?;
        let mut guard = match self.saved.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(value);
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
