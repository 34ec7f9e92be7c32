//! SQLite backend
//!
//! Each top-level key of the learner state is one row of a key/value table,
//! holding that key's JSON text. A save rewrites all rows in one
//! transaction.

use rusqlite::{params, Connection};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use super::{PersistedState, RawState, StateStore, STATE_KEYS};
use crate::error::StoreError;

pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteStore {
    /// Open or create a state database at the given path
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: db_path.to_path_buf(),
        })
    }

    /// Throwaway database, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    fn init(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )?;
        Ok(())
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut *guard)
    }
}

impl StateStore for SqliteStore {
    fn load(&self) -> Result<Option<RawState>, StoreError> {
        let rows: Vec<(String, String)> = self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM kv")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .filter_map(|r| r.ok())
                .collect();
            Ok(rows)
        })?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut map = Map::new();
        for (key, text) in rows {
            match serde_json::from_str::<Value>(&text) {
                Ok(value) => {
                    map.insert(key, value);
                }
                Err(e) => warn!("Ignoring unreadable '{}' row: {}", key, e),
            }
        }
        Ok(Some(serde_json::from_value(Value::Object(map))?))
    }

    fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        let value = serde_json::to_value(state)?;
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            for key in STATE_KEYS {
                let json = value.get(key).cloned().unwrap_or(Value::Null);
                tx.execute(
                    "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                    params![key, serde_json::to_string(&json)?],
                )?;
            }
            tx.commit()?;
            Ok(())
        })?;
        debug!("Saved state to {:?}", self.path);
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
