//! Error types for the scheduling engine
//!
//! Every public entry point returns either a value or one of these
//! classified errors. Recoverable conditions (malformed records, clock
//! anomalies) are also collected into load reports instead of aborting.

use thiserror::Error;

/// Which budget an answer would have exceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    NewItems,
    Reviews,
    /// Too many items in flight to start another new one
    ActivePool,
}

impl std::fmt::Display for LimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitKind::NewItems => write!(f, "new items"),
            LimitKind::Reviews => write!(f, "reviews"),
            LimitKind::ActivePool => write!(f, "active pool"),
        }
    }
}

/// Errors raised by the persistence backends
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The stored state could not be parsed and was moved aside
    #[error("unreadable state moved to {backup}: {reason}")]
    Corrupt { backup: String, reason: String },
}

/// Errors surfaced by the scheduler, session controller and engine
#[derive(Error, Debug)]
pub enum SrsError {
    #[error("malformed record for '{id}': {reason}")]
    MalformedRecord { id: String, reason: String },

    #[error("unknown item: {0}")]
    UnknownItem(String),

    #[error("item already exists: {0}")]
    DuplicateItem(String),

    #[error("persistence failure: {0}")]
    PersistenceFailure(#[from] StoreError),

    #[error("clock anomaly in {field}: {detail}")]
    ClockAnomaly { field: String, detail: String },

    #[error("daily limit reached for {0}")]
    DailyLimitReached(LimitKind),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no active session")]
    NoActiveSession,
}

pub type SrsResult<T> = Result<T, SrsError>;
