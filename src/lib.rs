//! Recall: a spaced-repetition scheduling engine for vocabulary study
//!
//! The [`Engine`] ties together the item store, the daily quota ledger, the
//! scheduler and the practice session, and persists every change through a
//! [`StateStore`](storage::StateStore).

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod migrate;
pub mod scheduler;
pub mod session;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, SchedulerConfig};
pub use engine::{Engine, ItemStats, LoadReport};
pub use error::{LimitKind, SrsError, SrsResult, StoreError};
pub use scheduler::{Grade, Phase, ScheduleRecord, SchedulerContext};
pub use session::PracticeMode;
pub use storage::LearningItem;
