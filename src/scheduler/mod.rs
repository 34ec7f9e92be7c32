//! Spaced-repetition scheduler
//!
//! Items move `new -> learning -> review`, and a failed review drops the
//! item back to the first learning step. All operations take an explicit
//! [`SchedulerContext`] carrying the parameters and the clock.

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

use crate::clock::{Clock, ManualClock, SystemClock};
use crate::config::SchedulerConfig;
use crate::error::SrsResult;
use crate::session::PracticeMode;
use crate::storage::ItemStore;

mod answer;
mod day_counter;
mod record;
mod selection;
mod stats;

pub use answer::{apply_answer, next_review_interval, transition, Transition};
pub use day_counter::{DayCounter, DayCounters, Rollover};
pub use record::{Grade, Phase, ScheduleRecord};
pub use selection::{
    due_candidates, endless_queue, in_flight_count, remaining_budget, scheduled_queue, Budget,
};
pub use stats::{summarize, StatsSummary};

/// Parameters and time source shared by every scheduler operation
#[derive(Clone)]
pub struct SchedulerContext {
    pub config: SchedulerConfig,
    pub clock: Arc<dyn Clock>,
}

impl SchedulerContext {
    pub fn new(config: SchedulerConfig, clock: Arc<dyn Clock>) -> SrsResult<Self> {
        config.validate()?;
        Ok(Self { config, clock })
    }

    pub fn system(config: SchedulerConfig) -> SrsResult<Self> {
        Self::new(config, Arc::new(SystemClock))
    }

    /// Context pinned to a fixed instant, UTC dates
    pub fn with_manual_clock(config: SchedulerConfig, now: DateTime<Utc>) -> SrsResult<Self> {
        Self::new(config, Arc::new(ManualClock::new(now)))
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }
}

impl std::fmt::Debug for SchedulerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerContext")
            .field("config", &self.config)
            .field("now", &self.clock.now())
            .finish()
    }
}

/// Items due now for the given practice mode
///
/// Scheduled mode respects the daily budgets and the active pool. Endless
/// mode returns one batch, drawing from the nearest upcoming items when
/// nothing is due.
pub fn get_due_queue(
    ctx: &SchedulerContext,
    items: &ItemStore,
    day: &mut DayCounter,
    mode: PracticeMode,
) -> Vec<String> {
    let now = ctx.now();
    match mode {
        PracticeMode::Scheduled => {
            let counters = day.current_counters(ctx.clock.as_ref());
            scheduled_queue(ctx, items, &counters, now)
        }
        PracticeMode::Endless => endless_queue(ctx, items, now, None),
    }
}
