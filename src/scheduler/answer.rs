//! Applying an answer to a record
//!
//! `new` items are introduced into learning step 0 before the grade is
//! applied, so three correct answers take a fresh item through all three
//! learning steps and into review.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::day_counter::DayCounter;
use super::record::{Grade, Phase, ScheduleRecord};
use super::selection::pool_allowance;
use super::SchedulerContext;
use crate::config::{SchedulerConfig, MAX_INTERVAL_DAYS};
use crate::error::{LimitKind, SrsError, SrsResult};
use crate::session::PracticeMode;
use crate::storage::ItemStore;

/// Outcome of the pure state transition
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub record: ScheduleRecord,
    /// The item left `new` with this answer
    pub introduced: bool,
    /// The answer counts against the daily review budget
    pub counts_as_review: bool,
}

fn days(n: u32) -> Duration {
    Duration::days(i64::from(n))
}

/// Interval after a correct review
///
/// The first review after graduation is forced onto the second rung of the
/// graduation ramp; after that the interval grows by ease, at least one day.
pub fn next_review_interval(config: &SchedulerConfig, interval_days: u32, ease: f64) -> u32 {
    let [first, second] = config.graduate_to_days;
    let grown = if interval_days == first {
        second
    } else {
        let scaled = (f64::from(interval_days) * ease).round();
        if scaled >= MAX_INTERVAL_DAYS as f64 {
            MAX_INTERVAL_DAYS as u32
        } else {
            scaled.max(0.0) as u32
        }
    };
    grown
        .max(interval_days.saturating_add(1))
        .min(MAX_INTERVAL_DAYS as u32)
}

/// Compute the next record for an answer at `now`
pub fn transition(
    config: &SchedulerConfig,
    current: &ScheduleRecord,
    grade: Grade,
    now: DateTime<Utc>,
) -> Transition {
    let mut record = current.clone();
    let introduced = record.phase == Phase::New;
    let counts_as_review = !introduced;

    if introduced {
        record.phase = Phase::Learning;
        record.step_index = 0;
    }

    match (record.phase, grade) {
        (Phase::New | Phase::Learning, Grade::Correct) => {
            let last = config.step_count().saturating_sub(1);
            if record.step_index >= last {
                record.phase = Phase::Review;
                record.step_index = 0;
                record.interval_days = config.graduate_to_days[0];
                record.due_at = now + days(record.interval_days);
            } else {
                record.step_index += 1;
                record.due_at = now + config.learning_step(record.step_index);
            }
        }
        (Phase::New | Phase::Learning, Grade::Incorrect) => {
            record.step_index = 0;
            record.due_at = now + config.learning_step(0);
        }
        (Phase::Review, Grade::Correct) => {
            record.interval_days = next_review_interval(config, record.interval_days, record.ease);
            record.ease = config.ease.grow(record.ease);
            record.due_at = now + days(record.interval_days);
        }
        (Phase::Review, Grade::Incorrect) => {
            record.lapses = record.lapses.saturating_add(1);
            record.ease = config.ease.penalize(record.ease);
            record.phase = Phase::Learning;
            record.step_index = 0;
            record.due_at = now + config.learning_step(0);
        }
    }

    if grade.is_correct() && record.due_at < current.due_at {
        record.due_at = current.due_at;
    }
    record.ease = record.ease.max(config.ease.min_ease);

    Transition {
        record,
        introduced,
        counts_as_review,
    }
}

/// Apply an answer to the store and the day ledger
///
/// A `new` item is refused in either mode while the active pool is full.
/// In scheduled mode an answer that would exceed a daily cap is refused
/// too. Endless mode records answers without daily caps. A refused answer
/// changes nothing.
pub fn apply_answer(
    ctx: &SchedulerContext,
    items: &mut ItemStore,
    day: &mut DayCounter,
    id: &str,
    grade: Grade,
    mode: PracticeMode,
) -> SrsResult<ScheduleRecord> {
    let current = items
        .get(id)
        .ok_or_else(|| SrsError::UnknownItem(id.to_string()))?;
    let clock = ctx.clock.as_ref();
    let now = ctx.now();

    if current.phase == Phase::New && pool_allowance(ctx, items, now) == 0 {
        return Err(SrsError::DailyLimitReached(LimitKind::ActivePool));
    }

    if mode == PracticeMode::Scheduled {
        let counters = day.current_counters(clock);
        if current.phase == Phase::New && counters.new_introduced_count >= ctx.config.daily_new {
            return Err(SrsError::DailyLimitReached(LimitKind::NewItems));
        }
        if current.phase != Phase::New && counters.review_answer_count >= ctx.config.daily_review {
            return Err(SrsError::DailyLimitReached(LimitKind::Reviews));
        }
    }

    let outcome = transition(&ctx.config, current, grade, now);
    debug!(
        "{} {:?}: {} -> {} (step {}, interval {}d, ease {:.2})",
        id,
        grade,
        current.phase,
        outcome.record.phase,
        outcome.record.step_index,
        outcome.record.interval_days,
        outcome.record.ease
    );

    items.upsert(id, outcome.record.clone())?;
    if outcome.introduced {
        day.record_new_introduced(clock);
    }
    if outcome.counts_as_review {
        day.record_review_answer(clock);
    }
    Ok(outcome.record)
}
