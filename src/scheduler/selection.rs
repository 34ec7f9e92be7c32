//! Due-set selection
//!
//! Items are eligible once `due_at <= now`. Eligible items are ordered by
//! due time, oldest first, with item insertion order breaking ties.

use chrono::{DateTime, Duration, Utc};

use super::day_counter::DayCounters;
use super::record::{Phase, ScheduleRecord};
use super::SchedulerContext;
use crate::storage::ItemStore;

/// Remaining allowance for the current day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub reviews: u32,
    pub new_items: u32,
}

/// Non-new items still actively cycling
///
/// Learning items always count; review items count while their next due
/// date is within the active horizon.
pub fn in_flight_count(ctx: &SchedulerContext, items: &ItemStore, now: DateTime<Utc>) -> u32 {
    let horizon = now + Duration::days(i64::from(ctx.config.active_horizon_days));
    let count = items
        .all()
        .filter(|(_, record)| match record.phase {
            Phase::New => false,
            Phase::Learning => true,
            Phase::Review => record.due_at <= horizon,
        })
        .count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// How many new items may still be introduced given the active pool
pub fn pool_allowance(ctx: &SchedulerContext, items: &ItemStore, now: DateTime<Utc>) -> u32 {
    ctx.config
        .active_pool
        .saturating_sub(in_flight_count(ctx, items, now))
}

/// Daily allowance left after today's counters, gated by the active pool
pub fn remaining_budget(
    ctx: &SchedulerContext,
    items: &ItemStore,
    counters: &DayCounters,
    now: DateTime<Utc>,
) -> Budget {
    let reviews = ctx
        .config
        .daily_review
        .saturating_sub(counters.review_answer_count);
    let new_budget = ctx
        .config
        .daily_new
        .saturating_sub(counters.new_introduced_count);
    Budget {
        reviews,
        new_items: new_budget.min(pool_allowance(ctx, items, now)),
    }
}

/// Every eligible item, oldest due first
pub fn due_candidates<'a>(
    items: &'a ItemStore,
    now: DateTime<Utc>,
) -> Vec<(&'a str, &'a ScheduleRecord)> {
    let mut due: Vec<_> = items.all().filter(|(_, r)| r.is_due(now)).collect();
    // Stable sort keeps insertion order among equal due times
    due.sort_by_key(|(_, record)| record.due_at);
    due
}

/// Take candidates in order while their budget lasts
///
/// An item whose budget is spent is skipped, so later items of the other
/// kind can still fill the queue.
fn take_within_budget<'a>(
    candidates: impl IntoIterator<Item = (&'a str, &'a ScheduleRecord)>,
    mut budget: Budget,
    limit: usize,
) -> Vec<String> {
    let mut queue = Vec::new();
    for (id, record) in candidates {
        if queue.len() >= limit {
            break;
        }
        let slot = match record.phase {
            Phase::New => &mut budget.new_items,
            Phase::Learning | Phase::Review => &mut budget.reviews,
        };
        if *slot == 0 {
            continue;
        }
        *slot -= 1;
        queue.push(id.to_string());
    }
    queue
}

/// Fixed queue for a scheduled session
pub fn scheduled_queue(
    ctx: &SchedulerContext,
    items: &ItemStore,
    counters: &DayCounters,
    now: DateTime<Utc>,
) -> Vec<String> {
    let budget = remaining_budget(ctx, items, counters, now);
    take_within_budget(due_candidates(items, now), budget, usize::MAX)
}

/// One batch for endless practice
///
/// Daily caps are ignored but the active pool still gates new items. When
/// nothing is due the nearest upcoming items are drawn instead. The item in
/// `avoid` is moved to the back so the learner does not see it twice in a
/// row when anything else is available.
pub fn endless_queue(
    ctx: &SchedulerContext,
    items: &ItemStore,
    now: DateTime<Utc>,
    avoid: Option<&str>,
) -> Vec<String> {
    let budget = Budget {
        reviews: u32::MAX,
        new_items: pool_allowance(ctx, items, now),
    };
    let batch = ctx.config.endless_batch;

    let mut queue = take_within_budget(due_candidates(items, now), budget, batch);
    if queue.is_empty() {
        let mut upcoming: Vec<_> = items.all().collect();
        upcoming.sort_by_key(|(_, record)| record.due_at);
        queue = take_within_budget(upcoming, budget, batch);
    }

    if let Some(avoid) = avoid {
        if queue.len() > 1 && queue[0] == avoid {
            let first = queue.remove(0);
            queue.push(first);
        }
    }
    queue
}
