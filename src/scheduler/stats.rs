//! Aggregate numbers for display

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::day_counter::DayCounters;
use super::record::Phase;
use super::selection::{in_flight_count, remaining_budget};
use super::SchedulerContext;
use crate::storage::ItemStore;

/// Snapshot of the whole collection and today's quotas
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub total_items: usize,
    pub new_items: usize,
    pub learning_items: usize,
    pub review_items: usize,
    pub due_now: usize,
    pub total_lapses: u64,
    pub average_ease: Option<f64>,
    pub in_flight: u32,
    pub today: DayCounters,
    pub new_remaining: u32,
    pub reviews_remaining: u32,
    pub next_due_at: Option<DateTime<Utc>>,
}

pub fn summarize(
    ctx: &SchedulerContext,
    items: &ItemStore,
    today: DayCounters,
    now: DateTime<Utc>,
) -> StatsSummary {
    let mut summary = StatsSummary {
        total_items: items.len(),
        new_items: 0,
        learning_items: 0,
        review_items: 0,
        due_now: 0,
        total_lapses: 0,
        average_ease: None,
        in_flight: in_flight_count(ctx, items, now),
        new_remaining: 0,
        reviews_remaining: 0,
        next_due_at: None,
        today,
    };

    let mut ease_sum = 0.0;
    let mut ease_count = 0usize;
    for (_, record) in items.all() {
        match record.phase {
            Phase::New => summary.new_items += 1,
            Phase::Learning => summary.learning_items += 1,
            Phase::Review => summary.review_items += 1,
        }
        if record.phase != Phase::New {
            ease_sum += record.ease;
            ease_count += 1;
        }
        if record.is_due(now) {
            summary.due_now += 1;
        } else if summary.next_due_at.map_or(true, |next| record.due_at < next) {
            summary.next_due_at = Some(record.due_at);
        }
        summary.total_lapses += u64::from(record.lapses);
    }

    if ease_count > 0 {
        summary.average_ease = Some(ease_sum / ease_count as f64);
    }

    let budget = remaining_budget(ctx, items, &summary.today, now);
    summary.new_remaining = budget.new_items;
    summary.reviews_remaining = budget.reviews;
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::scheduler::{apply_answer, DayCounter, Grade};
    use crate::session::PracticeMode;
    use crate::storage::LearningItem;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_summary_counts_phases() {
        let now = Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap();
        let ctx = SchedulerContext::with_manual_clock(SchedulerConfig::default(), now).unwrap();
        let mut items = ItemStore::new();
        for word in ["a", "b", "c"] {
            items
                .add_item(LearningItem::new(word, "a1", vec![]), &ctx.config, now)
                .unwrap();
        }
        let mut day = DayCounter::new(ctx.today());
        apply_answer(&ctx, &mut items, &mut day, "a::a1", Grade::Correct, PracticeMode::Scheduled)
            .unwrap();

        let summary = summarize(&ctx, &items, day.current_counters(ctx.clock.as_ref()), now);
        assert_eq!(summary.total_items, 3);
        assert_eq!(summary.new_items, 2);
        assert_eq!(summary.learning_items, 1);
        assert_eq!(summary.due_now, 2);
        assert_eq!(summary.in_flight, 1);
        assert_eq!(summary.today.new_introduced_count, 1);
        assert_eq!(summary.new_remaining, 29);
        assert_eq!(summary.reviews_remaining, 150);
        assert_eq!(summary.next_due_at, Some(now + Duration::minutes(60)));
        assert_eq!(summary.average_ease, Some(2.5));
    }
}
