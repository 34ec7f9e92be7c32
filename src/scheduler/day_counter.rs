//! Daily quota ledger
//!
//! Tracks how many new items were introduced and how many review answers
//! were recorded on the learner's current local day. The ledger is passive:
//! the scheduler decides whether a cap applies. Every access re-checks the
//! date against the clock, so a long-lived process rolls over at midnight.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::clock::Clock;

/// Counters for one local calendar day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayCounters {
    pub date: NaiveDate,
    #[serde(default)]
    pub new_introduced_count: u32,
    #[serde(default)]
    pub review_answer_count: u32,
}

impl DayCounters {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            new_introduced_count: 0,
            review_answer_count: 0,
        }
    }
}

/// Why the ledger was reset on access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rollover {
    /// Stored date is before today
    NewDay,
    /// Stored date is after today; the clock moved backwards or the data is bad
    FutureDate,
}

#[derive(Debug, Clone)]
pub struct DayCounter {
    counters: DayCounters,
}

impl DayCounter {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            counters: DayCounters::empty(today),
        }
    }

    pub fn from_counters(counters: DayCounters) -> Self {
        Self { counters }
    }

    /// Restore from persisted `srsDay`, starting fresh when it is unreadable
    pub fn from_raw(raw: &Value, today: NaiveDate) -> Self {
        if raw.is_null() {
            return Self::new(today);
        }
        match serde_json::from_value::<DayCounters>(raw.clone()) {
            Ok(counters) => Self::from_counters(counters),
            Err(e) => {
                warn!("Discarding unreadable day counters: {}", e);
                Self::new(today)
            }
        }
    }

    fn roll(&mut self, clock: &dyn Clock) -> Option<Rollover> {
        let today = clock.today();
        let stored = self.counters.date;
        if stored == today {
            return None;
        }

        let reason = if stored > today {
            warn!(
                "Day counter dated {} is ahead of today ({}), treating as rollover",
                stored, today
            );
            Rollover::FutureDate
        } else {
            debug!("Day rolled over from {} to {}", stored, today);
            Rollover::NewDay
        };
        self.counters = DayCounters::empty(today);
        Some(reason)
    }

    /// Counters for today, resetting first if the date changed
    pub fn current_counters(&mut self, clock: &dyn Clock) -> DayCounters {
        self.roll(clock);
        self.counters.clone()
    }

    /// Like [`current_counters`](Self::current_counters) but also reports a rollover
    pub fn refresh(&mut self, clock: &dyn Clock) -> (DayCounters, Option<Rollover>) {
        let rolled = self.roll(clock);
        (self.counters.clone(), rolled)
    }

    pub fn record_new_introduced(&mut self, clock: &dyn Clock) {
        self.roll(clock);
        self.counters.new_introduced_count = self.counters.new_introduced_count.saturating_add(1);
    }

    pub fn record_review_answer(&mut self, clock: &dyn Clock) {
        self.roll(clock);
        self.counters.review_answer_count = self.counters.review_answer_count.saturating_add(1);
    }

    /// Stored counters without a rollover check, for persistence
    pub fn snapshot(&self) -> &DayCounters {
        &self.counters
    }
}
