//! Per-item scheduling record and answer grades

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::config::{SchedulerConfig, MAX_INTERVAL_DAYS};

/// Where an item sits in the learning state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Added but never answered
    New,
    /// Walking the short learning steps
    Learning,
    /// Graduated, interval measured in days
    Review,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::New => "new",
            Phase::Learning => "learning",
            Phase::Review => "review",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "new" => Some(Phase::New),
            "learning" => Some(Phase::Learning),
            "review" => Some(Phase::Review),
            _ => None,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Learner's answer to a card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    Incorrect,
    Correct,
}

impl Grade {
    pub fn is_correct(&self) -> bool {
        matches!(self, Grade::Correct)
    }
}

impl FromStr for Grade {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "correct" | "c" | "good" | "yes" | "y" | "1" => Ok(Grade::Correct),
            "incorrect" | "i" | "wrong" | "again" | "no" | "n" | "0" => Ok(Grade::Incorrect),
            other => Err(format!("unrecognized grade '{}' (use correct or incorrect)", other)),
        }
    }
}

/// Scheduling state of one learning item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRecord {
    pub phase: Phase,
    /// Index into the learning steps; only meaningful while learning
    pub step_index: usize,
    pub interval_days: u32,
    pub ease: f64,
    pub due_at: DateTime<Utc>,
    /// Failed reviews since the record was created
    pub lapses: u32,
}

impl ScheduleRecord {
    /// Default record for an item seen for the first time
    pub fn new(config: &SchedulerConfig, now: DateTime<Utc>) -> Self {
        Self {
            phase: Phase::New,
            step_index: 0,
            interval_days: 0,
            ease: config.ease.initial(),
            due_at: now,
            lapses: 0,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at <= now
    }

    /// Clamp fields back inside the record invariants
    ///
    /// Applying this twice gives the same result as applying it once.
    pub fn sanitized(mut self, config: &SchedulerConfig) -> Self {
        if !self.ease.is_finite() {
            self.ease = config.ease.initial();
        }
        self.ease = self.ease.max(config.ease.min_ease);

        match self.phase {
            Phase::Learning => {
                let last = config.step_count().saturating_sub(1);
                self.step_index = self.step_index.min(last);
            }
            Phase::New | Phase::Review => self.step_index = 0,
        }

        self.interval_days = self.interval_days.min(MAX_INTERVAL_DAYS as u32);
        if self.phase == Phase::Review && self.interval_days == 0 {
            self.interval_days = config.graduate_to_days[0];
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_default_record() {
        let config = SchedulerConfig::default();
        let record = ScheduleRecord::new(&config, now());
        assert_eq!(record.phase, Phase::New);
        assert_eq!(record.step_index, 0);
        assert_eq!(record.interval_days, 0);
        assert_eq!(record.ease, 2.5);
        assert_eq!(record.due_at, now());
        assert_eq!(record.lapses, 0);
        assert!(record.is_due(now()));
    }

    #[test]
    fn test_sanitize_clamps_ease_and_step() {
        let config = SchedulerConfig::default();
        let record = ScheduleRecord {
            phase: Phase::Learning,
            step_index: 9,
            interval_days: 0,
            ease: 0.4,
            due_at: now(),
            lapses: 2,
        };
        let clean = record.sanitized(&config);
        assert_eq!(clean.step_index, 2);
        assert_eq!(clean.ease, 1.3);
        assert_eq!(clean.clone().sanitized(&config), clean);
    }

    #[test]
    fn test_sanitize_caps_interval() {
        let config = SchedulerConfig::default();
        let record = ScheduleRecord {
            phase: Phase::Review,
            step_index: 0,
            interval_days: 100_000,
            ease: 2.5,
            due_at: now(),
            lapses: 0,
        };
        let clean = record.sanitized(&config);
        assert_eq!(clean.interval_days, MAX_INTERVAL_DAYS as u32);
        assert_eq!(clean.clone().sanitized(&config), clean);
    }

    #[test]
    fn test_grade_parsing() {
        assert_eq!("correct".parse::<Grade>().unwrap(), Grade::Correct);
        assert_eq!(" Again ".parse::<Grade>().unwrap(), Grade::Incorrect);
        assert!("maybe".parse::<Grade>().is_err());
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let config = SchedulerConfig::default();
        let json = serde_json::to_value(ScheduleRecord::new(&config, now())).unwrap();
        assert_eq!(json["phase"], "new");
        assert_eq!(json["stepIndex"], 0);
        assert_eq!(json["intervalDays"], 0);
        assert!(json.get("dueAt").is_some());
    }
}
