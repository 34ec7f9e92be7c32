//! Persisted-schema migration
//!
//! `wordStats` has been written in three layouts over time. Each raw record
//! is classified into a [`VersionedRecord`] and converted to the current
//! [`ScheduleRecord`]. Migration is pure and idempotent: feeding the output
//! back in yields the same bytes, because current records only pass through
//! invariant clamping and the output map is sorted by id.
//!
//! A record that cannot be recovered is dropped and reported; the owning
//! item then falls back to a fresh `new` record.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::config::{SchedulerConfig, MAX_INTERVAL_DAYS};
use crate::error::SrsError;
use crate::scheduler::{Phase, ScheduleRecord};
use crate::storage::LearningItem;

pub const SCHEMA_VERSION: u32 = 3;

/// A record in the current layout, tagged with its schema version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub schema: u32,
    #[serde(flatten)]
    pub record: ScheduleRecord,
}

impl From<ScheduleRecord> for StoredRecord {
    fn from(record: ScheduleRecord) -> Self {
        Self {
            schema: SCHEMA_VERSION,
            record,
        }
    }
}

/// v1: counter-style records from the first release
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyCounters {
    #[serde(default)]
    pub reps: u32,
    #[serde(default)]
    pub ef: Option<f64>,
    /// Days, possibly fractional
    #[serde(default)]
    pub interval: Option<f64>,
    /// Epoch milliseconds
    #[serde(default, rename = "nextReview")]
    pub next_review: Option<i64>,
    #[serde(default)]
    pub fails: u32,
}

/// v2: state-machine records with epoch-millisecond due times
#[derive(Debug, Clone, Deserialize)]
pub struct StateRecord {
    pub state: String,
    #[serde(default)]
    pub step: Option<usize>,
    #[serde(default)]
    pub interval: Option<f64>,
    #[serde(default)]
    pub ease: Option<f64>,
    #[serde(default)]
    pub due: Option<i64>,
    #[serde(default)]
    pub lapses: u32,
}

/// v3 with every field optional so gaps can be defaulted
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentFields {
    pub phase: Option<Phase>,
    #[serde(default)]
    pub step_index: Option<usize>,
    #[serde(default)]
    pub interval_days: Option<u32>,
    #[serde(default)]
    pub ease: Option<f64>,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub lapses: Option<u32>,
}

/// Every layout `wordStats` entries have been stored in
#[derive(Debug, Clone)]
pub enum VersionedRecord {
    V1(LegacyCounters),
    V2(StateRecord),
    Current(CurrentFields),
}

impl VersionedRecord {
    /// Classify a raw JSON record
    pub fn detect(raw: &Value) -> Result<Self, String> {
        let obj = raw
            .as_object()
            .ok_or_else(|| format!("expected an object, found {}", kind_of(raw)))?;

        let parsed = if let Some(schema) = obj.get("schema") {
            match schema.as_u64() {
                Some(v) if v == u64::from(SCHEMA_VERSION) => {
                    serde_json::from_value(raw.clone()).map(VersionedRecord::Current)
                }
                _ => return Err(format!("unsupported schema version {}", schema)),
            }
        } else if obj.contains_key("phase") {
            serde_json::from_value(raw.clone()).map(VersionedRecord::Current)
        } else if obj.contains_key("state") {
            serde_json::from_value(raw.clone()).map(VersionedRecord::V2)
        } else if obj.contains_key("ef") || obj.contains_key("nextReview") || obj.contains_key("reps")
        {
            serde_json::from_value(raw.clone()).map(VersionedRecord::V1)
        } else {
            return Err("no recognizable scheduling fields".to_string());
        };
        parsed.map_err(|e| e.to_string())
    }

    pub fn version(&self) -> u32 {
        match self {
            VersionedRecord::V1(_) => 1,
            VersionedRecord::V2(_) => 2,
            VersionedRecord::Current(_) => SCHEMA_VERSION,
        }
    }

    /// Convert to the current layout, defaulting what is missing
    pub fn upgrade(
        self,
        config: &SchedulerConfig,
        now: DateTime<Utc>,
    ) -> Result<ScheduleRecord, String> {
        let defaults = ScheduleRecord::new(config, now);
        let record = match self {
            VersionedRecord::V1(v1) => {
                let interval = days_from(v1.interval)?;
                let (phase, interval_days) = if v1.reps == 0 {
                    (Phase::New, 0)
                } else {
                    (Phase::Review, interval.max(1))
                };
                ScheduleRecord {
                    phase,
                    step_index: 0,
                    interval_days,
                    ease: v1.ef.unwrap_or(defaults.ease),
                    due_at: millis_to_time(v1.next_review)?.unwrap_or(now),
                    lapses: v1.fails,
                }
            }
            VersionedRecord::V2(v2) => {
                let phase = match v2.state.to_lowercase().as_str() {
                    "relearning" => Phase::Learning,
                    other => Phase::from_str(other)
                        .ok_or_else(|| format!("unknown state '{}'", other))?,
                };
                ScheduleRecord {
                    phase,
                    step_index: v2.step.unwrap_or(0),
                    interval_days: days_from(v2.interval)?,
                    ease: v2.ease.unwrap_or(defaults.ease),
                    due_at: millis_to_time(v2.due)?.unwrap_or(now),
                    lapses: v2.lapses,
                }
            }
            VersionedRecord::Current(current) => ScheduleRecord {
                phase: current.phase.unwrap_or(defaults.phase),
                step_index: current.step_index.unwrap_or(defaults.step_index),
                interval_days: current.interval_days.unwrap_or(defaults.interval_days),
                ease: current.ease.unwrap_or(defaults.ease),
                due_at: current.due_at.unwrap_or(defaults.due_at),
                lapses: current.lapses.unwrap_or(defaults.lapses),
            },
        };
        Ok(record.sanitized(config))
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn days_from(interval: Option<f64>) -> Result<u32, String> {
    match interval {
        None => Ok(0),
        Some(days) if !days.is_finite() || days < 0.0 => {
            Err(format!("invalid interval {}", days))
        }
        Some(days) => Ok(days.round().min(MAX_INTERVAL_DAYS as f64) as u32),
    }
}

fn millis_to_time(millis: Option<i64>) -> Result<Option<DateTime<Utc>>, String> {
    match millis {
        None => Ok(None),
        Some(ms) => Utc
            .timestamp_millis_opt(ms)
            .single()
            .map(Some)
            .ok_or_else(|| format!("timestamp {} out of range", ms)),
    }
}

/// Result of migrating `wordStats`
#[derive(Debug, Default)]
pub struct MigrationReport {
    pub records: BTreeMap<String, ScheduleRecord>,
    /// Records that were upgraded from an older layout
    pub upgraded: usize,
    /// Unrecoverable records, each a `MalformedRecord`
    pub dropped: Vec<SrsError>,
    /// Due dates reset because they were implausibly far ahead
    pub anomalies: Vec<SrsError>,
}

impl MigrationReport {
    /// Records in the persisted layout
    pub fn stored(&self) -> BTreeMap<String, StoredRecord> {
        self.records
            .iter()
            .map(|(id, record)| (id.clone(), StoredRecord::from(record.clone())))
            .collect()
    }
}

/// Migrate every raw `wordStats` entry to the current layout
pub fn migrate(
    raw_stats: &Map<String, Value>,
    config: &SchedulerConfig,
    now: DateTime<Utc>,
) -> MigrationReport {
    let mut report = MigrationReport::default();
    let horizon = now + Duration::days(MAX_INTERVAL_DAYS);

    for (id, raw) in raw_stats {
        let versioned = match VersionedRecord::detect(raw) {
            Ok(versioned) => versioned,
            Err(reason) => {
                warn!("Dropping record {}: {}", id, reason);
                report.dropped.push(SrsError::MalformedRecord {
                    id: id.clone(),
                    reason,
                });
                continue;
            }
        };

        let version = versioned.version();
        let mut record = match versioned.upgrade(config, now) {
            Ok(record) => record,
            Err(reason) => {
                warn!("Dropping record {}: {}", id, reason);
                report.dropped.push(SrsError::MalformedRecord {
                    id: id.clone(),
                    reason,
                });
                continue;
            }
        };

        if version != SCHEMA_VERSION {
            debug!("Upgraded record {} from schema v{}", id, version);
            report.upgraded += 1;
        }

        if record.due_at > horizon {
            warn!("Record {} due at {} is beyond any interval, resetting", id, record.due_at);
            report.anomalies.push(SrsError::ClockAnomaly {
                field: format!("{}.dueAt", id),
                detail: format!("{} is more than {} days ahead", record.due_at, MAX_INTERVAL_DAYS),
            });
            record.due_at = now;
        }

        report.records.insert(id.clone(), record);
    }

    if report.upgraded > 0 || !report.dropped.is_empty() {
        info!(
            "Migrated {} records ({} upgraded, {} dropped)",
            report.records.len(),
            report.upgraded,
            report.dropped.len()
        );
    }
    report
}

/// Migrate a raw `wordStats` value straight to its persisted JSON form
pub fn migrate_value(raw_stats: &Value, config: &SchedulerConfig, now: DateTime<Utc>) -> Value {
    let empty = Map::new();
    let map = raw_stats.as_object().unwrap_or(&empty);
    let stored = migrate(map, config, now).stored();
    serde_json::to_value(stored).unwrap_or_else(|_| Value::Object(Map::new()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawItem {
    #[serde(default)]
    id: Option<String>,
    word: String,
    #[serde(default)]
    forms: Option<Vec<String>>,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

/// Level given to legacy items saved without one
pub const DEFAULT_LEVEL: &str = "general";

/// Parse `learningWords`, deriving missing ids and skipping bad entries
///
/// Entries may be full item objects or bare strings from the oldest layout.
pub fn migrate_items(raw_items: &Value) -> (Vec<LearningItem>, Vec<SrsError>) {
    let mut items = Vec::new();
    let mut problems = Vec::new();

    let entries = match raw_items {
        Value::Null => return (items, problems),
        Value::Array(entries) => entries,
        other => {
            problems.push(SrsError::MalformedRecord {
                id: "learningWords".to_string(),
                reason: format!("expected an array, found {}", kind_of(other)),
            });
            return (items, problems);
        }
    };

    for (index, entry) in entries.iter().enumerate() {
        let parsed = match entry {
            Value::String(word) => Ok(RawItem {
                id: None,
                word: word.clone(),
                forms: None,
                level: None,
                category: None,
            }),
            other => serde_json::from_value::<RawItem>(other.clone()),
        };

        match parsed {
            Ok(raw) if raw.word.trim().is_empty() => problems.push(SrsError::MalformedRecord {
                id: format!("learningWords[{}]", index),
                reason: "empty word".to_string(),
            }),
            Ok(raw) => {
                let level = raw
                    .level
                    .or(raw.category)
                    .filter(|l| !l.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_LEVEL.to_string());
                let mut item = LearningItem::new(&raw.word, &level, raw.forms.unwrap_or_default());
                if let Some(id) = raw.id.filter(|id| !id.trim().is_empty()) {
                    item.id = id;
                }
                items.push(item);
            }
            Err(e) => {
                warn!("Skipping unreadable learning word #{}: {}", index, e);
                problems.push(SrsError::MalformedRecord {
                    id: format!("learningWords[{}]", index),
                    reason: e.to_string(),
                });
            }
        }
    }
    (items, problems)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{transition, Grade};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 1, 12, 0, 0).unwrap()
    }

    fn raw_fixture() -> Map<String, Value> {
        let value = json!({
            "legacy::a1": { "reps": 4, "ef": 2.2, "interval": 5.6, "nextReview": 1727000000000i64, "fails": 1 },
            "fresh::a1": { "reps": 0 },
            "relearn::b1": { "state": "relearning", "step": 7, "interval": 3, "ease": 1.1, "due": 1727800000000i64, "lapses": 2 },
            "current::b2": {
                "schema": 3, "phase": "review", "stepIndex": 0, "intervalDays": 12,
                "ease": 2.35, "dueAt": "2024-10-05T08:00:00Z", "lapses": 0
            },
            "partial::c1": { "schema": 3, "phase": "learning", "stepIndex": 1 },
            "junk::c1": "not a record",
            "weird::c1": { "state": "mastered" },
            "future::c1": { "schema": 3, "phase": "review", "intervalDays": 10, "ease": 2.5,
                            "dueAt": "2999-01-01T00:00:00Z", "lapses": 0, "stepIndex": 0 }
        });
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_detect_versions() {
        let raw = raw_fixture();
        assert_eq!(VersionedRecord::detect(&raw["legacy::a1"]).unwrap().version(), 1);
        assert_eq!(VersionedRecord::detect(&raw["relearn::b1"]).unwrap().version(), 2);
        assert_eq!(VersionedRecord::detect(&raw["current::b2"]).unwrap().version(), 3);
        assert!(VersionedRecord::detect(&raw["junk::c1"]).is_err());
        assert!(VersionedRecord::detect(&json!({"schema": 9})).is_err());
        assert!(VersionedRecord::detect(&json!({"color": "red"})).is_err());
    }

    #[test]
    fn test_legacy_records_upgrade() {
        let config = SchedulerConfig::default();
        let report = migrate(&raw_fixture(), &config, now());

        let legacy = &report.records["legacy::a1"];
        assert_eq!(legacy.phase, Phase::Review);
        assert_eq!(legacy.interval_days, 6);
        assert_eq!(legacy.ease, 2.2);
        assert_eq!(legacy.lapses, 1);
        assert_eq!(legacy.due_at, Utc.timestamp_millis_opt(1727000000000).unwrap());

        let fresh = &report.records["fresh::a1"];
        assert_eq!(fresh.phase, Phase::New);
        assert_eq!(fresh.due_at, now());

        let relearn = &report.records["relearn::b1"];
        assert_eq!(relearn.phase, Phase::Learning);
        assert_eq!(relearn.step_index, 2);
        assert_eq!(relearn.ease, 1.3);
        assert_eq!(relearn.lapses, 2);

        let partial = &report.records["partial::c1"];
        assert_eq!(partial.step_index, 1);
        assert_eq!(partial.ease, 2.5);
        assert_eq!(partial.due_at, now());

        assert_eq!(report.upgraded, 3);
    }

    #[test]
    fn test_malformed_records_dropped_not_fatal() {
        let config = SchedulerConfig::default();
        let report = migrate(&raw_fixture(), &config, now());
        assert_eq!(report.dropped.len(), 2);
        assert!(!report.records.contains_key("junk::c1"));
        assert!(!report.records.contains_key("weird::c1"));
        assert!(report
            .dropped
            .iter()
            .all(|e| matches!(e, SrsError::MalformedRecord { .. })));
    }

    #[test]
    fn test_far_future_due_is_clock_anomaly() {
        let config = SchedulerConfig::default();
        let report = migrate(&raw_fixture(), &config, now());
        assert_eq!(report.records["future::c1"].due_at, now());
        assert_eq!(report.anomalies.len(), 1);
        assert!(matches!(report.anomalies[0], SrsError::ClockAnomaly { .. }));
    }

    #[test]
    fn test_oversized_current_interval_is_capped() {
        let config = SchedulerConfig::default();
        let mut raw = Map::new();
        raw.insert(
            "huge::a1".to_string(),
            json!({ "schema": 3, "phase": "review", "intervalDays": 100000, "ease": 2.5,
                    "dueAt": "2024-10-01T12:00:00Z", "lapses": 0, "stepIndex": 0 }),
        );
        let report = migrate(&raw, &config, now());
        let huge = &report.records["huge::a1"];
        assert_eq!(huge.interval_days, MAX_INTERVAL_DAYS as u32);

        let next = transition(&config, huge, Grade::Correct, now()).record;
        assert_eq!(next.interval_days, MAX_INTERVAL_DAYS as u32);
    }

    #[test]
    fn test_current_record_passes_through() {
        let config = SchedulerConfig::default();
        let raw = raw_fixture();
        let report = migrate(&raw, &config, now());
        let stored = serde_json::to_value(&report.stored()["current::b2"]).unwrap();
        assert_eq!(stored, raw["current::b2"]);
    }

    #[test]
    fn test_migration_is_idempotent() {
        let config = SchedulerConfig::default();
        let raw = Value::Object(raw_fixture());

        let first = migrate_value(&raw, &config, now());
        let first_bytes = serde_json::to_string(&first).unwrap();

        let second = migrate_value(&first, &config, now());
        let second_bytes = serde_json::to_string(&second).unwrap();
        assert_eq!(first_bytes, second_bytes);

        let later = migrate_value(&first, &config, now() + Duration::days(3));
        assert_eq!(serde_json::to_string(&later).unwrap(), first_bytes);

        let again = migrate_value(&raw, &config, now());
        assert_eq!(serde_json::to_string(&again).unwrap(), first_bytes);
    }

    #[test]
    fn test_migrate_items() {
        let raw = json!([
            "Abandon",
            { "word": "go", "forms": ["went", "gone"], "level": "A1" },
            { "word": "run", "category": "b1" },
            { "id": "custom-id", "word": "see", "level": "a2" },
            { "word": "   " },
            { "forms": [] }
        ]);
        let (items, problems) = migrate_items(&raw);
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["abandon::general", "go::a1", "run::b1", "custom-id"]);
        assert_eq!(items[1].forms, vec!["went", "gone"]);
        assert_eq!(problems.len(), 2);

        let (none, problems) = migrate_items(&json!({"word": "x"}));
        assert!(none.is_empty());
        assert_eq!(problems.len(), 1);
    }
}
