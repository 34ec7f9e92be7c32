//! Engine facade
//!
//! Owns the item store, day ledger and session controller, loads them
//! through the migrator and writes every mutation back to a [`StateStore`]
//! before returning. When a write fails the in-memory state stays
//! authoritative; the caller gets `PersistenceFailure` and can retry with
//! [`Engine::flush`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{SrsError, SrsResult, StoreError};
use crate::migrate::{migrate, migrate_items, StoredRecord};
use crate::scheduler::{
    self, endless_queue, summarize, DayCounter, DayCounters, Grade, Rollover, ScheduleRecord,
    SchedulerContext, StatsSummary,
};
use crate::session::{PracticeMode, SessionController};
use crate::storage::{ItemStore, LearningItem, PersistedState, StateStore};

/// What happened while loading persisted state
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Nothing had been saved yet
    pub fresh: bool,
    pub items: usize,
    /// Records converted from an older schema
    pub upgraded: usize,
    /// Items and records that could not be recovered
    pub dropped: Vec<SrsError>,
    /// Timestamps that were reset
    pub anomalies: Vec<SrsError>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.upgraded == 0 && self.dropped.is_empty() && self.anomalies.is_empty()
    }
}

/// Per-item view for display
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStats {
    pub item: LearningItem,
    pub record: ScheduleRecord,
    pub due: bool,
}

pub struct Engine {
    ctx: SchedulerContext,
    store: Box<dyn StateStore>,
    items: ItemStore,
    day: DayCounter,
    session: SessionController,
    report: LoadReport,
    dirty: bool,
}

impl Engine {
    /// Load state from `store`, migrating it to the current layout
    ///
    /// Only a failing read is fatal. Damaged records are dropped and listed
    /// in the [`LoadReport`]; if anything was repaired the cleaned state is
    /// written back right away.
    pub fn open(store: Box<dyn StateStore>, ctx: SchedulerContext) -> SrsResult<Self> {
        let mut unreadable = None;
        let raw = match store.load() {
            Ok(raw) => raw,
            Err(e @ StoreError::Corrupt { .. }) => {
                warn!("Starting from empty state: {}", e);
                unreadable = Some(SrsError::MalformedRecord {
                    id: "state".to_string(),
                    reason: e.to_string(),
                });
                None
            }
            Err(e) => return Err(e.into()),
        };
        let fresh = raw.is_none();
        let raw = raw.unwrap_or_default();
        let now = ctx.now();
        let today = ctx.today();

        let (items, mut dropped) = migrate_items(&raw.learning_words);
        dropped.extend(unreadable);

        let empty = Map::new();
        let stats = match &raw.word_stats {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => {
                dropped.push(SrsError::MalformedRecord {
                    id: "wordStats".to_string(),
                    reason: "expected an object".to_string(),
                });
                &empty
            }
        };
        let migration = migrate(stats, &ctx.config, now);
        dropped.extend(migration.dropped);
        let mut anomalies = migration.anomalies;

        let mut day = DayCounter::from_raw(&raw.srs_day, today);
        let stored_date = day.snapshot().date;
        if let (_, Some(Rollover::FutureDate)) = day.refresh(ctx.clock.as_ref()) {
            anomalies.push(SrsError::ClockAnomaly {
                field: "srsDay.date".to_string(),
                detail: format!("{} is after today ({})", stored_date, today),
            });
        }

        let items = ItemStore::from_parts(items, migration.records, &ctx.config, now);
        let session = SessionController::restore(&raw.practice_mode, &raw.session, today);

        let report = LoadReport {
            fresh,
            items: items.len(),
            upgraded: migration.upgraded,
            dropped,
            anomalies,
        };
        info!(
            "Loaded {} items from {} ({} mode)",
            report.items,
            store.describe(),
            session.mode()
        );

        let mut engine = Self {
            ctx,
            store,
            items,
            day,
            session,
            report,
            dirty: false,
        };

        if !engine.report.is_clean() {
            if let Err(e) = engine.persist() {
                warn!("Could not write repaired state: {}", e);
            }
        }
        Ok(engine)
    }

    pub fn context(&self) -> &SchedulerContext {
        &self.ctx
    }

    pub fn load_report(&self) -> &LoadReport {
        &self.report
    }

    pub fn store_location(&self) -> String {
        self.store.describe()
    }

    /// Unsaved changes from an earlier failed write
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn now(&self) -> DateTime<Utc> {
        self.ctx.now()
    }

    fn persisted_state(&self) -> PersistedState {
        PersistedState {
            learning_words: self.items.items().to_vec(),
            word_stats: self
                .items
                .records_by_id()
                .into_iter()
                .map(|(id, record)| (id, StoredRecord::from(record)))
                .collect(),
            srs_day: self.day.snapshot().clone(),
            practice_mode: self.session.mode(),
            session: self.session.queue().cloned(),
        }
    }

    fn persist(&mut self) -> SrsResult<()> {
        match self.store.save(&self.persisted_state()) {
            Ok(()) => {
                self.dirty = false;
                Ok(())
            }
            Err(e) => {
                warn!("Save to {} failed: {}", self.store.describe(), e);
                self.dirty = true;
                Err(SrsError::PersistenceFailure(e))
            }
        }
    }

    /// Write the current state, e.g. to retry after a failed save
    pub fn flush(&mut self) -> SrsResult<()> {
        self.persist()
    }

    pub fn add_item(&mut self, word: &str, level: &str, forms: Vec<String>) -> SrsResult<LearningItem> {
        if word.trim().is_empty() {
            return Err(SrsError::MalformedRecord {
                id: word.to_string(),
                reason: "empty word".to_string(),
            });
        }
        let item = LearningItem::new(word, level, forms);
        let now = self.now();
        self.items.add_item(item.clone(), &self.ctx.config, now)?;
        info!("Added {}", item.id);
        self.persist()?;
        Ok(item)
    }

    /// Delete an item and its history
    pub fn remove_item(&mut self, id: &str) -> SrsResult<LearningItem> {
        let (item, _) = self
            .items
            .remove(id)
            .ok_or_else(|| SrsError::UnknownItem(id.to_string()))?;
        info!("Removed {}", id);
        self.persist()?;
        Ok(item)
    }

    pub fn item(&self, id: &str) -> Option<&LearningItem> {
        self.items.item(id)
    }

    pub fn items(&self) -> &[LearningItem] {
        self.items.items()
    }

    pub fn get_due_queue(&mut self, mode: PracticeMode) -> Vec<String> {
        scheduler::get_due_queue(&self.ctx, &self.items, &mut self.day, mode)
    }

    /// Grade an item under the current practice mode
    pub fn apply_answer(&mut self, id: &str, grade: Grade) -> SrsResult<ScheduleRecord> {
        let record = scheduler::apply_answer(
            &self.ctx,
            &mut self.items,
            &mut self.day,
            id,
            grade,
            self.session.mode(),
        )?;
        self.session.record_answer(id);
        self.persist()?;
        Ok(record)
    }

    pub fn get_stats(&self, id: &str) -> SrsResult<ItemStats> {
        let item = self
            .items
            .item(id)
            .ok_or_else(|| SrsError::UnknownItem(id.to_string()))?;
        let record = self
            .items
            .get(id)
            .ok_or_else(|| SrsError::UnknownItem(id.to_string()))?;
        Ok(ItemStats {
            item: item.clone(),
            record: record.clone(),
            due: record.is_due(self.now()),
        })
    }

    pub fn practice_mode(&self) -> PracticeMode {
        self.session.mode()
    }

    /// Returns whether the mode changed
    pub fn switch_practice_mode(&mut self, mode: PracticeMode) -> SrsResult<bool> {
        if !self.session.switch_mode(mode) {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    /// Begin a new session in the current mode, replacing any existing one
    pub fn start_session(&mut self) -> SrsResult<usize> {
        let ids = match self.session.mode() {
            PracticeMode::Scheduled => self.get_due_queue(PracticeMode::Scheduled),
            PracticeMode::Endless => self.endless_batch(),
        };
        let count = ids.len();
        self.session.start(ids, self.ctx.today());
        self.persist()?;
        Ok(count)
    }

    fn endless_batch(&self) -> Vec<String> {
        endless_queue(&self.ctx, &self.items, self.now(), self.session.last_answered())
    }

    /// Card under the session cursor
    ///
    /// Removed items are skipped. Endless sessions refill themselves;
    /// a scheduled session must have been started and `None` means it is
    /// finished.
    pub fn current_card(&mut self) -> SrsResult<Option<LearningItem>> {
        let today = self.ctx.today();
        if self.session.queue().map_or(false, |q| q.started_on != today) {
            debug!("Session from a previous day expired");
            self.session.clear();
        }

        let before = self.session.queue().cloned();
        let items = &self.items;
        self.session.skip_unresolved(|id| items.contains(id));

        if self.session.needs_refill() {
            let ids = self.endless_batch();
            self.session.start(ids, today);
            let items = &self.items;
            self.session.skip_unresolved(|id| items.contains(id));
        } else if !self.session.is_active() {
            return Err(SrsError::NoActiveSession);
        }

        if self.session.queue() != before.as_ref() {
            self.persist()?;
        }
        Ok(self
            .session
            .current()
            .and_then(|id| self.items.item(id))
            .cloned())
    }

    /// Grade the card under the cursor and advance
    pub fn answer_current(&mut self, grade: Grade) -> SrsResult<(LearningItem, ScheduleRecord)> {
        let card = self.current_card()?.ok_or(SrsError::NoActiveSession)?;
        let record = self.apply_answer(&card.id, grade)?;
        Ok((card, record))
    }

    pub fn day_counters(&mut self) -> DayCounters {
        self.day.current_counters(self.ctx.clock.as_ref())
    }

    pub fn summary(&mut self) -> StatsSummary {
        let today = self.day_counters();
        summarize(&self.ctx, &self.items, today, self.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::SchedulerConfig;
    use crate::error::LimitKind;
    use crate::scheduler::Phase;
    use crate::storage::{JsonFileStore, MemoryStore};
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap()
    }

    fn setup(store: Arc<MemoryStore>) -> (Engine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now()));
        let ctx = SchedulerContext::new(SchedulerConfig::default(), clock.clone()).unwrap();
        (Engine::open(Box::new(store), ctx).unwrap(), clock)
    }

    #[test]
    fn test_fresh_store() {
        let store = Arc::new(MemoryStore::new());
        let (engine, _) = setup(store.clone());
        assert!(engine.load_report().fresh);
        assert!(engine.items().is_empty());
        assert_eq!(store.save_count(), 0);
    }

    #[test]
    fn test_answer_persists_before_returning() {
        let store = Arc::new(MemoryStore::new());
        let (mut engine, _) = setup(store.clone());
        engine.add_item("go", "a1", vec![]).unwrap();
        engine.apply_answer("go::a1", Grade::Correct).unwrap();

        let saved = store.snapshot().unwrap();
        assert_eq!(saved["wordStats"]["go::a1"]["phase"], "learning");
        assert_eq!(saved["wordStats"]["go::a1"]["schema"], 3);
        assert_eq!(saved["srsDay"]["newIntroducedCount"], 1);
    }

    #[test]
    fn test_unknown_item_mutates_nothing() {
        let store = Arc::new(MemoryStore::new());
        let (mut engine, _) = setup(store.clone());
        let err = engine.apply_answer("ghost::a1", Grade::Correct).unwrap_err();
        assert!(matches!(err, SrsError::UnknownItem(_)));
        assert_eq!(engine.day_counters().new_introduced_count, 0);
        assert_eq!(store.save_count(), 0);
    }

    #[test]
    fn test_failed_save_keeps_memory_state() {
        let store = Arc::new(MemoryStore::new());
        let (mut engine, _) = setup(store.clone());
        engine.add_item("go", "a1", vec![]).unwrap();

        store.set_fail_saves(true);
        let err = engine.apply_answer("go::a1", Grade::Correct).unwrap_err();
        assert!(matches!(err, SrsError::PersistenceFailure(_)));
        assert!(engine.is_dirty());
        assert_eq!(engine.get_stats("go::a1").unwrap().record.phase, Phase::Learning);

        store.set_fail_saves(false);
        engine.flush().unwrap();
        assert!(!engine.is_dirty());
        assert_eq!(store.snapshot().unwrap()["wordStats"]["go::a1"]["phase"], "learning");
    }

    #[test]
    fn test_legacy_state_is_migrated_and_written_back() {
        let store = Arc::new(MemoryStore::with_raw(json!({
            "learningWords": ["abandon", { "word": "go", "level": "a1" }],
            "wordStats": {
                "abandon::general": { "reps": 3, "ef": 2.1, "interval": 4, "nextReview": 1718000000000i64 },
                "go::a1": "garbage"
            },
            "srsDay": { "date": "2024-06-09", "newIntroducedCount": 30, "reviewAnswerCount": 150 }
        })));
        let (mut engine, _) = setup(store.clone());

        let report = engine.load_report();
        assert_eq!(report.items, 2);
        assert_eq!(report.upgraded, 1);
        assert_eq!(report.dropped.len(), 1);

        assert_eq!(engine.get_stats("abandon::general").unwrap().record.phase, Phase::Review);
        assert_eq!(engine.get_stats("go::a1").unwrap().record.phase, Phase::New);
        assert_eq!(engine.day_counters().review_answer_count, 0);

        let saved = store.snapshot().unwrap();
        assert_eq!(saved["wordStats"]["abandon::general"]["schema"], 3);
    }

    #[test]
    fn test_corrupt_json_state_starts_fresh() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{\"learningWords\": [").unwrap();

        let ctx = SchedulerContext::with_manual_clock(SchedulerConfig::default(), now()).unwrap();
        let mut engine = Engine::open(Box::new(JsonFileStore::new(&path)), ctx).unwrap();
        let report = engine.load_report();
        assert!(report.fresh);
        assert_eq!(report.dropped.len(), 1);
        assert!(matches!(
            &report.dropped[0],
            SrsError::MalformedRecord { id, .. } if id == "state"
        ));
        assert!(dir.path().join("state.json.corrupt").exists());
        assert!(path.exists(), "repaired state should be written back");

        engine.add_item("go", "a1", vec![]).unwrap();
        drop(engine);

        let ctx = SchedulerContext::with_manual_clock(SchedulerConfig::default(), now()).unwrap();
        let engine = Engine::open(Box::new(JsonFileStore::new(&path)), ctx).unwrap();
        assert!(engine.load_report().is_clean());
        assert!(engine.item("go::a1").is_some());
    }

    #[test]
    fn test_future_day_counter_reported() {
        let store = Arc::new(MemoryStore::with_raw(json!({
            "srsDay": { "date": "2030-01-01", "newIntroducedCount": 5, "reviewAnswerCount": 5 }
        })));
        let (mut engine, _) = setup(store);
        assert_eq!(engine.load_report().anomalies.len(), 1);
        assert_eq!(engine.day_counters().new_introduced_count, 0);
    }

    #[test]
    fn test_scheduled_session_walks_queue() {
        let store = Arc::new(MemoryStore::new());
        let (mut engine, _) = setup(store);
        for word in ["one", "two"] {
            engine.add_item(word, "a1", vec![]).unwrap();
        }

        assert!(matches!(engine.current_card(), Err(SrsError::NoActiveSession)));
        assert_eq!(engine.start_session().unwrap(), 2);

        let (card, record) = engine.answer_current(Grade::Correct).unwrap();
        assert_eq!(card.id, "one::a1");
        assert_eq!(record.phase, Phase::Learning);
        assert_eq!(engine.current_card().unwrap().unwrap().id, "two::a1");

        engine.remove_item("two::a1").unwrap();
        assert!(engine.current_card().unwrap().is_none());
        assert!(matches!(
            engine.answer_current(Grade::Correct),
            Err(SrsError::NoActiveSession)
        ));
    }

    #[test]
    fn test_endless_mode_always_has_a_card() {
        let store = Arc::new(MemoryStore::new());
        let (mut engine, _) = setup(store.clone());
        engine.add_item("one", "a1", vec![]).unwrap();
        engine.add_item("two", "a1", vec![]).unwrap();
        engine.start_session().unwrap();

        assert!(engine.switch_practice_mode(PracticeMode::Endless).unwrap());
        assert!(engine.session().queue().is_none());
        assert!(!engine.switch_practice_mode(PracticeMode::Endless).unwrap());

        for _ in 0..6 {
            let (card, _) = engine.answer_current(Grade::Correct).unwrap();
            assert!(engine.item(&card.id).is_some());
        }
        assert!(engine.current_card().unwrap().is_some());
        assert_eq!(store.snapshot().unwrap()["practiceMode"], "endless");
    }

    #[test]
    fn test_session_resumes_same_day_only() {
        let store = Arc::new(MemoryStore::new());
        let (mut engine, clock) = setup(store.clone());
        engine.add_item("one", "a1", vec![]).unwrap();
        engine.add_item("two", "a1", vec![]).unwrap();
        engine.start_session().unwrap();
        engine.answer_current(Grade::Correct).unwrap();
        drop(engine);

        let ctx = SchedulerContext::new(SchedulerConfig::default(), clock.clone()).unwrap();
        let mut engine = Engine::open(Box::new(store.clone()), ctx).unwrap();
        assert_eq!(engine.current_card().unwrap().unwrap().id, "two::a1");

        clock.advance(Duration::days(1));
        assert!(matches!(engine.current_card(), Err(SrsError::NoActiveSession)));
    }

    #[test]
    fn test_scheduled_answers_respect_daily_new_cap() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(now()));
        let config = SchedulerConfig {
            daily_new: 1,
            ..SchedulerConfig::default()
        };
        let ctx = SchedulerContext::new(config, clock).unwrap();
        let mut engine = Engine::open(Box::new(store), ctx).unwrap();
        engine.add_item("one", "a1", vec![]).unwrap();
        engine.add_item("two", "a1", vec![]).unwrap();

        engine.apply_answer("one::a1", Grade::Correct).unwrap();
        let err = engine.apply_answer("two::a1", Grade::Correct).unwrap_err();
        assert!(matches!(err, SrsError::DailyLimitReached(_)));
        assert_eq!(engine.get_stats("two::a1").unwrap().record.phase, Phase::New);

        engine.switch_practice_mode(PracticeMode::Endless).unwrap();
        engine.apply_answer("two::a1", Grade::Correct).unwrap();
        assert_eq!(engine.day_counters().new_introduced_count, 2);
    }

    #[test]
    fn test_full_active_pool_refuses_new_items_in_both_modes() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(now()));
        let config = SchedulerConfig {
            active_pool: 1,
            ..SchedulerConfig::default()
        };
        let ctx = SchedulerContext::new(config, clock).unwrap();
        let mut engine = Engine::open(Box::new(store.clone()), ctx).unwrap();
        engine.add_item("one", "a1", vec![]).unwrap();
        engine.add_item("two", "a1", vec![]).unwrap();
        engine.apply_answer("one::a1", Grade::Correct).unwrap();

        for mode in [PracticeMode::Scheduled, PracticeMode::Endless] {
            engine.switch_practice_mode(mode).unwrap();
            let saves = store.save_count();
            let err = engine.apply_answer("two::a1", Grade::Correct).unwrap_err();
            assert!(matches!(err, SrsError::DailyLimitReached(LimitKind::ActivePool)));
            assert_eq!(engine.get_stats("two::a1").unwrap().record.phase, Phase::New);
            assert_eq!(engine.day_counters().new_introduced_count, 1);
            assert_eq!(store.save_count(), saves);
        }

        // Items already in flight can still be answered.
        let record = engine.apply_answer("one::a1", Grade::Correct).unwrap();
        assert_eq!(record.phase, Phase::Learning);
    }

    #[test]
    fn test_summary_counts() {
        let store = Arc::new(MemoryStore::new());
        let (mut engine, _) = setup(store);
        engine.add_item("one", "a1", vec![]).unwrap();
        engine.add_item("two", "a1", vec![]).unwrap();
        engine.apply_answer("one::a1", Grade::Correct).unwrap();

        let summary = engine.summary();
        assert_eq!(summary.total_items, 2);
        assert_eq!(summary.new_items, 1);
        assert_eq!(summary.learning_items, 1);
        assert_eq!(summary.new_remaining, 29);
        assert_eq!(engine.get_due_queue(PracticeMode::Scheduled), vec!["two::a1"]);
    }
}
