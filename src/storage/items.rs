//! Learned items and their scheduling records
//!
//! Items keep the order in which the learner added them; that order breaks
//! ties when several items share a due time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use crate::config::SchedulerConfig;
use crate::error::{SrsError, SrsResult};
use crate::scheduler::ScheduleRecord;

/// A vocabulary entry under study
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningItem {
    pub id: String,
    pub word: String,
    /// Ordered surface forms, e.g. principal parts of an irregular verb
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forms: Vec<String>,
    pub level: String,
}

impl LearningItem {
    pub fn new(word: &str, level: &str, forms: Vec<String>) -> Self {
        Self {
            id: item_id(word, level),
            word: word.trim().to_string(),
            forms,
            level: level.trim().to_string(),
        }
    }
}

/// Stable id from the canonical word text and its level tag
pub fn item_id(word: &str, level: &str) -> String {
    let canonical: Vec<&str> = word.split_whitespace().collect();
    format!(
        "{}::{}",
        canonical.join(" ").to_lowercase(),
        level.trim().to_lowercase()
    )
}

/// In-memory store of items and records
#[derive(Debug, Default)]
pub struct ItemStore {
    items: Vec<LearningItem>,
    records: HashMap<String, ScheduleRecord>,
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble from loaded items and migrated records
    ///
    /// Records with no matching item are dropped; items with no record get
    /// a default one, so a dropped record puts its item back to `new`.
    pub fn from_parts(
        items: Vec<LearningItem>,
        mut records: BTreeMap<String, ScheduleRecord>,
        config: &SchedulerConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let mut store = Self::new();
        for item in items {
            if store.contains(&item.id) {
                warn!("Skipping duplicate item {}", item.id);
                continue;
            }
            let record = records
                .remove(&item.id)
                .unwrap_or_else(|| ScheduleRecord::new(config, now));
            store.records.insert(item.id.clone(), record);
            store.items.push(item);
        }

        for orphan in records.keys() {
            debug!("Dropping record {} with no matching item", orphan);
        }
        store
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add a new item; its default record is created right away
    pub fn add_item(
        &mut self,
        item: LearningItem,
        config: &SchedulerConfig,
        now: DateTime<Utc>,
    ) -> SrsResult<&ScheduleRecord> {
        if self.contains(&item.id) {
            return Err(SrsError::DuplicateItem(item.id));
        }
        let id = item.id.clone();
        self.items.push(item);
        let record = self
            .records
            .entry(id)
            .or_insert_with(|| ScheduleRecord::new(config, now));
        Ok(&*record)
    }

    pub fn item(&self, id: &str) -> Option<&LearningItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn items(&self) -> &[LearningItem] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&ScheduleRecord> {
        self.records.get(id)
    }

    /// Replace the record of a known item
    pub fn upsert(&mut self, id: &str, record: ScheduleRecord) -> SrsResult<()> {
        match self.records.get_mut(id) {
            Some(slot) => {
                *slot = record;
                Ok(())
            }
            None => Err(SrsError::UnknownItem(id.to_string())),
        }
    }

    /// All records in item insertion order
    pub fn all(&self) -> impl Iterator<Item = (&str, &ScheduleRecord)> + '_ {
        self.items
            .iter()
            .filter_map(|item| self.records.get(&item.id).map(|r| (item.id.as_str(), r)))
    }

    /// Delete an item and its record permanently
    pub fn remove(&mut self, id: &str) -> Option<(LearningItem, ScheduleRecord)> {
        let record = self.records.remove(id)?;
        let position = self.items.iter().position(|item| item.id == id)?;
        Some((self.items.remove(position), record))
    }

    /// Records keyed by id, for persistence
    pub fn records_by_id(&self) -> BTreeMap<String, ScheduleRecord> {
        self.all()
            .map(|(id, record)| (id.to_string(), record.clone()))
            .collect()
    }
}
