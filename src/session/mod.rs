//! Practice session state
//!
//! A session is an ordered list of item ids and a cursor. Scheduled
//! sessions are computed once and walked to the end; endless sessions are
//! refilled whenever they run dry. Ids are resolved through the item store
//! on every access, so removed items are skipped rather than shown.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// How cards are drawn for practice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PracticeMode {
    /// Fixed queue bounded by daily budgets
    #[default]
    Scheduled,
    /// Unbounded re-draw that ignores daily budgets
    Endless,
}

impl PracticeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PracticeMode::Scheduled => "scheduled",
            PracticeMode::Endless => "endless",
        }
    }
}

impl FromStr for PracticeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "scheduled" => Ok(PracticeMode::Scheduled),
            "endless" => Ok(PracticeMode::Endless),
            other => Err(format!("unknown practice mode '{}'", other)),
        }
    }
}

impl std::fmt::Display for PracticeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queue and cursor of the active session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionQueue {
    pub mode: PracticeMode,
    pub ids: Vec<String>,
    pub current_review_index: usize,
    pub started_on: NaiveDate,
}

impl SessionQueue {
    pub fn remaining(&self) -> usize {
        self.ids.len().saturating_sub(self.current_review_index)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionController {
    mode: PracticeMode,
    queue: Option<SessionQueue>,
    last_answered: Option<String>,
}

impl SessionController {
    pub fn new(mode: PracticeMode) -> Self {
        Self {
            mode,
            queue: None,
            last_answered: None,
        }
    }

    /// Rebuild from persisted `practiceMode` and `session` values
    ///
    /// A saved queue is only resumed when it belongs to the saved mode and
    /// was started today.
    pub fn restore(mode: &Value, session: &Value, today: NaiveDate) -> Self {
        let mode = match serde_json::from_value::<PracticeMode>(mode.clone()) {
            Ok(mode) => mode,
            Err(_) if mode.is_null() => PracticeMode::default(),
            Err(e) => {
                warn!("Unreadable practice mode, using scheduled: {}", e);
                PracticeMode::default()
            }
        };

        let mut controller = Self::new(mode);
        if session.is_null() {
            return controller;
        }

        match serde_json::from_value::<SessionQueue>(session.clone()) {
            Ok(queue) if queue.mode != mode => {
                debug!("Discarding {} session saved under {} mode", queue.mode, mode);
            }
            Ok(queue) if queue.started_on != today => {
                info!("Discarding session from {}", queue.started_on);
            }
            Ok(queue) => controller.queue = Some(queue),
            Err(e) => warn!("Discarding unreadable session state: {}", e),
        }
        controller
    }

    pub fn mode(&self) -> PracticeMode {
        self.mode
    }

    /// Switch practice mode, dropping any queue and cursor
    ///
    /// Returns false when already in `mode`; nothing is reset then.
    pub fn switch_mode(&mut self, mode: PracticeMode) -> bool {
        if self.mode == mode {
            return false;
        }
        info!("Practice mode {} -> {}", self.mode, mode);
        self.mode = mode;
        self.queue = None;
        self.last_answered = None;
        true
    }

    /// Replace the queue with a freshly computed one
    pub fn start(&mut self, ids: Vec<String>, today: NaiveDate) {
        debug!("Starting {} session with {} cards", self.mode, ids.len());
        self.queue = Some(SessionQueue {
            mode: self.mode,
            ids,
            current_review_index: 0,
            started_on: today,
        });
    }

    pub fn queue(&self) -> Option<&SessionQueue> {
        self.queue.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.queue.is_some()
    }

    /// Id under the cursor, if the queue is not exhausted
    pub fn current(&self) -> Option<&str> {
        let queue = self.queue.as_ref()?;
        queue
            .ids
            .get(queue.current_review_index)
            .map(String::as_str)
    }

    /// Move the cursor past ids that no longer resolve
    pub fn skip_unresolved(&mut self, resolves: impl Fn(&str) -> bool) {
        if let Some(queue) = self.queue.as_mut() {
            while let Some(id) = queue.ids.get(queue.current_review_index) {
                if resolves(id) {
                    break;
                }
                debug!("Skipping removed item {}", id);
                queue.current_review_index += 1;
            }
        }
    }

    /// Mark `id` answered; the cursor moves only if `id` is the current card
    pub fn record_answer(&mut self, id: &str) {
        if self.current() == Some(id) {
            if let Some(queue) = self.queue.as_mut() {
                queue.current_review_index += 1;
            }
        }
        self.last_answered = Some(id.to_string());
    }

    pub fn last_answered(&self) -> Option<&str> {
        self.last_answered.as_deref()
    }

    /// Scheduled session walked past its last card
    pub fn is_finished(&self) -> bool {
        self.queue
            .as_ref()
            .map_or(false, |queue| queue.remaining() == 0)
    }

    /// Endless mode with nothing left under the cursor
    pub fn needs_refill(&self) -> bool {
        self.mode == PracticeMode::Endless && self.current().is_none()
    }

    pub fn clear(&mut self) {
        self.queue = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 9).unwrap()
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cursor_walks_queue() {
        let mut session = SessionController::new(PracticeMode::Scheduled);
        session.start(ids(&["a", "b"]), today());
        assert_eq!(session.current(), Some("a"));

        session.record_answer("a");
        assert_eq!(session.current(), Some("b"));
        session.record_answer("b");
        assert_eq!(session.current(), None);
        assert!(session.is_finished());
        assert!(!session.needs_refill());
    }

    #[test]
    fn test_answer_off_queue_does_not_move_cursor() {
        let mut session = SessionController::new(PracticeMode::Scheduled);
        session.start(ids(&["a", "b"]), today());
        session.record_answer("z");
        assert_eq!(session.current(), Some("a"));
        assert_eq!(session.last_answered(), Some("z"));
    }

    #[test]
    fn test_switch_mode_resets() {
        let mut session = SessionController::new(PracticeMode::Scheduled);
        session.start(ids(&["a", "b"]), today());
        session.record_answer("a");

        assert!(session.switch_mode(PracticeMode::Endless));
        assert!(session.queue().is_none());
        assert!(session.needs_refill());

        assert!(!session.switch_mode(PracticeMode::Endless));
    }

    #[test]
    fn test_skip_unresolved() {
        let mut session = SessionController::new(PracticeMode::Scheduled);
        session.start(ids(&["gone", "also-gone", "kept"]), today());
        session.skip_unresolved(|id| id == "kept");
        assert_eq!(session.current(), Some("kept"));
    }

    #[test]
    fn test_restore_resumes_todays_session() {
        let saved = json!({
            "mode": "scheduled",
            "ids": ["a", "b", "c"],
            "currentReviewIndex": 1,
            "startedOn": "2024-09-09"
        });
        let session = SessionController::restore(&json!("scheduled"), &saved, today());
        assert_eq!(session.current(), Some("b"));
    }

    #[test]
    fn test_restore_discards_stale_or_mismatched() {
        let stale = json!({
            "mode": "scheduled",
            "ids": ["a"],
            "currentReviewIndex": 0,
            "startedOn": "2024-09-08"
        });
        assert!(!SessionController::restore(&json!("scheduled"), &stale, today()).is_active());

        let other_mode = json!({
            "mode": "scheduled",
            "ids": ["a"],
            "currentReviewIndex": 0,
            "startedOn": "2024-09-09"
        });
        let session = SessionController::restore(&json!("endless"), &other_mode, today());
        assert_eq!(session.mode(), PracticeMode::Endless);
        assert!(!session.is_active());
    }

    #[test]
    fn test_restore_defaults() {
        let session = SessionController::restore(&Value::Null, &Value::Null, today());
        assert_eq!(session.mode(), PracticeMode::Scheduled);
        let session = SessionController::restore(&json!(42), &json!("junk"), today());
        assert_eq!(session.mode(), PracticeMode::Scheduled);
        assert!(!session.is_active());
    }
}
