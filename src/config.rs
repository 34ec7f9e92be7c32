//! Scheduler constants and the optional `config.toml`
//!
//! The daily caps, learning steps and graduation ramp are fixed defaults of
//! [`SchedulerConfig`]. The config file only tunes storage, the ease policy
//! and endless-mode batching.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{SrsError, SrsResult};

pub const DAILY_NEW: u32 = 30;
pub const DAILY_REVIEW: u32 = 150;
pub const ACTIVE_POOL: u32 = 200;
pub const LEARNING_STEPS_MINUTES: [i64; 3] = [10, 60, 240];
pub const GRADUATE_TO_DAYS: [u32; 2] = [1, 6];
pub const MIN_EASE: f64 = 1.3;

/// Upper bound on any review interval; later due dates are clock anomalies
pub const MAX_INTERVAL_DAYS: i64 = 36_500;

/// Default config file written by `recall init`
pub const DEFAULT_CONFIG: &str = r#"# Recall Configuration

[storage]
# Persistence backend: "json" (single state.json) or "sqlite" (state.sqlite)
backend = "json"

[policy]
# Ease assigned to newly added words
starting_ease = 2.5
# Subtracted from ease on every lapse (ease never drops below 1.3)
ease_penalty = 0.2
# Added to ease on every correct review
ease_bonus = 0.0
# Correct reviews never raise ease above this
max_ease = 3.0

[session]
# Cards drawn per refill in endless mode
endless_batch = 20
"#;

/// How ease reacts to review answers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EasePolicy {
    pub starting_ease: f64,
    pub min_ease: f64,
    pub ease_penalty: f64,
    pub ease_bonus: f64,
    pub max_ease: f64,
}

impl Default for EasePolicy {
    fn default() -> Self {
        Self {
            starting_ease: 2.5,
            min_ease: MIN_EASE,
            ease_penalty: 0.2,
            ease_bonus: 0.0,
            max_ease: 3.0,
        }
    }
}

impl EasePolicy {
    /// Ease given to a freshly created record
    pub fn initial(&self) -> f64 {
        self.starting_ease.max(self.min_ease)
    }

    /// Ease after a correct review
    pub fn grow(&self, ease: f64) -> f64 {
        let ceiling = self.max_ease.max(ease);
        (ease + self.ease_bonus).min(ceiling).max(self.min_ease)
    }

    /// Ease after a lapse
    pub fn penalize(&self, ease: f64) -> f64 {
        (ease - self.ease_penalty).max(self.min_ease)
    }
}

/// All scheduling parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub daily_new: u32,
    pub daily_review: u32,
    pub active_pool: u32,
    pub learning_steps_minutes: Vec<i64>,
    pub graduate_to_days: [u32; 2],
    /// Review items due within this many days still count as in flight
    pub active_horizon_days: u32,
    pub endless_batch: usize,
    pub ease: EasePolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            daily_new: DAILY_NEW,
            daily_review: DAILY_REVIEW,
            active_pool: ACTIVE_POOL,
            learning_steps_minutes: LEARNING_STEPS_MINUTES.to_vec(),
            graduate_to_days: GRADUATE_TO_DAYS,
            active_horizon_days: GRADUATE_TO_DAYS[1],
            endless_batch: 20,
            ease: EasePolicy::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> SrsResult<()> {
        if self.learning_steps_minutes.is_empty() {
            return Err(SrsError::InvalidConfig("learning steps must not be empty".into()));
        }
        if self.learning_steps_minutes.iter().any(|m| *m <= 0) {
            return Err(SrsError::InvalidConfig("learning steps must be positive".into()));
        }
        let [first, second] = self.graduate_to_days;
        if first == 0 || second <= first {
            return Err(SrsError::InvalidConfig(format!(
                "graduation ramp must be increasing and positive, got [{}, {}]",
                first, second
            )));
        }
        let ease = &self.ease;
        if !(ease.min_ease > 0.0 && ease.max_ease >= ease.min_ease) {
            return Err(SrsError::InvalidConfig(format!(
                "ease bounds out of order: min {} max {}",
                ease.min_ease, ease.max_ease
            )));
        }
        if ease.ease_penalty < 0.0 || ease.ease_bonus < 0.0 {
            return Err(SrsError::InvalidConfig("ease adjustments must be non-negative".into()));
        }
        if self.endless_batch == 0 {
            return Err(SrsError::InvalidConfig("endless batch must be at least 1".into()));
        }
        Ok(())
    }

    pub fn step_count(&self) -> usize {
        self.learning_steps_minutes.len()
    }

    /// Delay for a learning step; indices past the end use the last step
    pub fn learning_step(&self, index: usize) -> Duration {
        let minutes = self
            .learning_steps_minutes
            .get(index)
            .or_else(|| self.learning_steps_minutes.last())
            .copied()
            .unwrap_or(LEARNING_STEPS_MINUTES[0]);
        Duration::minutes(minutes)
    }
}

/// Persistence backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub starting_ease: f64,
    pub ease_penalty: f64,
    pub ease_bonus: f64,
    pub max_ease: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let policy = EasePolicy::default();
        Self {
            starting_ease: policy.starting_ease,
            ease_penalty: policy.ease_penalty,
            ease_bonus: policy.ease_bonus,
            max_ease: policy.max_ease,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub endless_batch: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { endless_batch: 20 }
    }
}

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    /// Build validated scheduler parameters from the file settings
    pub fn scheduler_config(&self) -> SrsResult<SchedulerConfig> {
        let config = SchedulerConfig {
            endless_batch: self.session.endless_batch,
            ease: EasePolicy {
                starting_ease: self.policy.starting_ease,
                min_ease: MIN_EASE,
                ease_penalty: self.policy.ease_penalty,
                ease_bonus: self.policy.ease_bonus,
                max_ease: self.policy.max_ease,
            },
            ..SchedulerConfig::default()
        };
        config.validate()?;
        Ok(config)
    }
}

/// Load configuration, falling back to defaults when the file is absent
pub fn load_config(config_path: &Path) -> SrsResult<Config> {
    if !config_path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(config_path)
        .map_err(|e| SrsError::InvalidConfig(format!("{}: {}", config_path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| SrsError::InvalidConfig(format!("{}: {}", config_path.display(), e)))
}
