// Watch-progress checkpoints and the resume-prompt predicate.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;

/// Percentage of `duration` reached at `position`, clamped to [0, 100].
pub fn watch_percentage(position_seconds: f64, duration_seconds: f64) -> f64 {
    if !(duration_seconds > 0.0) || !position_seconds.is_finite() {
        return 0.0;
    }
    (position_seconds / duration_seconds * 100.0).clamp(0.0, 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchCheckpoint {
    /// `None` for anonymous viewers; such checkpoints only live in local history.
    pub user_id: Option<i64>,
    pub video_id: i64,
    pub position_seconds: f64,
    pub total_duration_seconds: f64,
    pub percentage: f64,
    pub saved_at: DateTime<Utc>,
}

impl WatchCheckpoint {
    pub fn new(
        user_id: Option<i64>,
        video_id: i64,
        position_seconds: f64,
        total_duration_seconds: f64,
        saved_at: DateTime<Utc>,
    ) -> Self {
        let position_seconds = position_seconds.max(0.0);
        Self {
            user_id,
            video_id,
            position_seconds,
            total_duration_seconds,
            percentage: watch_percentage(position_seconds, total_duration_seconds),
            saved_at,
        }
    }

    pub fn is_completed(&self, completion_percent: f64) -> bool {
        self.percentage >= completion_percent
    }

    /// Corrupt records are treated as if no checkpoint existed.
    pub fn is_valid(&self) -> bool {
        self.position_seconds.is_finite()
            && self.position_seconds >= 0.0
            && self.total_duration_seconds.is_finite()
            && self.total_duration_seconds > 0.0
            && (0.0..=100.0).contains(&self.percentage)
    }
}

/// Thresholds deciding whether a checkpoint is worth offering for resume.
#[derive(Debug, Clone)]
pub struct ResumePolicy {
    pub min_position_seconds: f64,
    pub completion_percent: f64,
    pub max_age: Duration,
}

impl ResumePolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            min_position_seconds: config.resume_min_position_seconds,
            completion_percent: config.completion_percent,
            max_age: Duration::days(config.resume_max_age_days),
        }
    }
}

impl Default for ResumePolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeChoice {
    /// Continue from the saved position.
    Resume,
    /// Restart the episode from zero.
    StartOver,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResumeDecision {
    pub should_prompt: bool,
    pub checkpoint: Option<WatchCheckpoint>,
}

impl ResumeDecision {
    pub fn none() -> Self {
        Self {
            should_prompt: false,
            checkpoint: None,
        }
    }

    pub fn evaluate(
        checkpoint: Option<WatchCheckpoint>,
        policy: &ResumePolicy,
        now: DateTime<Utc>,
    ) -> Self {
        let checkpoint = match checkpoint {
            Some(cp) if cp.is_valid() => cp,
            _ => return Self::none(),
        };

        let old_enough = checkpoint.position_seconds >= policy.min_position_seconds;
        let unfinished = !checkpoint.is_completed(policy.completion_percent);
        let recent = now.signed_duration_since(checkpoint.saved_at) <= policy.max_age;

        Self {
            should_prompt: old_enough && unfinished && recent,
            checkpoint: Some(checkpoint),
        }
    }
}
