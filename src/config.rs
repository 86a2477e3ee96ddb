use anyhow::{anyhow, Result};
use serde::Deserialize;

/// Playback length covered by one segment, in seconds.
pub const DEFAULT_SEGMENT_DURATION_SECONDS: f64 = 6.0;

/// Number of segments kept warm ahead of the playhead.
pub const DEFAULT_PRELOAD_BUFFER_SIZE: u32 = 3;

/// Minimum gap between two prefetch dispatches of one scheduler.
pub const DEFAULT_MIN_PREFETCH_INTERVAL_SECS: u64 = 5;

/// Number of segment names requested with the initial summary.
pub const DEFAULT_INITIAL_SEGMENT_LIMIT: u32 = 10;

/// Seconds of buffer ahead of the playhead that count as 100% health.
pub const DEFAULT_HEALTHY_LOOKAHEAD_SECONDS: f64 = 30.0;

/// Minimum gap between two throttled checkpoint saves.
pub const DEFAULT_CHECKPOINT_INTERVAL_SECS: u64 = 10;

/// Coarse progress tracker only fires on whole seconds divisible by this.
pub const DEFAULT_PROGRESS_TRACK_CADENCE_SECS: u64 = 5;

/// Checkpoints below this position never trigger a resume prompt.
pub const DEFAULT_RESUME_MIN_POSITION_SECONDS: f64 = 120.0;

/// Percentage at which an episode counts as watched.
pub const DEFAULT_COMPLETION_PERCENT: f64 = 90.0;

/// Checkpoints older than this are not offered for resume.
pub const DEFAULT_RESUME_MAX_AGE_DAYS: i64 = 30;

/// Timeout applied to every HTTP request made by the collaborators.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Playback rates offered by the transport.
pub const PLAYBACK_RATES: [f64; 6] = [0.5, 0.75, 1.0, 1.25, 1.5, 2.0];

/// Jump applied by the seek shortcuts.
pub const SEEK_STEP_SECONDS: f64 = 10.0;

/// Change applied by the volume shortcuts.
pub const VOLUME_STEP: f64 = 0.1;

/// How segment files are named on the segment host.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SegmentNamingConfig {
    pub prefix: String,
    /// Zero-padding width of the segment number.
    pub pad_width: usize,
    pub extension: String,
}

impl Default for SegmentNamingConfig {
    fn default() -> Self {
        Self {
            prefix: "segment_".to_string(),
            pad_width: 3,
            extension: "ts".to_string(),
        }
    }
}

/// Top-level configuration for the playback engine.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Fixed playback length of one segment in seconds.
    pub segment_duration_seconds: f64,
    /// Segments to keep warm ahead of the playhead.
    pub preload_buffer_size: u32,
    /// Minimum gap between two prefetch dispatches.
    pub min_prefetch_interval_secs: u64,
    /// Segment names requested with the initial summary.
    pub initial_segment_limit: u32,
    /// Buffer ahead of the playhead that counts as 100% health.
    pub healthy_lookahead_seconds: f64,
    /// Minimum gap between two throttled checkpoint saves.
    pub checkpoint_interval_secs: u64,
    /// Local progress is recorded on whole seconds divisible by this.
    pub progress_track_cadence_secs: u64,
    /// Checkpoints earlier than this never trigger a resume prompt.
    pub resume_min_position_seconds: f64,
    /// Watch percentage at which an episode counts as finished.
    pub completion_percent: f64,
    /// Checkpoints older than this many days are ignored for resume.
    pub resume_max_age_days: i64,
    /// Timeout applied to every HTTP request.
    pub request_timeout_secs: u64,
    /// How segment numbers map to file names.
    pub segment_naming: SegmentNamingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            segment_duration_seconds: DEFAULT_SEGMENT_DURATION_SECONDS,
            preload_buffer_size: DEFAULT_PRELOAD_BUFFER_SIZE,
            min_prefetch_interval_secs: DEFAULT_MIN_PREFETCH_INTERVAL_SECS,
            initial_segment_limit: DEFAULT_INITIAL_SEGMENT_LIMIT,
            healthy_lookahead_seconds: DEFAULT_HEALTHY_LOOKAHEAD_SECONDS,
            checkpoint_interval_secs: DEFAULT_CHECKPOINT_INTERVAL_SECS,
            progress_track_cadence_secs: DEFAULT_PROGRESS_TRACK_CADENCE_SECS,
            resume_min_position_seconds: DEFAULT_RESUME_MIN_POSITION_SECONDS,
            completion_percent: DEFAULT_COMPLETION_PERCENT,
            resume_max_age_days: DEFAULT_RESUME_MAX_AGE_DAYS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            segment_naming: SegmentNamingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a JSON config document. Missing fields keep their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.segment_duration_seconds > 0.0) {
            return Err(anyhow!(
                "segment_duration_seconds must be > 0 (got {})",
                self.segment_duration_seconds
            ));
        }
        if !(self.healthy_lookahead_seconds > 0.0) {
            return Err(anyhow!(
                "healthy_lookahead_seconds must be > 0 (got {})",
                self.healthy_lookahead_seconds
            ));
        }
        if self.checkpoint_interval_secs == 0 || self.progress_track_cadence_secs == 0 {
            return Err(anyhow!("checkpoint and progress intervals must be > 0"));
        }
        if !(self.completion_percent > 0.0 && self.completion_percent <= 100.0) {
            return Err(anyhow!(
                "completion_percent must be in (0, 100] (got {})",
                self.completion_percent
            ));
        }
        if self.resume_max_age_days < 0 {
            return Err(anyhow!("resume_max_age_days must not be negative"));
        }
        Ok(())
    }
}
