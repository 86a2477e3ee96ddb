// Buffer health: turns buffered time ranges into a single 0-100 signal.

use serde::Serialize;

use crate::config::DEFAULT_HEALTHY_LOOKAHEAD_SECONDS;
use crate::source::traits::TimeRange;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BufferHealthSample {
    pub buffered_through_seconds: f64,
    pub buffered_percent_of_duration: f64,
    pub buffer_ahead_of_playhead_seconds: f64,
    pub health_percent: f64,
}

impl BufferHealthSample {
    pub fn level(&self) -> HealthLevel {
        HealthLevel::from_percent(self.health_percent)
    }
}

/// UI bucket for a health percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    Healthy,
    Caution,
    Critical,
}

impl HealthLevel {
    pub fn from_percent(percent: f64) -> Self {
        if percent > 70.0 {
            HealthLevel::Healthy
        } else if percent >= 30.0 {
            HealthLevel::Caution
        } else {
            HealthLevel::Critical
        }
    }
}

/// Stateless sampler; advisory only, nothing throttles on it.
#[derive(Debug, Clone)]
pub struct BufferHealthMonitor {
    healthy_lookahead_seconds: f64,
}

impl BufferHealthMonitor {
    pub fn new(healthy_lookahead_seconds: f64) -> Self {
        Self {
            healthy_lookahead_seconds,
        }
    }

    pub fn sample(
        &self,
        buffered: &[TimeRange],
        current_time: f64,
        total_duration: f64,
    ) -> BufferHealthSample {
        let buffered_end = buffered.last().map(|r| r.end.max(0.0)).unwrap_or(0.0);

        let buffered_percent = if total_duration > 0.0 {
            (buffered_end / total_duration * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };
        let ahead = (buffered_end - current_time).max(0.0);
        let health = if self.healthy_lookahead_seconds > 0.0 {
            (ahead / self.healthy_lookahead_seconds * 100.0).min(100.0)
        } else {
            100.0
        };

        BufferHealthSample {
            buffered_through_seconds: buffered_end,
            buffered_percent_of_duration: buffered_percent,
            buffer_ahead_of_playhead_seconds: ahead,
            health_percent: health,
        }
    }
}

impl Default for BufferHealthMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_HEALTHY_LOOKAHEAD_SECONDS)
    }
}
