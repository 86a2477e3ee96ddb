// Immutable per-video segment layout consumed by the prefetch scheduler.

use crate::config::{EngineConfig, SegmentNamingConfig};
use crate::source::traits::SegmentSummary;

/// Maps a 1-based segment number to its file name.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentNaming {
    prefix: String,
    pad_width: usize,
    extension: String,
}

impl SegmentNaming {
    pub fn new(config: &SegmentNamingConfig) -> Self {
        Self {
            prefix: config.prefix.clone(),
            pad_width: config.pad_width,
            extension: config.extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn name_for(&self, number: u32) -> String {
        format!(
            "{}{:0width$}.{}",
            self.prefix,
            number,
            self.extension,
            width = self.pad_width
        )
    }
}

impl Default for SegmentNaming {
    fn default() -> Self {
        Self::new(&SegmentNamingConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct SegmentDescriptorSet {
    pub video_id: i64,
    pub manifest_url: String,
    pub total_segments: u32,
    pub segment_duration_seconds: f64,
    pub naming: SegmentNaming,
    /// First few names as listed by the catalog (capped by the request limit).
    pub initial_names: Vec<String>,
}

impl SegmentDescriptorSet {
    pub fn from_summary(
        video_id: i64,
        manifest_url: &str,
        summary: SegmentSummary,
        config: &EngineConfig,
    ) -> Self {
        Self {
            video_id,
            manifest_url: manifest_url.to_string(),
            total_segments: summary.total_segments,
            segment_duration_seconds: config.segment_duration_seconds,
            naming: SegmentNaming::new(&config.segment_naming),
            initial_names: summary.initial_segment_names,
        }
    }

    /// Zero-based index of the segment playing at `time_seconds`.
    pub fn index_at(&self, time_seconds: f64) -> u32 {
        if !(time_seconds > 0.0) || !(self.segment_duration_seconds > 0.0) {
            return 0;
        }
        let index = (time_seconds / self.segment_duration_seconds).floor();
        if index >= u32::MAX as f64 {
            u32::MAX
        } else {
            index as u32
        }
    }

    pub fn name_for(&self, number: u32) -> String {
        self.naming.name_for(number)
    }

    /// Names for the inclusive 1-based range `[first, last]`.
    pub fn names_in(&self, first: u32, last: u32) -> Vec<String> {
        let last = last.min(self.total_segments);
        if first == 0 || first > last {
            return Vec::new();
        }
        (first..=last).map(|n| self.name_for(n)).collect()
    }
}
