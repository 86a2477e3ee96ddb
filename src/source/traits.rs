// Collaborator contracts: catalog, progress persistence and the media backend.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::engine::checkpoint::WatchCheckpoint;

/// Identifies one episode of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpisodeKey {
    pub series_id: i64,
    pub episode_number: u32,
}

impl EpisodeKey {
    pub fn new(series_id: i64, episode_number: u32) -> Self {
        Self {
            series_id,
            episode_number,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Video associated with an episode, as returned by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDescriptor {
    pub video_id: i64,
    pub hls_manifest_url: String,
    pub duration_seconds: f64,
    pub status: VideoStatus,
    pub total_segments: u32,
}

/// Segment count plus the first few segment names of a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentSummary {
    pub total_segments: u32,
    #[serde(default)]
    pub initial_segment_names: Vec<String>,
}

/// One contiguous buffered span reported by the media backend, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }
}

/// Catalog-side view of videos and their segments.
#[async_trait]
pub trait SegmentSource: Send + Sync {
    /// `Ok(None)` when no completed video is attached to the episode.
    async fn get_video_for_episode(&self, key: EpisodeKey) -> Result<Option<VideoDescriptor>>;
    async fn get_segment_summary(&self, video_id: i64, limit: u32) -> Result<SegmentSummary>;
    /// Lightweight existence / cache-warm request for one segment.
    async fn warm_segment(&self, manifest_url: &str, segment_name: &str) -> Result<()>;
}

/// System of record for watch-progress checkpoints.
#[async_trait]
pub trait ProgressGateway: Send + Sync {
    /// Upsert keyed by `(user_id, video_id)`; last write wins.
    async fn save_checkpoint(&self, checkpoint: &WatchCheckpoint) -> Result<()>;
    async fn last_checkpoint(&self, key: EpisodeKey) -> Result<Option<WatchCheckpoint>>;
}

/// Local watch-history cache fed at a coarse cadence during playback.
pub trait ProgressTracker: Send + Sync {
    fn record_progress(&self, key: EpisodeKey, checkpoint: WatchCheckpoint);
}

/// Abstract media backend driven by the session controller.
///
/// Lifecycle and timing notifications flow the other way, as
/// [`MediaEvent`](crate::engine::session::MediaEvent)s handed to the session.
pub trait MediaEngine: Send + Sync {
    fn set_source(&self, url: &str);
    fn play(&self) -> Result<()>;
    fn pause(&self);
    fn seek(&self, time_seconds: f64);
    fn set_volume(&self, volume: f64);
    fn set_muted(&self, muted: bool);
    fn set_playback_rate(&self, rate: f64);
    fn request_fullscreen(&self) -> Result<()> {
        Ok(())
    }
    /// Buffered ranges in non-decreasing order.
    fn buffered(&self) -> Vec<TimeRange>;
}
