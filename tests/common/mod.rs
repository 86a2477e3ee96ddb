// In-process fakes for the collaborator traits.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

use vod_stream_engine::engine::checkpoint::WatchCheckpoint;
use vod_stream_engine::logging::init_tracing;
use vod_stream_engine::engine::session::SessionCollaborators;
use vod_stream_engine::source::history::WatchHistory;
use vod_stream_engine::source::traits::{
    EpisodeKey, MediaEngine, ProgressGateway, SegmentSource, SegmentSummary, TimeRange,
    VideoDescriptor, VideoStatus,
};

pub const MANIFEST_URL: &str = "http://cdn.local/hls/42/index.m3u8";

pub fn completed_video(total_segments: u32) -> VideoDescriptor {
    VideoDescriptor {
        video_id: 42,
        hls_manifest_url: MANIFEST_URL.to_string(),
        duration_seconds: total_segments as f64 * 6.0,
        status: VideoStatus::Completed,
        total_segments,
    }
}

pub struct FakeCatalog {
    pub video: Mutex<Option<VideoDescriptor>>,
    pub total_segments: u32,
    pub failing: HashSet<String>,
    pub warm_delay: Option<Duration>,
    pub fail_lookup: AtomicBool,
    pub fail_summary: AtomicBool,
    pub summary_calls: AtomicU32,
    pub warmed: Mutex<Vec<String>>,
}

impl FakeCatalog {
    pub fn new(total_segments: u32) -> Self {
        Self {
            video: Mutex::new(Some(completed_video(total_segments))),
            total_segments,
            failing: HashSet::new(),
            warm_delay: None,
            fail_lookup: AtomicBool::new(false),
            fail_summary: AtomicBool::new(false),
            summary_calls: AtomicU32::new(0),
            warmed: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn with_warm_delay(mut self, delay: Duration) -> Self {
        self.warm_delay = Some(delay);
        self
    }

    pub fn warmed(&self) -> Vec<String> {
        let mut names = self.warmed.lock().clone();
        names.sort();
        names
    }
}

#[async_trait]
impl SegmentSource for FakeCatalog {
    async fn get_video_for_episode(&self, _key: EpisodeKey) -> Result<Option<VideoDescriptor>> {
        if self.fail_lookup.load(Ordering::SeqCst) {
            return Err(anyhow!("catalog unreachable"));
        }
        Ok(self.video.lock().clone())
    }

    async fn get_segment_summary(&self, _video_id: i64, limit: u32) -> Result<SegmentSummary> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_summary.load(Ordering::SeqCst) {
            return Err(anyhow!("summary unavailable"));
        }
        let listed = limit.min(self.total_segments);
        Ok(SegmentSummary {
            total_segments: self.total_segments,
            initial_segment_names: (1..=listed).map(|n| format!("segment_{:03}.ts", n)).collect(),
        })
    }

    async fn warm_segment(&self, _manifest_url: &str, segment_name: &str) -> Result<()> {
        if let Some(delay) = self.warm_delay {
            tokio::time::sleep(delay).await;
        }
        self.warmed.lock().push(segment_name.to_string());
        if self.failing.contains(segment_name) {
            return Err(anyhow!("HTTP 503 for {}", segment_name));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeGateway {
    pub saved: Mutex<Vec<WatchCheckpoint>>,
    pub last: Mutex<Option<WatchCheckpoint>>,
    pub fail_saves: AtomicBool,
    pub fail_lookup: AtomicBool,
}

impl FakeGateway {
    pub fn with_last(checkpoint: WatchCheckpoint) -> Self {
        let gateway = Self::default();
        *gateway.last.lock() = Some(checkpoint);
        gateway
    }

    pub fn saved(&self) -> Vec<WatchCheckpoint> {
        self.saved.lock().clone()
    }
}

#[async_trait]
impl ProgressGateway for FakeGateway {
    async fn save_checkpoint(&self, checkpoint: &WatchCheckpoint) -> Result<()> {
        self.saved.lock().push(checkpoint.clone());
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(anyhow!("HTTP 500"));
        }
        Ok(())
    }

    async fn last_checkpoint(&self, _key: EpisodeKey) -> Result<Option<WatchCheckpoint>> {
        if self.fail_lookup.load(Ordering::SeqCst) {
            return Err(anyhow!("history unavailable"));
        }
        Ok(self.last.lock().clone())
    }
}

#[derive(Default)]
pub struct FakeEngine {
    pub sources: Mutex<Vec<String>>,
    pub seeks: Mutex<Vec<f64>>,
    pub buffered: Mutex<Vec<TimeRange>>,
    pub plays: AtomicU32,
    pub pauses: AtomicU32,
    pub volume: Mutex<Option<f64>>,
    pub muted: Mutex<Option<bool>>,
    pub rate: Mutex<Option<f64>>,
    pub fullscreen_requests: AtomicU32,
}

impl FakeEngine {
    pub fn set_buffered(&self, ranges: Vec<TimeRange>) {
        *self.buffered.lock() = ranges;
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.seeks.lock().clone()
    }
}

impl MediaEngine for FakeEngine {
    fn set_source(&self, url: &str) {
        self.sources.lock().push(url.to_string());
    }

    fn play(&self) -> Result<()> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn pause(&self) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
    }

    fn seek(&self, time_seconds: f64) {
        self.seeks.lock().push(time_seconds);
    }

    fn set_volume(&self, volume: f64) {
        *self.volume.lock() = Some(volume);
    }

    fn set_muted(&self, muted: bool) {
        *self.muted.lock() = Some(muted);
    }

    fn set_playback_rate(&self, rate: f64) {
        *self.rate.lock() = Some(rate);
    }

    fn request_fullscreen(&self) -> Result<()> {
        self.fullscreen_requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn buffered(&self) -> Vec<TimeRange> {
        self.buffered.lock().clone()
    }
}

pub struct Harness {
    pub catalog: Arc<FakeCatalog>,
    pub gateway: Arc<FakeGateway>,
    pub history: Arc<WatchHistory>,
    pub engine: Arc<FakeEngine>,
}

impl Harness {
    pub fn new(catalog: FakeCatalog, gateway: FakeGateway) -> Self {
        init_tracing();
        Self {
            catalog: Arc::new(catalog),
            gateway: Arc::new(gateway),
            history: Arc::new(WatchHistory::new()),
            engine: Arc::new(FakeEngine::default()),
        }
    }

    pub fn collaborators(&self) -> SessionCollaborators {
        SessionCollaborators {
            catalog: self.catalog.clone(),
            progress: self.gateway.clone(),
            tracker: self.history.clone(),
            engine: self.engine.clone(),
        }
    }
}
