// Playback session controller: one instance per open episode.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::checkpoint::{ResumeChoice, ResumeDecision, ResumePolicy, WatchCheckpoint};
use super::health::{BufferHealthMonitor, BufferHealthSample, HealthLevel};
use super::prefetch::{PrefetchScheduler, PrefetchSnapshot};
use super::transport::{Shortcut, TransportState};
use crate::config::{EngineConfig, SEEK_STEP_SECONDS, VOLUME_STEP};
use crate::source::traits::{
    EpisodeKey, MediaEngine, ProgressGateway, ProgressTracker, SegmentSource, VideoDescriptor,
    VideoStatus,
};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Ended,
    Error,
}

impl PlaybackState {
    /// States in which seek, volume and rate changes are accepted.
    fn is_interactive(self) -> bool {
        matches!(
            self,
            PlaybackState::Ready | PlaybackState::Playing | PlaybackState::Paused
        )
    }
}

/// Notifications from the media backend.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    MetadataLoaded { duration: f64 },
    MetadataFailed { reason: String },
    TimeUpdate { current_time: f64, duration: f64 },
    BufferProgress,
    Playing,
    Paused,
    Ended,
}

/// Notifications to the surrounding UI.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(PlaybackState),
    /// No completed video exists for the episode yet.
    Unavailable(EpisodeKey),
    ResumePromptRequired(WatchCheckpoint),
    ResumeResolved(ResumeChoice),
    LoadFailed(String),
    Ended(EpisodeKey),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// Source is loading; `resume_prompt` is set while the caller owes a resume choice.
    Loading {
        resume_prompt: Option<WatchCheckpoint>,
    },
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub transport: TransportState,
    pub buffer: BufferHealthSample,
    pub health_level: HealthLevel,
    pub prefetch: PrefetchSnapshot,
    pub resume_pending: bool,
    /// Checkpoint saves dispatched but not yet reaped.
    pub pending_saves: usize,
}

/// External collaborators a session talks to.
#[derive(Clone)]
pub struct SessionCollaborators {
    pub catalog: Arc<dyn SegmentSource>,
    pub progress: Arc<dyn ProgressGateway>,
    pub tracker: Arc<dyn ProgressTracker>,
    pub engine: Arc<dyn MediaEngine>,
}

enum ResumeGate {
    Open,
    Pending(WatchCheckpoint),
}

pub struct PlaybackSession {
    session_id: String,
    key: EpisodeKey,
    user_id: Option<i64>,
    config: EngineConfig,
    resume_policy: ResumePolicy,
    collaborators: SessionCollaborators,
    state: PlaybackState,
    video: Option<VideoDescriptor>,
    source_url: Option<String>,
    resume_time: f64,
    resume_gate: ResumeGate,
    metadata_ready: bool,
    transport: TransportState,
    monitor: BufferHealthMonitor,
    buffer: BufferHealthSample,
    prefetch: PrefetchScheduler,
    /// Stamped at dispatch; a failed save restores the previous stamp.
    last_checkpoint_save: Arc<Mutex<Option<Instant>>>,
    last_tracked_second: Option<u64>,
    saves: JoinSet<()>,
    events: broadcast::Sender<SessionEvent>,
}

impl PlaybackSession {
    pub fn new(
        session_id: String,
        key: EpisodeKey,
        user_id: Option<i64>,
        collaborators: SessionCollaborators,
        config: EngineConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let prefetch = PrefetchScheduler::new(collaborators.catalog.clone(), config.clone());
        Self {
            session_id,
            key,
            user_id,
            resume_policy: ResumePolicy::from_config(&config),
            monitor: BufferHealthMonitor::new(config.healthy_lookahead_seconds),
            config,
            collaborators,
            state: PlaybackState::Idle,
            video: None,
            source_url: None,
            resume_time: 0.0,
            resume_gate: ResumeGate::Open,
            metadata_ready: false,
            transport: TransportState::default(),
            buffer: BufferHealthSample::default(),
            prefetch,
            last_checkpoint_save: Arc::new(Mutex::new(None)),
            last_tracked_second: None,
            saves: JoinSet::new(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Resolve the episode's video, warm the prefetch window, decide on a
    /// resume prompt and hand the source to the media backend.
    pub async fn start(&mut self) -> Result<StartOutcome> {
        self.resume_gate = ResumeGate::Open;
        self.set_state(PlaybackState::Loading);

        let video = match self
            .collaborators
            .catalog
            .get_video_for_episode(self.key)
            .await
        {
            Ok(video) => video,
            Err(e) => {
                error!(
                    "session {} video lookup for {:?} failed: {}",
                    self.session_id, self.key, e
                );
                self.fail(e.to_string());
                return Err(e);
            }
        };

        let video = match video {
            Some(v) if v.status == VideoStatus::Completed => v,
            other => {
                info!(
                    "session {} episode {:?} has no playable video (status={:?})",
                    self.session_id,
                    self.key,
                    other.map(|v| v.status)
                );
                self.set_state(PlaybackState::Idle);
                self.emit(SessionEvent::Unavailable(self.key));
                return Ok(StartOutcome::Unavailable);
            }
        };

        if let Err(e) = self
            .prefetch
            .initialize(&video, self.config.initial_segment_limit)
            .await
        {
            warn!(
                "session {} prefetch disabled for video {}: {}",
                self.session_id, video.video_id, e
            );
        }

        let previous = match self.collaborators.progress.last_checkpoint(self.key).await {
            Ok(cp) => cp,
            Err(e) => {
                warn!("session {} resume lookup failed: {}", self.session_id, e);
                None
            }
        };
        let decision = ResumeDecision::evaluate(previous, &self.resume_policy, Utc::now());
        let resume_prompt = match decision {
            ResumeDecision {
                should_prompt: true,
                checkpoint: Some(cp),
            } => {
                debug!(
                    "session {} resume prompt at {:.1}s ({:.0}%)",
                    self.session_id, cp.position_seconds, cp.percentage
                );
                self.resume_gate = ResumeGate::Pending(cp.clone());
                self.emit(SessionEvent::ResumePromptRequired(cp.clone()));
                Some(cp)
            }
            _ => None,
        };

        let url = video.hls_manifest_url.clone();
        info!(
            "session {} starting video={} segments={} duration={:.1}s",
            self.session_id, video.video_id, video.total_segments, video.duration_seconds
        );
        self.video = Some(video);
        self.load_source(&url, 0.0);

        Ok(StartOutcome::Loading { resume_prompt })
    }

    /// Point the backend at `url`. `resume_time` is applied once metadata is
    /// ready, unless a resume prompt is still unresolved.
    pub fn load_source(&mut self, url: &str, resume_time: f64) {
        self.source_url = Some(url.to_string());
        self.resume_time = if resume_time.is_finite() {
            resume_time.max(0.0)
        } else {
            0.0
        };
        self.metadata_ready = false;
        let preserved = TransportState {
            volume: self.transport.volume,
            muted: self.transport.muted,
            playback_rate: self.transport.playback_rate,
            ..TransportState::default()
        };
        self.transport = preserved;
        self.buffer = BufferHealthSample::default();
        self.set_state(PlaybackState::Loading);
        self.collaborators.engine.set_source(url);
    }

    /// Retry after a load failure, starting over from scratch.
    pub async fn retry(&mut self) -> Result<StartOutcome> {
        if self.state != PlaybackState::Error {
            return Err(anyhow!("retry is only valid after a load failure"));
        }
        match self.source_url.clone() {
            Some(url) if self.video.is_some() => {
                info!("session {} retrying source {}", self.session_id, url);
                let resume_time = self.resume_time;
                self.load_source(&url, resume_time);
                Ok(StartOutcome::Loading {
                    resume_prompt: self.pending_resume().cloned(),
                })
            }
            _ => self.start().await,
        }
    }

    /// Apply the caller's answer to a pending resume prompt.
    ///
    /// Returns `false` if no prompt was pending.
    pub fn resolve_resume(&mut self, choice: ResumeChoice) -> bool {
        let checkpoint = match std::mem::replace(&mut self.resume_gate, ResumeGate::Open) {
            ResumeGate::Pending(cp) => cp,
            ResumeGate::Open => return false,
        };
        let target = match choice {
            ResumeChoice::Resume => checkpoint.position_seconds,
            ResumeChoice::StartOver => 0.0,
        };
        debug!(
            "session {} resume resolved {:?} target={:.1}s",
            self.session_id, choice, target
        );

        if self.metadata_ready {
            self.resume_time = 0.0;
            self.apply_seek(target);
        } else {
            self.resume_time = target;
        }
        self.emit(SessionEvent::ResumeResolved(choice));
        true
    }

    pub fn handle_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::MetadataLoaded { duration } => self.on_metadata_loaded(duration),
            MediaEvent::MetadataFailed { reason } => {
                error!("session {} metadata load failed: {}", self.session_id, reason);
                self.fail(reason);
            }
            MediaEvent::TimeUpdate {
                current_time,
                duration,
            } => self.on_time_update(current_time, duration),
            MediaEvent::BufferProgress => self.resample_buffer(),
            MediaEvent::Playing => {
                if self.state.is_interactive() {
                    self.transport.playing = true;
                    self.set_state(PlaybackState::Playing);
                }
            }
            MediaEvent::Paused => {
                if self.state == PlaybackState::Playing {
                    self.transport.playing = false;
                    self.set_state(PlaybackState::Paused);
                }
            }
            MediaEvent::Ended => self.on_ended(),
        }
    }

    fn on_metadata_loaded(&mut self, duration: f64) {
        if self.state != PlaybackState::Loading {
            debug!(
                "session {} ignoring metadata in state {:?}",
                self.session_id, self.state
            );
            return;
        }
        self.metadata_ready = true;
        if duration.is_finite() && duration > 0.0 {
            self.transport.duration = duration;
        }

        if matches!(self.resume_gate, ResumeGate::Open) && self.resume_time > 0.0 {
            let target = std::mem::take(&mut self.resume_time);
            self.apply_seek(target);
        }
        self.set_state(PlaybackState::Ready);
    }

    /// Per-tick fan-out: buffer health, prefetch, checkpoint and local progress.
    pub fn on_time_update(&mut self, current_time: f64, duration: f64) {
        if !current_time.is_finite() {
            return;
        }
        self.reap_saves();
        self.transport.current_time = current_time.max(0.0);
        if duration.is_finite() && duration > 0.0 {
            self.transport.duration = duration;
        }

        self.resample_buffer();
        self.prefetch.on_playback_tick(current_time);
        self.save_checkpoint_throttled(current_time, duration);
        self.track_progress(current_time, duration);
    }

    /// Persist a checkpoint unless one went out within the checkpoint interval.
    ///
    /// Nothing is saved while a resume prompt is pending or outside
    /// `Ready`/`Playing`/`Paused`. Returns `true` if a save was dispatched.
    pub fn save_checkpoint_throttled(&mut self, position: f64, duration: f64) -> bool {
        if !self.records_progress() {
            return false;
        }
        self.dispatch_checkpoint(position, duration, false)
    }

    /// Final checkpoint at the true end, bypassing the throttle.
    pub fn on_ended(&mut self) {
        if self.state == PlaybackState::Ended {
            return;
        }
        let duration = self.transport.duration;
        self.transport.playing = false;
        self.transport.current_time = duration;
        self.dispatch_checkpoint(duration, duration, true);
        self.set_state(PlaybackState::Ended);
        self.emit(SessionEvent::Ended(self.key));
    }

    pub fn play(&mut self) -> Result<()> {
        if let ResumeGate::Pending(_) = self.resume_gate {
            debug!("session {} play held until resume is resolved", self.session_id);
            return Ok(());
        }
        if !self.state.is_interactive() {
            debug!("session {} play ignored in state {:?}", self.session_id, self.state);
            return Ok(());
        }
        self.collaborators.engine.play()?;
        self.transport.playing = true;
        self.set_state(PlaybackState::Playing);
        Ok(())
    }

    pub fn pause(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        self.collaborators.engine.pause();
        self.transport.playing = false;
        self.set_state(PlaybackState::Paused);
    }

    pub fn toggle_play(&mut self) -> Result<()> {
        if self.state == PlaybackState::Playing {
            self.pause();
            Ok(())
        } else {
            self.play()
        }
    }

    /// Seek to `time`, clamped to `[0, duration]`. Returns the applied position.
    pub fn seek_to(&mut self, time: f64) -> Option<f64> {
        if !self.state.is_interactive() {
            return None;
        }
        Some(self.apply_seek(time))
    }

    pub fn seek_by(&mut self, delta: f64) -> Option<f64> {
        self.seek_to(self.transport.current_time + delta)
    }

    pub fn set_volume(&mut self, volume: f64) {
        let volume = TransportState::clamp_volume(volume);
        self.collaborators.engine.set_volume(volume);
        self.transport.volume = volume;
    }

    pub fn adjust_volume(&mut self, delta: f64) {
        self.set_volume(self.transport.volume + delta);
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.collaborators.engine.set_muted(muted);
        self.transport.muted = muted;
    }

    pub fn set_playback_rate(&mut self, rate: f64) -> Result<()> {
        let rate = TransportState::supported_rate(rate)
            .ok_or_else(|| anyhow!("unsupported playback rate {}", rate))?;
        self.collaborators.engine.set_playback_rate(rate);
        self.transport.playback_rate = rate;
        Ok(())
    }

    pub fn request_fullscreen(&self) -> Result<()> {
        self.collaborators.engine.request_fullscreen()
    }

    pub fn handle_shortcut(&mut self, shortcut: Shortcut) -> Result<()> {
        match shortcut {
            Shortcut::TogglePlay => return self.toggle_play(),
            Shortcut::SeekBackward => {
                self.seek_by(-SEEK_STEP_SECONDS);
            }
            Shortcut::SeekForward => {
                self.seek_by(SEEK_STEP_SECONDS);
            }
            Shortcut::VolumeUp => self.adjust_volume(VOLUME_STEP),
            Shortcut::VolumeDown => self.adjust_volume(-VOLUME_STEP),
            Shortcut::ToggleMute => self.set_muted(!self.transport.muted),
            Shortcut::Fullscreen => return self.request_fullscreen(),
        }
        Ok(())
    }

    /// Swap in another episode. In-flight work for the old one is abandoned.
    pub async fn change_episode(&mut self, key: EpisodeKey) -> Result<StartOutcome> {
        info!(
            "session {} switching {:?} -> {:?}",
            self.session_id, self.key, key
        );
        self.teardown();
        self.key = key;
        self.video = None;
        self.source_url = None;
        self.resume_time = 0.0;
        self.resume_gate = ResumeGate::Open;
        self.metadata_ready = false;
        self.buffer = BufferHealthSample::default();
        self.last_checkpoint_save = Arc::new(Mutex::new(None));
        self.last_tracked_second = None;
        self.prefetch =
            PrefetchScheduler::new(self.collaborators.catalog.clone(), self.config.clone());
        self.start().await
    }

    /// Abandon pending saves and prefetches and return to `Idle`.
    pub fn close(&mut self) {
        self.teardown();
        self.set_state(PlaybackState::Idle);
        debug!("session {} closed", self.session_id);
    }

    /// Wait for dispatched checkpoint saves and prefetch batches to finish.
    pub async fn settle(&mut self) {
        while let Some(joined) = self.saves.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    warn!("session {} checkpoint task panicked: {}", self.session_id, e);
                }
            }
        }
        self.prefetch.settle().await;
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            state: self.state,
            transport: self.transport.clone(),
            buffer: self.buffer,
            health_level: self.buffer.level(),
            prefetch: self.prefetch.snapshot(),
            resume_pending: self.pending_resume().is_some(),
            pending_saves: self.saves.len(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn key(&self) -> EpisodeKey {
        self.key
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn video(&self) -> Option<&VideoDescriptor> {
        self.video.as_ref()
    }

    pub fn buffer_health(&self) -> BufferHealthSample {
        self.buffer
    }

    pub fn pending_resume(&self) -> Option<&WatchCheckpoint> {
        match &self.resume_gate {
            ResumeGate::Pending(cp) => Some(cp),
            ResumeGate::Open => None,
        }
    }

    pub fn prefetch(&self) -> &PrefetchScheduler {
        &self.prefetch
    }

    fn apply_seek(&mut self, time: f64) -> f64 {
        let target = self.transport.clamp_seek(time);
        self.collaborators.engine.seek(target);
        self.transport.current_time = target;
        self.resample_buffer();
        target
    }

    fn resample_buffer(&mut self) {
        let ranges = self.collaborators.engine.buffered();
        self.buffer = self.monitor.sample(
            &ranges,
            self.transport.current_time,
            self.transport.duration,
        );
    }

    fn dispatch_checkpoint(&mut self, position: f64, duration: f64, force: bool) -> bool {
        let Some(user_id) = self.user_id else {
            return false;
        };
        let Some(video_id) = self.video.as_ref().map(|v| v.video_id) else {
            return false;
        };
        if !(duration >= 1.0) {
            return false;
        }

        let now = Instant::now();
        let interval = Duration::from_secs(self.config.checkpoint_interval_secs);
        let previous = {
            let mut last_save = self.last_checkpoint_save.lock();
            if !force {
                if let Some(at) = *last_save {
                    if now.duration_since(at) < interval {
                        return false;
                    }
                }
            }
            // Stamped now so ticks during an in-flight save do not pile up.
            last_save.replace(now)
        };

        let checkpoint =
            WatchCheckpoint::new(Some(user_id), video_id, position, duration, Utc::now());
        let progress = Arc::clone(&self.collaborators.progress);
        let last_save = Arc::clone(&self.last_checkpoint_save);
        let session_id = self.session_id.clone();
        self.saves.spawn(async move {
            match progress.save_checkpoint(&checkpoint).await {
                Ok(()) => debug!(
                    "session {} checkpoint saved video={} position={:.1}s ({:.0}%)",
                    session_id,
                    checkpoint.video_id,
                    checkpoint.position_seconds,
                    checkpoint.percentage
                ),
                Err(e) => {
                    warn!("session {} checkpoint save failed: {}", session_id, e);
                    let mut stamp = last_save.lock();
                    if *stamp == Some(now) {
                        *stamp = previous;
                    }
                }
            }
        });
        true
    }

    fn track_progress(&mut self, current_time: f64, duration: f64) {
        if !self.records_progress() {
            return;
        }
        let Some(video_id) = self.video.as_ref().map(|v| v.video_id) else {
            return;
        };
        if current_time < 0.0 || !(duration > 0.0) {
            return;
        }
        let second = current_time.floor() as u64;
        if second % self.config.progress_track_cadence_secs.max(1) != 0
            || self.last_tracked_second == Some(second)
        {
            return;
        }
        self.last_tracked_second = Some(second);
        let checkpoint =
            WatchCheckpoint::new(self.user_id, video_id, current_time, duration, Utc::now());
        self.collaborators
            .tracker
            .record_progress(self.key, checkpoint);
    }

    /// Progress is only recorded for an interactive session with no open prompt.
    fn records_progress(&self) -> bool {
        self.state.is_interactive() && matches!(self.resume_gate, ResumeGate::Open)
    }

    fn reap_saves(&mut self) {
        while let Some(joined) = self.saves.try_join_next() {
            if let Err(e) = joined {
                if e.is_panic() {
                    warn!("session {} checkpoint task panicked: {}", self.session_id, e);
                }
            }
        }
    }

    fn teardown(&mut self) {
        self.saves.abort_all();
        self.prefetch.shutdown();
    }

    fn fail(&mut self, reason: String) {
        self.metadata_ready = false;
        self.transport.playing = false;
        self.set_state(PlaybackState::Error);
        self.emit(SessionEvent::LoadFailed(reason));
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state == state {
            return;
        }
        debug!(
            "session {} state {:?} -> {:?}",
            self.session_id, self.state, state
        );
        self.state = state;
        self.emit(SessionEvent::StateChanged(state));
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        debug!("PlaybackSession {} dropped, abandoning pending work", self.session_id);
        self.teardown();
    }
}
