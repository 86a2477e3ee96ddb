// Prefetch scheduler: keeps a bounded window of segments warm ahead of the playhead.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::segments::SegmentDescriptorSet;
use super::stats::{StatsCollector, StatsSnapshot};
use crate::config::EngineConfig;
use crate::source::traits::{SegmentSource, VideoDescriptor};

/// Mutable window bookkeeping, shared with in-flight batch tasks.
#[derive(Debug)]
pub struct PrefetchWindowState {
    /// Count of segments (1-based, contiguous from the start) already warmed.
    pub loaded_segments: u32,
    pub preload_buffer_size: u32,
    pub last_load: Option<Instant>,
    pub in_flight: HashSet<String>,
    /// Highest segment number handed to any batch.
    dispatched_through: u32,
}

impl PrefetchWindowState {
    fn new(preload_buffer_size: u32) -> Self {
        Self {
            loaded_segments: 0,
            preload_buffer_size,
            last_load: None,
            in_flight: HashSet::new(),
            dispatched_through: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrefetchSnapshot {
    pub active: bool,
    pub loaded_segments: u32,
    pub total_segments: u32,
    pub in_flight_segments: usize,
    pub stats: StatsSnapshot,
}

/// Everything a batch task needs, detached from the scheduler's lifetime.
#[derive(Clone)]
struct BatchContext {
    source: Arc<dyn SegmentSource>,
    descriptor: Arc<SegmentDescriptorSet>,
    state: Arc<Mutex<PrefetchWindowState>>,
    stats: Arc<StatsCollector>,
    cancel: CancellationToken,
}

impl BatchContext {
    async fn run(self, first: u32, last: u32) {
        let names = self.descriptor.names_in(first, last);
        if names.is_empty() {
            return;
        }
        let count = names.len() as u32;
        let last = first + count - 1;

        {
            let mut state = self.state.lock();
            state.in_flight.extend(names.iter().cloned());
            state.dispatched_through = state.dispatched_through.max(last);
        }
        self.stats.record_dispatch();
        let t0 = Instant::now();

        let mut requests = JoinSet::new();
        for name in names.iter().cloned() {
            let source = Arc::clone(&self.source);
            let manifest_url = self.descriptor.manifest_url.clone();
            requests.spawn(async move {
                let result = source.warm_segment(&manifest_url, &name).await;
                (name, result)
            });
        }

        let stats = Arc::clone(&self.stats);
        let drain = async move {
            while let Some(joined) = requests.join_next().await {
                match joined {
                    Ok((_, Ok(()))) => stats.record_segment(true),
                    Ok((name, Err(e))) => {
                        stats.record_segment(false);
                        warn!("prefetch of {} failed: {}", name, e);
                    }
                    Err(e) => {
                        stats.record_segment(false);
                        warn!("prefetch task failed: {}", e);
                    }
                }
            }
        };

        // Dropping `drain` on cancellation aborts the remaining requests.
        let finished = tokio::select! {
            _ = drain => true,
            _ = self.cancel.cancelled() => false,
        };

        if !finished {
            self.stats.record_batch_abandoned();
            debug!(
                "prefetch batch [{}, {}] of video {} abandoned",
                first, last, self.descriptor.video_id
            );
            return;
        }

        let elapsed = t0.elapsed();
        let loaded = {
            let mut state = self.state.lock();
            for name in &names {
                state.in_flight.remove(name);
            }
            state.loaded_segments = state
                .loaded_segments
                .max(last)
                .min(self.descriptor.total_segments);
            state.loaded_segments
        };
        let rate = self.stats.record_batch_done(count, elapsed);
        debug!(
            "prefetch batch [{}, {}] video={} loaded={}/{} elapsed_ms={} rate={:.2} seg/s",
            first,
            last,
            self.descriptor.video_id,
            loaded,
            self.descriptor.total_segments,
            elapsed.as_millis(),
            rate
        );
    }
}

/// Single-owner scheduler bound to one playback session.
///
/// [`on_playback_tick`](Self::on_playback_tick) is cheap and safe to call on
/// every timing tick; throttling happens here, not in the caller. Batches run
/// as tasks on the current tokio runtime and never report errors upward.
pub struct PrefetchScheduler {
    source: Arc<dyn SegmentSource>,
    config: EngineConfig,
    descriptor: Option<Arc<SegmentDescriptorSet>>,
    state: Arc<Mutex<PrefetchWindowState>>,
    stats: Arc<StatsCollector>,
    tasks: JoinSet<()>,
    cancel: CancellationToken,
}

impl PrefetchScheduler {
    pub fn new(source: Arc<dyn SegmentSource>, config: EngineConfig) -> Self {
        let preload = config.preload_buffer_size;
        Self {
            source,
            config,
            descriptor: None,
            state: Arc::new(Mutex::new(PrefetchWindowState::new(preload))),
            stats: Arc::new(StatsCollector::new()),
            tasks: JoinSet::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Fetch the segment summary once. Later calls are no-ops.
    ///
    /// On error the scheduler stays inactive and may be initialized again.
    pub async fn initialize(&mut self, video: &VideoDescriptor, limit: u32) -> Result<()> {
        if self.descriptor.is_some() {
            debug!("prefetch scheduler for video {} already initialized", video.video_id);
            return Ok(());
        }

        let summary = self.source.get_segment_summary(video.video_id, limit).await?;
        let descriptor = SegmentDescriptorSet::from_summary(
            video.video_id,
            &video.hls_manifest_url,
            summary,
            &self.config,
        );

        let initial = limit.min(descriptor.total_segments);
        {
            let mut state = self.state.lock();
            state.loaded_segments = initial;
            state.dispatched_through = initial;
        }
        info!(
            "prefetch scheduler video={} segments={} initial={} listed={}",
            video.video_id,
            descriptor.total_segments,
            initial,
            descriptor.initial_names.len()
        );
        self.descriptor = Some(Arc::new(descriptor));
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
            && self
                .descriptor
                .as_ref()
                .is_some_and(|d| d.total_segments > 0)
    }

    /// Advance the window for the playhead at `current_time`.
    ///
    /// Returns `true` if a batch was dispatched.
    pub fn on_playback_tick(&mut self, current_time: f64) -> bool {
        self.reap_finished();

        if !self.is_active() {
            return false;
        }
        let Some(descriptor) = self.descriptor.clone() else {
            return false;
        };

        let current_index = descriptor.index_at(current_time);
        let now = Instant::now();
        let min_interval = Duration::from_secs(self.config.min_prefetch_interval_secs);

        let (first, last) = {
            let mut state = self.state.lock();
            let target = current_index
                .saturating_add(state.preload_buffer_size)
                .min(descriptor.total_segments);
            let from = state.loaded_segments.max(state.dispatched_through);
            if target <= from {
                return false;
            }
            if let Some(at) = state.last_load {
                if now.duration_since(at) < min_interval {
                    return false;
                }
            }
            // Stamped before the batch resolves so fast ticks cannot double-dispatch.
            state.last_load = Some(now);
            state.dispatched_through = target;
            (from + 1, target)
        };

        debug!(
            "prefetch dispatch video={} segment_index={} batch=[{}, {}]",
            descriptor.video_id, current_index, first, last
        );
        let ctx = self.batch_context(descriptor);
        self.tasks.spawn(ctx.run(first, last));
        true
    }

    /// Warm segments `first..=last` (1-based) and wait for the whole batch.
    ///
    /// Individual failures are logged and counted; the window still advances.
    /// The window counts contiguous segments from the start, so completion
    /// raises `loaded_segments` to `last` rather than adding the batch size.
    /// A range that skips past the loaded count marks the gap as loaded too.
    pub async fn prefetch_batch(&self, first: u32, last: u32) {
        let Some(descriptor) = self.descriptor.clone() else {
            return;
        };
        if self.cancel.is_cancelled() {
            return;
        }
        self.batch_context(descriptor).run(first, last).await;
    }

    /// Wait for every dispatched batch to finish.
    pub async fn settle(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    warn!("prefetch batch panicked: {}", e);
                }
            }
        }
    }

    /// Abandon all in-flight batches. Their results are ignored.
    pub fn shutdown(&mut self) {
        self.cancel.cancel();
        self.tasks.abort_all();
        self.state.lock().in_flight.clear();
    }

    pub fn loaded_segments(&self) -> u32 {
        self.state.lock().loaded_segments
    }

    pub fn total_segments(&self) -> u32 {
        self.descriptor.as_ref().map_or(0, |d| d.total_segments)
    }

    pub fn descriptor(&self) -> Option<&SegmentDescriptorSet> {
        self.descriptor.as_deref()
    }

    pub fn snapshot(&self) -> PrefetchSnapshot {
        let state = self.state.lock();
        PrefetchSnapshot {
            active: self.is_active(),
            loaded_segments: state.loaded_segments,
            total_segments: self.total_segments(),
            in_flight_segments: state.in_flight.len(),
            stats: self.stats.snapshot(),
        }
    }

    fn batch_context(&self, descriptor: Arc<SegmentDescriptorSet>) -> BatchContext {
        BatchContext {
            source: Arc::clone(&self.source),
            descriptor,
            state: Arc::clone(&self.state),
            stats: Arc::clone(&self.stats),
            cancel: self.cancel.clone(),
        }
    }

    fn reap_finished(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            if let Err(e) = joined {
                if e.is_panic() {
                    warn!("prefetch batch panicked: {}", e);
                }
            }
        }
    }
}

impl Drop for PrefetchScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
