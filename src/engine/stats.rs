// Prefetch observability: dispatch counts, per-segment outcomes, batch throughput.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

struct BatchSample {
    segments: u32,
    elapsed: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub batches_dispatched: u64,
    pub segments_warmed: u64,
    pub segments_failed: u64,
    pub batches_in_flight: u32,
    /// Segments per second measured over the most recent batch.
    pub last_throughput: f64,
}

pub struct StatsCollector {
    batches_dispatched: AtomicU64,
    segments_warmed: AtomicU64,
    segments_failed: AtomicU64,
    batches_in_flight: AtomicU32,
    last_batch: Mutex<Option<BatchSample>>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            batches_dispatched: AtomicU64::new(0),
            segments_warmed: AtomicU64::new(0),
            segments_failed: AtomicU64::new(0),
            batches_in_flight: AtomicU32::new(0),
            last_batch: Mutex::new(None),
        }
    }

    pub fn record_dispatch(&self) {
        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
        self.batches_in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_segment(&self, ok: bool) {
        if ok {
            self.segments_warmed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.segments_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a finished batch and return its throughput in segments/second.
    pub fn record_batch_done(&self, segments: u32, elapsed: Duration) -> f64 {
        let _ = self
            .batches_in_flight
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
        *self.last_batch.lock() = Some(BatchSample { segments, elapsed });
        throughput(segments, elapsed)
    }

    /// Release the in-flight slot of a batch that was abandoned before finishing.
    pub fn record_batch_abandoned(&self) {
        let _ = self
            .batches_in_flight
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let last_throughput = self
            .last_batch
            .lock()
            .as_ref()
            .map(|b| throughput(b.segments, b.elapsed))
            .unwrap_or(0.0);

        StatsSnapshot {
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            segments_warmed: self.segments_warmed.load(Ordering::Relaxed),
            segments_failed: self.segments_failed.load(Ordering::Relaxed),
            batches_in_flight: self.batches_in_flight.load(Ordering::Relaxed),
            last_throughput,
        }
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn throughput(segments: u32, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        segments as f64 / secs
    } else {
        // Sub-resolution batch; report the raw count.
        segments as f64
    }
}
