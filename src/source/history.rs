// Local watch history: per-episode last checkpoint, last write wins.

use std::collections::HashMap;

use anyhow::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::traits::{EpisodeKey, ProgressTracker};
use crate::config::DEFAULT_COMPLETION_PERCENT;
use crate::engine::checkpoint::WatchCheckpoint;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HistoryEntry {
    key: EpisodeKey,
    checkpoint: WatchCheckpoint,
}

pub struct WatchHistory {
    entries: RwLock<HashMap<EpisodeKey, WatchCheckpoint>>,
    completion_percent: f64,
}

impl WatchHistory {
    pub fn new() -> Self {
        Self::with_completion_percent(DEFAULT_COMPLETION_PERCENT)
    }

    pub fn with_completion_percent(completion_percent: f64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            completion_percent,
        }
    }

    pub fn get(&self, key: EpisodeKey) -> Option<WatchCheckpoint> {
        self.entries.read().get(&key).cloned()
    }

    pub fn upsert(&self, key: EpisodeKey, checkpoint: WatchCheckpoint) {
        self.entries.write().insert(key, checkpoint);
    }

    /// Returns `true` if an entry was removed.
    pub fn clear(&self, key: EpisodeKey) -> bool {
        self.entries.write().remove(&key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Unfinished episodes, most recently watched first.
    pub fn continue_watching(&self, limit: usize) -> Vec<(EpisodeKey, WatchCheckpoint)> {
        let mut items: Vec<_> = self
            .entries
            .read()
            .iter()
            .filter(|(_, cp)| cp.is_valid() && !cp.is_completed(self.completion_percent))
            .map(|(k, cp)| (*k, cp.clone()))
            .collect();
        items.sort_by(|a, b| b.1.saved_at.cmp(&a.1.saved_at));
        items.truncate(limit);
        items
    }

    pub fn export_json(&self) -> Result<String> {
        let entries: Vec<HistoryEntry> = self
            .entries
            .read()
            .iter()
            .map(|(key, checkpoint)| HistoryEntry {
                key: *key,
                checkpoint: checkpoint.clone(),
            })
            .collect();
        Ok(serde_json::to_string(&entries)?)
    }

    /// Restore from [`export_json`](Self::export_json) output. Corrupt entries are dropped.
    pub fn import_json(raw: &str) -> Result<Self> {
        let entries: Vec<HistoryEntry> = serde_json::from_str(raw)?;
        let history = Self::new();
        {
            let mut map = history.entries.write();
            for entry in entries {
                if !entry.checkpoint.is_valid() {
                    warn!("dropping corrupt history entry for {:?}", entry.key);
                    continue;
                }
                map.insert(entry.key, entry.checkpoint);
            }
        }
        debug!("watch history restored with {} entries", history.len());
        Ok(history)
    }
}

impl Default for WatchHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker for WatchHistory {
    fn record_progress(&self, key: EpisodeKey, checkpoint: WatchCheckpoint) {
        self.upsert(key, checkpoint);
    }
}
