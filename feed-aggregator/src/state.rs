use crate::dedup::DedupStore;
use crate::store::write_json_atomic;
use crate::types::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunStats {
    #[serde(alias = "totalProcessed")]
    pub total_processed: u64,
    #[serde(alias = "totalNew")]
    pub total_new: u64,
    #[serde(alias = "totalDuplicates")]
    pub total_duplicates: u64,
    #[serde(alias = "totalErrors")]
    pub total_errors: u64,
}

/// Persisted between runs. Keys match the aggregator's historical state file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunState {
    #[serde(alias = "lastRun")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(alias = "processedHashes")]
    pub processed_hashes: DedupStore,
    /// Consecutive failed runs per source id.
    #[serde(alias = "sourceErrors")]
    pub source_errors: BTreeMap<String, u32>,
    /// Last successful fetch per source id.
    #[serde(alias = "successfulRuns")]
    pub successful_runs: BTreeMap<String, DateTime<Utc>>,
    pub stats: RunStats,
}

impl RunState {
    /// Never fails: a missing or unreadable file yields a fresh state.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            info!("No state file at {}, starting fresh", path.display());
            return Self::default();
        }

        let loaded: Result<RunState> = std::fs::read_to_string(path)
            .map_err(Into::into)
            .and_then(|raw| serde_json::from_str(&raw).map_err(Into::into));

        match loaded {
            Ok(state) => {
                debug!(
                    "Loaded state: {} known hashes, {} sources with errors",
                    state.processed_hashes.len(),
                    state.source_errors.len()
                );
                state
            }
            Err(e) => {
                error!("Failed to load state from {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Bounds the hash list to the `hash_retention` most recent entries and
    /// writes the state.
    pub fn save(&mut self, path: &Path, hash_retention: usize) -> Result<()> {
        self.processed_hashes.truncate(hash_retention);
        write_json_atomic(path, &*self)
    }
}

/// The run state as mutated by concurrently running fetches. Each method
/// locks only for the duration of a synchronous update, so no update ever
/// spans a suspension point.
#[derive(Debug, Default)]
pub struct SharedState {
    inner: Mutex<RunState>,
}

impl SharedState {
    pub fn new(state: RunState) -> Self {
        Self {
            inner: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims a content hash for this run. Returns `false` (and counts a
    /// duplicate) when it was already seen, in this run or an earlier one.
    pub fn claim_hash(&self, hash: &str) -> bool {
        let mut state = self.lock();
        if state.processed_hashes.insert(hash) {
            state.stats.total_new += 1;
            true
        } else {
            state.stats.total_duplicates += 1;
            false
        }
    }

    pub fn record_source_success(&self, source_id: &str, at: DateTime<Utc>) {
        let mut state = self.lock();
        state.source_errors.remove(source_id);
        state.successful_runs.insert(source_id.to_string(), at);
    }

    pub fn record_source_failure(&self, source_id: &str) {
        let mut state = self.lock();
        *state.source_errors.entry(source_id.to_string()).or_insert(0) += 1;
        state.stats.total_errors += 1;
    }

    pub fn record_run_complete(&self, items_processed: usize, at: DateTime<Utc>) {
        let mut state = self.lock();
        state.last_run = Some(at);
        state.stats.total_processed += items_processed as u64;
    }

    /// Releases every hash claimed since `baseline` was taken, along with
    /// the new/duplicate counts. Used when claimed items are never stored.
    pub fn release_claims_since(&self, baseline: &RunState) {
        let mut state = self.lock();
        state.processed_hashes = baseline.processed_hashes.clone();
        state.stats.total_new = baseline.stats.total_new;
        state.stats.total_duplicates = baseline.stats.total_duplicates;
    }

    pub fn source_error_count(&self, source_id: &str) -> u32 {
        self.lock().source_errors.get(source_id).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> RunState {
        self.lock().clone()
    }

    pub fn save(&self, path: &Path, hash_retention: usize) -> Result<()> {
        let mut state = self.snapshot();
        state.save(path, hash_retention)
    }
}
