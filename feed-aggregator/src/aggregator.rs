use crate::config::AggregatorConfig;
use crate::fetcher::{FetchWorker, HttpTransport};
use crate::registry::SourceRegistry;
use crate::retry::RetryController;
use crate::scheduler::BatchScheduler;
use crate::state::{RunState, RunStats, SharedState};
use crate::store::DailyStore;
use crate::traits::FeedTransport;
use crate::types::Result;
use chrono::Utc;
use std::future::{pending, Future};
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// What one invocation did. Counters are for this run only; the cumulative
/// totals live in the state file.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub sources: usize,
    pub items_collected: usize,
    pub items_written: usize,
    pub new_items: u64,
    pub duplicates: u64,
    pub errors: u64,
    pub sources_with_errors: usize,
    pub interrupted: bool,
}

pub struct FeedAggregator {
    config: AggregatorConfig,
    transport: Arc<dyn FeedTransport>,
}

impl FeedAggregator {
    /// Builds the connection-capped HTTP transport. Failing here is a setup
    /// failure.
    pub fn new(config: AggregatorConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::limited(&config.fetch)?);
        Ok(Self::with_transport(config, transport))
    }

    pub fn with_transport(config: AggregatorConfig, transport: Arc<dyn FeedTransport>) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub async fn run(&self) -> Result<RunSummary> {
        self.run_until(pending()).await
    }

    /// Runs once, stopping early if `shutdown` completes first. The run state
    /// is saved on both paths, but an interrupted run gives back the hashes
    /// it claimed since none of those items were stored.
    pub async fn run_until<S>(&self, shutdown: S) -> Result<RunSummary>
    where
        S: Future<Output = ()>,
    {
        let run_id = Uuid::new_v4();
        self.run_inner(run_id, shutdown)
            .instrument(info_span!("run", run_id = %run_id))
            .await
    }

    async fn run_inner<S>(&self, run_id: Uuid, shutdown: S) -> Result<RunSummary>
    where
        S: Future<Output = ()>,
    {
        info!("Starting feed aggregation");
        if self.config.dry_run {
            info!("Dry run: nothing will be written");
        }

        let state = Arc::new(SharedState::new(RunState::load_or_default(&self.config.state_path)));
        let baseline = state.snapshot();

        let registry = SourceRegistry::load(&self.config.sources_path)?;
        if registry.is_empty() {
            warn!("Source registry is empty");
        }

        let worker = FetchWorker::new(self.transport.clone(), &self.config.normalize, state.clone());
        let retry = RetryController::new(self.config.retry.clone());
        let scheduler = BatchScheduler::new(self.config.batch.clone());

        let mut summary = RunSummary {
            run_id,
            sources: registry.len(),
            ..Default::default()
        };

        let collected = tokio::select! {
            items = scheduler.run(registry.sources(), &worker, &retry) => Some(items),
            _ = shutdown => None,
        };

        match collected {
            Some(items) => {
                summary.items_collected = items.len();
                if self.config.dry_run {
                    for item in &items {
                        info!("Would store {} [{}] {}", item.date_key(), item.source_id, item.title);
                    }
                } else {
                    let store = DailyStore::new(&self.config.store);
                    let report = store.persist(&items);
                    summary.items_written = report.items_added;
                    if !report.dates_failed.is_empty() {
                        warn!("Could not update daily files for {:?}", report.dates_failed);
                    }
                }
                state.record_run_complete(items.len(), Utc::now());
            }
            None => {
                warn!("Aggregation interrupted by user, saving progress");
                state.release_claims_since(&baseline);
                summary.interrupted = true;
            }
        }

        self.save_state(&state);

        let current = state.snapshot();
        let delta = stats_delta(&baseline.stats, &current.stats);
        summary.new_items = delta.total_new;
        summary.duplicates = delta.total_duplicates;
        summary.errors = delta.total_errors;
        summary.sources_with_errors = current.source_errors.len();

        info!("Aggregation complete:");
        info!("  - New items: {}", summary.new_items);
        info!("  - Duplicates: {}", summary.duplicates);
        info!("  - Errors: {}", summary.errors);
        info!("  - Sources with errors: {}", summary.sources_with_errors);
        Ok(summary)
    }

    fn save_state(&self, state: &SharedState) {
        if self.config.dry_run {
            return;
        }
        match state.save(&self.config.state_path, self.config.hash_retention) {
            Ok(()) => info!("Saved run state to {}", self.config.state_path.display()),
            Err(e) => error!("Failed to save state: {}", e),
        }
    }
}

fn stats_delta(before: &RunStats, after: &RunStats) -> RunStats {
    RunStats {
        total_processed: after.total_processed.saturating_sub(before.total_processed),
        total_new: after.total_new.saturating_sub(before.total_new),
        total_duplicates: after.total_duplicates.saturating_sub(before.total_duplicates),
        total_errors: after.total_errors.saturating_sub(before.total_errors),
    }
}
