use crate::config::RetryConfig;
use crate::fetcher::FetchWorker;
use crate::types::{FeedItem, Result, SourceDescriptor};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// About to make this (1-based) attempt.
    Pending(u32),
    Success,
    Exhausted,
}

impl RetryState {
    fn after_failure(attempt: u32, max_attempts: u32) -> Self {
        if attempt < max_attempts {
            RetryState::Pending(attempt + 1)
        } else {
            RetryState::Exhausted
        }
    }
}

/// Bounded retries around a fetch. The delay before attempt `n` is
/// `base * factor^(n-2)`.
pub struct RetryController {
    config: RetryConfig,
}

impl RetryController {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    fn delays(&self) -> ExponentialBackoff<backoff::SystemClock> {
        let base = self.config.base_delay();
        ExponentialBackoff {
            current_interval: base,
            initial_interval: base,
            randomization_factor: 0.0,
            multiplier: self.config.backoff_factor,
            max_interval: Duration::from_secs(3_600),
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// Runs `op` until it succeeds or attempts run out. `None` means exhausted.
    pub async fn retry<T, F, Fut>(&self, label: &str, mut op: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delays = self.delays();
        let mut state = RetryState::Pending(1);
        let mut value = None;

        while let RetryState::Pending(attempt) = state {
            match op().await {
                Ok(v) => {
                    value = Some(v);
                    state = RetryState::Success;
                }
                Err(e) => {
                    state = RetryState::after_failure(attempt, self.config.max_attempts);
                    if state == RetryState::Exhausted {
                        error!(source = label, attempt, "Giving up after {} attempts: {}", attempt, e);
                    } else {
                        let delay = delays.next_backoff().unwrap_or_else(|| self.config.base_delay());
                        warn!(source = label, attempt, "Attempt failed, retrying in {:?}: {}", delay, e);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        value
    }

    /// Fetches `source` with retries. Exhaustion counts one error against
    /// the source and yields no items.
    pub async fn run(&self, worker: &FetchWorker, source: &SourceDescriptor) -> Vec<FeedItem> {
        match self.retry(&source.id, || worker.fetch_source(source)).await {
            Some(items) => items,
            None => {
                worker.state().record_source_failure(&source.id);
                Vec::new()
            }
        }
    }
}
