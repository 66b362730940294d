use crate::types::{AggregatorError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    /// Total in-flight requests across all hosts.
    pub max_connections: usize,
    pub max_connections_per_host: usize,
    /// Feeds are public news text; certificate problems are tolerated.
    pub accept_invalid_certs: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (compatible; FinanceAggregator/2.0)".to_string(),
            timeout_seconds: 45,
            max_connections: 20,
            max_connections_per_host: 3,
            accept_invalid_certs: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_factor: f64,
    /// Delay before the second attempt; later delays grow by `backoff_factor`.
    pub base_delay_ms: u64,
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_factor: 2.0,
            base_delay_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub delay_between_batches_ms: u64,
}

impl BatchConfig {
    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.delay_between_batches_ms)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            delay_between_batches_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    pub max_age_days: i64,
    pub max_items_per_source: usize,
    pub summary_max_chars: usize,
    /// Summary length when it has to be derived from the full content.
    pub summary_fallback_chars: usize,
    pub full_content_max_chars: usize,
    pub hash_summary_prefix_chars: usize,
    pub max_tags: usize,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            max_age_days: 30,
            max_items_per_source: 50,
            summary_max_chars: 1_000,
            summary_fallback_chars: 500,
            full_content_max_chars: 5_000,
            hash_summary_prefix_chars: 500,
            max_tags: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub output_dir: PathBuf,
    pub max_items_per_day: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("src/content/links"),
            max_items_per_day: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Appended to on every run. `None` logs to stdout only.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some(PathBuf::from("aggregation.log")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub sources_path: PathBuf,
    pub state_path: PathBuf,
    /// Number of content hashes kept in the run state between runs.
    pub hash_retention: usize,
    pub fetch: FetchConfig,
    pub retry: RetryConfig,
    pub batch: BatchConfig,
    pub normalize: NormalizeConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
    pub dry_run: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            sources_path: PathBuf::from("config/sources.json"),
            state_path: PathBuf::from("scripts/aggregator_state.json"),
            hash_retention: 5_000,
            fetch: FetchConfig::default(),
            retry: RetryConfig::default(),
            batch: BatchConfig::default(),
            normalize: NormalizeConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
            dry_run: false,
        }
    }
}

/// Upper bound for `max_age_days`, roughly a century.
pub const MAX_AGE_DAYS_LIMIT: i64 = 36_500;

impl AggregatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a (possibly partial) JSON config file over the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch.batch_size == 0 {
            return Err(AggregatorError::Config("batch_size must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(AggregatorError::Config("max_attempts must be at least 1".into()));
        }
        if self.fetch.max_connections == 0 || self.fetch.max_connections_per_host == 0 {
            return Err(AggregatorError::Config("connection limits must be at least 1".into()));
        }
        if self.retry.backoff_factor < 1.0 {
            return Err(AggregatorError::Config("backoff_factor must be >= 1".into()));
        }
        if !(1..=MAX_AGE_DAYS_LIMIT).contains(&self.normalize.max_age_days) {
            return Err(AggregatorError::Config(format!(
                "max_age_days must be between 1 and {MAX_AGE_DAYS_LIMIT}, got {}",
                self.normalize.max_age_days
            )));
        }
        Ok(())
    }
}
