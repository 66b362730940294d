pub mod aggregator;
pub mod classify;
pub mod config;
pub mod dedup;
pub mod fetcher;
pub mod logging;
pub mod normalizer;
pub mod parser;
pub mod registry;
pub mod retry;
pub mod rss_utils;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod traits;
pub mod types;

pub use aggregator::{FeedAggregator, RunSummary};
pub use config::AggregatorConfig;
pub use dedup::DedupStore;
pub use fetcher::{ConnectionLimiter, FetchWorker, HttpTransport, LimitedTransport};
pub use logging::init_logging;
pub use normalizer::{content_hash, NormalizeOutcome, Normalizer, SkipReason};
pub use parser::FeedParser;
pub use registry::SourceRegistry;
pub use retry::{RetryController, RetryState};
pub use scheduler::BatchScheduler;
pub use state::{RunState, RunStats, SharedState};
pub use store::{DailyStore, PersistReport};
pub use traits::FeedTransport;
pub use types::*;
