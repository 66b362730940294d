use crate::config::{FetchConfig, NormalizeConfig};
use crate::normalizer::{NormalizeOutcome, Normalizer, SkipReason};
use crate::parser::FeedParser;
use crate::rss_utils::url::host_key;
use crate::state::SharedState;
use crate::traits::FeedTransport;
use crate::types::{AggregatorError, FeedItem, Result, SourceDescriptor};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, PRAGMA};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

const ACCEPT_FEEDS: &str = "application/rss+xml, application/xml, text/xml, application/atom+xml";

/// Caps requests in flight, both in total and per host.
pub struct ConnectionLimiter {
    global: Arc<Semaphore>,
    per_host_limit: usize,
    hosts: Mutex<HashMap<String, Arc<Semaphore>>>,
}

/// Both slots held by one request. Released on drop.
pub struct ConnectionPermit {
    _host: OwnedSemaphorePermit,
    _global: OwnedSemaphorePermit,
}

impl ConnectionLimiter {
    pub fn new(max_connections: usize, per_host_limit: usize) -> Self {
        Self {
            global: Arc::new(Semaphore::new(max_connections)),
            per_host_limit,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(config.max_connections, config.max_connections_per_host)
    }

    fn host_semaphore(&self, url: &str) -> Arc<Semaphore> {
        let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        hosts
            .entry(host_key(url))
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_host_limit)))
            .clone()
    }

    pub async fn acquire(&self, url: &str) -> Result<ConnectionPermit> {
        let closed = |_| AggregatorError::General("connection limiter closed".to_string());
        // Host slot first so a busy host never holds a global slot while it waits.
        let host = self.host_semaphore(url).acquire_owned().await.map_err(closed)?;
        let global = self.global.clone().acquire_owned().await.map_err(closed)?;
        Ok(ConnectionPermit {
            _host: host,
            _global: global,
        })
    }
}

/// Wraps any transport so every `get` runs under a [`ConnectionLimiter`].
pub struct LimitedTransport<T> {
    inner: T,
    limiter: ConnectionLimiter,
}

impl<T: FeedTransport> LimitedTransport<T> {
    pub fn new(inner: T, limiter: ConnectionLimiter) -> Self {
        Self { inner, limiter }
    }
}

#[async_trait]
impl<T: FeedTransport> FeedTransport for LimitedTransport<T> {
    async fn get(&self, url: &str) -> Result<String> {
        let _permit = self.limiter.acquire(url).await?;
        self.inner.get(url).await
    }
}

/// Plain reqwest transport. Non-2xx responses are errors.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_FEEDS));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .pool_max_idle_per_host(config.max_connections_per_host)
            .build()?;

        Ok(Self { client })
    }

    /// The transport used for real runs: reqwest under the configured caps.
    pub fn limited(config: &FetchConfig) -> Result<LimitedTransport<Self>> {
        Ok(LimitedTransport::new(
            Self::new(config)?,
            ConnectionLimiter::from_config(config),
        ))
    }
}

#[async_trait]
impl FeedTransport for HttpTransport {
    async fn get(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AggregatorError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        debug!("Fetched {} ({} bytes)", url, body.len());
        Ok(body)
    }
}

/// Fetches one source and turns its entries into items.
pub struct FetchWorker {
    transport: Arc<dyn FeedTransport>,
    parser: FeedParser,
    normalizer: Normalizer,
    state: Arc<SharedState>,
    max_items_per_source: usize,
}

impl FetchWorker {
    pub fn new(transport: Arc<dyn FeedTransport>, config: &NormalizeConfig, state: Arc<SharedState>) -> Self {
        Self {
            transport,
            parser: FeedParser::new(),
            normalizer: Normalizer::new(config.clone()),
            state,
            max_items_per_source: config.max_items_per_source,
        }
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// One attempt at a source. Transport and unreadable-body failures are
    /// returned; problems with single entries are logged and skipped.
    pub async fn fetch_source(&self, source: &SourceDescriptor) -> Result<Vec<FeedItem>> {
        let body = self.transport.get(&source.url).await?;
        let feed = self.parser.parse_feed(&body)?;
        for warning in &feed.warnings {
            warn!(source = %source.id, "Feed parse warning: {}", warning);
        }

        let now = Utc::now();
        let mut items = Vec::new();
        let (mut stale, mut duplicates, mut failed) = (0usize, 0usize, 0usize);

        for entry in feed.entries.iter().take(self.max_items_per_source) {
            match self.normalizer.normalize(entry, source, &self.state, now) {
                NormalizeOutcome::Accepted(item) => items.push(item),
                NormalizeOutcome::Skipped(SkipReason::Stale { .. }) => stale += 1,
                NormalizeOutcome::Skipped(reason @ SkipReason::Duplicate { .. }) => {
                    debug!(source = %source.id, "Skipping entry: {}", reason);
                    duplicates += 1;
                }
                NormalizeOutcome::Failed(reason) => {
                    warn!(source = %source.id, "Dropping entry: {}", reason);
                    failed += 1;
                }
            }
        }

        self.state.record_source_success(&source.id, now);
        info!(
            source = %source.id,
            "{}: {} new, {} duplicates, {} stale, {} dropped",
            source.name,
            items.len(),
            duplicates,
            stale,
            failed
        );
        Ok(items)
    }
}
