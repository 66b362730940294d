use crate::config::BatchConfig;
use crate::fetcher::FetchWorker;
use crate::retry::RetryController;
use crate::types::{FeedItem, SourceDescriptor};
use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{error, info};

/// Runs sources in fixed-size batches. Fetches inside a batch are
/// concurrent; a batch finishes completely before the next one starts.
pub struct BatchScheduler {
    config: BatchConfig,
}

impl BatchScheduler {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    pub async fn run(
        &self,
        sources: &[SourceDescriptor],
        worker: &FetchWorker,
        retry: &RetryController,
    ) -> Vec<FeedItem> {
        self.run_with(sources, |source| retry.run(worker, source)).await
    }

    /// Drives `fetch` over every source and returns all items, newest first.
    /// A panicking fetch is logged and contributes nothing.
    pub async fn run_with<'a, F, Fut>(&self, sources: &'a [SourceDescriptor], fetch: F) -> Vec<FeedItem>
    where
        F: Fn(&'a SourceDescriptor) -> Fut,
        Fut: Future<Output = Vec<FeedItem>>,
    {
        let batch_size = self.config.batch_size.max(1);
        let batch_count = sources.len().div_ceil(batch_size);
        let mut collected = Vec::new();

        for (index, batch) in sources.chunks(batch_size).enumerate() {
            info!("Processing batch {}/{} ({} sources)", index + 1, batch_count, batch.len());

            let tasks = batch
                .iter()
                .map(|source| AssertUnwindSafe(fetch(source)).catch_unwind().map(move |r| (source, r)));

            for (source, result) in join_all(tasks).await {
                match result {
                    Ok(items) => collected.extend(items),
                    Err(payload) => error!(
                        source = %source.id,
                        "Unexpected failure while fetching {}: {}",
                        source.name,
                        panic_message(payload.as_ref())
                    ),
                }
            }

            if index + 1 < batch_count {
                tokio::time::sleep(self.config.pacing_delay()).await;
            }
        }

        collected.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        collected
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Priority;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Mutex;

    fn source(id: &str) -> SourceDescriptor {
        SourceDescriptor {
            id: id.to_string(),
            name: id.to_string(),
            url: format!("https://{id}.example/rss"),
            category: "markets".to_string(),
            priority: None,
        }
    }

    fn item_for(source: &SourceDescriptor, hours: i64) -> FeedItem {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap() + Duration::hours(hours);
        FeedItem {
            id: format!("{}-{hours}", source.id),
            source_id: source.id.clone(),
            source_name: source.name.clone(),
            title: source.id.clone(),
            url: source.url.clone(),
            summary: String::new(),
            full_content: None,
            published_at: at,
            fetched_at: at,
            category: source.category.clone(),
            tags: Vec::new(),
            priority: Priority::Normal,
            content_hash: format!("{}{hours}", source.id),
        }
    }

    fn scheduler(batch_size: usize) -> BatchScheduler {
        BatchScheduler::new(BatchConfig {
            batch_size,
            delay_between_batches_ms: 1,
        })
    }

    #[tokio::test]
    async fn batches_complete_in_order() {
        let sources: Vec<_> = ["a", "b", "c", "d", "e"].iter().map(|id| source(id)).collect();
        let log = Mutex::new(Vec::new());

        scheduler(2)
            .run_with(&sources, |s| {
                let log = &log;
                async move {
                    log.lock().unwrap().push(format!("start {}", s.id));
                    tokio::task::yield_now().await;
                    log.lock().unwrap().push(format!("end {}", s.id));
                    Vec::new()
                }
            })
            .await;

        let log = log.into_inner().unwrap();
        let position = |entry: &str| log.iter().position(|e| e == entry).unwrap();
        assert!(position("end a") < position("start c"));
        assert!(position("end b") < position("start c"));
        assert!(position("end d") < position("start e"));
        assert_eq!(log.len(), 10);
    }

    #[tokio::test]
    async fn panicking_source_does_not_stop_others() {
        let sources = vec![source("ok"), source("boom"), source("late")];

        let items = scheduler(2)
            .run_with(&sources, |s| async move {
                if s.id == "boom" {
                    panic!("parser exploded");
                }
                vec![item_for(s, if s.id == "ok" { 1 } else { 5 })]
            })
            .await;

        let ids: Vec<_> = items.iter().map(|i| i.source_id.as_str()).collect();
        assert_eq!(ids, vec!["late", "ok"]);
    }

    #[tokio::test]
    async fn results_sorted_newest_first() {
        let sources = vec![source("a"), source("b")];

        let items = scheduler(8)
            .run_with(&sources, |s| async move { vec![item_for(s, 2), item_for(s, 9), item_for(s, 4)] })
            .await;

        let hours: Vec<i64> = items.iter().map(|i| (i.published_at.timestamp() / 3600) % 24).collect();
        assert_eq!(hours, vec![9, 9, 4, 4, 2, 2]);
        // Ties keep input order.
        assert_eq!(items[0].source_id, "a");
        assert_eq!(items[1].source_id, "b");
    }
}
