use crate::types::Result;
use async_trait::async_trait;

/// Transport that retrieves a feed document by URL.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// GET the document body. Non-2xx responses, timeouts and connection
    /// errors are all errors; retrying is the caller's business.
    async fn get(&self, url: &str) -> Result<String>;
}
