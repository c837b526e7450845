use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

// Ingest-side ports
#[async_trait]
pub trait HttpClientPort: Send + Sync {
    /// GET `url`. `timeout` of `None` waits indefinitely.
    async fn get(&self, url: &str, timeout: Option<Duration>) -> Result<HttpGetResult>;
}

#[derive(Clone, Debug)]
pub struct HttpGetResult {
    pub bytes: Vec<u8>,
    /// URL after redirects; relative links on the page resolve against it.
    pub final_url: String,
}

#[async_trait]
pub trait RateLimiterPort: Send + Sync {
    async fn acquire(&self);

    /// Marks the end of the work a grant covered; the next interval starts here.
    async fn complete(&self) {}
}
