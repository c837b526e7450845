use crate::app::ports::{HttpClientPort, HttpGetResult};
use crate::error::{Result, ScraperError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

pub struct ReqwestHttp {
    client: reqwest::Client,
}

impl ReqwestHttp {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClientPort for ReqwestHttp {
    async fn get(&self, url: &str, timeout: Option<Duration>) -> Result<HttpGetResult> {
        debug!("HTTP GET request to: {}", url);
        let mut request = self.client.get(url);
        if let Some(limit) = timeout {
            request = request.timeout(limit);
        }
        let resp = request.send().await.map_err(|e| classify(url, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ScraperError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let final_url = resp.url().to_string();
        let bytes = resp.bytes().await.map_err(|e| classify(url, e))?.to_vec();
        debug!("HTTP response: status={}, size={} bytes", status.as_u16(), bytes.len());
        Ok(HttpGetResult {
            bytes,
            final_url,
        })
    }
}

fn classify(url: &str, err: reqwest::Error) -> ScraperError {
    if err.is_timeout() {
        ScraperError::Timeout { url: url.to_string() }
    } else {
        ScraperError::Http(err)
    }
}

/// Bounded retry with exponential backoff around another client.
pub struct RetryingHttp<H> {
    inner: H,
    max_retries: u32,
    base_delay: Duration,
}

impl<H: HttpClientPort> RetryingHttp<H> {
    pub fn new(inner: H, max_retries: u32, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
        }
    }
}

#[async_trait]
impl<H: HttpClientPort> HttpClientPort for RetryingHttp<H> {
    async fn get(&self, url: &str, timeout: Option<Duration>) -> Result<HttpGetResult> {
        let mut attempt: u32 = 0;
        loop {
            match self.inner.get(url, timeout).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.base_delay * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    warn!(
                        url,
                        attempt,
                        error = %e,
                        "Request failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures_left: AtomicU32,
        status: u16,
        calls: AtomicU32,
    }

    #[async_trait]
    impl HttpClientPort for Flaky {
        async fn get(&self, url: &str, _timeout: Option<Duration>) -> Result<HttpGetResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(ScraperError::Status { url: url.to_string(), status: self.status });
            }
            Ok(HttpGetResult {
                bytes: b"ok".to_vec(),
                final_url: url.to_string(),
            })
        }
    }

    fn flaky(failures: u32, status: u16) -> Flaky {
        Flaky {
            failures_left: AtomicU32::new(failures),
            status,
            calls: AtomicU32::new(0),
        }
    }

    #[tokio::test]
    async fn retries_server_errors_until_success() {
        let client = RetryingHttp::new(flaky(2, 503), 2, Duration::ZERO);
        let resp = client.get("https://x/1.html", None).await.unwrap();
        assert_eq!(resp.bytes, b"ok");
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let client = RetryingHttp::new(flaky(5, 503), 1, Duration::ZERO);
        let err = client.get("https://x/1.html", None).await.unwrap_err();
        assert!(matches!(err, ScraperError::Status { status: 503, .. }));
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let client = RetryingHttp::new(flaky(1, 404), 3, Duration::ZERO);
        assert!(client.get("https://x/1.html", None).await.is_err());
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 1);
    }
}
