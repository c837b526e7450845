use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Clone, Debug, Default)]
pub struct Limits {
    /// Minimum gap between the end of one unit of work and the next grant.
    pub min_interval: Duration,
}

/// Shared politeness token: one grant per `min_interval`, across every clone.
///
/// The interval runs from the later of the previous grant and the previous
/// `complete`, so slow work never eats into the gap.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    limits: Limits,
    // last grant or completion, whichever came later
    last_grant: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(limits: Limits) -> Self {
        Self {
            inner: Arc::new(Inner {
                limits,
                last_grant: Mutex::new(None),
            }),
        }
    }

    pub fn with_interval(min_interval: Duration) -> Self {
        Self::new(Limits { min_interval })
    }

    // Wait until the interval since the previous grant has elapsed.
    pub async fn acquire(&self) {
        let interval = self.inner.limits.min_interval;
        // Hold the lock while sleeping so concurrent callers queue up behind us
        let mut last = self.inner.last_grant.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + interval;
            let now = Instant::now();
            if ready_at > now {
                tokio::time::sleep(ready_at - now).await;
            }
        }
        *last = Some(Instant::now());
    }

    pub async fn complete(&self) {
        *self.inner.last_grant.lock().await = Some(Instant::now());
    }
}
