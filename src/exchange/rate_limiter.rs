//! Client-side rate limiter for exchange REST requests
//!
//! Implements GCRA (Generic Cell Rate Algorithm) via governor crate.
//! One limiter per gateway; excess requests queue until the queue timeout.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorRateLimiter,
};
use std::num::NonZeroU32;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::FetchError;

/// Poll interval while waiting for a permit
const PERMIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Client-side rate limiter for one exchange
///
/// Queues excess requests for up to `queue_timeout`, then rejects with
/// `FetchError::RateLimited` so the target is retried next cycle.
pub struct RateLimiter {
    exchange: &'static str,
    limiter: GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    queue_timeout: Duration,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("exchange", &self.exchange)
            .field("queue_timeout", &self.queue_timeout)
            .finish()
    }
}

impl RateLimiter {
    /// A zero quota is treated as one request per minute.
    pub fn new(exchange: &'static str, requests_per_minute: u32, queue_timeout: Duration) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);

        Self {
            exchange,
            limiter: GovernorRateLimiter::direct(Quota::per_minute(per_minute)),
            queue_timeout,
        }
    }

    /// Wait for rate limit permission (async, with timeout)
    pub async fn wait(&self) -> Result<(), FetchError> {
        if self.limiter.check().is_ok() {
            return Ok(());
        }

        debug!(exchange = self.exchange, "Rate limit reached, queueing request");

        let waited = timeout(self.queue_timeout, async {
            loop {
                if self.limiter.check().is_ok() {
                    return;
                }
                tokio::time::sleep(PERMIT_POLL_INTERVAL).await;
            }
        })
        .await;

        match waited {
            Ok(()) => Ok(()),
            Err(_) => {
                warn!(
                    exchange = self.exchange,
                    timeout_ms = self.queue_timeout.as_millis() as u64,
                    "Rate limit queue timeout exceeded"
                );
                Err(FetchError::RateLimited(format!(
                    "client-side {} quota exhausted",
                    self.exchange
                )))
            }
        }
    }
}
