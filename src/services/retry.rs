//! Bounded retry for store reads
//!
//! Reads that fail with a retryable store error are attempted again after a
//! fixed delay, up to `max_attempts` attempts in total. Anything else fails
//! immediately.

use backoff::backoff::Backoff;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    fn schedule(&self) -> FixedSchedule {
        FixedSchedule {
            retries: self.max_attempts - 1,
            remaining: self.max_attempts - 1,
            delay: self.delay,
        }
    }
}

/// `Backoff` yielding the same delay until the retry budget is spent.
#[derive(Debug, Clone)]
struct FixedSchedule {
    retries: u32,
    remaining: u32,
    delay: Duration,
}

impl Backoff for FixedSchedule {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.delay)
    }

    fn reset(&mut self) {
        self.remaining = self.retries;
    }
}

/// Run a store read under `policy`.
pub async fn retry_read<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut read: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    backoff::future::retry_notify(
        policy.schedule(),
        || {
            let attempt = read();
            async move {
                attempt.await.map_err(|e| {
                    if e.is_retryable() {
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        },
        |e: StoreError, after: Duration| {
            warn!(
                operation,
                error = %e,
                retry_in_ms = after.as_millis() as u64,
                "Store read failed, retrying"
            );
        },
    )
    .await
}
