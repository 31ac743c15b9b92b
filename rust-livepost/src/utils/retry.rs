//! Capped exponential backoff with jitter.

use std::future::Future;
use std::time::Duration;

use rand::random;
use tokio::time::sleep;
use tracing::debug;

use crate::{Error, Result};

/// Backoff parameters for a retry loop.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    /// Retries after the first attempt.
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Backoff {
    pub const fn new(max_retries: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Small bounded policy for outbound HTTP calls.
    pub const fn http() -> Self {
        Self::new(3, Duration::from_millis(500), Duration::from_secs(8))
    }

    /// Delay before retry number `attempt` (zero-based), jitter included.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let shift = attempt.min(32) as u32;
        let capped_ms = base_ms.saturating_mul(1u64 << shift).min(max_ms);
        let jitter_ms = random::<u64>() % (capped_ms / 4 + 1);
        Duration::from_millis((capped_ms + jitter_ms).min(max_ms))
    }
}

/// Run `op` until it succeeds, `should_retry` rejects the error, or the
/// retry budget is spent.
pub async fn retry_with<T, F, Fut, P>(
    op_name: &'static str,
    backoff: Backoff,
    should_retry: P,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&Error) -> bool,
{
    let mut attempt = 0usize;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !should_retry(&err) || attempt >= backoff.max_retries {
                    return Err(err);
                }

                let delay = backoff.delay_for(attempt);
                debug!(
                    "{} failed ({}), retrying in {:?} (attempt {}/{})",
                    op_name,
                    err,
                    delay,
                    attempt + 1,
                    backoff.max_retries
                );

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Retry an outbound call on transient HTTP failures only.
pub async fn retry_transient<T, F, Fut>(op_name: &'static str, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_with(op_name, Backoff::http(), Error::is_transient, op).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_delay_is_capped() {
        let backoff = Backoff::new(12, Duration::from_millis(10), Duration::from_millis(2000));
        assert!(backoff.delay_for(0) >= Duration::from_millis(10));
        assert!(backoff.delay_for(20) <= Duration::from_millis(2000));
        assert!(backoff.delay_for(63) <= Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_budget_spent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let backoff = Backoff::new(2, Duration::from_millis(1), Duration::from_millis(5));

        let counter = calls.clone();
        let result: Result<()> = retry_with("test", backoff, |_| true, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::Other("boom".into()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result: Result<()> = retry_transient("test", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::validation("bad input"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let backoff = Backoff::new(5, Duration::from_millis(1), Duration::from_millis(5));
        let value = retry_with("test", backoff, |_| true, || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::Other("flaky".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
