//! Token bucket for outbound API calls.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Burst capacity.
    pub max_tokens: u32,
    /// Tokens added per second.
    pub refill_rate: f64,
}

impl RateLimiterConfig {
    /// Sustained `rps` with a burst of twice that (at least one token).
    pub fn with_rps(rps: f64) -> Result<Self> {
        if !rps.is_finite() || rps <= 0.0 {
            return Err(Error::config(format!(
                "rate limit must be a positive finite number, got {rps}"
            )));
        }

        Ok(Self {
            max_tokens: (rps * 2.0).ceil().max(1.0) as u32,
            refill_rate: rps,
        })
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Shared token bucket; callers wait in `acquire` until a token is free.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            bucket: Mutex::new(Bucket {
                tokens: config.max_tokens as f64,
                last_refill: Instant::now(),
            }),
            config,
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens =
            (bucket.tokens + elapsed * self.config.refill_rate).min(self.config.max_tokens as f64);
        bucket.last_refill = now;
    }

    /// Take one token, sleeping until one is available. Returns the time waited.
    pub async fn acquire(&self) -> Duration {
        let mut waited = Duration::ZERO;
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                self.refill(&mut bucket);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return waited;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.config.refill_rate)
            };

            debug!("Rate limited, waiting {:?}", wait);
            tokio::time::sleep(wait).await;
            waited += wait;
        }
    }
}
