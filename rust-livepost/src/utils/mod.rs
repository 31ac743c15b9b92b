//! Shared utilities.

pub mod clock;
pub mod fs;
pub mod http;
pub mod rate_limiter;
pub mod retry;
pub mod xml;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock, system_clock};
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use retry::{Backoff, retry_transient, retry_with};
