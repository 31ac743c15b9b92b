//! Background scheduling: the periodic polling loop and one-shot prefetch
//! jobs ahead of scheduled broadcasts.

mod prefetch;
mod service;

pub use prefetch::{
    DEFAULT_PREFETCH_LEAD_MINUTES, DEFAULT_PREFETCH_WORKERS, PrefetchConfig, PrefetchHandler,
    PrefetchScheduler, SnapshotRefresher,
};
pub use service::{PollingService, TickReport};
