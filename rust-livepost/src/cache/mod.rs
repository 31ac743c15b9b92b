//! File-backed caches owned by the composing process.
//!
//! Both caches are plain objects constructed once at startup and shared by
//! reference; nothing here is global.

pub mod dedup;
pub mod live;

pub use dedup::DedupDenylist;
pub use live::{CacheStatus, CacheTtl, LiveCache, LiveCacheEntry};
