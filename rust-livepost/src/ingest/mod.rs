//! Feed ingestion and duplicate resolution.

mod dedup;
mod feed;

pub use dedup::{DuplicateResolver, ResolveReport};
pub use feed::{FeedEntry, FeedSource, IngestReport, Ingestor};
