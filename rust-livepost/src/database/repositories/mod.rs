//! Repositories over the SQLite schema.

pub mod video;

pub use video::{ClassificationUpdate, SqlxVideoRepository, VideoRepository};
