//! Niconico collaborators. Niconico has no public detail API, so only the
//! per-user upload RSS is consumed and every item is ingested as a video.

mod rss;

pub use rss::{NiconicoUserFeed, parse_user_feed};
