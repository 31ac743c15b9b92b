//! YouTube collaborators: channel Atom feeds and the Data API v3 detail fetcher.

mod api;
mod models;
mod rss;

pub use api::{DataApiClient, DataApiConfig, MAX_IDS_PER_REQUEST};
pub use rss::{YoutubeChannelFeed, parse_channel_feed};

/// Canonical watch URL for a video id.
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}
