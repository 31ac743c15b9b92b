//! Channel Atom feed (`/feeds/videos.xml?channel_id=…`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use tracing::debug;

use crate::Result;
use crate::domain::Source;
use crate::ingest::{FeedEntry, FeedSource};
use crate::utils::http::{DEFAULT_REQUEST_TIMEOUT, build_client, fetch_text};
use crate::utils::xml::{XmlNode, walk};

const FEED_URL: &str = "https://www.youtube.com/feeds/videos.xml";

#[derive(Default)]
struct PartialEntry {
    video_id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    published: Option<String>,
    author: Option<String>,
    thumbnail: Option<String>,
}

impl PartialEntry {
    fn finish(self, feed_author: &str) -> Option<FeedEntry> {
        let video_id = self.video_id.filter(|id| !id.is_empty())?;
        let published_at = match self.published.as_deref().map(DateTime::parse_from_rfc3339) {
            Some(Ok(ts)) => ts.with_timezone(&Utc),
            _ => {
                debug!(video_id = %video_id, "Skipping feed entry without a valid publish date");
                return None;
            }
        };

        Some(FeedEntry {
            video_url: self.url.unwrap_or_else(|| super::watch_url(&video_id)),
            title: self.title.unwrap_or_default(),
            channel_name: self
                .author
                .unwrap_or_else(|| feed_author.to_string()),
            thumbnail_url: self.thumbnail,
            published_at,
            source: Source::Youtube,
            video_id,
        })
    }
}

/// Parse a channel feed document into entries, in document order.
pub fn parse_channel_feed(xml: &str) -> Result<Vec<FeedEntry>> {
    let mut feed_author = String::new();
    let mut current: Option<PartialEntry> = None;
    let mut finished: Vec<PartialEntry> = Vec::new();

    walk(xml, |node| match &node {
        XmlNode::Open { .. } if node.at(&["feed", "entry"]) => {
            current = Some(PartialEntry::default());
        }
        XmlNode::Open { .. } => {
            let Some(entry) = current.as_mut() else {
                return;
            };
            if node.at(&["entry", "link"])
                && node.attr("rel").is_none_or(|rel| rel == "alternate")
            {
                entry.url = node.attr("href").map(str::to_string);
            } else if node.at(&["media:group", "media:thumbnail"]) {
                entry.thumbnail = node.attr("url").map(str::to_string);
            }
        }
        XmlNode::Close { .. } if node.at(&["feed", "entry"]) => {
            if let Some(entry) = current.take() {
                finished.push(entry);
            }
        }
        XmlNode::Close { text, .. } => {
            let text = (*text).to_string();
            match current.as_mut() {
                Some(entry) => {
                    if node.at(&["entry", "yt:videoId"]) {
                        entry.video_id = Some(text);
                    } else if node.at(&["entry", "title"]) {
                        entry.title = Some(text);
                    } else if node.at(&["entry", "published"]) {
                        entry.published = Some(text);
                    } else if node.at(&["entry", "author", "name"]) {
                        entry.author = Some(text);
                    }
                }
                None if node.at(&["feed", "author", "name"]) => feed_author = text,
                None if node.at(&["feed", "title"]) && feed_author.is_empty() => {
                    feed_author = text
                }
                None => {}
            }
        }
    })?;

    Ok(finished
        .into_iter()
        .filter_map(|e| e.finish(&feed_author))
        .collect())
}

/// One YouTube channel's upload feed.
pub struct YoutubeChannelFeed {
    client: Client,
    channel_id: String,
}

impl YoutubeChannelFeed {
    pub fn new(channel_id: impl Into<String>) -> Result<Self> {
        Ok(Self::with_client(
            build_client(DEFAULT_REQUEST_TIMEOUT)?,
            channel_id,
        ))
    }

    pub fn with_client(client: Client, channel_id: impl Into<String>) -> Self {
        Self {
            client,
            channel_id: channel_id.into(),
        }
    }

    pub fn url(&self) -> String {
        format!("{FEED_URL}?channel_id={}", self.channel_id)
    }
}

#[async_trait]
impl FeedSource for YoutubeChannelFeed {
    fn name(&self) -> String {
        format!("youtube:{}", self.channel_id)
    }

    async fn fetch_entries(&self) -> Result<Vec<FeedEntry>> {
        let body = fetch_text(&self.client, &self.url(), "youtube_rss").await?;
        parse_channel_feed(&body)
    }
}
