//! User upload RSS 2.0 feed (`/user/{id}/video?rss=2.0`).

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Client;
use tracing::debug;

use crate::Result;
use crate::domain::Source;
use crate::ingest::{FeedEntry, FeedSource};
use crate::utils::http::{DEFAULT_REQUEST_TIMEOUT, build_client, fetch_text};
use crate::utils::xml::{XmlNode, walk};

static VIDEO_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/watch/((?:sm|so|nm)\d+)").unwrap());

static THUMBNAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<img[^>]*\bsrc="([^"]+)""#).unwrap());

/// Suffix Niconico appends to the channel title of user feeds.
const TITLE_SUFFIX: &str = "さんの投稿動画‐ニコニコ動画";

#[derive(Default)]
struct PartialItem {
    title: Option<String>,
    link: Option<String>,
    pub_date: Option<String>,
    description: Option<String>,
}

impl PartialItem {
    fn finish(self, channel_name: &str) -> Option<FeedEntry> {
        let link = self.link?;
        let video_id = VIDEO_ID_REGEX.captures(&link)?.get(1)?.as_str().to_string();
        let published_at = match self.pub_date.as_deref().map(DateTime::parse_from_rfc2822) {
            Some(Ok(ts)) => ts.with_timezone(&Utc),
            _ => {
                debug!(video_id = %video_id, "Skipping RSS item without a valid pubDate");
                return None;
            }
        };
        let thumbnail_url = self
            .description
            .as_deref()
            .and_then(|d| THUMBNAIL_REGEX.captures(d))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());

        Some(FeedEntry {
            video_url: format!("https://www.nicovideo.jp/watch/{video_id}"),
            title: self.title.unwrap_or_default(),
            channel_name: channel_name.to_string(),
            source: Source::Niconico,
            published_at,
            thumbnail_url,
            video_id,
        })
    }
}

/// Parse a user feed. Items whose link carries no video id are skipped.
pub fn parse_user_feed(xml: &str) -> Result<Vec<FeedEntry>> {
    let mut creator: Option<String> = None;
    let mut channel_title: Option<String> = None;
    let mut current: Option<PartialItem> = None;
    let mut finished: Vec<PartialItem> = Vec::new();

    walk(xml, |node| match &node {
        XmlNode::Open { .. } => {
            if node.at(&["channel", "item"]) {
                current = Some(PartialItem::default());
            }
        }
        XmlNode::Close { .. } if node.at(&["channel", "item"]) => {
            if let Some(item) = current.take() {
                finished.push(item);
            }
        }
        XmlNode::Close { text, .. } => {
            let text = (*text).to_string();
            match current.as_mut() {
                Some(item) => {
                    if node.at(&["item", "title"]) {
                        item.title = Some(text);
                    } else if node.at(&["item", "link"]) {
                        item.link = Some(text);
                    } else if node.at(&["item", "pubDate"]) {
                        item.pub_date = Some(text);
                    } else if node.at(&["item", "description"]) {
                        item.description = Some(text);
                    }
                }
                None if node.at(&["channel", "dc:creator"]) => creator = Some(text),
                None if node.at(&["rss", "channel", "title"]) => channel_title = Some(text),
                None => {}
            }
        }
    })?;

    let channel_name = creator
        .filter(|c| !c.is_empty())
        .or_else(|| {
            channel_title.map(|t| {
                t.strip_suffix(TITLE_SUFFIX)
                    .map(str::to_string)
                    .unwrap_or(t)
            })
        })
        .unwrap_or_default();

    Ok(finished
        .into_iter()
        .filter_map(|item| item.finish(&channel_name))
        .collect())
}

/// One Niconico user's upload feed.
pub struct NiconicoUserFeed {
    client: Client,
    user_id: String,
}

impl NiconicoUserFeed {
    pub fn new(user_id: impl Into<String>) -> Result<Self> {
        Ok(Self::with_client(
            build_client(DEFAULT_REQUEST_TIMEOUT)?,
            user_id,
        ))
    }

    pub fn with_client(client: Client, user_id: impl Into<String>) -> Self {
        Self {
            client,
            user_id: user_id.into(),
        }
    }

    pub fn url(&self) -> String {
        format!("https://www.nicovideo.jp/user/{}/video?rss=2.0", self.user_id)
    }
}

#[async_trait]
impl FeedSource for NiconicoUserFeed {
    fn name(&self) -> String {
        format!("niconico:{}", self.user_id)
    }

    async fn fetch_entries(&self) -> Result<Vec<FeedEntry>> {
        let body = fetch_text(&self.client, &self.url(), "niconico_rss").await?;
        parse_user_feed(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>テストユーザーさんの投稿動画‐ニコニコ動画</title>
    <link>https://www.nicovideo.jp/user/12345/video</link>
    <description>テストユーザーさんの投稿動画</description>
    <language>ja-jp</language>
    <item>
      <title>新作動画</title>
      <link>https://www.nicovideo.jp/watch/sm44000001?ref=rss_myvideo_rss2</link>
      <guid isPermaLink="false">tag:nicovideo.jp,2025-02-01:/watch/sm44000001</guid>
      <pubDate>Sat, 01 Feb 2025 21:00:00 +0900</pubDate>
      <description><![CDATA[<p class="nico-thumbnail"><img alt="新作動画" src="https://nicovideo.cdn.nimg.jp/thumbnails/44000001/44000001" width="94" height="70" border="0"/></p>]]></description>
    </item>
    <item>
      <title>No id</title>
      <link>https://www.nicovideo.jp/user/12345</link>
      <pubDate>Sat, 01 Feb 2025 20:00:00 +0900</pubDate>
    </item>
    <item>
      <title>Bad date</title>
      <link>https://www.nicovideo.jp/watch/sm44000002</link>
      <pubDate>someday</pubDate>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_user_feed() {
        let entries = parse_user_feed(FEED).unwrap();
        assert_eq!(entries.len(), 1);

        let e = &entries[0];
        assert_eq!(e.video_id, "sm44000001");
        assert_eq!(e.source, Source::Niconico);
        assert_eq!(e.title, "新作動画");
        assert_eq!(e.channel_name, "テストユーザー");
        assert_eq!(e.video_url, "https://www.nicovideo.jp/watch/sm44000001");
        assert_eq!(e.published_at.to_rfc3339(), "2025-02-01T12:00:00+00:00");
        assert_eq!(
            e.thumbnail_url.as_deref(),
            Some("https://nicovideo.cdn.nimg.jp/thumbnails/44000001/44000001")
        );
    }

    #[test]
    fn test_creator_overrides_channel_title() {
        let xml = r#"<rss xmlns:dc="http://purl.org/dc/elements/1.1/"><channel>
            <title>Something else</title>
            <dc:creator>Creator Name</dc:creator>
            <item>
              <title>t</title>
              <link>https://www.nicovideo.jp/watch/so123</link>
              <pubDate>Mon, 03 Feb 2025 10:00:00 +0000</pubDate>
            </item>
        </channel></rss>"#;
        let entries = parse_user_feed(xml).unwrap();
        assert_eq!(entries[0].channel_name, "Creator Name");
        assert_eq!(entries[0].video_id, "so123");
    }

    #[test]
    fn test_feed_url() {
        let feed = NiconicoUserFeed::new("12345").unwrap();
        assert_eq!(feed.url(), "https://www.nicovideo.jp/user/12345/video?rss=2.0");
        assert_eq!(feed.name(), "niconico:12345");
    }
}
