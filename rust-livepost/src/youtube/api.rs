//! `videos.list` detail fetcher.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::models::{ApiErrorResponse, VideoItem, VideoListResponse};
use crate::classifier::{BroadcastFlag, DetailPayload, LiveTiming, UploadStatus};
use crate::monitor::DetailFetcher;
use crate::utils::http::{DEFAULT_REQUEST_TIMEOUT, build_client};
use crate::utils::{Backoff, RateLimiter, RateLimiterConfig, retry_with};
use crate::{Error, Result};

/// The API rejects `id` lists longer than this.
pub const MAX_IDS_PER_REQUEST: usize = 50;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";
const PARTS: &str = "snippet,status,liveStreamingDetails";
const THUMBNAIL_PREFERENCE: [&str; 5] = ["maxres", "standard", "high", "medium", "default"];

#[derive(Debug, Clone)]
pub struct DataApiConfig {
    pub api_key: String,
    pub base_url: String,
    pub requests_per_second: f64,
    /// Retry policy per `videos.list` request.
    pub retry: Backoff,
}

impl DataApiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            requests_per_second: 2.0,
            retry: Backoff::http(),
        }
    }
}

pub struct DataApiClient {
    client: Client,
    config: DataApiConfig,
    limiter: RateLimiter,
}

impl DataApiClient {
    pub fn new(config: DataApiConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(Error::config("YouTube API key is empty"));
        }
        let limiter = RateLimiter::new(RateLimiterConfig::with_rps(config.requests_per_second)?);
        Ok(Self {
            client: build_client(DEFAULT_REQUEST_TIMEOUT)?,
            config,
            limiter,
        })
    }

    fn videos_url(&self) -> String {
        format!("{}/videos", self.config.base_url.trim_end_matches('/'))
    }

    async fn fetch_chunk(&self, ids: &[String]) -> Result<Vec<DetailPayload>> {
        let joined = ids.join(",");
        let url = self.videos_url();

        let body = retry_with("youtube_videos_list", self.config.retry, Error::is_transient, || async {
            self.limiter.acquire().await;
            let response = self
                .client
                .get(&url)
                .query(&[
                    ("part", PARTS),
                    ("id", joined.as_str()),
                    ("key", self.config.api_key.as_str()),
                ])
                .send()
                .await?;
            let status = response.status();
            let text = response.text().await?;
            if !status.is_success() {
                let message = serde_json::from_str::<ApiErrorResponse>(&text)
                    .map(|e| format!("{} ({})", e.error.message, e.error.code))
                    .unwrap_or(text);
                return Err(Error::http_status("youtube", status.as_u16(), message));
            }
            Ok(text)
        })
        .await?;

        parse_video_list(&body)
    }
}

#[async_trait]
impl DetailFetcher for DataApiClient {
    /// Chunks are fetched one after another. A chunk that still fails after
    /// its retries is logged and skipped; the call errors only when no chunk
    /// succeeded.
    async fn fetch_details(&self, video_ids: &[String]) -> Result<Vec<DetailPayload>> {
        let mut payloads = Vec::with_capacity(video_ids.len());
        let mut succeeded = 0usize;
        let mut last_error = None;
        for chunk in video_ids.chunks(MAX_IDS_PER_REQUEST) {
            match self.fetch_chunk(chunk).await {
                Ok(items) => {
                    succeeded += 1;
                    payloads.extend(items);
                }
                Err(e) => {
                    warn!(ids = chunk.len(), error = %e, "videos.list chunk failed");
                    last_error = Some(e);
                }
            }
        }
        if succeeded == 0
            && let Some(e) = last_error
        {
            return Err(e);
        }
        debug!(
            requested = video_ids.len(),
            returned = payloads.len(),
            "Fetched video details"
        );
        Ok(payloads)
    }
}

/// Parse a `videos.list` body into detail payloads.
pub(crate) fn parse_video_list(body: &str) -> Result<Vec<DetailPayload>> {
    let response: VideoListResponse = serde_json::from_str(body)?;
    Ok(response.items.into_iter().map(into_payload).collect())
}

fn parse_timestamp(details: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    let raw = details.get(key)?.as_str()?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            warn!(field = key, value = raw, error = %e, "Ignoring malformed timestamp");
            None
        }
    }
}

fn into_payload(item: VideoItem) -> DetailPayload {
    let timing = item
        .live_streaming_details
        .as_ref()
        .filter(|details| !details.is_empty())
        .map(|details| LiveTiming {
            scheduled_start: parse_timestamp(details, "scheduledStartTime"),
            actual_start: parse_timestamp(details, "actualStartTime"),
            actual_end: parse_timestamp(details, "actualEndTime"),
        });

    let (broadcast, title, channel_title, thumbnail_url) = match item.snippet {
        Some(mut snippet) => {
            let thumbnail = THUMBNAIL_PREFERENCE
                .iter()
                .find_map(|key| snippet.thumbnails.remove(*key))
                .map(|t| t.url);
            (
                BroadcastFlag::parse(snippet.live_broadcast_content.as_deref()),
                snippet.title,
                snippet.channel_title,
                thumbnail,
            )
        }
        None => (BroadcastFlag::None, None, None, None),
    };

    DetailPayload {
        video_id: item.id,
        broadcast,
        upload_status: UploadStatus::parse(
            item.status.as_ref().and_then(|s| s.upload_status.as_deref()),
        ),
        timing,
        title,
        channel_title,
        thumbnail_url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classify;
    use crate::domain::{ContentType, LiveStatus};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const UPCOMING: &str = r#"{
        "items": [{
            "id": "abc123",
            "snippet": {
                "title": "Morning stream",
                "channelTitle": "Chan",
                "liveBroadcastContent": "upcoming",
                "thumbnails": {
                    "default": {"url": "https://i.ytimg.com/vi/abc123/default.jpg"},
                    "high": {"url": "https://i.ytimg.com/vi/abc123/hqdefault.jpg"}
                }
            },
            "status": {"uploadStatus": "uploaded"},
            "liveStreamingDetails": {"scheduledStartTime": "2025-01-01T12:00:00Z"}
        }]
    }"#;

    #[test]
    fn test_parse_upcoming_item() {
        let payloads = parse_video_list(UPCOMING).unwrap();
        assert_eq!(payloads.len(), 1);
        let p = &payloads[0];
        assert_eq!(p.video_id, "abc123");
        assert_eq!(p.broadcast, BroadcastFlag::Upcoming);
        assert_eq!(p.upload_status, Some(UploadStatus::Uploaded));
        assert_eq!(
            p.thumbnail_url.as_deref(),
            Some("https://i.ytimg.com/vi/abc123/hqdefault.jpg")
        );
        assert_eq!(
            p.scheduled_start().map(|t| t.to_rfc3339()),
            Some("2025-01-01T12:00:00+00:00".to_string())
        );

        let c = classify(p);
        assert_eq!(c.stage(), (ContentType::Live, Some(LiveStatus::Upcoming)));
    }

    #[test]
    fn test_malformed_timestamp_degrades_to_absent() {
        let body = r#"{"items": [{
            "id": "x",
            "snippet": {"liveBroadcastContent": "none"},
            "status": {"uploadStatus": "processed"},
            "liveStreamingDetails": {"actualStartTime": "yesterday", "concurrentViewers": "12"}
        }]}"#;
        let p = &parse_video_list(body).unwrap()[0];
        // Details object is present, so timing exists, but without a start.
        assert_eq!(p.timing, Some(LiveTiming::default()));
        assert_eq!(classify(p).stage(), (ContentType::Video, None));
    }

    #[test]
    fn test_missing_parts_and_empty_details() {
        let body = r#"{"items": [{"id": "y", "liveStreamingDetails": {}}]}"#;
        let p = &parse_video_list(body).unwrap()[0];
        assert_eq!(p.timing, None);
        assert_eq!(p.broadcast, BroadcastFlag::None);
        assert_eq!(p.upload_status, None);

        assert!(parse_video_list(r#"{"kind": "youtube#videoListResponse"}"#)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_archived_broadcast() {
        let body = r#"{"items": [{
            "id": "z",
            "snippet": {"liveBroadcastContent": "none"},
            "status": {"uploadStatus": "processed"},
            "liveStreamingDetails": {
                "actualStartTime": "2025-01-01T10:00:00Z",
                "actualEndTime": "2025-01-01T11:30:00.000Z"
            }
        }]}"#;
        let p = &parse_video_list(body).unwrap()[0];
        let c = classify(p);
        assert_eq!(c.stage(), (ContentType::Archive, Some(LiveStatus::Completed)));
        assert!(c.is_premiere());
    }

    #[test]
    fn test_empty_api_key_rejected() {
        assert!(DataApiClient::new(DataApiConfig::new("  ")).is_err());
    }

    /// Local HTTP server answering the n-th request (zero-based) with
    /// `respond(n)`. Returns its base URL and a request counter.
    async fn serve(respond: fn(usize) -> (u16, &'static str)) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let (status, body) = respond(counter.fetch_add(1, Ordering::SeqCst));
                tokio::spawn(async move {
                    let mut head = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => head.extend_from_slice(&buf[..n]),
                        }
                    }
                    let reason = if status == 200 { "OK" } else { "Service Unavailable" };
                    let reply = format!(
                        "HTTP/1.1 {status} {reason}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(reply.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        (format!("http://{addr}"), hits)
    }

    fn test_client(base_url: String) -> DataApiClient {
        let mut config = DataApiConfig::new("test-key");
        config.base_url = base_url;
        config.requests_per_second = 1000.0;
        config.retry = Backoff::new(3, Duration::from_millis(1), Duration::from_millis(5));
        DataApiClient::new(config).unwrap()
    }

    const UNAVAILABLE: &str = r#"{"error": {"code": 503, "message": "backend unavailable"}}"#;

    #[tokio::test]
    async fn test_persistent_server_error_retries_once_per_budget() {
        let (base_url, hits) = serve(|_| (503, UNAVAILABLE)).await;
        let client = test_client(base_url);

        let err = client.fetch_details(&["a".to_string()]).await.unwrap_err();
        assert!(err.is_transient());
        // One attempt plus three retries, nothing more.
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_failed_chunk_keeps_earlier_results() {
        let (base_url, hits) = serve(|n| match n {
            0 => (200, r#"{"items": [{"id": "v0"}]}"#),
            _ => (503, UNAVAILABLE),
        })
        .await;
        let client = test_client(base_url);

        let ids: Vec<String> = (0..=MAX_IDS_PER_REQUEST).map(|i| format!("v{i}")).collect();
        let payloads = client.fetch_details(&ids).await.unwrap();

        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].video_id, "v0");
        assert_eq!(hits.load(Ordering::SeqCst), 1 + 4);
    }
}
