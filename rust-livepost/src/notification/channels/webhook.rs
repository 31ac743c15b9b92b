//! Generic webhook sink.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header::HeaderMap};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::NotificationSink;
use crate::notification::Post;
use crate::utils::http::build_client;
use crate::{Error, Result};

/// Webhook sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Webhook URL.
    pub url: String,
    /// Custom headers.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// Authentication type.
    #[serde(default)]
    pub auth: Option<WebhookAuth>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            auth: None,
            timeout_secs: default_timeout(),
        }
    }
}

/// Webhook authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WebhookAuth {
    /// Bearer token authentication.
    Bearer { token: String },
    /// Basic authentication.
    Basic { username: String, password: String },
    /// Custom header authentication.
    Header { name: String, value: String },
}

/// POSTs each post as JSON.
pub struct WebhookSink {
    config: WebhookConfig,
    client: Client,
}

impl WebhookSink {
    pub fn new(config: WebhookConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(Error::config("webhook url is empty"));
        }
        let client = build_client(Duration::from_secs(config.timeout_secs))?;
        Ok(Self { config, client })
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        for (name, value) in &self.config.headers {
            if let (Ok(name), Ok(value)) = (
                name.parse::<reqwest::header::HeaderName>(),
                value.parse::<reqwest::header::HeaderValue>(),
            ) {
                headers.insert(name, value);
            }
        }

        match &self.config.auth {
            Some(WebhookAuth::Bearer { token }) => {
                if let Ok(value) = format!("Bearer {}", token).parse() {
                    headers.insert(reqwest::header::AUTHORIZATION, value);
                }
            }
            Some(WebhookAuth::Header { name, value }) => {
                if let (Ok(name), Ok(value)) = (
                    name.parse::<reqwest::header::HeaderName>(),
                    value.parse::<reqwest::header::HeaderValue>(),
                ) {
                    headers.insert(name, value);
                }
            }
            // Basic auth goes through the request builder.
            Some(WebhookAuth::Basic { .. }) | None => {}
        }

        headers
    }

    fn build_payload(&self, post: &Post) -> serde_json::Value {
        json!({
            "kind": post.kind,
            "text": post.text,
            "video_id": post.record.video_id,
            "source": post.record.source,
            "title": post.record.title,
            "channel": post.record.channel_name,
            "url": post.record.video_url,
            "thumbnail_url": post.record.thumbnail_url,
            "published_at": post.record.published_at.to_rfc3339(),
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    fn sink_type(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, post: &Post) -> Result<()> {
        let mut request = self
            .client
            .post(&self.config.url)
            .headers(self.build_headers())
            .json(&self.build_payload(post));

        if let Some(WebhookAuth::Basic { username, password }) = &self.config.auth {
            request = request.basic_auth(username, Some(password));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Webhook failed: {} - {}", status, body);
            return Err(Error::http_status("webhook", status.as_u16(), body));
        }

        debug!("Webhook notification sent: {} {}", post.kind, post.record.video_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PostKind, Source, VideoRecord};

    fn post() -> Post {
        Post {
            kind: PostKind::Live,
            record: VideoRecord::new(
                "abc",
                Source::Youtube,
                "Stream",
                "Chan",
                "https://www.youtube.com/watch?v=abc",
                chrono::Utc::now(),
            ),
            text: "Chan is live".to_string(),
        }
    }

    #[test]
    fn test_empty_url_rejected() {
        assert!(WebhookSink::new(WebhookConfig::new("")).is_err());
    }

    #[test]
    fn test_build_payload() {
        let sink = WebhookSink::new(WebhookConfig::new("https://example.com/hook")).unwrap();
        let payload = sink.build_payload(&post());
        assert_eq!(payload["kind"], "live");
        assert_eq!(payload["source"], "youtube");
        assert_eq!(payload["video_id"], "abc");
        assert_eq!(payload["text"], "Chan is live");
    }

    #[test]
    fn test_build_headers_with_bearer() {
        let config = WebhookConfig {
            auth: Some(WebhookAuth::Bearer {
                token: "test-token".to_string(),
            }),
            ..WebhookConfig::new("https://example.com/hook")
        };
        let sink = WebhookSink::new(config).unwrap();
        let headers = sink.build_headers();
        assert_eq!(
            headers.get(reqwest::header::AUTHORIZATION).unwrap(),
            "Bearer test-token"
        );
    }
}
