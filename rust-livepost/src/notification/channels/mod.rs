//! Notification sinks.
//!
//! The set of sinks is fixed at compile time: each [`SinkConfig`] variant
//! builds exactly one implementation.
//! - Bluesky (AT Protocol post with link facets)
//! - Generic webhooks (HTTP POST)
//! - Log (dry run)

mod bluesky;
mod log;
mod webhook;

pub use bluesky::{BlueskyConfig, BlueskySink};
pub use log::LogSink;
pub use webhook::{WebhookAuth, WebhookConfig, WebhookSink};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Post;
use crate::Result;

/// Trait for notification sinks.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Get the sink type name.
    fn sink_type(&self) -> &'static str;

    /// Deliver one post.
    async fn send(&self, post: &Post) -> Result<()>;
}

/// Sink configuration wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkConfig {
    Bluesky(BlueskyConfig),
    Webhook(WebhookConfig),
    Log,
}

impl SinkConfig {
    pub fn sink_type(&self) -> &'static str {
        match self {
            Self::Bluesky(_) => "bluesky",
            Self::Webhook(_) => "webhook",
            Self::Log => "log",
        }
    }

    pub fn build(self) -> Result<Arc<dyn NotificationSink>> {
        Ok(match self {
            Self::Bluesky(config) => Arc::new(BlueskySink::new(config)?),
            Self::Webhook(config) => Arc::new(WebhookSink::new(config)?),
            Self::Log => Arc::new(LogSink),
        })
    }
}

/// Build every configured sink. With nothing configured, posts go to the
/// log sink only.
pub fn build_sinks(configs: Vec<SinkConfig>) -> Result<Vec<Arc<dyn NotificationSink>>> {
    if configs.is_empty() {
        return Ok(vec![Arc::new(LogSink)]);
    }
    configs.into_iter().map(SinkConfig::build).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_config_tagging() {
        let config: SinkConfig = serde_json::from_value(serde_json::json!({
            "type": "webhook",
            "url": "https://example.com/hook"
        }))
        .unwrap();
        assert_eq!(config.sink_type(), "webhook");

        let log: SinkConfig = serde_json::from_value(serde_json::json!({ "type": "log" })).unwrap();
        assert_eq!(log.sink_type(), "log");
    }

    #[test]
    fn test_empty_registry_falls_back_to_log() {
        let sinks = build_sinks(Vec::new()).unwrap();
        assert_eq!(sinks.len(), 1);
        assert_eq!(sinks[0].sink_type(), "log");
    }
}
