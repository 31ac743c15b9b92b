//! Dry-run sink that only logs.

use async_trait::async_trait;
use tracing::info;

use super::NotificationSink;
use crate::Result;
use crate::notification::Post;

pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    fn sink_type(&self) -> &'static str {
        "log"
    }

    async fn send(&self, post: &Post) -> Result<()> {
        info!(
            kind = %post.kind,
            video_id = %post.record.video_id,
            "[dry-run] {}",
            post.text
        );
        Ok(())
    }
}
