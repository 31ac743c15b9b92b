//! Auto-post decisions and delivery bookkeeping.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::channels::NotificationSink;
use super::template::{MAX_POST_CHARS, Templates};
use super::Post;
use crate::domain::{ContentType, LiveStatus, PostKind, TransitionKind, VideoRecord};
use crate::monitor::{ListenerRegistry, TransitionEvent, TransitionListener};
use crate::store::Store;
use crate::utils::retry_transient;
use crate::{Error, Result};

/// Which post kinds may be published automatically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoPostMode {
    pub video: bool,
    pub schedule: bool,
    pub live: bool,
    pub live_end: bool,
    pub archive: bool,
}

impl AutoPostMode {
    pub const OFF: Self = Self {
        video: false,
        schedule: false,
        live: false,
        live_end: false,
        archive: false,
    };

    pub const ALL: Self = Self {
        video: true,
        schedule: true,
        live: true,
        live_end: true,
        archive: true,
    };

    pub fn allows(&self, kind: PostKind) -> bool {
        match kind {
            PostKind::Video => self.video,
            PostKind::Schedule => self.schedule,
            PostKind::Live => self.live,
            PostKind::LiveEnd => self.live_end,
            PostKind::Archive => self.archive,
        }
    }

    pub fn with(mut self, kind: PostKind) -> Self {
        match kind {
            PostKind::Video => self.video = true,
            PostKind::Schedule => self.schedule = true,
            PostKind::Live => self.live = true,
            PostKind::LiveEnd => self.live_end = true,
            PostKind::Archive => self.archive = true,
        }
        self
    }

    pub fn is_off(&self) -> bool {
        *self == Self::OFF
    }
}

/// `off`, `all`, or a comma list of post kinds (`video,schedule,live,live_end,archive`).
impl FromStr for AutoPostMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "off" | "none" => return Ok(Self::OFF),
            "all" => return Ok(Self::ALL),
            _ => {}
        }

        s.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .try_fold(Self::OFF, |mode, token| {
                token
                    .to_ascii_lowercase()
                    .parse::<PostKind>()
                    .map(|kind| mode.with(kind))
                    .map_err(|_| Error::config(format!("unknown auto-post mode '{token}'")))
            })
    }
}

/// Whether `mode` permits posting a record in the given stage.
pub fn should_autopost(
    content_type: ContentType,
    live_status: Option<LiveStatus>,
    mode: &AutoPostMode,
) -> bool {
    mode.allows(PostKind::for_stage(content_type, live_status))
}

/// Transition listener that renders and delivers posts.
///
/// Delivery is gated per `(video, kind)` by the store, so a kind is posted
/// at most once even across restarts.
pub struct AutoPoster {
    store: Arc<Store>,
    sinks: Vec<Arc<dyn NotificationSink>>,
    templates: Templates,
    mode: AutoPostMode,
}

impl AutoPoster {
    pub fn new(
        store: Arc<Store>,
        sinks: Vec<Arc<dyn NotificationSink>>,
        templates: Templates,
        mode: AutoPostMode,
    ) -> Self {
        Self {
            store,
            sinks,
            templates,
            mode,
        }
    }

    /// Listen for every transition kind.
    pub fn register(self: Arc<Self>, registry: &ListenerRegistry) {
        registry.register_many(
            [
                TransitionKind::VideoPublished,
                TransitionKind::ScheduleDetected,
                TransitionKind::LiveStarted,
                TransitionKind::LiveEnded,
                TransitionKind::ArchiveAvailable,
            ],
            self,
        );
    }

    pub async fn on_video_published(&self, event: &TransitionEvent) -> Result<bool> {
        self.deliver(&event.record, ContentType::Video, None).await
    }

    pub async fn on_schedule_detected(&self, event: &TransitionEvent) -> Result<bool> {
        self.deliver(&event.record, ContentType::Live, Some(LiveStatus::Upcoming))
            .await
    }

    pub async fn on_live_started(&self, event: &TransitionEvent) -> Result<bool> {
        self.deliver(&event.record, ContentType::Live, Some(LiveStatus::Live))
            .await
    }

    pub async fn on_live_ended(&self, event: &TransitionEvent) -> Result<bool> {
        self.deliver(&event.record, ContentType::Live, Some(LiveStatus::Completed))
            .await
    }

    pub async fn on_archive_available(&self, event: &TransitionEvent) -> Result<bool> {
        self.deliver(&event.record, ContentType::Archive, Some(LiveStatus::Completed))
            .await
    }

    /// Returns `true` if a post went out.
    async fn deliver(
        &self,
        record: &VideoRecord,
        content_type: ContentType,
        live_status: Option<LiveStatus>,
    ) -> Result<bool> {
        let kind = PostKind::for_stage(content_type, live_status);
        if !should_autopost(content_type, live_status, &self.mode) {
            debug!(video_id = %record.video_id, kind = %kind, "Auto-post disabled for kind");
            return Ok(false);
        }

        if self
            .store
            .was_delivered(&record.video_id, record.source, kind)
            .await
        {
            debug!(video_id = %record.video_id, kind = %kind, "Already delivered");
            return Ok(false);
        }

        let post = Post {
            kind,
            record: record.clone(),
            text: self.templates.render(kind, record, MAX_POST_CHARS),
        };

        let mut delivered = 0usize;
        let mut last_error = None;
        for sink in &self.sinks {
            match retry_transient("notification_send", || sink.send(&post)).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(
                        sink = sink.sink_type(),
                        video_id = %record.video_id,
                        kind = %kind,
                        error = %e,
                        "Notification delivery failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        if delivered == 0 {
            return Err(last_error
                .unwrap_or_else(|| Error::notification("autopost", "no notification sinks configured")));
        }

        // The post went out; an error here would re-dispatch archive posts.
        if let Err(e) = self
            .store
            .record_delivery(&record.video_id, record.source, kind)
            .await
        {
            error!(
                video_id = %record.video_id,
                kind = %kind,
                error = %e,
                "Posted but failed to record delivery"
            );
        }
        info!(video_id = %record.video_id, kind = %kind, sinks = delivered, "Auto-posted");
        Ok(true)
    }
}

#[async_trait]
impl TransitionListener for AutoPoster {
    fn name(&self) -> &str {
        "autopost"
    }

    async fn on_transition(&self, event: &TransitionEvent) -> Result<()> {
        match event.kind {
            TransitionKind::VideoPublished => self.on_video_published(event).await?,
            TransitionKind::ScheduleDetected => self.on_schedule_detected(event).await?,
            TransitionKind::LiveStarted => self.on_live_started(event).await?,
            TransitionKind::LiveEnded => self.on_live_ended(event).await?,
            TransitionKind::ArchiveAvailable => self.on_archive_available(event).await?,
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("off".parse::<AutoPostMode>().unwrap(), AutoPostMode::OFF);
        assert_eq!("ALL".parse::<AutoPostMode>().unwrap(), AutoPostMode::ALL);

        let mode: AutoPostMode = "schedule, live_end".parse().unwrap();
        assert!(mode.schedule && mode.live_end);
        assert!(!mode.live && !mode.video && !mode.archive);

        assert!("live,bogus".parse::<AutoPostMode>().is_err());
    }

    #[test]
    fn test_should_autopost_table() {
        let live_only = AutoPostMode::OFF.with(PostKind::Live);
        assert!(should_autopost(ContentType::Live, Some(LiveStatus::Live), &live_only));
        assert!(!should_autopost(ContentType::Live, Some(LiveStatus::Upcoming), &live_only));
        assert!(!should_autopost(ContentType::Archive, Some(LiveStatus::Completed), &live_only));
        assert!(!should_autopost(ContentType::Video, None, &live_only));

        let archive_only = AutoPostMode::OFF.with(PostKind::Archive);
        assert!(should_autopost(ContentType::Archive, Some(LiveStatus::Completed), &archive_only));
        assert!(!should_autopost(ContentType::Live, Some(LiveStatus::Completed), &archive_only));

        for (ct, ls) in [
            (ContentType::Video, None),
            (ContentType::Live, Some(LiveStatus::Upcoming)),
            (ContentType::Live, Some(LiveStatus::Live)),
            (ContentType::Archive, Some(LiveStatus::Completed)),
        ] {
            assert!(!should_autopost(ct, ls, &AutoPostMode::OFF));
            assert!(should_autopost(ct, ls, &AutoPostMode::ALL));
        }
    }
}
