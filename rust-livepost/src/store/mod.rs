//! Persistence façade over the video table and the live cache.
//!
//! Callers decide what to write and when; this layer only forwards. Storage
//! failures are logged and reported as `false` / `None` / empty, so a
//! polling loop keeps running through transient lock contention.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::cache::{CacheStatus, LiveCache, LiveCacheEntry};
use crate::classifier::DetailPayload;
use crate::database::models::{DeliveryDbModel, VideoDbModel};
use crate::database::repositories::{ClassificationUpdate, VideoRepository};
use crate::database::time::datetime_to_ms;
use crate::domain::{Classification, LiveStatus, PostKind, Source, VideoRecord};
use crate::utils::SharedClock;
use crate::{Error, Result};

pub struct Store {
    videos: Arc<dyn VideoRepository>,
    live_cache: Arc<LiveCache>,
    clock: SharedClock,
}

fn log_failure<T>(op: &'static str, video_id: &str, result: Result<T>, fallback: T) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!(op, video_id, error = %e, "Store operation failed");
            fallback
        }
    }
}

fn rows_into_records(op: &'static str, rows: Vec<VideoDbModel>) -> Vec<VideoRecord> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.video_id.clone();
            match row.into_record() {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(op, video_id = %id, error = %e, "Skipping unreadable video row");
                    None
                }
            }
        })
        .collect()
}

impl Store {
    pub fn new(
        videos: Arc<dyn VideoRepository>,
        live_cache: Arc<LiveCache>,
        clock: SharedClock,
    ) -> Self {
        Self {
            videos,
            live_cache,
            clock,
        }
    }

    pub fn live_cache(&self) -> &LiveCache {
        &self.live_cache
    }

    // ---- video records ----

    /// Insert a record; `false` when it already exists or on failure.
    pub async fn insert_video(&self, record: &VideoRecord) -> bool {
        let now_ms = datetime_to_ms(self.clock.now());
        let row = VideoDbModel::from_record(record, now_ms);
        log_failure(
            "insert_video",
            &record.video_id,
            self.videos.insert_video(&row).await,
            false,
        )
    }

    pub async fn get_video(&self, video_id: &str, source: Source) -> Option<VideoRecord> {
        match self.videos.get_video(video_id, source.as_str()).await {
            Ok(row) => log_failure("get_video", video_id, row.into_record().map(Some), None),
            Err(Error::NotFound { .. }) => None,
            Err(e) => log_failure("get_video", video_id, Err(e), None),
        }
    }

    pub async fn get_unclassified(&self) -> Vec<VideoRecord> {
        match self.videos.list_unclassified().await {
            Ok(rows) => rows_into_records("get_unclassified", rows),
            Err(e) => log_failure("get_unclassified", "*", Err(e), Vec::new()),
        }
    }

    pub async fn get_by_live_status(&self, status: LiveStatus) -> Vec<VideoRecord> {
        match self.videos.list_by_live_status(status.as_str()).await {
            Ok(rows) => rows_into_records("get_by_live_status", rows),
            Err(e) => log_failure("get_by_live_status", "*", Err(e), Vec::new()),
        }
    }

    /// Stored records grouped by `(title, channel_name, source)`, groups of
    /// two or more only.
    pub async fn list_by_title_channel(&self) -> Vec<Vec<VideoRecord>> {
        let rows = match self.videos.list_duplicate_candidates().await {
            Ok(rows) => rows_into_records("list_by_title_channel", rows),
            Err(e) => return log_failure("list_by_title_channel", "*", Err(e), Vec::new()),
        };

        let mut groups: Vec<Vec<VideoRecord>> = Vec::new();
        for record in rows {
            let same_group = groups.last().is_some_and(|group| {
                group[0].title == record.title
                    && group[0].channel_name == record.channel_name
                    && group[0].source == record.source
            });
            if same_group && let Some(group) = groups.last_mut() {
                group.push(record);
            } else {
                groups.push(vec![record]);
            }
        }
        groups.retain(|g| g.len() > 1);
        groups
    }

    /// Write back a classification. `published_at` replaces the stored
    /// timestamp when given.
    pub async fn update_classification(
        &self,
        video_id: &str,
        source: Source,
        classification: Classification,
        published_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> bool {
        let update = ClassificationUpdate {
            content_type: classification.content_type().as_str(),
            live_status: classification.live_status().map(|s| s.as_str()),
            is_premiere: classification.is_premiere(),
            published_at: published_at.map(datetime_to_ms),
        };
        let now_ms = datetime_to_ms(self.clock.now());
        log_failure(
            "update_classification",
            video_id,
            self.videos
                .update_classification(video_id, source.as_str(), update, now_ms)
                .await,
            false,
        )
    }

    pub async fn mark_posted(&self, video_id: &str, source: Source) -> bool {
        let now_ms = datetime_to_ms(self.clock.now());
        log_failure(
            "mark_posted",
            video_id,
            self.videos
                .mark_posted(video_id, source.as_str(), now_ms)
                .await,
            false,
        )
    }

    pub async fn delete_video(&self, video_id: &str, source: Source) -> bool {
        log_failure(
            "delete_video",
            video_id,
            self.videos.delete_video(video_id, source.as_str()).await,
            false,
        )
    }

    /// Whether a post of `kind` was already delivered. Unknown on failure is
    /// reported as delivered so that a storage hiccup never causes a repost.
    pub async fn was_delivered(&self, video_id: &str, source: Source, kind: PostKind) -> bool {
        log_failure(
            "was_delivered",
            video_id,
            self.videos
                .has_delivery(video_id, source.as_str(), kind.as_str())
                .await,
            true,
        )
    }

    /// Record a confirmed delivery and set the posted flag. `Ok(false)` if
    /// this kind was already recorded.
    ///
    /// Unlike the other writes the error is returned: a post that went out
    /// without being recorded is no longer gated, and the caller has to know.
    pub async fn record_delivery(
        &self,
        video_id: &str,
        source: Source,
        kind: PostKind,
    ) -> Result<bool> {
        let delivery = DeliveryDbModel {
            video_id: video_id.to_string(),
            source: source.as_str().to_string(),
            kind: kind.as_str().to_string(),
            delivered_at: datetime_to_ms(self.clock.now()),
        };
        self.videos.record_delivery(&delivery).await
    }

    pub async fn deliveries(&self, video_id: &str, source: Source) -> Vec<PostKind> {
        let rows = log_failure(
            "deliveries",
            video_id,
            self.videos.list_deliveries(video_id, source.as_str()).await,
            Vec::new(),
        );
        rows.into_iter()
            .filter_map(|row| row.kind.parse::<PostKind>().ok())
            .collect()
    }

    // ---- live cache ----

    pub fn add_live(
        &self,
        video_id: &str,
        source: Source,
        snapshot: DetailPayload,
        classification: Classification,
    ) -> bool {
        log_failure(
            "add_live",
            video_id,
            self.live_cache
                .add(video_id, source, snapshot, classification, CacheStatus::Live)
                .map(|_| true),
            false,
        )
    }

    /// Seed an entry that is already concluded, so ended processing picks it up.
    pub fn add_ended(
        &self,
        video_id: &str,
        source: Source,
        snapshot: DetailPayload,
        classification: Classification,
    ) -> bool {
        log_failure(
            "add_ended",
            video_id,
            self.live_cache
                .add(video_id, source, snapshot, classification, CacheStatus::Ended)
                .map(|_| true),
            false,
        )
    }

    pub fn update_live(
        &self,
        video_id: &str,
        snapshot: DetailPayload,
        classification: Classification,
    ) -> bool {
        log_failure(
            "update_live",
            video_id,
            self.live_cache.update(video_id, snapshot, classification),
            false,
        )
    }

    pub fn refresh_live_snapshot(&self, video_id: &str, snapshot: DetailPayload) -> bool {
        log_failure(
            "refresh_live_snapshot",
            video_id,
            self.live_cache.refresh_snapshot(video_id, snapshot),
            false,
        )
    }

    pub fn mark_ended(&self, video_id: &str) -> bool {
        log_failure("mark_ended", video_id, self.live_cache.mark_ended(video_id), false)
    }

    pub fn mark_archive_notified(&self, video_id: &str) -> bool {
        log_failure(
            "mark_archive_notified",
            video_id,
            self.live_cache.mark_archive_notified(video_id),
            false,
        )
    }

    pub fn remove_live(&self, video_id: &str) -> bool {
        log_failure("remove_live", video_id, self.live_cache.remove(video_id), false)
    }

    pub fn get_live(&self, video_id: &str) -> Option<LiveCacheEntry> {
        self.live_cache.get(video_id)
    }

    /// Cache entry for `video_id` if it is younger than the live TTL.
    pub fn fresh_live(&self, video_id: &str) -> Option<LiveCacheEntry> {
        self.live_cache.fresh(video_id)
    }

    pub fn get_by_cache_status(&self, status: CacheStatus) -> Vec<LiveCacheEntry> {
        self.live_cache.by_status(status)
    }

    /// Purge ended entries older than `max_age`; returns the purged ids.
    pub fn clear_ended(&self, max_age: Duration) -> Vec<String> {
        log_failure("clear_ended", "*", self.live_cache.clear_ended(max_age), Vec::new())
    }
}
