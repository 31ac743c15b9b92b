//! Video repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::{DeliveryDbModel, VideoDbModel};
use crate::database::retry::retry_on_sqlite_busy;
use crate::{Error, Result};

/// Classification columns written back by the poller.
#[derive(Debug, Clone, Copy)]
pub struct ClassificationUpdate<'a> {
    pub content_type: &'a str,
    pub live_status: Option<&'a str>,
    pub is_premiere: bool,
    /// New `published_at` (epoch ms); `None` keeps the stored value.
    pub published_at: Option<i64>,
}

/// Video repository trait.
#[async_trait]
pub trait VideoRepository: Send + Sync {
    /// Insert a row; `false` if `(video_id, source)` already existed.
    async fn insert_video(&self, video: &VideoDbModel) -> Result<bool>;
    async fn get_video(&self, video_id: &str, source: &str) -> Result<VideoDbModel>;
    async fn list_unclassified(&self) -> Result<Vec<VideoDbModel>>;
    async fn list_by_live_status(&self, live_status: &str) -> Result<Vec<VideoDbModel>>;
    /// Rows sharing `(title, channel_name, source)` with at least one other row,
    /// ordered so that members of a group are adjacent.
    async fn list_duplicate_candidates(&self) -> Result<Vec<VideoDbModel>>;
    async fn update_classification(
        &self,
        video_id: &str,
        source: &str,
        update: ClassificationUpdate<'_>,
        now_ms: i64,
    ) -> Result<bool>;
    async fn mark_posted(&self, video_id: &str, source: &str, posted_at: i64) -> Result<bool>;
    /// Record a delivery and set the posted flag in one transaction.
    /// `false` if this kind was already recorded.
    async fn record_delivery(&self, delivery: &DeliveryDbModel) -> Result<bool>;
    async fn has_delivery(&self, video_id: &str, source: &str, kind: &str) -> Result<bool>;
    async fn list_deliveries(&self, video_id: &str, source: &str) -> Result<Vec<DeliveryDbModel>>;
    async fn delete_video(&self, video_id: &str, source: &str) -> Result<bool>;
}

/// SQLx implementation of VideoRepository.
pub struct SqlxVideoRepository {
    pool: SqlitePool,
}

impl SqlxVideoRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VideoRepository for SqlxVideoRepository {
    async fn insert_video(&self, video: &VideoDbModel) -> Result<bool> {
        retry_on_sqlite_busy("insert_video", || async {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO videos (
                    video_id, source, title, channel_name, video_url, thumbnail_url,
                    published_at, content_type, live_status, is_premiere,
                    posted_flag, posted_at, selected_for_post, scheduled_at,
                    created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&video.video_id)
            .bind(&video.source)
            .bind(&video.title)
            .bind(&video.channel_name)
            .bind(&video.video_url)
            .bind(&video.thumbnail_url)
            .bind(video.published_at)
            .bind(&video.content_type)
            .bind(&video.live_status)
            .bind(video.is_premiere)
            .bind(video.posted_flag)
            .bind(video.posted_at)
            .bind(video.selected_for_post)
            .bind(video.scheduled_at)
            .bind(video.created_at)
            .bind(video.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn get_video(&self, video_id: &str, source: &str) -> Result<VideoDbModel> {
        let row = retry_on_sqlite_busy("get_video", || async {
            let row = sqlx::query_as::<_, VideoDbModel>(
                "SELECT * FROM videos WHERE video_id = ? AND source = ?",
            )
            .bind(video_id)
            .bind(source)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        })
        .await?;
        row.ok_or_else(|| Error::not_found("Video", format!("{source}:{video_id}")))
    }

    async fn list_unclassified(&self) -> Result<Vec<VideoDbModel>> {
        retry_on_sqlite_busy("list_unclassified", || async {
            let videos = sqlx::query_as::<_, VideoDbModel>(
                "SELECT * FROM videos WHERE content_type IS NULL ORDER BY published_at",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(videos)
        })
        .await
    }

    async fn list_by_live_status(&self, live_status: &str) -> Result<Vec<VideoDbModel>> {
        retry_on_sqlite_busy("list_by_live_status", || async {
            let videos = sqlx::query_as::<_, VideoDbModel>(
                "SELECT * FROM videos WHERE live_status = ? ORDER BY published_at",
            )
            .bind(live_status)
            .fetch_all(&self.pool)
            .await?;
            Ok(videos)
        })
        .await
    }

    async fn list_duplicate_candidates(&self) -> Result<Vec<VideoDbModel>> {
        retry_on_sqlite_busy("list_duplicate_candidates", || async {
            let videos = sqlx::query_as::<_, VideoDbModel>(
                r#"
                SELECT v.* FROM videos v
                JOIN (
                    SELECT title, channel_name, source FROM videos
                    GROUP BY title, channel_name, source
                    HAVING COUNT(*) > 1
                ) d
                ON v.title = d.title AND v.channel_name = d.channel_name AND v.source = d.source
                ORDER BY v.source, v.channel_name, v.title, v.video_id
                "#,
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(videos)
        })
        .await
    }

    async fn update_classification(
        &self,
        video_id: &str,
        source: &str,
        update: ClassificationUpdate<'_>,
        now_ms: i64,
    ) -> Result<bool> {
        retry_on_sqlite_busy("update_classification", || async {
            let result = sqlx::query(
                r#"
                UPDATE videos SET
                    content_type = ?,
                    live_status = ?,
                    is_premiere = ?,
                    published_at = COALESCE(?, published_at),
                    updated_at = ?
                WHERE video_id = ? AND source = ?
                "#,
            )
            .bind(update.content_type)
            .bind(update.live_status)
            .bind(update.is_premiere)
            .bind(update.published_at)
            .bind(now_ms)
            .bind(video_id)
            .bind(source)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn mark_posted(&self, video_id: &str, source: &str, posted_at: i64) -> Result<bool> {
        retry_on_sqlite_busy("mark_posted", || async {
            let result = sqlx::query(
                r#"
                UPDATE videos SET posted_flag = 1, posted_at = ?, updated_at = ?
                WHERE video_id = ? AND source = ?
                "#,
            )
            .bind(posted_at)
            .bind(posted_at)
            .bind(video_id)
            .bind(source)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn record_delivery(&self, delivery: &DeliveryDbModel) -> Result<bool> {
        retry_on_sqlite_busy("record_delivery", || async {
            let mut tx = self.pool.begin().await?;

            let inserted = sqlx::query(
                r#"
                INSERT OR IGNORE INTO deliveries (video_id, source, kind, delivered_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&delivery.video_id)
            .bind(&delivery.source)
            .bind(&delivery.kind)
            .bind(delivery.delivered_at)
            .execute(&mut *tx)
            .await?
            .rows_affected()
                > 0;

            if inserted {
                sqlx::query(
                    r#"
                    UPDATE videos SET posted_flag = 1, posted_at = ?, updated_at = ?
                    WHERE video_id = ? AND source = ?
                    "#,
                )
                .bind(delivery.delivered_at)
                .bind(delivery.delivered_at)
                .bind(&delivery.video_id)
                .bind(&delivery.source)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            Ok(inserted)
        })
        .await
    }

    async fn has_delivery(&self, video_id: &str, source: &str, kind: &str) -> Result<bool> {
        retry_on_sqlite_busy("has_delivery", || async {
            let row: Option<(i64,)> = sqlx::query_as(
                "SELECT 1 FROM deliveries WHERE video_id = ? AND source = ? AND kind = ?",
            )
            .bind(video_id)
            .bind(source)
            .bind(kind)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.is_some())
        })
        .await
    }

    async fn list_deliveries(&self, video_id: &str, source: &str) -> Result<Vec<DeliveryDbModel>> {
        retry_on_sqlite_busy("list_deliveries", || async {
            let rows = sqlx::query_as::<_, DeliveryDbModel>(
                "SELECT * FROM deliveries WHERE video_id = ? AND source = ? ORDER BY delivered_at",
            )
            .bind(video_id)
            .bind(source)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        })
        .await
    }

    async fn delete_video(&self, video_id: &str, source: &str) -> Result<bool> {
        retry_on_sqlite_busy("delete_video", || async {
            let result = sqlx::query("DELETE FROM videos WHERE video_id = ? AND source = ?")
                .bind(video_id)
                .bind(source)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }
}
