//! Video database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::{datetime_to_ms, ms_to_datetime, opt_ms_to_datetime};
use crate::domain::{Classification, ContentType, LiveStatus, Source, VideoRecord};
use crate::{Error, Result};

/// Row of the `videos` table.
///
/// Enum columns are stored as their lowercase string forms; the
/// classification columns are all `NULL` until the classifier has run.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct VideoDbModel {
    pub video_id: String,
    pub source: String,
    pub title: String,
    pub channel_name: String,
    pub video_url: String,
    pub thumbnail_url: Option<String>,
    /// Unix epoch milliseconds (UTC).
    pub published_at: i64,
    pub content_type: Option<String>,
    pub live_status: Option<String>,
    pub is_premiere: bool,
    pub posted_flag: bool,
    pub posted_at: Option<i64>,
    pub selected_for_post: bool,
    pub scheduled_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl VideoDbModel {
    pub fn from_record(record: &VideoRecord, now_ms: i64) -> Self {
        let (content_type, live_status, is_premiere) = match &record.classification {
            Some(c) => (
                Some(c.content_type().as_str().to_string()),
                c.live_status().map(|s| s.as_str().to_string()),
                c.is_premiere(),
            ),
            None => (None, None, false),
        };

        Self {
            video_id: record.video_id.clone(),
            source: record.source.as_str().to_string(),
            title: record.title.clone(),
            channel_name: record.channel_name.clone(),
            video_url: record.video_url.clone(),
            thumbnail_url: record.thumbnail_url.clone(),
            published_at: datetime_to_ms(record.published_at),
            content_type,
            live_status,
            is_premiere,
            posted_flag: record.posted,
            posted_at: record.posted_at.map(datetime_to_ms),
            selected_for_post: record.selected_for_post,
            scheduled_at: record.scheduled_at.map(datetime_to_ms),
            created_at: now_ms,
            updated_at: now_ms,
        }
    }

    /// Convert into the domain record, validating enum columns.
    pub fn into_record(self) -> Result<VideoRecord> {
        let source = self
            .source
            .parse::<Source>()
            .map_err(|_| Error::validation(format!("unknown source '{}'", self.source)))?;

        let classification = match self.content_type.as_deref() {
            None => None,
            Some(raw) => {
                let content_type = raw
                    .parse::<ContentType>()
                    .map_err(|_| Error::validation(format!("unknown content_type '{raw}'")))?;
                let live_status = self
                    .live_status
                    .as_deref()
                    .map(|s| {
                        s.parse::<LiveStatus>()
                            .map_err(|_| Error::validation(format!("unknown live_status '{s}'")))
                    })
                    .transpose()?;
                Some(Classification::from_parts(
                    content_type,
                    live_status,
                    self.is_premiere,
                )?)
            }
        };

        Ok(VideoRecord {
            video_id: self.video_id,
            source,
            title: self.title,
            channel_name: self.channel_name,
            video_url: self.video_url,
            thumbnail_url: self.thumbnail_url,
            published_at: ms_to_datetime(self.published_at),
            classification,
            posted: self.posted_flag,
            posted_at: opt_ms_to_datetime(self.posted_at),
            selected_for_post: self.selected_for_post,
            scheduled_at: opt_ms_to_datetime(self.scheduled_at),
        })
    }
}

/// Row of the `deliveries` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DeliveryDbModel {
    pub video_id: String,
    pub source: String,
    /// Post kind, see [`crate::domain::PostKind`].
    pub kind: String,
    pub delivered_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_record_conversion_keeps_classification() {
        let published = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        let record = VideoRecord::new(
            "abc",
            Source::Youtube,
            "Stream",
            "Chan",
            "https://www.youtube.com/watch?v=abc",
            published,
        )
        .with_classification(Classification::live(true));

        let row = VideoDbModel::from_record(&record, 0);
        assert_eq!(row.content_type.as_deref(), Some("live"));
        assert_eq!(row.live_status.as_deref(), Some("live"));
        assert!(row.is_premiere);

        let back = row.into_record().unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_invalid_columns_are_rejected() {
        let record = VideoRecord::new("x", Source::Niconico, "t", "c", "u", Utc::now());
        let mut row = VideoDbModel::from_record(&record, 0);
        row.content_type = Some("archive".into());
        row.live_status = None;
        assert!(row.into_record().is_err());

        let mut row = VideoDbModel::from_record(&record, 0);
        row.source = "vimeo".into();
        assert!(row.into_record().is_err());
    }
}
