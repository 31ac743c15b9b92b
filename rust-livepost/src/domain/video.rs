//! Video record entity and its classification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Platform a record was ingested from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Youtube,
    Niconico,
    Twitch,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Youtube => "youtube",
            Self::Niconico => "niconico",
            Self::Twitch => "twitch",
        }
    }

    /// Whether this platform exposes a per-video detail API the classifier can use.
    pub fn has_detail_api(&self) -> bool {
        matches!(self, Self::Youtube)
    }
}

/// Coarse kind of a record.
///
/// Declaration order is the tie-break order used by the priority resolver
/// (`Archive` > `Live` > `Video`).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Video,
    Live,
    Archive,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Live => "live",
            Self::Archive => "archive",
        }
    }
}

/// Broadcast stage of a live or archived record.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LiveStatus {
    Upcoming,
    Live,
    Completed,
}

impl LiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Live => "live",
            Self::Completed => "completed",
        }
    }
}

/// Canonical `(content_type, live_status, is_premiere)` triple.
///
/// `live_status` is present exactly when `content_type` is `Live` or
/// `Archive`; [`Classification::from_parts`] rejects anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Classification {
    content_type: ContentType,
    live_status: Option<LiveStatus>,
    is_premiere: bool,
}

impl Classification {
    /// An ordinary upload, as the classifier emits it (never a premiere).
    pub const fn video() -> Self {
        Self {
            content_type: ContentType::Video,
            live_status: None,
            is_premiere: false,
        }
    }

    pub const fn upcoming(is_premiere: bool) -> Self {
        Self {
            content_type: ContentType::Live,
            live_status: Some(LiveStatus::Upcoming),
            is_premiere,
        }
    }

    pub const fn live(is_premiere: bool) -> Self {
        Self {
            content_type: ContentType::Live,
            live_status: Some(LiveStatus::Live),
            is_premiere,
        }
    }

    pub const fn archive(is_premiere: bool) -> Self {
        Self {
            content_type: ContentType::Archive,
            live_status: Some(LiveStatus::Completed),
            is_premiere,
        }
    }

    /// Build from stored parts, enforcing the live-status invariant.
    pub fn from_parts(
        content_type: ContentType,
        live_status: Option<LiveStatus>,
        is_premiere: bool,
    ) -> Result<Self> {
        match (content_type, live_status) {
            (ContentType::Video, None) => Ok(Self {
                content_type,
                live_status: None,
                is_premiere,
            }),
            (ContentType::Live | ContentType::Archive, Some(status)) => Ok(Self {
                content_type,
                live_status: Some(status),
                is_premiere,
            }),
            (ct, ls) => Err(Error::validation(format!(
                "live_status {:?} is not valid for content_type {}",
                ls, ct
            ))),
        }
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn live_status(&self) -> Option<LiveStatus> {
        self.live_status
    }

    pub fn is_premiere(&self) -> bool {
        self.is_premiere
    }

    /// The `(content_type, live_status)` pair transitions are detected on.
    pub fn stage(&self) -> (ContentType, Option<LiveStatus>) {
        (self.content_type, self.live_status)
    }

    /// Whether the poller should keep re-checking this record.
    pub fn is_trackable(&self) -> bool {
        matches!(
            self.live_status,
            Some(LiveStatus::Upcoming) | Some(LiveStatus::Live)
        )
    }
}

/// One ingested video or broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub video_id: String,
    pub source: Source,
    pub title: String,
    pub channel_name: String,
    pub video_url: String,
    pub thumbnail_url: Option<String>,
    /// For live content this is the scheduled or actual start time.
    pub published_at: DateTime<Utc>,
    /// `None` until the classifier has run.
    pub classification: Option<Classification>,
    pub posted: bool,
    pub posted_at: Option<DateTime<Utc>>,
    pub selected_for_post: bool,
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl VideoRecord {
    /// Create an unclassified record as produced by feed ingestion.
    pub fn new(
        video_id: impl Into<String>,
        source: Source,
        title: impl Into<String>,
        channel_name: impl Into<String>,
        video_url: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            video_id: video_id.into(),
            source,
            title: title.into(),
            channel_name: channel_name.into(),
            video_url: video_url.into(),
            thumbnail_url: None,
            published_at,
            classification: None,
            posted: false,
            posted_at: None,
            selected_for_post: false,
            scheduled_at: None,
        }
    }

    pub fn with_thumbnail(mut self, url: Option<String>) -> Self {
        self.thumbnail_url = url;
        self
    }

    pub fn with_classification(mut self, classification: Classification) -> Self {
        self.classification = Some(classification);
        self
    }

    pub fn content_type(&self) -> Option<ContentType> {
        self.classification.map(|c| c.content_type())
    }

    pub fn live_status(&self) -> Option<LiveStatus> {
        self.classification.and_then(|c| c.live_status())
    }

    pub fn is_premiere(&self) -> bool {
        self.classification.is_some_and(|c| c.is_premiere())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_invariant() {
        assert!(Classification::from_parts(ContentType::Video, None, false).is_ok());
        assert!(
            Classification::from_parts(ContentType::Live, Some(LiveStatus::Upcoming), true)
                .is_ok()
        );
        assert!(Classification::from_parts(ContentType::Video, Some(LiveStatus::Live), false)
            .is_err());
        assert!(Classification::from_parts(ContentType::Archive, None, false).is_err());
    }

    #[test]
    fn test_stored_premiere_flag_survives_on_video() {
        assert!(!Classification::video().is_premiere());
        let c = Classification::from_parts(ContentType::Video, None, true).unwrap();
        assert!(c.is_premiere());
        assert_eq!(c.stage(), (ContentType::Video, None));
    }

    #[test]
    fn test_trackable() {
        assert!(Classification::upcoming(false).is_trackable());
        assert!(Classification::live(false).is_trackable());
        assert!(!Classification::archive(true).is_trackable());
        assert!(!Classification::video().is_trackable());
    }

    #[test]
    fn test_enum_string_forms() {
        assert_eq!(Source::Youtube.to_string(), "youtube");
        assert_eq!("niconico".parse::<Source>().unwrap(), Source::Niconico);
        assert_eq!(ContentType::Archive.as_str(), "archive");
        assert_eq!("completed".parse::<LiveStatus>().unwrap(), LiveStatus::Completed);
        assert_eq!(
            serde_json::to_string(&LiveStatus::Upcoming).unwrap(),
            "\"upcoming\""
        );
    }
}
