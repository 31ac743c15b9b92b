//! Kinds of outbound posts.

use serde::{Deserialize, Serialize};

use super::state::TransitionKind;
use super::video::{ContentType, LiveStatus};

/// What a notification announces. Also the unit of delivery bookkeeping:
/// each `(video, kind)` is delivered at most once.
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
    strum::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PostKind {
    /// A regular upload.
    Video,
    /// A newly scheduled broadcast or premiere.
    Schedule,
    /// A broadcast went live.
    Live,
    /// A broadcast concluded.
    LiveEnd,
    /// The archive of a concluded broadcast is available.
    Archive,
}

impl PostKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Schedule => "schedule",
            Self::Live => "live",
            Self::LiveEnd => "live_end",
            Self::Archive => "archive",
        }
    }

    /// Post kind announcing a record in the given stage.
    pub fn for_stage(content_type: ContentType, live_status: Option<LiveStatus>) -> Self {
        match (content_type, live_status) {
            (ContentType::Video, _) => Self::Video,
            (ContentType::Archive, _) => Self::Archive,
            (ContentType::Live, Some(LiveStatus::Upcoming)) => Self::Schedule,
            (ContentType::Live, Some(LiveStatus::Completed)) => Self::LiveEnd,
            (ContentType::Live, _) => Self::Live,
        }
    }

    pub fn for_transition(kind: TransitionKind) -> Self {
        match kind {
            TransitionKind::VideoPublished => Self::Video,
            TransitionKind::ScheduleDetected => Self::Schedule,
            TransitionKind::LiveStarted => Self::Live,
            TransitionKind::LiveEnded => Self::LiveEnd,
            TransitionKind::ArchiveAvailable => Self::Archive,
        }
    }
}
