//! Broadcast classification.
//!
//! Turns the relevant subset of a platform detail response into a
//! [`Classification`]. The function is pure: no I/O, no clock. Timing fields
//! are authoritative because they come from the platform's own lifecycle
//! tracking; the coarse broadcast flag is only a fallback for sparse payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Classification;

/// Coarse `snippet.liveBroadcastContent` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastFlag {
    /// Field present with value `"none"`, or absent.
    #[default]
    None,
    Upcoming,
    Live,
    Completed,
    /// Any value the platform has not documented.
    Unknown,
}

impl BroadcastFlag {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None => Self::None,
            Some(s) => match s.trim().to_ascii_lowercase().as_str() {
                "none" | "" => Self::None,
                "upcoming" => Self::Upcoming,
                "live" => Self::Live,
                "completed" => Self::Completed,
                _ => Self::Unknown,
            },
        }
    }

    fn is_live_or_upcoming(&self) -> bool {
        matches!(self, Self::Live | Self::Upcoming)
    }
}

/// `status.uploadStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Processed,
    Uploaded,
    Failed,
    Rejected,
    Deleted,
    Other,
}

impl UploadStatus {
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        raw.map(|s| match s.trim().to_ascii_lowercase().as_str() {
            "processed" => Self::Processed,
            "uploaded" => Self::Uploaded,
            "failed" => Self::Failed,
            "rejected" => Self::Rejected,
            "deleted" => Self::Deleted,
            _ => Self::Other,
        })
    }
}

/// `liveStreamingDetails` timing fields.
///
/// A `LiveTiming` value exists whenever the platform returned a non-empty
/// details object, even if none of the three timestamps parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LiveTiming {
    pub scheduled_start: Option<DateTime<Utc>>,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,
}

/// Typed subset of a per-video detail response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DetailPayload {
    pub video_id: String,
    pub broadcast: BroadcastFlag,
    pub upload_status: Option<UploadStatus>,
    pub timing: Option<LiveTiming>,
    pub title: Option<String>,
    pub channel_title: Option<String>,
    pub thumbnail_url: Option<String>,
}

impl DetailPayload {
    pub fn new(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            ..Default::default()
        }
    }

    pub fn with_broadcast(mut self, flag: BroadcastFlag) -> Self {
        self.broadcast = flag;
        self
    }

    pub fn with_upload_status(mut self, status: UploadStatus) -> Self {
        self.upload_status = Some(status);
        self
    }

    pub fn with_timing(mut self, timing: LiveTiming) -> Self {
        self.timing = Some(timing);
        self
    }

    pub fn scheduled_start(&self) -> Option<DateTime<Utc>> {
        self.timing.and_then(|t| t.scheduled_start)
    }

    pub fn actual_end(&self) -> Option<DateTime<Utc>> {
        self.timing.and_then(|t| t.actual_end)
    }

    /// Best "when this matters" timestamp: actual start, else scheduled start.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.timing
            .and_then(|t| t.actual_start.or(t.scheduled_start))
    }
}

/// Premiere eligibility, computed independently of the stage.
fn is_premiere(payload: &DetailPayload) -> bool {
    let Some(timing) = payload.timing else {
        return false;
    };

    if timing.actual_end.is_some() {
        return true;
    }

    payload.upload_status == Some(UploadStatus::Processed)
        && payload.broadcast.is_live_or_upcoming()
}

/// Classify a detail payload. First matching rule wins.
pub fn classify(payload: &DetailPayload) -> Classification {
    let premiere = is_premiere(payload);

    if let Some(timing) = payload.timing {
        if timing.actual_end.is_some() {
            return Classification::archive(premiere);
        }
        if timing.actual_start.is_some() {
            return Classification::live(premiere);
        }
        if timing.scheduled_start.is_some() {
            return Classification::upcoming(premiere);
        }
    }

    match payload.broadcast {
        BroadcastFlag::Live => Classification::live(premiere),
        BroadcastFlag::Upcoming => Classification::upcoming(premiere),
        // "completed" without timing details stays an ordinary video.
        BroadcastFlag::Completed | BroadcastFlag::None | BroadcastFlag::Unknown => {
            Classification::video()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ContentType, LiveStatus};
    use chrono::TimeZone;

    fn ts(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, h, 0, 0).unwrap()
    }

    fn triple(c: Classification) -> (ContentType, Option<LiveStatus>, bool) {
        (c.content_type(), c.live_status(), c.is_premiere())
    }

    #[test]
    fn test_live_with_actual_start() {
        let payload = DetailPayload::new("v1")
            .with_broadcast(BroadcastFlag::Live)
            .with_upload_status(UploadStatus::Processed)
            .with_timing(LiveTiming {
                actual_start: Some(ts(10)),
                ..Default::default()
            });

        assert_eq!(
            triple(classify(&payload)),
            (ContentType::Live, Some(LiveStatus::Live), true)
        );
    }

    #[test]
    fn test_gaining_end_time_becomes_archive() {
        let payload = DetailPayload::new("v1")
            .with_broadcast(BroadcastFlag::Live)
            .with_upload_status(UploadStatus::Processed)
            .with_timing(LiveTiming {
                actual_start: Some(ts(10)),
                actual_end: Some(ts(11)),
                ..Default::default()
            });

        assert_eq!(
            triple(classify(&payload)),
            (ContentType::Archive, Some(LiveStatus::Completed), true)
        );
    }

    #[test]
    fn test_end_time_beats_scheduled_start() {
        for flag in [
            BroadcastFlag::None,
            BroadcastFlag::Upcoming,
            BroadcastFlag::Live,
            BroadcastFlag::Completed,
            BroadcastFlag::Unknown,
        ] {
            let payload = DetailPayload::new("v")
                .with_broadcast(flag)
                .with_timing(LiveTiming {
                    scheduled_start: Some(ts(9)),
                    actual_end: Some(ts(12)),
                    ..Default::default()
                });
            let c = classify(&payload);
            assert_eq!(c.content_type(), ContentType::Archive, "flag {:?}", flag);
            assert_eq!(c.live_status(), Some(LiveStatus::Completed));
            // Concluded broadcasts with timing details are always premiere-eligible.
            assert!(c.is_premiere());
        }
    }

    #[test]
    fn test_scheduled_only_is_upcoming() {
        let payload = DetailPayload::new("v")
            .with_broadcast(BroadcastFlag::Upcoming)
            .with_upload_status(UploadStatus::Uploaded)
            .with_timing(LiveTiming {
                scheduled_start: Some(ts(20)),
                ..Default::default()
            });

        assert_eq!(
            triple(classify(&payload)),
            (ContentType::Live, Some(LiveStatus::Upcoming), false)
        );
    }

    #[test]
    fn test_flag_fallback_without_timing() {
        let live = DetailPayload::new("v").with_broadcast(BroadcastFlag::Live);
        assert_eq!(
            triple(classify(&live)),
            (ContentType::Live, Some(LiveStatus::Live), false)
        );

        let upcoming = DetailPayload::new("v").with_broadcast(BroadcastFlag::Upcoming);
        assert_eq!(
            triple(classify(&upcoming)),
            (ContentType::Live, Some(LiveStatus::Upcoming), false)
        );
    }

    #[test]
    fn test_completed_flag_without_details_is_video() {
        let payload = DetailPayload::new("v")
            .with_broadcast(BroadcastFlag::Completed)
            .with_upload_status(UploadStatus::Processed);
        assert_eq!(triple(classify(&payload)), (ContentType::Video, None, false));
    }

    #[test]
    fn test_empty_and_unknown_payloads_degrade_to_video() {
        assert_eq!(
            triple(classify(&DetailPayload::new("v"))),
            (ContentType::Video, None, false)
        );
        let unknown = DetailPayload::new("v").with_broadcast(BroadcastFlag::Unknown);
        assert_eq!(triple(classify(&unknown)), (ContentType::Video, None, false));
    }

    #[test]
    fn test_empty_timing_falls_through_to_flag() {
        // Details object present but no parseable timestamps.
        let payload = DetailPayload::new("v")
            .with_broadcast(BroadcastFlag::Upcoming)
            .with_upload_status(UploadStatus::Processed)
            .with_timing(LiveTiming::default());
        assert_eq!(
            triple(classify(&payload)),
            (ContentType::Live, Some(LiveStatus::Upcoming), true)
        );
    }

    #[test]
    fn test_premiere_requires_processed_and_details() {
        // No details object at all: never a premiere.
        let no_details = DetailPayload::new("v")
            .with_broadcast(BroadcastFlag::Upcoming)
            .with_upload_status(UploadStatus::Processed);
        assert!(!classify(&no_details).is_premiere());

        // Details present but not processed.
        let not_processed = DetailPayload::new("v")
            .with_broadcast(BroadcastFlag::Live)
            .with_upload_status(UploadStatus::Uploaded)
            .with_timing(LiveTiming {
                actual_start: Some(ts(1)),
                ..Default::default()
            });
        assert!(!classify(&not_processed).is_premiere());
    }

    #[test]
    fn test_classify_is_deterministic() {
        let payload = DetailPayload::new("v")
            .with_broadcast(BroadcastFlag::Live)
            .with_upload_status(UploadStatus::Processed)
            .with_timing(LiveTiming {
                scheduled_start: Some(ts(1)),
                actual_start: Some(ts(2)),
                actual_end: None,
            });
        let first = classify(&payload);
        for _ in 0..10 {
            assert_eq!(classify(&payload), first);
        }
    }

    #[test]
    fn test_flag_parsing() {
        assert_eq!(BroadcastFlag::parse(None), BroadcastFlag::None);
        assert_eq!(BroadcastFlag::parse(Some("none")), BroadcastFlag::None);
        assert_eq!(BroadcastFlag::parse(Some("LIVE")), BroadcastFlag::Live);
        assert_eq!(BroadcastFlag::parse(Some("bogus")), BroadcastFlag::Unknown);
        assert_eq!(UploadStatus::parse(Some("processed")), Some(UploadStatus::Processed));
        assert_eq!(UploadStatus::parse(Some("weird")), Some(UploadStatus::Other));
        assert_eq!(UploadStatus::parse(None), None);
    }

    #[test]
    fn test_start_time_prefers_actual() {
        let payload = DetailPayload::new("v").with_timing(LiveTiming {
            scheduled_start: Some(ts(1)),
            actual_start: Some(ts(2)),
            actual_end: None,
        });
        assert_eq!(payload.start_time(), Some(ts(2)));
        assert_eq!(payload.scheduled_start(), Some(ts(1)));
    }
}
