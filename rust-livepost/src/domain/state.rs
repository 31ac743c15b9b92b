//! Per-video tracking state.

use serde::{Deserialize, Serialize};

use super::video::{Classification, ContentType, LiveStatus};

/// Where a video sits in the polling state machine.
///
/// `Video` and `Archived` are terminal: once reached, the video is no
/// longer polled.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BroadcastState {
    /// Ingested, classifier has not run yet.
    Unclassified,
    /// Ordinary upload.
    Video,
    /// Scheduled broadcast or premiere that has not started.
    Upcoming,
    /// Broadcast in progress.
    Live,
    /// Broadcast concluded.
    Archived,
}

impl BroadcastState {
    pub fn from_classification(classification: Option<&Classification>) -> Self {
        let Some(c) = classification else {
            return Self::Unclassified;
        };
        match c.stage() {
            (ContentType::Video, _) => Self::Video,
            (_, Some(LiveStatus::Upcoming)) => Self::Upcoming,
            (_, Some(LiveStatus::Live)) => Self::Live,
            (ContentType::Archive, _) | (_, Some(LiveStatus::Completed)) => Self::Archived,
            // Unreachable under the classification invariant.
            (ContentType::Live, None) => Self::Unclassified,
        }
    }

    /// Events implied by moving from `self` to `to`.
    ///
    /// `ArchiveAvailable` is never produced here: it is confirmed separately
    /// once an ended broadcast's archive has been re-checked.
    pub fn transition_events(&self, to: BroadcastState) -> Vec<TransitionKind> {
        use BroadcastState::*;
        match (self, to) {
            (a, b) if *a == b => Vec::new(),
            (Unclassified, Video) => vec![TransitionKind::VideoPublished],
            (Unclassified, Upcoming) => vec![TransitionKind::ScheduleDetected],
            (Unclassified | Upcoming, Live) => vec![TransitionKind::LiveStarted],
            (Upcoming | Live, Archived) => vec![TransitionKind::LiveEnded],
            _ => Vec::new(),
        }
    }

    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: BroadcastState) -> bool {
        use BroadcastState::*;
        match (self, target) {
            (Unclassified, Unclassified) => false,
            (Unclassified, _) => true,
            // A scheduled stream can start, finish without being observed
            // live, or be withdrawn back to an ordinary upload.
            (Upcoming, Live | Archived | Video) => true,
            // Rescheduling after a false start.
            (Live, Upcoming | Archived | Video) => true,
            _ => false,
        }
    }
}

/// Kind of a detected state change, as delivered to listeners.
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
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// A new ordinary upload was classified.
    VideoPublished,
    /// A new broadcast was found scheduled.
    ScheduleDetected,
    LiveStarted,
    LiveEnded,
    /// The archive of a concluded broadcast is confirmed stable.
    ArchiveAvailable,
}

impl TransitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VideoPublished => "video_published",
            Self::ScheduleDetected => "schedule_detected",
            Self::LiveStarted => "live_started",
            Self::LiveEnded => "live_ended",
            Self::ArchiveAvailable => "archive_available",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_classification() {
        assert_eq!(
            BroadcastState::from_classification(None),
            BroadcastState::Unclassified
        );
        assert_eq!(
            BroadcastState::from_classification(Some(&Classification::video())),
            BroadcastState::Video
        );
        assert_eq!(
            BroadcastState::from_classification(Some(&Classification::upcoming(true))),
            BroadcastState::Upcoming
        );
        assert_eq!(
            BroadcastState::from_classification(Some(&Classification::live(false))),
            BroadcastState::Live
        );
        assert_eq!(
            BroadcastState::from_classification(Some(&Classification::archive(false))),
            BroadcastState::Archived
        );
    }

    #[test]
    fn test_terminal_states_do_not_transition() {
        for target in [
            BroadcastState::Upcoming,
            BroadcastState::Live,
            BroadcastState::Archived,
            BroadcastState::Video,
        ] {
            assert!(!BroadcastState::Video.can_transition_to(target));
            assert!(!BroadcastState::Archived.can_transition_to(target));
        }
    }

    #[test]
    fn test_forward_transitions() {
        assert!(BroadcastState::Unclassified.can_transition_to(BroadcastState::Upcoming));
        assert!(BroadcastState::Upcoming.can_transition_to(BroadcastState::Live));
        assert!(BroadcastState::Upcoming.can_transition_to(BroadcastState::Archived));
        assert!(BroadcastState::Live.can_transition_to(BroadcastState::Archived));
        assert!(!BroadcastState::Live.can_transition_to(BroadcastState::Live));
    }

    #[test]
    fn test_transition_events() {
        use BroadcastState::*;
        assert_eq!(
            Unclassified.transition_events(Upcoming),
            vec![TransitionKind::ScheduleDetected]
        );
        assert_eq!(
            Upcoming.transition_events(Live),
            vec![TransitionKind::LiveStarted]
        );
        assert_eq!(Live.transition_events(Archived), vec![TransitionKind::LiveEnded]);
        assert_eq!(
            Upcoming.transition_events(Archived),
            vec![TransitionKind::LiveEnded]
        );
        assert!(Live.transition_events(Live).is_empty());
        assert!(Live.transition_events(Upcoming).is_empty());
        assert!(Upcoming.transition_events(Video).is_empty());
        assert_eq!(
            Unclassified.transition_events(Video),
            vec![TransitionKind::VideoPublished]
        );
        assert!(Unclassified.transition_events(Archived).is_empty());
    }

    #[test]
    fn test_transition_kind_strings() {
        assert_eq!(TransitionKind::LiveEnded.to_string(), "live_ended");
        assert_eq!(
            "archive_available".parse::<TransitionKind>().unwrap(),
            TransitionKind::ArchiveAvailable
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(BroadcastState::Archived.to_string(), "ARCHIVED");
    }
}
