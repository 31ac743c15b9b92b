//! Priority ordering between records that describe the same broadcast.
//!
//! When a channel publishes both a placeholder upload and a live broadcast
//! with the same title, only one of them should survive. Records are ranked
//! so that the most "advanced" representation wins:
//!
//! | rank | records |
//! |------|---------|
//! | 4    | archives, anything with `live_status == completed` |
//! | 3    | live / upcoming broadcasts, premieres starting within the window |
//! | 1    | ordinary videos, premieres further out |
//!
//! Within a rank the content type breaks ties, then the video id. Only the
//! `(rank, content_type)` pair is meaningful; the id just makes the order
//! total so that selection is deterministic.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};

use super::video::{ContentType, LiveStatus, VideoRecord};

/// Default window ahead of "now" in which a premiere counts as live.
pub const DEFAULT_PREMIERE_WINDOW_MINUTES: i64 = 10;

const RANK_ARCHIVE: u8 = 4;
const RANK_LIVE: u8 = 3;
const RANK_VIDEO: u8 = 1;

/// Total-order key for a record. Larger wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityKey<'a> {
    pub rank: u8,
    pub content_type: ContentType,
    pub video_id: &'a str,
}

impl PartialOrd for PriorityKey<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriorityKey<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank
            .cmp(&other.rank)
            .then(self.content_type.cmp(&other.content_type))
            .then(self.video_id.cmp(other.video_id))
    }
}

/// Ranking rules with the premiere window as a tunable.
#[derive(Debug, Clone, Copy)]
pub struct PriorityPolicy {
    premiere_window: Duration,
}

impl Default for PriorityPolicy {
    fn default() -> Self {
        Self::with_premiere_window(Duration::minutes(DEFAULT_PREMIERE_WINDOW_MINUTES))
    }
}

/// Outcome of resolving a group of duplicates.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub keep: VideoRecord,
    pub discard: Vec<VideoRecord>,
}

impl PriorityPolicy {
    pub fn with_premiere_window(premiere_window: Duration) -> Self {
        Self { premiere_window }
    }

    pub fn premiere_window(&self) -> Duration {
        self.premiere_window
    }

    /// Numeric rank of a record at time `now`.
    pub fn rank(&self, record: &VideoRecord, now: DateTime<Utc>) -> u8 {
        let content_type = record.content_type();
        let live_status = record.live_status();

        if content_type == Some(ContentType::Archive) || live_status == Some(LiveStatus::Completed)
        {
            return RANK_ARCHIVE;
        }

        if content_type == Some(ContentType::Live)
            || matches!(live_status, Some(LiveStatus::Live | LiveStatus::Upcoming))
        {
            return RANK_LIVE;
        }

        // A window past the end of representable time covers everything.
        if record.is_premiere()
            && now
                .checked_add_signed(self.premiere_window)
                .is_none_or(|limit| record.published_at < limit)
        {
            return RANK_LIVE;
        }

        RANK_VIDEO
    }

    /// Full ordering key. Unclassified records order as videos.
    pub fn key<'a>(&self, record: &'a VideoRecord, now: DateTime<Utc>) -> PriorityKey<'a> {
        PriorityKey {
            rank: self.rank(record, now),
            content_type: record.content_type().unwrap_or(ContentType::Video),
            video_id: &record.video_id,
        }
    }

    /// Pick the record to keep among candidates. `None` only for an empty slice.
    pub fn select_best<'a>(
        &self,
        candidates: &'a [VideoRecord],
        now: DateTime<Utc>,
    ) -> Option<&'a VideoRecord> {
        candidates
            .iter()
            .max_by(|a, b| self.key(a, now).cmp(&self.key(b, now)))
    }

    /// Split candidates into the winner and everything else.
    pub fn resolve(&self, candidates: Vec<VideoRecord>, now: DateTime<Utc>) -> Option<Resolution> {
        let best_idx = candidates
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| self.key(a, now).cmp(&self.key(b, now)))
            .map(|(idx, _)| idx)?;

        let mut discard = candidates;
        let keep = discard.swap_remove(best_idx);
        Some(Resolution { keep, discard })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::video::{Classification, Source};

    fn record(id: &str, classification: Option<Classification>, published_at: DateTime<Utc>) -> VideoRecord {
        let mut r = VideoRecord::new(
            id,
            Source::Youtube,
            "Stream X",
            "Chan",
            format!("https://www.youtube.com/watch?v={id}"),
            published_at,
        );
        r.classification = classification;
        r
    }

    /// A video row flagged premiere, e.g. set by an operator ahead of the
    /// detail API catching up.
    fn premiere_video(id: &str, published_at: DateTime<Utc>) -> VideoRecord {
        record(
            id,
            Some(Classification::from_parts(ContentType::Video, None, true).unwrap()),
            published_at,
        )
    }

    #[test]
    fn test_rank_table() {
        let now = Utc::now();
        let policy = PriorityPolicy::default();

        assert_eq!(policy.rank(&record("a", Some(Classification::archive(false)), now), now), 4);
        assert_eq!(policy.rank(&record("b", Some(Classification::live(false)), now), now), 3);
        assert_eq!(policy.rank(&record("c", Some(Classification::upcoming(false)), now), now), 3);
        assert_eq!(policy.rank(&record("d", Some(Classification::video()), now), now), 1);
        assert_eq!(policy.rank(&record("e", None, now), now), 1);
        assert_eq!(policy.rank(&premiere_video("f", now + Duration::hours(3)), now), 1);
        assert_eq!(policy.rank(&premiere_video("g", now + Duration::minutes(5)), now), 3);
        assert_eq!(policy.rank(&premiere_video("h", now - Duration::minutes(30)), now), 3);
    }

    #[test]
    fn test_select_best_prefers_live_over_video() {
        let now = Utc::now();
        let policy = PriorityPolicy::default();
        let candidates = vec![
            record("vid", Some(Classification::video()), now),
            record("live", Some(Classification::upcoming(false)), now),
        ];

        let best = policy.select_best(&candidates, now).unwrap();
        assert_eq!(best.video_id, "live");
    }

    #[test]
    fn test_archive_beats_live() {
        let now = Utc::now();
        let policy = PriorityPolicy::default();
        let candidates = vec![
            record("z-live", Some(Classification::live(true)), now),
            record("a-archive", Some(Classification::archive(false)), now),
        ];

        let best = policy.select_best(&candidates, now).unwrap();
        assert_eq!(best.video_id, "a-archive");
    }

    #[test]
    fn test_select_best_is_permutation_stable() {
        let now = Utc::now();
        let policy = PriorityPolicy::default();
        let base = vec![
            record("1", Some(Classification::video()), now),
            record("2", Some(Classification::upcoming(false)), now),
            record("3", None, now),
            record("4", Some(Classification::live(false)), now),
        ];

        let expected = policy.select_best(&base, now).unwrap().classification;
        let mut rotated = base.clone();
        for _ in 0..rotated.len() {
            rotated.rotate_left(1);
            let best = policy.select_best(&rotated, now).unwrap();
            assert_eq!(best.classification, expected);
        }
        let mut reversed = base;
        reversed.reverse();
        assert_eq!(policy.select_best(&reversed, now).unwrap().classification, expected);
    }

    #[test]
    fn test_premiere_window_boundary() {
        let now = Utc::now();
        let policy = PriorityPolicy::default();
        // Window is half-open: exactly now + 10min is outside.
        assert_eq!(policy.rank(&premiere_video("p", now + Duration::minutes(10)), now), 1);
        assert_eq!(
            policy.rank(&premiere_video("p", now + Duration::minutes(10) - Duration::seconds(1)), now),
            3
        );
    }

    #[test]
    fn test_premiere_window_is_configurable() {
        let now = Utc::now();
        let r = premiere_video("p", now + Duration::minutes(20));
        assert_eq!(PriorityPolicy::default().rank(&r, now), 1);

        let wide = PriorityPolicy::with_premiere_window(Duration::minutes(30));
        assert_eq!(wide.premiere_window(), Duration::minutes(30));
        assert_eq!(wide.rank(&r, now), 3);

        let unbounded = PriorityPolicy::with_premiere_window(Duration::MAX);
        assert_eq!(unbounded.rank(&r, now), 3);
    }

    #[test]
    fn test_resolve_splits_winner_and_losers() {
        let now = Utc::now();
        let policy = PriorityPolicy::default();
        let resolution = policy
            .resolve(
                vec![
                    record("vid", Some(Classification::video()), now),
                    record("live", Some(Classification::upcoming(false)), now),
                    record("other", None, now),
                ],
                now,
            )
            .unwrap();

        assert_eq!(resolution.keep.video_id, "live");
        let mut discarded: Vec<_> = resolution.discard.iter().map(|r| r.video_id.as_str()).collect();
        discarded.sort();
        assert_eq!(discarded, vec!["other", "vid"]);
    }

    #[test]
    fn test_resolve_empty() {
        assert!(PriorityPolicy::default().resolve(Vec::new(), Utc::now()).is_none());
    }
}
