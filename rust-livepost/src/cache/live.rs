//! Short-lived polling cache for broadcasts that are being tracked.
//!
//! Keeps the last detail snapshot per video so the poller can skip API
//! calls inside the TTL window, and so that polling noise never reaches the
//! durable video table until a transition is confirmed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Result;
use crate::classifier::DetailPayload;
use crate::domain::{Classification, Source};
use crate::utils::SharedClock;
use crate::utils::fs::{read_json_or_default, write_json_atomic};

/// Default freshness window of a tracked entry.
pub const DEFAULT_LIVE_TTL: Duration = Duration::from_secs(5 * 60);
/// Default retention of an ended entry.
pub const DEFAULT_ENDED_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Still being polled (upcoming or live).
    Live,
    /// Concluded; waiting for archive confirmation and cleanup.
    Ended,
}

#[derive(Debug, Clone, Copy)]
pub struct CacheTtl {
    pub live: Duration,
    pub ended: Duration,
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self {
            live: DEFAULT_LIVE_TTL,
            ended: DEFAULT_ENDED_TTL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveCacheEntry {
    pub video_id: String,
    pub source: Source,
    /// Last detail payload fetched for this video.
    pub snapshot: DetailPayload,
    /// Classification last confirmed by the poller. Transitions are
    /// detected against this, not against the snapshot.
    pub classification: Classification,
    pub status: CacheStatus,
    pub poll_count: u32,
    pub cached_at: DateTime<Utc>,
    pub last_polled_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// Set once `archive_available` has been emitted for this entry.
    #[serde(default)]
    pub archive_notified: bool,
}

impl LiveCacheEntry {
    /// Whether the snapshot is younger than `ttl` at `now`.
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.last_polled_at);
        chrono::Duration::from_std(ttl).is_ok_and(|ttl| age < ttl)
    }
}

type Entries = BTreeMap<String, LiveCacheEntry>;

/// JSON-file backed live-status cache keyed by video id.
pub struct LiveCache {
    path: PathBuf,
    ttl: CacheTtl,
    clock: SharedClock,
    entries: Mutex<Entries>,
}

impl LiveCache {
    /// Load the cache from `path`. Missing or corrupt files start empty.
    pub fn load(path: impl Into<PathBuf>, ttl: CacheTtl, clock: SharedClock) -> Self {
        let path = path.into();
        let entries: Entries = read_json_or_default(&path);
        debug!(path = %path.display(), entries = entries.len(), "Loaded live cache");
        Self {
            path,
            ttl,
            clock,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ttl(&self) -> CacheTtl {
        self.ttl
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Apply `f` to a copy of the entries and swap it in once persisted.
    /// On a failed write the in-memory state is left untouched.
    fn mutate<R>(&self, f: impl FnOnce(&mut Entries, DateTime<Utc>) -> R) -> Result<R> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let mut next = entries.clone();
        let out = f(&mut next, now);
        write_json_atomic(&self.path, &next)?;
        *entries = next;
        Ok(out)
    }

    /// Start tracking a video, replacing any previous entry.
    pub fn add(
        &self,
        video_id: &str,
        source: Source,
        snapshot: DetailPayload,
        classification: Classification,
        status: CacheStatus,
    ) -> Result<()> {
        self.mutate(|entries, now| {
            entries.insert(
                video_id.to_string(),
                LiveCacheEntry {
                    video_id: video_id.to_string(),
                    source,
                    snapshot,
                    classification,
                    status,
                    poll_count: 1,
                    cached_at: now,
                    last_polled_at: now,
                    ended_at: (status == CacheStatus::Ended).then_some(now),
                    archive_notified: false,
                },
            );
        })
    }

    /// Record a poll result. `false` if the video is not tracked.
    pub fn update(
        &self,
        video_id: &str,
        snapshot: DetailPayload,
        classification: Classification,
    ) -> Result<bool> {
        self.mutate(|entries, now| match entries.get_mut(video_id) {
            Some(entry) => {
                entry.snapshot = snapshot;
                entry.classification = classification;
                entry.poll_count = entry.poll_count.saturating_add(1);
                entry.last_polled_at = now;
                true
            }
            None => false,
        })
    }

    /// Replace only the snapshot, leaving the confirmed classification for
    /// the next poll to compare against.
    pub fn refresh_snapshot(&self, video_id: &str, snapshot: DetailPayload) -> Result<bool> {
        self.mutate(|entries, now| match entries.get_mut(video_id) {
            Some(entry) => {
                entry.snapshot = snapshot;
                entry.last_polled_at = now;
                true
            }
            None => false,
        })
    }

    pub fn mark_ended(&self, video_id: &str) -> Result<bool> {
        self.mutate(|entries, now| match entries.get_mut(video_id) {
            Some(entry) => {
                if entry.status != CacheStatus::Ended {
                    entry.status = CacheStatus::Ended;
                    entry.ended_at = Some(now);
                }
                true
            }
            None => false,
        })
    }

    pub fn mark_archive_notified(&self, video_id: &str) -> Result<bool> {
        self.mutate(|entries, _| match entries.get_mut(video_id) {
            Some(entry) => {
                entry.archive_notified = true;
                true
            }
            None => false,
        })
    }

    pub fn remove(&self, video_id: &str) -> Result<bool> {
        self.mutate(|entries, _| entries.remove(video_id).is_some())
    }

    pub fn get(&self, video_id: &str) -> Option<LiveCacheEntry> {
        self.entries.lock().get(video_id).cloned()
    }

    pub fn by_status(&self, status: CacheStatus) -> Vec<LiveCacheEntry> {
        self.entries
            .lock()
            .values()
            .filter(|e| e.status == status)
            .cloned()
            .collect()
    }

    /// Entry for `video_id` if its snapshot is still within the live TTL.
    pub fn fresh(&self, video_id: &str) -> Option<LiveCacheEntry> {
        let now = self.clock.now();
        self.get(video_id)
            .filter(|e| e.is_fresh(self.ttl.live, now))
    }

    /// Drop ended entries whose end lies at least `max_age` in the past.
    /// Returns the removed video ids.
    pub fn clear_ended(&self, max_age: Duration) -> Result<Vec<String>> {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        self.mutate(|entries, now| {
            let expired: Vec<String> = entries
                .values()
                .filter(|e| e.status == CacheStatus::Ended)
                .filter(|e| {
                    e.ended_at
                        .is_some_and(|ended| now.signed_duration_since(ended) >= max_age)
                })
                .map(|e| e.video_id.clone())
                .collect();
            for id in &expired {
                entries.remove(id);
            }
            expired
        })
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
