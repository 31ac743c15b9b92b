//! Polling state machine.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::events::{DispatchReport, ListenerRegistry, TransitionEvent};
use super::fetcher::DetailFetcher;
use crate::cache::{CacheStatus, LiveCacheEntry};
use crate::classifier::{DetailPayload, classify};
use crate::domain::{
    BroadcastState, Classification, ContentType, LiveStatus, PostKind, TransitionKind,
    VideoRecord,
};
use crate::scheduler::PrefetchScheduler;
use crate::store::Store;
use crate::utils::SharedClock;

/// Counters for one poller pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Records or entries looked at.
    pub checked: usize,
    /// Detail payloads fetched from the platform.
    pub fetched: usize,
    /// Transition events emitted.
    pub events: usize,
}

impl PollSummary {
    fn merge(&mut self, other: PollSummary) {
        self.checked += other.checked;
        self.fetched += other.fetched;
        self.events += other.events;
    }
}

pub struct Poller {
    store: Arc<Store>,
    fetcher: Option<Arc<dyn DetailFetcher>>,
    listeners: Arc<ListenerRegistry>,
    prefetch: Option<Arc<PrefetchScheduler>>,
    clock: SharedClock,
}

/// `published_at` for live content follows the broadcast start.
fn effective_published_at(
    classification: &Classification,
    payload: &DetailPayload,
) -> Option<DateTime<Utc>> {
    match classification.content_type() {
        ContentType::Video => None,
        ContentType::Live | ContentType::Archive => payload.start_time(),
    }
}

/// Archive whose end time is known.
fn is_stable_archive(payload: &DetailPayload) -> bool {
    payload.actual_end().is_some() && classify(payload).content_type() == ContentType::Archive
}

impl Poller {
    pub fn new(
        store: Arc<Store>,
        fetcher: Option<Arc<dyn DetailFetcher>>,
        listeners: Arc<ListenerRegistry>,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            fetcher,
            listeners,
            prefetch: None,
            clock,
        }
    }

    pub fn with_prefetch(mut self, prefetch: Arc<PrefetchScheduler>) -> Self {
        self.prefetch = Some(prefetch);
        self
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Fetch payloads for `ids`, keyed by video id. The fetcher owns retries;
    /// a failure here is logged and yields an empty map, and the items are
    /// picked up again on the next tick.
    async fn fetch(&self, ids: Vec<String>) -> HashMap<String, DetailPayload> {
        let Some(fetcher) = self.fetcher.as_ref() else {
            return HashMap::new();
        };
        if ids.is_empty() {
            return HashMap::new();
        }

        match fetcher.fetch_details(&ids).await {
            Ok(payloads) => payloads
                .into_iter()
                .map(|p| (p.video_id.clone(), p))
                .collect(),
            Err(e) => {
                warn!(count = ids.len(), error = %e, "Detail fetch failed, skipping this tick");
                HashMap::new()
            }
        }
    }

    async fn emit(
        &self,
        kinds: &[TransitionKind],
        record: &VideoRecord,
        from: BroadcastState,
        to: BroadcastState,
    ) -> usize {
        for kind in kinds {
            self.dispatch(*kind, record, from, to).await;
        }
        kinds.len()
    }

    async fn dispatch(
        &self,
        kind: TransitionKind,
        record: &VideoRecord,
        from: BroadcastState,
        to: BroadcastState,
    ) -> DispatchReport {
        let event = TransitionEvent::new(kind, record.clone(), from, to, self.clock.now());
        info!(
            video_id = %record.video_id,
            kind = %kind,
            from = %from,
            to = %to,
            "Transition detected: {}",
            event.description()
        );
        self.listeners.dispatch(&event).await
    }

    fn schedule_prefetch(&self, record: &VideoRecord, payload: &DetailPayload) {
        if let Some(prefetch) = &self.prefetch
            && let Some(start) = payload.scheduled_start()
        {
            prefetch.schedule(&record.video_id, record.source, start);
        }
    }

    fn cancel_prefetch(&self, video_id: &str) {
        if let Some(prefetch) = &self.prefetch {
            prefetch.cancel(video_id);
        }
    }

    /// Classify every record the classifier has not seen yet.
    ///
    /// Only sources with a detail API are considered; without a configured
    /// fetcher this is a no-op.
    pub async fn poll_unclassified(&self) -> PollSummary {
        let mut summary = PollSummary::default();
        if self.fetcher.is_none() {
            return summary;
        }

        let records: Vec<VideoRecord> = self
            .store
            .get_unclassified()
            .await
            .into_iter()
            .filter(|r| r.source.has_detail_api())
            .collect();
        summary.checked = records.len();
        if records.is_empty() {
            return summary;
        }

        let mut payloads: HashMap<String, DetailPayload> = HashMap::new();
        let mut to_fetch = Vec::new();
        for record in &records {
            match self.store.fresh_live(&record.video_id) {
                Some(entry) => {
                    payloads.insert(record.video_id.clone(), entry.snapshot);
                }
                None => to_fetch.push(record.video_id.clone()),
            }
        }
        let fetched = self.fetch(to_fetch).await;
        summary.fetched = fetched.len();
        payloads.extend(fetched);

        for mut record in records {
            let Some(payload) = payloads.remove(&record.video_id) else {
                debug!(video_id = %record.video_id, "No detail payload, leaving unclassified");
                continue;
            };

            let classification = classify(&payload);
            let published_at = effective_published_at(&classification, &payload);
            if !self
                .store
                .update_classification(&record.video_id, record.source, classification, published_at)
                .await
            {
                continue;
            }
            record.classification = Some(classification);
            if let Some(at) = published_at {
                record.published_at = at;
            }

            let to = BroadcastState::from_classification(Some(&classification));
            match to {
                BroadcastState::Upcoming | BroadcastState::Live => {
                    self.store
                        .add_live(&record.video_id, record.source, payload.clone(), classification);
                    if to == BroadcastState::Upcoming {
                        self.schedule_prefetch(&record, &payload);
                    }
                }
                BroadcastState::Archived => {
                    self.store
                        .add_ended(&record.video_id, record.source, payload.clone(), classification);
                }
                BroadcastState::Video | BroadcastState::Unclassified => {}
            }

            let kinds = BroadcastState::Unclassified.transition_events(to);
            summary.events += self.emit(&kinds, &record, BroadcastState::Unclassified, to).await;
        }

        summary
    }

    /// Re-check every tracked entry and emit events for stage changes.
    ///
    /// Entries polled within the live TTL are re-evaluated from their cached
    /// snapshot instead of the API. An unchanged stage emits nothing.
    pub async fn poll_tracked(&self) -> PollSummary {
        let mut summary = PollSummary::default();
        let entries = self.store.get_by_cache_status(CacheStatus::Live);
        summary.checked = entries.len();
        if entries.is_empty() {
            return summary;
        }

        let now = self.clock.now();
        let ttl = self.store.live_cache().ttl().live;
        let stale: Vec<String> = entries
            .iter()
            .filter(|e| !e.is_fresh(ttl, now))
            .map(|e| e.video_id.clone())
            .collect();
        let mut fetched = self.fetch(stale).await;
        summary.fetched = fetched.len();

        for entry in entries {
            let (payload, was_fetched) = match fetched.remove(&entry.video_id) {
                Some(payload) => (payload, true),
                None if entry.is_fresh(ttl, now) => (entry.snapshot.clone(), false),
                None => continue,
            };
            summary.events += self.evaluate_tracked(entry, payload, was_fetched).await;
        }

        summary
    }

    async fn evaluate_tracked(
        &self,
        entry: LiveCacheEntry,
        payload: DetailPayload,
        was_fetched: bool,
    ) -> usize {
        let video_id = entry.video_id.as_str();
        let classification = classify(&payload);

        if classification.stage() == entry.classification.stage() {
            if was_fetched || classification != entry.classification {
                self.store.update_live(video_id, payload, classification);
            }
            return 0;
        }

        let Some(mut record) = self.store.get_video(video_id, entry.source).await else {
            debug!(video_id, "Tracked video no longer stored, dropping cache entry");
            self.store.remove_live(video_id);
            self.cancel_prefetch(video_id);
            return 0;
        };

        let from = BroadcastState::from_classification(Some(&entry.classification));
        let to = BroadcastState::from_classification(Some(&classification));
        if !from.can_transition_to(to) {
            warn!(video_id, from = %from, to = %to, "Ignoring impossible transition");
            return 0;
        }

        let published_at = effective_published_at(&classification, &payload);
        if !self
            .store
            .update_classification(video_id, entry.source, classification, published_at)
            .await
        {
            // Keep the old cache state so the transition is retried next tick.
            return 0;
        }
        record.classification = Some(classification);
        if let Some(at) = published_at {
            record.published_at = at;
        }

        match to {
            BroadcastState::Archived => {
                self.store.update_live(video_id, payload, classification);
                self.store.mark_ended(video_id);
                self.cancel_prefetch(video_id);
            }
            BroadcastState::Video | BroadcastState::Unclassified => {
                self.store.remove_live(video_id);
                self.cancel_prefetch(video_id);
            }
            BroadcastState::Live => {
                self.store.update_live(video_id, payload, classification);
                self.cancel_prefetch(video_id);
            }
            BroadcastState::Upcoming => {
                self.store.update_live(video_id, payload.clone(), classification);
                self.schedule_prefetch(&record, &payload);
            }
        }

        let kinds = from.transition_events(to);
        self.emit(&kinds, &record, from, to).await
    }

    /// Confirm archives of ended broadcasts and purge expired entries.
    ///
    /// `archive_available` never fires for a video whose archive post was
    /// already delivered. An entry is settled once a dispatch completes with
    /// no failing listener; until then it is retried every pass for as long
    /// as the entry stays in the cache.
    pub async fn process_ended_cache_entries(&self) -> PollSummary {
        let mut summary = PollSummary::default();
        let now = self.clock.now();
        let ttl = self.store.live_cache().ttl();

        let mut pending = Vec::new();
        for entry in self.store.get_by_cache_status(CacheStatus::Ended) {
            if entry.archive_notified {
                continue;
            }
            summary.checked += 1;
            if self
                .store
                .was_delivered(&entry.video_id, entry.source, PostKind::Archive)
                .await
            {
                self.store.mark_archive_notified(&entry.video_id);
                continue;
            }
            pending.push(entry);
        }

        let needs_fetch: Vec<String> = pending
            .iter()
            .filter(|e| self.fetcher.is_some() && !e.is_fresh(ttl.live, now))
            .map(|e| e.video_id.clone())
            .collect();
        let mut fetched = self.fetch(needs_fetch).await;
        summary.fetched = fetched.len();

        for entry in pending {
            let payload = match fetched.remove(&entry.video_id) {
                Some(payload) => {
                    self.store
                        .refresh_live_snapshot(&entry.video_id, payload.clone());
                    payload
                }
                None if self.fetcher.is_none() || entry.is_fresh(ttl.live, now) => {
                    entry.snapshot.clone()
                }
                None => continue,
            };

            if !is_stable_archive(&payload) {
                debug!(video_id = %entry.video_id, "Archive not stable yet");
                continue;
            }

            let Some(record) = self.store.get_video(&entry.video_id, entry.source).await else {
                self.store.remove_live(&entry.video_id);
                continue;
            };

            let report = self
                .dispatch(
                    TransitionKind::ArchiveAvailable,
                    &record,
                    BroadcastState::Archived,
                    BroadcastState::Archived,
                )
                .await;
            summary.events += 1;
            if report.failed == 0 {
                self.store.mark_archive_notified(&entry.video_id);
            } else {
                debug!(video_id = %entry.video_id, "Archive dispatch incomplete, retrying next pass");
            }
        }

        let purged = self.store.clear_ended(ttl.ended);
        if !purged.is_empty() {
            debug!(count = purged.len(), "Purged ended cache entries");
        }

        summary
    }

    /// One full pass: classify new records, re-check tracked ones, then
    /// settle ended broadcasts.
    pub async fn tick(&self) -> PollSummary {
        let mut summary = self.poll_unclassified().await;
        summary.merge(self.poll_tracked().await);
        summary.merge(self.process_ended_cache_entries().await);
        summary
    }

    /// Re-seed cache entries for stored upcoming/live records that have none,
    /// e.g. after the cache file was lost. The stored classification becomes
    /// the baseline the next poll compares against, so no event fires here.
    pub async fn resync_tracked(&self) -> usize {
        if self.fetcher.is_none() {
            return 0;
        }

        let mut missing = Vec::new();
        for status in [LiveStatus::Upcoming, LiveStatus::Live] {
            for record in self.store.get_by_live_status(status).await {
                if record.source.has_detail_api() && self.store.get_live(&record.video_id).is_none() {
                    missing.push(record);
                }
            }
        }
        if missing.is_empty() {
            return 0;
        }

        let mut fetched = self
            .fetch(missing.iter().map(|r| r.video_id.clone()).collect())
            .await;
        let mut seeded = 0;
        for record in missing {
            let (Some(payload), Some(classification)) =
                (fetched.remove(&record.video_id), record.classification)
            else {
                continue;
            };
            if self
                .store
                .add_live(&record.video_id, record.source, payload.clone(), classification)
            {
                seeded += 1;
                if classification.live_status() == Some(LiveStatus::Upcoming) {
                    self.schedule_prefetch(&record, &payload);
                }
            }
        }
        info!(seeded, "Re-seeded live cache from stored records");
        seeded
    }
}
