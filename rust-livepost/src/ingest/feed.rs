//! Turning feed entries into stored records.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::Result;
use crate::cache::DedupDenylist;
use crate::domain::{BroadcastState, Classification, Source, VideoRecord};
use crate::monitor::{ListenerRegistry, TransitionEvent};
use crate::store::Store;
use crate::utils::SharedClock;

/// One item as listed by a platform feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub video_id: String,
    pub source: Source,
    pub title: String,
    pub video_url: String,
    pub published_at: DateTime<Utc>,
    pub channel_name: String,
    pub thumbnail_url: Option<String>,
}

impl FeedEntry {
    /// Initial record for this entry. Sources without a detail API cannot
    /// be classified later, so they start as ordinary videos.
    pub fn into_record(self) -> VideoRecord {
        let source = self.source;
        let record = VideoRecord::new(
            self.video_id,
            self.source,
            self.title,
            self.channel_name,
            self.video_url,
            self.published_at,
        )
        .with_thumbnail(self.thumbnail_url);

        if source.has_detail_api() {
            record
        } else {
            record.with_classification(Classification::video())
        }
    }
}

/// A pollable feed (one channel or user).
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Label used in logs.
    fn name(&self) -> String;

    async fn fetch_entries(&self) -> Result<Vec<FeedEntry>>;
}

/// Counts of one ingestion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub inserted: usize,
    pub existing: usize,
    pub denied: usize,
}

impl IngestReport {
    pub fn merge(&mut self, other: IngestReport) {
        self.inserted += other.inserted;
        self.existing += other.existing;
        self.denied += other.denied;
    }
}

pub struct Ingestor {
    store: Arc<Store>,
    denylist: Arc<DedupDenylist>,
    listeners: Arc<ListenerRegistry>,
    clock: SharedClock,
}

impl Ingestor {
    pub fn new(
        store: Arc<Store>,
        denylist: Arc<DedupDenylist>,
        listeners: Arc<ListenerRegistry>,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            denylist,
            listeners,
            clock,
        }
    }

    /// Insert new entries. Denied ids are dropped silently; ids already
    /// stored are left untouched.
    pub async fn ingest(&self, entries: Vec<FeedEntry>) -> IngestReport {
        let mut report = IngestReport::default();

        for entry in entries {
            if self.denylist.is_denied(&entry.video_id, entry.source) {
                debug!(video_id = %entry.video_id, source = %entry.source, "Skipping denied video");
                report.denied += 1;
                continue;
            }

            let record = entry.into_record();
            if !self.store.insert_video(&record).await {
                report.existing += 1;
                continue;
            }
            report.inserted += 1;
            debug!(video_id = %record.video_id, title = %record.title, "Ingested video");

            // Pre-classified records never pass through the poller.
            if let Some(classification) = record.classification {
                let to = BroadcastState::from_classification(Some(&classification));
                for kind in BroadcastState::Unclassified.transition_events(to) {
                    let event = TransitionEvent::new(
                        kind,
                        record.clone(),
                        BroadcastState::Unclassified,
                        to,
                        self.clock.now(),
                    );
                    self.listeners.dispatch(&event).await;
                }
            }
        }

        if report.inserted > 0 || report.denied > 0 {
            info!(
                inserted = report.inserted,
                existing = report.existing,
                denied = report.denied,
                "Ingestion finished"
            );
        }
        report
    }

    /// Fetch and ingest every feed. A failing feed is logged and skipped.
    pub async fn ingest_feeds(&self, feeds: &[Arc<dyn FeedSource>]) -> IngestReport {
        let mut report = IngestReport::default();
        for feed in feeds {
            match feed.fetch_entries().await {
                Ok(entries) => report.merge(self.ingest(entries).await),
                Err(e) => warn!(feed = %feed.name(), error = %e, "Feed fetch failed"),
            }
        }
        report
    }
}
