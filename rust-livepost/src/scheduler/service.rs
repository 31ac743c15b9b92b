//! Periodic polling loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::ingest::{DuplicateResolver, FeedSource, IngestReport, Ingestor, ResolveReport};
use crate::monitor::{PollSummary, Poller};

/// Everything one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub ingest: IngestReport,
    pub duplicates: ResolveReport,
    pub poll: PollSummary,
}

/// Drives ingestion, duplicate resolution and the poller on a fixed interval.
pub struct PollingService {
    interval: Duration,
    feeds: Vec<Arc<dyn FeedSource>>,
    ingestor: Arc<Ingestor>,
    resolver: Arc<DuplicateResolver>,
    poller: Arc<Poller>,
}

impl PollingService {
    pub fn new(
        interval: Duration,
        feeds: Vec<Arc<dyn FeedSource>>,
        ingestor: Arc<Ingestor>,
        resolver: Arc<DuplicateResolver>,
        poller: Arc<Poller>,
    ) -> Self {
        Self {
            interval,
            feeds,
            ingestor,
            resolver,
            poller,
        }
    }

    /// Run a single tick. Each stage logs and absorbs its own failures.
    pub async fn tick(&self) -> TickReport {
        let ingest = self.ingestor.ingest_feeds(&self.feeds).await;
        let duplicates = self.resolver.resolve().await;
        let poll = self.poller.tick().await;

        let report = TickReport {
            ingest,
            duplicates,
            poll,
        };
        debug!(?report, "Polling tick finished");
        report
    }

    /// Tick until `cancel` fires. The first tick runs immediately; ticks
    /// that fall behind are skipped rather than bunched up.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            feeds = self.feeds.len(),
            "Polling service started"
        );

        self.poller.resync_tracked().await;

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        info!("Polling service stopped");
    }
}
