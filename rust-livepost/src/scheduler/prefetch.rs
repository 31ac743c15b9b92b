//! One-shot detail refresh shortly before a scheduled broadcast starts.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::Result;
use crate::domain::Source;
use crate::monitor::DetailFetcher;
use crate::store::Store;
use crate::utils::SharedClock;

pub const DEFAULT_PREFETCH_LEAD_MINUTES: i64 = 30;
pub const DEFAULT_PREFETCH_WORKERS: usize = 2;

/// Work performed when a prefetch job fires.
#[async_trait]
pub trait PrefetchHandler: Send + Sync {
    async fn prefetch(&self, video_id: &str, source: Source) -> Result<()>;
}

/// Refreshes the cached snapshot of a tracked video. Transitions are left
/// to the next poll, which sees the fresh snapshot.
pub struct SnapshotRefresher {
    fetcher: Arc<dyn DetailFetcher>,
    store: Arc<Store>,
}

impl SnapshotRefresher {
    pub fn new(fetcher: Arc<dyn DetailFetcher>, store: Arc<Store>) -> Self {
        Self { fetcher, store }
    }
}

#[async_trait]
impl PrefetchHandler for SnapshotRefresher {
    async fn prefetch(&self, video_id: &str, _source: Source) -> Result<()> {
        let ids = [video_id.to_string()];
        let payloads = self.fetcher.fetch_details(&ids).await?;
        match payloads.into_iter().find(|p| p.video_id == video_id) {
            Some(payload) => {
                self.store.refresh_live_snapshot(video_id, payload);
            }
            None => debug!(video_id, "Prefetch returned no payload"),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PrefetchConfig {
    /// How long before the scheduled start the job fires.
    pub lead: chrono::Duration,
    /// Maximum number of jobs running at once.
    pub workers: usize,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            lead: chrono::Duration::minutes(DEFAULT_PREFETCH_LEAD_MINUTES),
            workers: DEFAULT_PREFETCH_WORKERS,
        }
    }
}

struct Job {
    generation: u64,
    token: CancellationToken,
}

/// Keyed one-shot job scheduler with bounded concurrency.
///
/// At most one pending job exists per video id. A job is removed once it
/// has fired or been cancelled.
pub struct PrefetchScheduler {
    handler: Arc<dyn PrefetchHandler>,
    config: PrefetchConfig,
    permits: Arc<Semaphore>,
    jobs: Arc<DashMap<String, Job>>,
    next_generation: AtomicU64,
    clock: SharedClock,
    shutdown: CancellationToken,
}

impl PrefetchScheduler {
    pub fn new(handler: Arc<dyn PrefetchHandler>, config: PrefetchConfig, clock: SharedClock) -> Self {
        let workers = config.workers.max(1);
        Self {
            handler,
            config,
            permits: Arc::new(Semaphore::new(workers)),
            jobs: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
            clock,
            shutdown: CancellationToken::new(),
        }
    }

    /// Schedule a prefetch for a broadcast starting at `start`.
    ///
    /// Returns `false` when a job for this id is already pending or when
    /// `start` is not in the future. If the lead window has already begun
    /// the job fires immediately.
    pub fn schedule(&self, video_id: &str, source: Source, start: DateTime<Utc>) -> bool {
        let now = self.clock.now();
        if start <= now {
            debug!(video_id, %start, "Start time already passed, not scheduling prefetch");
            return false;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = self.shutdown.child_token();
        match self.jobs.entry(video_id.to_string()) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(slot) => {
                slot.insert(Job {
                    generation,
                    token: token.clone(),
                });
            }
        }

        let delay = start
            .checked_sub_signed(self.config.lead)
            .and_then(|fire_at| (fire_at - now).to_std().ok())
            .unwrap_or(Duration::ZERO);
        info!(video_id, %start, ?delay, "Scheduled prefetch");

        let handler = self.handler.clone();
        let permits = self.permits.clone();
        let jobs = self.jobs.clone();
        let video_id = video_id.to_string();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(video_id, "Prefetch cancelled before firing");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            let permit = tokio::select! {
                _ = token.cancelled() => return,
                permit = permits.acquire_owned() => permit,
            };
            // Fired: from here on the job can no longer be cancelled.
            jobs.remove_if(&video_id, |_, job| job.generation == generation);

            let Ok(_permit) = permit else {
                return;
            };
            debug!(video_id, "Prefetch firing");
            if let Err(e) = handler.prefetch(&video_id, source).await {
                warn!(video_id, error = %e, "Prefetch failed");
            }
        });

        true
    }

    /// Cancel a pending job. `false` if none was pending.
    pub fn cancel(&self, video_id: &str) -> bool {
        match self.jobs.remove(video_id) {
            Some((_, job)) => {
                job.token.cancel();
                debug!(video_id, "Prefetch job cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, video_id: &str) -> bool {
        self.jobs.contains_key(video_id)
    }

    pub fn pending(&self) -> usize {
        self.jobs.len()
    }

    /// Cancel every pending job.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.jobs.clear();
    }
}
