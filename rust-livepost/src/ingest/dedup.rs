//! Collapsing records that describe the same broadcast.

use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::DedupDenylist;
use crate::domain::PriorityPolicy;
use crate::scheduler::PrefetchScheduler;
use crate::store::Store;
use crate::utils::SharedClock;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveReport {
    /// Duplicate groups found.
    pub groups: usize,
    /// Records deleted and denylisted.
    pub removed: usize,
}

/// Keeps the best record of every `(title, channel_name, source)` group and
/// denylists the rest so feeds cannot bring them back.
pub struct DuplicateResolver {
    store: Arc<Store>,
    denylist: Arc<DedupDenylist>,
    policy: PriorityPolicy,
    prefetch: Option<Arc<PrefetchScheduler>>,
    clock: SharedClock,
}

impl DuplicateResolver {
    pub fn new(
        store: Arc<Store>,
        denylist: Arc<DedupDenylist>,
        policy: PriorityPolicy,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            denylist,
            policy,
            prefetch: None,
            clock,
        }
    }

    pub fn with_prefetch(mut self, prefetch: Arc<PrefetchScheduler>) -> Self {
        self.prefetch = Some(prefetch);
        self
    }

    pub async fn resolve(&self) -> ResolveReport {
        let mut report = ResolveReport::default();
        let now = self.clock.now();

        for group in self.store.list_by_title_channel().await {
            let Some(resolution) = self.policy.resolve(group, now) else {
                continue;
            };
            report.groups += 1;

            for loser in resolution.discard {
                // Denylist before deleting so no feed poll can resurrect the row.
                if let Err(e) = self.denylist.add(&loser.video_id, loser.source) {
                    warn!(video_id = %loser.video_id, error = %e, "Failed to denylist duplicate");
                    continue;
                }
                if !self.store.delete_video(&loser.video_id, loser.source).await {
                    continue;
                }
                self.store.remove_live(&loser.video_id);
                if let Some(prefetch) = &self.prefetch {
                    prefetch.cancel(&loser.video_id);
                }

                info!(
                    kept = %resolution.keep.video_id,
                    removed = %loser.video_id,
                    title = %loser.title,
                    "Removed duplicate record"
                );
                report.removed += 1;
            }
        }

        report
    }
}
