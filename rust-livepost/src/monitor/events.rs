//! Transition events and the listener registry they fan out through.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::Result;
use crate::domain::{BroadcastState, TransitionKind, VideoRecord};

/// A detected state change of one video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub kind: TransitionKind,
    /// Record as classified after the transition.
    pub record: VideoRecord,
    pub from: BroadcastState,
    pub to: BroadcastState,
    pub timestamp: DateTime<Utc>,
}

impl TransitionEvent {
    pub fn new(
        kind: TransitionKind,
        record: VideoRecord,
        from: BroadcastState,
        to: BroadcastState,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            record,
            from,
            to,
            timestamp,
        }
    }

    pub fn video_id(&self) -> &str {
        &self.record.video_id
    }

    /// Get a human-readable description of the event.
    pub fn description(&self) -> String {
        match self.kind {
            TransitionKind::VideoPublished => {
                format!("{} uploaded: {}", self.record.channel_name, self.record.title)
            }
            TransitionKind::ScheduleDetected => {
                format!("{} scheduled: {}", self.record.channel_name, self.record.title)
            }
            TransitionKind::LiveStarted => {
                format!("{} is now live: {}", self.record.channel_name, self.record.title)
            }
            TransitionKind::LiveEnded => {
                format!("{} ended: {}", self.record.channel_name, self.record.title)
            }
            TransitionKind::ArchiveAvailable => {
                format!("Archive available: {}", self.record.title)
            }
        }
    }
}

/// Receives transition events.
#[async_trait]
pub trait TransitionListener: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn on_transition(&self, event: &TransitionEvent) -> Result<()>;
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub succeeded: usize,
    pub failed: usize,
}

/// Ordered listener lists per transition kind.
///
/// Listeners for a kind run one after another in registration order. A
/// listener that returns an error or panics is logged and skipped; the
/// remaining listeners still run and the caller never sees the failure.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<HashMap<TransitionKind, Vec<Arc<dyn TransitionListener>>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, kind: TransitionKind, listener: Arc<dyn TransitionListener>) {
        debug!(listener = listener.name(), kind = %kind, "Registered transition listener");
        self.listeners.write().entry(kind).or_default().push(listener);
    }

    /// Register one listener for several kinds.
    pub fn register_many(
        &self,
        kinds: impl IntoIterator<Item = TransitionKind>,
        listener: Arc<dyn TransitionListener>,
    ) {
        for kind in kinds {
            self.register(kind, listener.clone());
        }
    }

    pub fn listener_count(&self, kind: TransitionKind) -> usize {
        self.listeners.read().get(&kind).map_or(0, Vec::len)
    }

    pub async fn dispatch(&self, event: &TransitionEvent) -> DispatchReport {
        // Snapshot so no lock is held across listener awaits.
        let listeners = self
            .listeners
            .read()
            .get(&event.kind)
            .cloned()
            .unwrap_or_default();

        let mut report = DispatchReport::default();
        for listener in listeners {
            let outcome = AssertUnwindSafe(listener.on_transition(event))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => report.succeeded += 1,
                Ok(Err(e)) => {
                    warn!(
                        listener = listener.name(),
                        kind = %event.kind,
                        video_id = event.video_id(),
                        error = %e,
                        "Transition listener failed"
                    );
                    report.failed += 1;
                }
                Err(_) => {
                    error!(
                        listener = listener.name(),
                        kind = %event.kind,
                        video_id = event.video_id(),
                        "Transition listener panicked"
                    );
                    report.failed += 1;
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::domain::Source;
    use parking_lot::Mutex;

    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl TransitionListener for Recording {
        fn name(&self) -> &str {
            self.name
        }

        async fn on_transition(&self, _event: &TransitionEvent) -> Result<()> {
            self.log.lock().push(self.name);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl TransitionListener for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn on_transition(&self, _event: &TransitionEvent) -> Result<()> {
            Err(Error::Other("listener exploded".into()))
        }
    }

    struct Panicking;

    #[async_trait]
    impl TransitionListener for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn on_transition(&self, _event: &TransitionEvent) -> Result<()> {
            panic!("listener panicked");
        }
    }

    fn event(kind: TransitionKind) -> TransitionEvent {
        TransitionEvent::new(
            kind,
            VideoRecord::new("v1", Source::Youtube, "Stream", "Chan", "url", Utc::now()),
            BroadcastState::Upcoming,
            BroadcastState::Live,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_dispatch_runs_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = ListenerRegistry::new();
        for name in ["first", "second", "third"] {
            registry.register(
                TransitionKind::LiveStarted,
                Arc::new(Recording {
                    name,
                    log: log.clone(),
                }),
            );
        }

        let report = registry.dispatch(&event(TransitionKind::LiveStarted)).await;
        assert_eq!(report.succeeded, 3);
        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = ListenerRegistry::new();
        registry.register(TransitionKind::LiveEnded, Arc::new(Failing));
        registry.register(TransitionKind::LiveEnded, Arc::new(Panicking));
        registry.register(
            TransitionKind::LiveEnded,
            Arc::new(Recording {
                name: "after",
                log: log.clone(),
            }),
        );

        let report = registry.dispatch(&event(TransitionKind::LiveEnded)).await;
        assert_eq!(report, DispatchReport { succeeded: 1, failed: 2 });
        assert_eq!(*log.lock(), vec!["after"]);
    }

    #[tokio::test]
    async fn test_only_listeners_for_kind_run() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = ListenerRegistry::new();
        registry.register(
            TransitionKind::ArchiveAvailable,
            Arc::new(Recording {
                name: "archive",
                log: log.clone(),
            }),
        );

        let report = registry.dispatch(&event(TransitionKind::LiveStarted)).await;
        assert_eq!(report, DispatchReport::default());
        assert!(log.lock().is_empty());
        assert_eq!(registry.listener_count(TransitionKind::ArchiveAvailable), 1);
    }
}
