//! Outbound notifications.
//!
//! The [`AutoPoster`] listens for transition events, applies the configured
//! auto-post mode and delivers rendered posts through the configured sinks.

pub mod autopost;
pub mod channels;
pub mod template;

pub use autopost::{AutoPostMode, AutoPoster, should_autopost};
pub use channels::{NotificationSink, SinkConfig, build_sinks};
pub use template::Templates;

use serde::Serialize;

use crate::domain::{PostKind, VideoRecord};

/// A rendered post ready for delivery.
#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub kind: PostKind,
    pub record: VideoRecord,
    pub text: String,
}
