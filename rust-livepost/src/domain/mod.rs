//! Domain layer: video records, broadcast state and duplicate priority.

pub mod post;
pub mod priority;
pub mod state;
pub mod video;

pub use post::PostKind;
pub use priority::{DEFAULT_PREMIERE_WINDOW_MINUTES, PriorityKey, PriorityPolicy, Resolution};
pub use state::{BroadcastState, TransitionKind};
pub use video::{Classification, ContentType, LiveStatus, Source, VideoRecord};
