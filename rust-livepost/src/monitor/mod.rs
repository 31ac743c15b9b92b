//! Broadcast monitor.
//!
//! Re-classifies tracked videos on each polling tick, detects transitions
//! between broadcast states and fans them out to registered listeners.

mod events;
mod fetcher;
mod poller;

pub use events::{DispatchReport, ListenerRegistry, TransitionEvent, TransitionListener};
pub use fetcher::DetailFetcher;
pub use poller::{PollSummary, Poller};
