//! rust-livepost library crate.
//!
//! Feed ingestion, live broadcast classification, transition detection and
//! notification delivery. The binary in `main.rs` wires these together.

pub mod cache;
pub mod classifier;
pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod monitor;
pub mod niconico;
pub mod notification;
pub mod scheduler;
pub mod store;
pub mod utils;
pub mod youtube;

pub use error::{Error, Result};
