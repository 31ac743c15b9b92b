//! Database row models.

pub mod video;

pub use video::{DeliveryDbModel, VideoDbModel};
