//! Seam between the monitor and a platform detail API.

use async_trait::async_trait;

use crate::Result;
use crate::classifier::DetailPayload;

/// Fetches detail payloads for a batch of video ids.
///
/// Ids the platform does not return (deleted, private) are simply absent
/// from the result. Implementations own the retry policy; callers treat an
/// error as final for the current pass.
#[async_trait]
pub trait DetailFetcher: Send + Sync {
    async fn fetch_details(&self, video_ids: &[String]) -> Result<Vec<DetailPayload>>;
}
