use async_trait::async_trait;

use crate::error::FetchError;
use crate::models::{Item, ListKey};

/// Remote data source behind every controller.
///
/// Calls are never aborted by callers; a result nobody waits for any more is
/// simply dropped on arrival.
#[async_trait]
pub trait DataFetcher: Send + Sync {
    /// Fetch page `page` (1-based) of the list identified by `key`.
    async fn fetch_page(&self, key: &ListKey, page: u32) -> Result<Vec<Item>, FetchError>;

    /// Resolve a free-form key (search text, route parameter) in one shot.
    async fn fetch_by_key(&self, key: &str) -> Result<Vec<Item>, FetchError>;

    /// Latency-bearing round trip that backs a favorites toggle.
    async fn perform_toggle_round_trip(&self) -> Result<(), FetchError>;
}
