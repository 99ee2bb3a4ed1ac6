use crate::storage::page::PageId;
use std::fmt::Debug;

/// Tracks the order in which cached pages should be considered for eviction.
///
/// The replacer only orders pages; whether a candidate may actually leave the
/// cache (it must be clean) is decided by the buffer pool.
pub trait Replacer: Send + Sync + Debug {
    /// Note that a cached page was just used.
    fn record_access(&mut self, page_id: PageId);

    /// Forget a page that left the cache.
    fn remove(&mut self, page_id: PageId);

    /// Eviction candidates, best victim first.
    fn candidates(&self) -> Vec<PageId>;

    /// Get the number of tracked pages.
    fn size(&self) -> usize;
}
