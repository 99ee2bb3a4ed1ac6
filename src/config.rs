use crate::storage::buffer::DEFAULT_POOL_PAGES;
use crate::storage::disk::DEFAULT_PAGE_SIZE;
use std::path::PathBuf;

/// Settings a [`Database`](crate::database::Database) is opened with.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Size of every page, in bytes.
    pub page_size: usize,
    /// Number of pages the buffer pool caches.
    pub buffer_pool_pages: usize,
    /// File the write-ahead log is kept in.
    pub log_path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        DbConfig {
            page_size: DEFAULT_PAGE_SIZE,
            buffer_pool_pages: DEFAULT_POOL_PAGES,
            log_path: PathBuf::from("heapstore.log"),
        }
    }
}

impl DbConfig {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_buffer_pool_pages(mut self, pages: usize) -> Self {
        self.buffer_pool_pages = pages;
        self
    }

    pub fn with_log_path(mut self, log_path: impl Into<PathBuf>) -> Self {
        self.log_path = log_path.into();
        self
    }
}
