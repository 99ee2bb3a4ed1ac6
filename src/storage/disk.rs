//! Raw page-granularity file I/O.

pub mod page_manager;

pub use page_manager::{PageManager, DEFAULT_PAGE_SIZE};
