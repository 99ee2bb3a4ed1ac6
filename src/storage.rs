//! Storage layer.
//!
//! - **PageManager**: reads and writes fixed-size pages of a file
//! - **HeapPage**: slotted page holding fixed-width tuples
//! - **BufferPool**: bounded page cache that never evicts dirty pages
//! - **WriteAheadLog**: before/after images forced ahead of page writes

pub mod buffer;
pub mod disk;
pub mod page;
pub mod wal;

pub use buffer::BufferPool;
pub use disk::{PageManager, DEFAULT_PAGE_SIZE};
pub use page::{HeapPage, PageId, PageRef};
pub use wal::{FileLog, WriteAheadLog};
