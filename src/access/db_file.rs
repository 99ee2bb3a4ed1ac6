use crate::access::{Tuple, TupleDesc};
use crate::error::DbResult;
use crate::storage::buffer::BufferPool;
use crate::storage::page::{HeapPage, PageId, PageRef};
use crate::transaction::TransactionId;
use std::path::Path;
use std::sync::Arc;

/// A table stored on disk as a sequence of pages.
///
/// Page reads and writes bypass the buffer pool; `insert_tuple` and
/// `delete_tuple` go through it so that every page they touch is locked on
/// behalf of the transaction.
pub trait DbFile: Send + Sync {
    /// Table id, unique among the files registered in a catalog.
    fn id(&self) -> u32;

    fn tuple_desc(&self) -> &Arc<TupleDesc>;

    fn page_size(&self) -> usize;

    fn path(&self) -> &Path;

    fn num_pages(&self) -> DbResult<u32>;

    fn read_page(&self, page_id: PageId) -> DbResult<HeapPage>;

    fn write_page(&self, page: &HeapPage) -> DbResult<()>;

    /// Stores `tuple` and returns the pages that were modified.
    fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> DbResult<Vec<PageRef>>;

    /// Frees the tuple's slot and returns the pages that were modified.
    fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> DbResult<Vec<PageRef>>;
}
