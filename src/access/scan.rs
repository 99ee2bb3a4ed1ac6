//! Sequential scans over a table file.

use crate::access::db_file::DbFile;
use crate::access::Tuple;
use crate::concurrency::Permissions;
use crate::error::DbResult;
use crate::storage::buffer::BufferPool;
use crate::storage::page::PageId;
use crate::transaction::TransactionId;

/// Iterator over every tuple of a file.
///
/// Pages are fetched one at a time through the buffer pool with read-only
/// permission, so a scan holds a shared lock on every page it has visited.
pub struct HeapFileIterator<'a> {
    file: &'a dyn DbFile,
    pool: &'a BufferPool,
    tid: TransactionId,
    next_page: u32,
    buffered: std::vec::IntoIter<Tuple>,
    done: bool,
}

impl<'a> HeapFileIterator<'a> {
    pub fn new(file: &'a dyn DbFile, pool: &'a BufferPool, tid: TransactionId) -> Self {
        Self {
            file,
            pool,
            tid,
            next_page: 0,
            buffered: Vec::new().into_iter(),
            done: false,
        }
    }

    /// Restart the scan from the first page.
    pub fn rewind(&mut self) {
        self.next_page = 0;
        self.buffered = Vec::new().into_iter();
        self.done = false;
    }

    fn load_next_page(&mut self) -> DbResult<bool> {
        if self.next_page >= self.file.num_pages()? {
            return Ok(false);
        }
        let page_id = PageId::new(self.file.id(), self.next_page);
        self.next_page += 1;

        let page = self.pool.get_page(self.tid, page_id, Permissions::ReadOnly)?;
        let tuples = page.read().tuples()?;
        self.buffered = tuples.into_iter();
        Ok(true)
    }
}

impl Iterator for HeapFileIterator<'_> {
    type Item = DbResult<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(tuple) = self.buffered.next() {
                return Some(Ok(tuple));
            }
            if self.done {
                return None;
            }
            match self.load_next_page() {
                Ok(true) => {}
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
