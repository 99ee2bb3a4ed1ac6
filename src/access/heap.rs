use crate::access::db_file::DbFile;
use crate::access::scan::HeapFileIterator;
use crate::access::{Tuple, TupleDesc};
use crate::concurrency::Permissions;
use crate::error::{DbError, DbResult};
use crate::storage::buffer::BufferPool;
use crate::storage::disk::PageManager;
use crate::storage::page::heap_page::MAX_SLOTS;
use crate::storage::page::{HeapPage, PageId, PageRef};
use crate::transaction::TransactionId;
use log::debug;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A table stored as an unordered collection of heap pages in one file.
pub struct HeapFile {
    id: u32,
    path: PathBuf,
    desc: Arc<TupleDesc>,
    page_size: usize,
    pages: Mutex<PageManager>,
    // Serializes file extension
    allocation: Mutex<()>,
}

impl HeapFile {
    /// Creates (or truncates) a heap file.
    pub fn create(path: &Path, desc: Arc<TupleDesc>, page_size: usize) -> DbResult<Self> {
        let pages = PageManager::create(path, page_size)?;
        Self::with_pages(path, desc, pages)
    }

    /// Opens a heap file, creating it empty if it does not exist.
    pub fn open(path: &Path, desc: Arc<TupleDesc>, page_size: usize) -> DbResult<Self> {
        let pages = PageManager::open(path, page_size)?;
        Self::with_pages(path, desc, pages)
    }

    /// Opens a heap file that must already exist.
    pub fn open_existing(path: &Path, desc: Arc<TupleDesc>, page_size: usize) -> DbResult<Self> {
        let pages = PageManager::open_existing(path, page_size)?;
        Self::with_pages(path, desc, pages)
    }

    fn with_pages(path: &Path, desc: Arc<TupleDesc>, pages: PageManager) -> DbResult<Self> {
        if HeapPage::slots_per_page(pages.page_size(), desc.size()) == 0 {
            return Err(DbError::InvalidSchema(format!(
                "{} does not fit in a {}-byte page",
                desc,
                pages.page_size()
            )));
        }
        if HeapPage::slots_per_page(pages.page_size(), desc.size()) > MAX_SLOTS {
            return Err(DbError::InvalidSchema(format!(
                "a {}-byte page holds more than {} tuples of {}",
                pages.page_size(),
                MAX_SLOTS,
                desc
            )));
        }
        let path = std::fs::canonicalize(path)?;
        Ok(Self {
            id: Self::table_id_for(&path),
            page_size: pages.page_size(),
            path,
            desc,
            pages: Mutex::new(pages),
            allocation: Mutex::new(()),
        })
    }

    /// Stable id derived from the absolute path of the file.
    fn table_id_for(path: &Path) -> u32 {
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        hasher.finish() as u32
    }

    /// Lazy scan over every stored tuple, page by page, under shared locks.
    pub fn iter<'a>(&'a self, pool: &'a BufferPool, tid: TransactionId) -> HeapFileIterator<'a> {
        HeapFileIterator::new(self, pool, tid)
    }

    fn check_page_id(&self, page_id: PageId) -> DbResult<()> {
        if page_id.table_id != self.id {
            return Err(DbError::PageNotFound(page_id));
        }
        Ok(())
    }

    /// Appends an empty page and returns its id.
    fn extend(&self) -> DbResult<PageId> {
        let page_id = self.pages.lock().allocate_page(self.id)?;
        debug!("Extended {} with page {}", self.path.display(), page_id);
        Ok(page_id)
    }
}

impl DbFile for HeapFile {
    fn id(&self) -> u32 {
        self.id
    }

    fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn num_pages(&self) -> DbResult<u32> {
        self.pages.lock().num_pages()
    }

    fn read_page(&self, page_id: PageId) -> DbResult<HeapPage> {
        self.check_page_id(page_id)?;
        let mut data = vec![0u8; self.page_size];
        self.pages.lock().read_page(page_id, &mut data)?;
        HeapPage::new(page_id, data, self.desc.clone())
    }

    fn write_page(&self, page: &HeapPage) -> DbResult<()> {
        self.check_page_id(page.id())?;
        self.pages.lock().write_page(page.id(), page.data())
    }

    fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> DbResult<Vec<PageRef>> {
        if tuple.tuple_desc().as_ref() != self.desc.as_ref() {
            return Err(DbError::SchemaMismatch {
                expected: self.desc.to_string(),
                found: tuple.tuple_desc().to_string(),
            });
        }

        for page_number in 0..self.num_pages()? {
            let page_id = PageId::new(self.id, page_number);
            let held_before = pool.holds_lock(tid, page_id);

            let page = pool.get_page(tid, page_id, Permissions::ReadOnly)?;
            let has_room = page.read().num_empty_slots() > 0;
            if !has_room {
                // Nothing was read or written here.
                if !held_before {
                    pool.release_page(tid, page_id);
                }
                continue;
            }

            let page = pool.get_page(tid, page_id, Permissions::ReadWrite)?;
            let mut guard = page.write();
            if guard.num_empty_slots() > 0 {
                guard.insert_tuple(tuple)?;
                drop(guard);
                return Ok(vec![page]);
            }
        }

        loop {
            let page_id = {
                let _allocating = self.allocation.lock();
                self.extend()?
            };
            let page = pool.get_page(tid, page_id, Permissions::ReadWrite)?;
            let mut guard = page.write();
            match guard.insert_tuple(tuple) {
                Ok(_) => {
                    drop(guard);
                    return Ok(vec![page]);
                }
                // Another transaction filled the new page first.
                Err(DbError::PageFull(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> DbResult<Vec<PageRef>> {
        let record_id = tuple.record_id().ok_or(DbError::MissingRecordId)?;
        self.check_page_id(record_id.page_id)?;
        if record_id.page_id.page_number >= self.num_pages()? {
            return Err(DbError::PageNotFound(record_id.page_id));
        }

        let page = pool.get_page(tid, record_id.page_id, Permissions::ReadWrite)?;
        page.write().delete_tuple(tuple)?;
        Ok(vec![page])
    }
}
