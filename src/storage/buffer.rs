//! Bounded page cache with NO-STEAL eviction.
//!
//! Every page access goes through [`BufferPool::get_page`], which first takes
//! the page lock for the requesting transaction and only then looks at the
//! cache. Dirty pages stay cached until their transaction completes.

pub mod lru;
pub mod replacer;

use crate::access::Tuple;
use crate::catalog::Catalog;
use crate::concurrency::{LockManager, LockMode, Permissions};
use crate::error::{DbError, DbResult};
use crate::storage::page::{PageId, PageRef};
use crate::storage::wal::WriteAheadLog;
use crate::transaction::TransactionId;
use log::{debug, warn};
use lru::LruReplacer;
use parking_lot::{Mutex, RwLock};
use replacer::Replacer;
use std::collections::HashMap;
use std::sync::Arc;

/// Default number of pages a buffer pool caches.
pub const DEFAULT_POOL_PAGES: usize = 50;

struct PoolState {
    pages: HashMap<PageId, PageRef>,
    replacer: Box<dyn Replacer>,
}

pub struct BufferPool {
    state: Mutex<PoolState>,
    lock_manager: LockManager,
    catalog: Arc<Catalog>,
    log: Arc<dyn WriteAheadLog>,
    capacity: usize,
}

impl BufferPool {
    pub fn new(capacity: usize, catalog: Arc<Catalog>, log: Arc<dyn WriteAheadLog>) -> Self {
        Self::with_replacer(capacity, catalog, log, Box::new(LruReplacer::new(capacity)))
    }

    pub fn with_replacer(
        capacity: usize,
        catalog: Arc<Catalog>,
        log: Arc<dyn WriteAheadLog>,
        replacer: Box<dyn Replacer>,
    ) -> Self {
        Self {
            state: Mutex::new(PoolState {
                pages: HashMap::with_capacity(capacity),
                replacer,
            }),
            lock_manager: LockManager::new(),
            catalog,
            log,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.lock_manager
    }

    /// Returns the page with `perm` locked on behalf of `tid`.
    ///
    /// Blocks while another transaction holds a conflicting lock and fails
    /// with `DbError::Deadlock` if waiting would deadlock. A cache miss reads
    /// the page from its table file, evicting a clean page if the pool is full.
    pub fn get_page(&self, tid: TransactionId, page_id: PageId, perm: Permissions) -> DbResult<PageRef> {
        // Never wait for a lock while holding the pool state.
        self.lock_manager.grant_lock(tid, page_id, perm.lock_mode())?;

        let mut state = self.state.lock();
        if let Some(page) = state.pages.get(&page_id).cloned() {
            state.replacer.record_access(page_id);
            return Ok(page);
        }

        if state.pages.len() >= self.capacity {
            self.evict_page(&mut state)?;
        }

        let file = self.catalog.database_file(page_id.table_id)?;
        let page: PageRef = Arc::new(RwLock::new(file.read_page(page_id)?));
        state.pages.insert(page_id, page.clone());
        state.replacer.record_access(page_id);
        Ok(page)
    }

    /// Inserts `tuple` into table `table_id` on behalf of `tid`.
    ///
    /// The modified pages are marked dirty by `tid` and stay cached until the
    /// transaction completes.
    pub fn insert_tuple(&self, tid: TransactionId, table_id: u32, tuple: &mut Tuple) -> DbResult<()> {
        let file = self.catalog.database_file(table_id)?;
        let pages = file.insert_tuple(self, tid, tuple)?;
        self.keep_dirty(tid, pages)
    }

    /// Deletes `tuple` from its table and clears its record id.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &mut Tuple) -> DbResult<()> {
        let record_id = tuple.record_id().ok_or(DbError::MissingRecordId)?;
        let file = self.catalog.database_file(record_id.page_id.table_id)?;
        let pages = file.delete_tuple(self, tid, tuple)?;
        self.keep_dirty(tid, pages)?;
        tuple.set_record_id(None);
        Ok(())
    }

    fn keep_dirty(&self, tid: TransactionId, pages: Vec<PageRef>) -> DbResult<()> {
        for page in pages {
            let page_id = {
                let mut guard = page.write();
                guard.mark_dirty(Some(tid));
                guard.id()
            };

            let mut state = self.state.lock();
            if !state.pages.contains_key(&page_id) && state.pages.len() >= self.capacity {
                self.evict_page(&mut state)?;
            }
            // A clean copy may have been evicted before it was marked dirty.
            state.pages.insert(page_id, page);
            state.replacer.record_access(page_id);
        }
        Ok(())
    }

    /// Drops the first clean page in access order. Dirty pages are never
    /// evicted; if every cached page is dirty the pool is full.
    fn evict_page(&self, state: &mut PoolState) -> DbResult<()> {
        let victim = state.replacer.candidates().into_iter().find(|page_id| {
            state
                .pages
                .get(page_id)
                .is_some_and(|page| page.read().is_dirty().is_none())
        });

        match victim {
            Some(page_id) => {
                // Clean pages already match the disk.
                state.pages.remove(&page_id);
                state.replacer.remove(page_id);
                debug!("Evicted clean page {}", page_id);
                Ok(())
            }
            None => {
                warn!("Buffer pool full: all {} cached pages are dirty", self.capacity);
                Err(DbError::BufferPoolFull {
                    capacity: self.capacity,
                })
            }
        }
    }

    /// Writes a cached page to disk if it is dirty and drops it from the cache.
    ///
    /// The page's images are logged and the log forced before the table file
    /// is written.
    pub fn flush_page(&self, page_id: PageId) -> DbResult<()> {
        let mut state = self.state.lock();
        self.flush_locked(&mut state, page_id)
    }

    fn flush_locked(&self, state: &mut PoolState, page_id: PageId) -> DbResult<()> {
        let Some(page) = state.pages.get(&page_id).cloned() else {
            return Ok(());
        };

        {
            let mut page = page.write();
            if let Some(dirtier) = page.is_dirty() {
                let before = page.before_image();
                self.log.log_write(dirtier, &before, &page)?;
                self.log.force()?;

                let file = self.catalog.database_file(page_id.table_id)?;
                file.write_page(&page)?;
                page.mark_dirty(None);
                page.set_before_image();
                debug!("Flushed page {} dirtied by {}", page_id, dirtier);
            }
        }

        state.pages.remove(&page_id);
        state.replacer.remove(page_id);
        Ok(())
    }

    /// Flushes every page `tid` holds exclusively or is the only reader of.
    pub fn flush_pages(&self, tid: TransactionId) -> DbResult<()> {
        let owned: Vec<PageId> = self
            .lock_manager
            .locks_held(tid)
            .into_iter()
            .filter(|lock| lock.mode == LockMode::Exclusive || lock.hold_count == 1)
            .map(|lock| lock.page_id)
            .collect();

        let mut state = self.state.lock();
        for page_id in owned {
            self.flush_locked(&mut state, page_id)?;
        }
        Ok(())
    }

    /// Flushes every cached page.
    ///
    /// Writes uncommitted changes to disk when transactions are running, so
    /// it is only safe at shutdown or in tests.
    pub fn flush_all_pages(&self) -> DbResult<()> {
        let mut state = self.state.lock();
        let page_ids: Vec<PageId> = state.pages.keys().copied().collect();
        for page_id in page_ids {
            self.flush_locked(&mut state, page_id)?;
        }
        Ok(())
    }

    /// Drops a page from the cache without writing it.
    pub fn discard_page(&self, page_id: PageId) {
        let mut state = self.state.lock();
        if state.pages.remove(&page_id).is_some() {
            state.replacer.remove(page_id);
            debug!("Discarded page {}", page_id);
        }
    }

    /// Finishes `tid` inside the pool and releases all of its locks.
    ///
    /// On commit the pages `tid` owns are flushed. If a flush fails the error
    /// is returned and `tid` keeps its locks, so the caller can roll back
    /// before anyone else sees the partly written pages. On abort every page
    /// `tid` locked is discarded so later readers reload it from disk.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> DbResult<()> {
        if commit {
            self.flush_pages(tid)?;
        } else {
            for lock in self.lock_manager.locks_held(tid) {
                self.discard_page(lock.page_id);
            }
        }

        self.lock_manager.release_all(tid);
        Ok(())
    }

    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.lock_manager.holds_lock(tid, page_id)
    }

    /// Releases one lock before the transaction ends.
    ///
    /// Breaks two-phase locking unless the caller did not read or modify the
    /// page under that lock.
    pub fn release_page(&self, tid: TransactionId, page_id: PageId) {
        self.lock_manager.release_lock(tid, page_id);
    }

    pub fn cached_pages(&self) -> Vec<PageId> {
        self.state.lock().pages.keys().copied().collect()
    }

    pub fn is_cached(&self, page_id: PageId) -> bool {
        self.state.lock().pages.contains_key(&page_id)
    }
}
