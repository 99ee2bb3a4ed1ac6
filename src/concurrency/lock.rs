//! Page-granularity lock management for strict two-phase locking.
//!
//! Every page lock is either shared by any number of transactions or held
//! exclusively by one. A request that conflicts with the current holders adds
//! wait-for edges from the requester to those holders; if the resulting graph
//! has a cycle the request fails with `DbError::Deadlock` instead of waiting.
//! Locks are only released when the owning transaction completes.

use crate::concurrency::wait_for::WaitForGraph;
use crate::error::{DbError, DbResult};
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};

/// Lock modes supported by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared lock for read operations.
    Shared,
    /// Exclusive lock for write operations.
    Exclusive,
}

impl LockMode {
    /// Checks if this lock mode is compatible with another.
    pub fn is_compatible_with(&self, other: &LockMode) -> bool {
        matches!((self, other), (LockMode::Shared, LockMode::Shared))
    }
}

/// Access requested on every buffer pool page fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permissions {
    ReadOnly,
    ReadWrite,
}

impl Permissions {
    pub fn lock_mode(&self) -> LockMode {
        match self {
            Permissions::ReadOnly => LockMode::Shared,
            Permissions::ReadWrite => LockMode::Exclusive,
        }
    }
}

/// Snapshot of one page's lock state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLock {
    pub page_id: PageId,
    pub mode: LockMode,
    pub hold_count: usize,
}

#[derive(Debug)]
struct LockEntry {
    mode: LockMode,
    holders: HashSet<TransactionId>,
}

#[derive(Debug, Default)]
struct LockTable {
    locks: HashMap<PageId, LockEntry>,
    held: HashMap<TransactionId, HashSet<PageId>>,
    /// The request each blocked transaction is waiting on.
    waiting: HashMap<TransactionId, (PageId, LockMode)>,
    graph: WaitForGraph,
}

impl LockTable {
    /// Transactions that keep `tid` from taking `mode` on `page_id`. Empty
    /// when the lock can be granted right away.
    fn blockers(&self, tid: TransactionId, page_id: PageId, mode: LockMode) -> Vec<TransactionId> {
        let Some(entry) = self.locks.get(&page_id) else {
            return Vec::new();
        };

        let grantable = if entry.holders.contains(&tid) {
            // Upgrade in place when nobody else shares the page.
            entry.mode == LockMode::Exclusive
                || mode == LockMode::Shared
                || entry.holders.len() == 1
        } else {
            entry.mode.is_compatible_with(&mode)
        };
        if grantable {
            return Vec::new();
        }

        entry
            .holders
            .iter()
            .copied()
            .filter(|&holder| holder != tid)
            .collect()
    }

    /// Records the lock. Only valid once `blockers` came back empty.
    fn grant(&mut self, tid: TransactionId, page_id: PageId, mode: LockMode) {
        let entry = self.locks.entry(page_id).or_insert_with(|| LockEntry {
            mode,
            holders: HashSet::new(),
        });
        if mode == LockMode::Exclusive {
            entry.mode = LockMode::Exclusive;
        }
        entry.holders.insert(tid);
        self.held.entry(tid).or_default().insert(page_id);
    }

    /// Rebuilds the wait-for graph from the blocked requests and the current
    /// holders of the pages they wait on.
    fn rebuild_graph(&mut self) {
        let mut graph = WaitForGraph::new();
        for (&waiter, &(page_id, mode)) in &self.waiting {
            for holder in self.blockers(waiter, page_id, mode) {
                graph.add_edge(waiter, holder);
            }
        }
        self.graph = graph;
    }

    fn release(&mut self, tid: TransactionId, page_id: PageId) -> bool {
        if let Some(pages) = self.held.get_mut(&tid) {
            pages.remove(&page_id);
            if pages.is_empty() {
                self.held.remove(&tid);
            }
        }
        match self.locks.get_mut(&page_id) {
            Some(entry) => {
                let removed = entry.holders.remove(&tid);
                if entry.holders.is_empty() {
                    self.locks.remove(&page_id);
                }
                removed
            }
            None => false,
        }
    }
}

/// Page lock table shared by all transaction threads.
pub struct LockManager {
    table: Mutex<LockTable>,
    released: Condvar,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(LockTable::default()),
            released: Condvar::new(),
        }
    }

    /// Acquires `mode` on `page_id` for `tid`, blocking while another
    /// transaction holds a conflicting lock.
    ///
    /// Fails with `DbError::Deadlock` when waiting would close a cycle in the
    /// wait-for graph; the caller must then abort `tid`.
    pub fn grant_lock(&self, tid: TransactionId, page_id: PageId, mode: LockMode) -> DbResult<()> {
        let mut table = self.table.lock();
        loop {
            let blockers = table.blockers(tid, page_id, mode);
            if blockers.is_empty() {
                table.waiting.remove(&tid);
                table.grant(tid, page_id, mode);
                return Ok(());
            }

            // Edges are recomputed from the lock table on every attempt, so
            // locks released since the last check never show up as waits.
            table.waiting.insert(tid, (page_id, mode));
            table.rebuild_graph();

            if table.graph.has_cycle() {
                table.waiting.remove(&tid);
                table.rebuild_graph();
                warn!(
                    "{} aborted by deadlock detection while requesting {:?} on {}",
                    tid, mode, page_id
                );
                return Err(DbError::Deadlock { tid, page_id });
            }

            debug!(
                "{} waits for {:?} on {} held by {:?}",
                tid, mode, page_id, blockers
            );
            self.released.wait(&mut table);
        }
    }

    /// Releases `tid`'s lock on one page and wakes any waiters.
    pub fn release_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        let released = self.table.lock().release(tid, page_id);
        if released {
            self.released.notify_all();
        }
        released
    }

    /// Releases every lock held by `tid`.
    pub fn release_all(&self, tid: TransactionId) {
        {
            let mut table = self.table.lock();
            let pages: Vec<PageId> = table
                .held
                .get(&tid)
                .map(|pages| pages.iter().copied().collect())
                .unwrap_or_default();
            for page_id in pages {
                table.release(tid, page_id);
            }
            table.waiting.remove(&tid);
        }
        self.released.notify_all();
    }

    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.table
            .lock()
            .locks
            .get(&page_id)
            .is_some_and(|entry| entry.holders.contains(&tid))
    }

    /// Every page `tid` currently holds a lock on.
    pub fn locks_held(&self, tid: TransactionId) -> Vec<PageLock> {
        let table = self.table.lock();
        table
            .held
            .get(&tid)
            .map(|pages| {
                pages
                    .iter()
                    .filter_map(|page_id| {
                        table.locks.get(page_id).map(|entry| PageLock {
                            page_id: *page_id,
                            mode: entry.mode,
                            hold_count: entry.holders.len(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Current lock state of a page, if anyone holds it.
    pub fn page_lock(&self, page_id: PageId) -> Option<PageLock> {
        self.table.lock().locks.get(&page_id).map(|entry| PageLock {
            page_id,
            mode: entry.mode,
            hold_count: entry.holders.len(),
        })
    }

    /// Whether `tid` is currently blocked behind another transaction.
    pub fn is_waiting(&self, tid: TransactionId) -> bool {
        self.table.lock().waiting.contains_key(&tid)
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
