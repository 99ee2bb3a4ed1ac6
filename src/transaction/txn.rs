//! Transactions over a [`Database`].

use log::{debug, warn};
use std::sync::Arc;

use super::id::TransactionId;
use crate::access::{HeapFileIterator, Tuple};
use crate::catalog::TableId;
use crate::concurrency::Permissions;
use crate::database::Database;
use crate::error::{DbError, DbResult};
use crate::storage::buffer::BufferPool;
use crate::storage::page::{PageId, PageRef};
use crate::storage::wal::WriteAheadLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed)
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

/// A unit of work under strict two-phase locking.
///
/// Every page the transaction touches stays locked until [`commit`] or
/// [`abort`]. Dropping an active transaction aborts it.
///
/// [`commit`]: Transaction::commit
/// [`abort`]: Transaction::abort
pub struct Transaction<'a> {
    db: &'a Database,
    pool: Arc<BufferPool>,
    id: TransactionId,
    state: TransactionState,
}

impl<'a> Transaction<'a> {
    /// Starts a transaction with a fresh id and logs its beginning.
    pub fn start(db: &'a Database) -> DbResult<Self> {
        let id = db.next_transaction_id();
        db.log().log_begin(id)?;
        debug!("{} started", id);
        Ok(Self {
            db,
            pool: db.buffer_pool(),
            id,
            state: TransactionState::Active,
        })
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// The pool this transaction's pages are cached in.
    pub fn buffer_pool(&self) -> &BufferPool {
        &self.pool
    }

    fn ensure_active(&self) -> DbResult<()> {
        if self.state.is_active() {
            Ok(())
        } else {
            Err(DbError::TransactionNotActive(self.id))
        }
    }

    pub fn get_page(&self, page_id: PageId, perm: Permissions) -> DbResult<PageRef> {
        self.ensure_active()?;
        self.pool.get_page(self.id, page_id, perm)
    }

    pub fn insert_tuple(&self, table_id: TableId, tuple: &mut Tuple) -> DbResult<()> {
        self.ensure_active()?;
        self.pool.insert_tuple(self.id, table_id, tuple)
    }

    pub fn delete_tuple(&self, tuple: &mut Tuple) -> DbResult<()> {
        self.ensure_active()?;
        self.pool.delete_tuple(self.id, tuple)
    }

    /// Reads every tuple of a table with a sequential scan.
    pub fn scan(&self, table_id: TableId) -> DbResult<Vec<Tuple>> {
        self.ensure_active()?;
        let catalog = self.db.catalog();
        let file = catalog.database_file(table_id)?;
        self.db.observer().on_physical_plan(
            self.id,
            &format!("SeqScan({})", catalog.table_name(table_id)?),
        );
        HeapFileIterator::new(file.as_ref(), &self.pool, self.id).collect()
    }

    /// Makes the transaction's changes durable and releases its locks.
    ///
    /// If the changes cannot be written the transaction is rolled back while
    /// it still holds its locks, and the write error is returned.
    pub fn commit(&mut self) -> DbResult<()> {
        self.ensure_active()?;
        self.state = TransactionState::Committed;

        if let Err(err) = self.pool.transaction_complete(self.id, true) {
            warn!("{} failed to commit: {}", self.id, err);
            if let Err(abort_err) = self.rollback() {
                warn!("Failed to roll back {}: {}", self.id, abort_err);
            }
            return Err(err);
        }

        self.db.log().log_commit(self.id)?;
        debug!("{} committed", self.id);
        Ok(())
    }

    /// Undoes the transaction's changes and releases its locks.
    pub fn abort(&mut self) -> DbResult<()> {
        self.ensure_active()?;
        self.rollback()
    }

    fn rollback(&mut self) -> DbResult<()> {
        self.state = TransactionState::Aborted;

        let restored = self.db.log().log_abort(self.id);
        if let Ok(pages) = &restored {
            for &page_id in pages {
                self.pool.discard_page(page_id);
            }
        }
        // Locks are released even if the log failed.
        let completed = self.pool.transaction_complete(self.id, false);

        debug!("{} aborted", self.id);
        restored.and(completed)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.state.is_active() {
            warn!("{} dropped while active, aborting", self.id);
            if let Err(err) = self.rollback() {
                warn!("Failed to abort {}: {}", self.id, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{DataType, DbFile, HeapFile, HeapFileEncoder, TupleDesc, Value};
    use crate::config::DbConfig;
    use crate::storage::page::HeapPage;
    use parking_lot::Mutex;
    use std::io;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::{tempdir, TempDir};

    /// Heap file whose write number `fail_at` (counting from 0) fails. Later
    /// writes record whether their page was still locked.
    struct FailingFile {
        inner: HeapFile,
        writes: AtomicUsize,
        fail_at: usize,
        pool: Mutex<Option<Arc<BufferPool>>>,
        locked_after_failure: Mutex<Vec<bool>>,
    }

    impl DbFile for FailingFile {
        fn id(&self) -> u32 {
            self.inner.id()
        }

        fn tuple_desc(&self) -> &Arc<TupleDesc> {
            self.inner.tuple_desc()
        }

        fn page_size(&self) -> usize {
            self.inner.page_size()
        }

        fn path(&self) -> &Path {
            self.inner.path()
        }

        fn num_pages(&self) -> DbResult<u32> {
            self.inner.num_pages()
        }

        fn read_page(&self, page_id: PageId) -> DbResult<HeapPage> {
            self.inner.read_page(page_id)
        }

        fn write_page(&self, page: &HeapPage) -> DbResult<()> {
            let n = self.writes.fetch_add(1, Ordering::SeqCst);
            if n == self.fail_at {
                return Err(DbError::Io(io::Error::new(io::ErrorKind::Other, "disk full")));
            }
            if n > self.fail_at {
                if let Some(pool) = self.pool.lock().as_ref() {
                    let locked = pool.lock_manager().page_lock(page.id()).is_some();
                    self.locked_after_failure.lock().push(locked);
                }
            }
            self.inner.write_page(page)
        }

        fn insert_tuple(
            &self,
            pool: &BufferPool,
            tid: TransactionId,
            tuple: &mut Tuple,
        ) -> DbResult<Vec<PageRef>> {
            self.inner.insert_tuple(pool, tid, tuple)
        }

        fn delete_tuple(
            &self,
            pool: &BufferPool,
            tid: TransactionId,
            tuple: &Tuple,
        ) -> DbResult<Vec<PageRef>> {
            self.inner.delete_tuple(pool, tid, tuple)
        }
    }

    fn setup() -> DbResult<(TempDir, Database, TableId)> {
        let dir = tempdir()?;
        let db = Database::open(DbConfig::default().with_log_path(dir.path().join("db.log")))?;
        let desc = Arc::new(TupleDesc::from_types(vec![DataType::Int32, DataType::Int32]));
        let file = Arc::new(HeapFile::create(&dir.path().join("t.dat"), desc, 4096)?);
        let table_id = file.id();
        db.catalog().add_table(file, "t", "")?;
        Ok((dir, db, table_id))
    }

    fn row(db: &Database, table_id: TableId, a: i32) -> DbResult<Tuple> {
        Tuple::new(
            db.catalog().tuple_desc(table_id)?,
            vec![Value::Int32(a), Value::Int32(a * 10)],
        )
    }

    #[test]
    fn test_ids_increase() -> DbResult<()> {
        let (_dir, db, _table_id) = setup()?;
        let mut first = Transaction::start(&db)?;
        let mut second = Transaction::start(&db)?;
        assert!(first.id() < second.id());
        first.commit()?;
        second.commit()?;
        Ok(())
    }

    #[test]
    fn test_commit_makes_changes_visible() -> DbResult<()> {
        let (_dir, db, table_id) = setup()?;

        let mut txn = Transaction::start(&db)?;
        txn.insert_tuple(table_id, &mut row(&db, table_id, 1)?)?;
        txn.commit()?;
        assert!(txn.state().is_committed());

        let mut reader = Transaction::start(&db)?;
        assert_eq!(reader.scan(table_id)?.len(), 1);
        reader.commit()?;
        Ok(())
    }

    #[test]
    fn test_abort_discards_changes() -> DbResult<()> {
        let (_dir, db, table_id) = setup()?;

        let mut txn = Transaction::start(&db)?;
        txn.insert_tuple(table_id, &mut row(&db, table_id, 1)?)?;
        txn.abort()?;
        assert!(txn.state().is_aborted());

        let mut reader = Transaction::start(&db)?;
        assert!(reader.scan(table_id)?.is_empty());
        reader.commit()?;
        Ok(())
    }

    #[test]
    fn test_finished_transaction_rejects_work() -> DbResult<()> {
        let (_dir, db, table_id) = setup()?;

        let mut txn = Transaction::start(&db)?;
        txn.commit()?;
        let id = txn.id();

        assert!(matches!(
            txn.insert_tuple(table_id, &mut row(&db, table_id, 1)?),
            Err(DbError::TransactionNotActive(tid)) if tid == id
        ));
        assert!(matches!(txn.commit(), Err(DbError::TransactionNotActive(_))));
        assert!(matches!(txn.abort(), Err(DbError::TransactionNotActive(_))));
        Ok(())
    }

    #[test]
    fn test_drop_aborts() -> DbResult<()> {
        let (_dir, db, table_id) = setup()?;
        let page_id = PageId::new(table_id, 0);

        let held_by = {
            let txn = Transaction::start(&db)?;
            txn.insert_tuple(table_id, &mut row(&db, table_id, 1)?)?;
            assert!(db.buffer_pool().holds_lock(txn.id(), page_id));
            txn.id()
        };

        assert!(!db.buffer_pool().holds_lock(held_by, page_id));
        let mut reader = Transaction::start(&db)?;
        assert!(reader.scan(table_id)?.is_empty());
        reader.commit()?;
        Ok(())
    }

    #[test]
    fn test_failed_commit_rolls_back_before_releasing() -> DbResult<()> {
        let dir = tempdir()?;
        let db = Database::open(DbConfig::default().with_log_path(dir.path().join("db.log")))?;
        let desc = Arc::new(TupleDesc::from_types(vec![DataType::Int32, DataType::Int32]));
        let path = dir.path().join("t.dat");
        let rows = (0..1008)
            .map(|i| Tuple::new(desc.clone(), vec![Value::Int32(i), Value::Int32(i)]))
            .collect::<DbResult<Vec<_>>>()?;
        assert_eq!(HeapFileEncoder::write_tuples(&path, desc.clone(), 4096, rows)?, 2);

        let file = Arc::new(FailingFile {
            inner: HeapFile::open(&path, desc, 4096)?,
            writes: AtomicUsize::new(0),
            fail_at: 1,
            pool: Mutex::new(Some(db.buffer_pool())),
            locked_after_failure: Mutex::new(Vec::new()),
        });
        let table_id = file.id();
        db.catalog().add_table(file.clone(), "t", "")?;

        let mut txn = Transaction::start(&db)?;
        for page_number in 0..2 {
            let page_id = PageId::new(table_id, page_number);
            let page = txn.get_page(page_id, Permissions::ReadWrite)?;
            let tuple = page.read().tuple(0)?;
            let mut tuple = tuple.ok_or(DbError::MissingRecordId)?;
            txn.delete_tuple(&mut tuple)?;
        }

        // The first page reaches the disk, the second write fails.
        assert!(matches!(txn.commit(), Err(DbError::Io(_))));
        assert!(txn.state().is_aborted());

        // Both logged pages were restored while the locks were still held.
        let locked = file.locked_after_failure.lock().clone();
        assert_eq!(locked, vec![true, true]);
        for page_number in 0..2 {
            let page_id = PageId::new(table_id, page_number);
            assert!(db.buffer_pool().lock_manager().page_lock(page_id).is_none());
        }

        let mut reader = Transaction::start(&db)?;
        assert_eq!(reader.scan(table_id)?.len(), 1008);
        reader.commit()?;
        Ok(())
    }
}
