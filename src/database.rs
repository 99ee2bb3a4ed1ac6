use crate::catalog::{Catalog, TableId};
use crate::config::DbConfig;
use crate::error::DbResult;
use crate::observer::{NoopObserver, QueryPlanObserver};
use crate::storage::buffer::BufferPool;
use crate::storage::wal::{FileLog, WriteAheadLog};
use crate::transaction::{Transaction, TransactionId, TransactionIdGenerator};
use log::{info, warn};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;

/// High-level database interface that ties the catalog, buffer pool and log
/// together.
pub struct Database {
    config: DbConfig,
    catalog: Arc<Catalog>,
    log: Arc<dyn WriteAheadLog>,
    buffer_pool: RwLock<Arc<BufferPool>>,
    transaction_ids: TransactionIdGenerator,
    observer: Arc<dyn QueryPlanObserver>,
}

impl Database {
    /// Opens a database with an empty catalog and the log at
    /// `config.log_path`.
    ///
    /// Transactions a previous run left unfinished are only rolled back by
    /// [`Database::recover`], once their tables are registered.
    pub fn open(config: DbConfig) -> DbResult<Self> {
        let catalog = Arc::new(Catalog::new());
        let log = Arc::new(FileLog::open(&config.log_path, catalog.clone())?);
        Ok(Self::with_log(config, catalog, log))
    }

    /// Builds a database around an already opened log. `config.log_path` is
    /// not used.
    pub fn with_log(config: DbConfig, catalog: Arc<Catalog>, log: Arc<dyn WriteAheadLog>) -> Self {
        let transaction_ids = TransactionIdGenerator::starting_after(log.last_transaction_id());
        let buffer_pool = Arc::new(BufferPool::new(
            config.buffer_pool_pages,
            catalog.clone(),
            log.clone(),
        ));

        Self {
            config,
            catalog,
            log,
            buffer_pool: RwLock::new(buffer_pool),
            transaction_ids,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Replaces the plan observer.
    pub fn with_observer(mut self, observer: Arc<dyn QueryPlanObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn log(&self) -> &Arc<dyn WriteAheadLog> {
        &self.log
    }

    pub fn observer(&self) -> &Arc<dyn QueryPlanObserver> {
        &self.observer
    }

    pub fn buffer_pool(&self) -> Arc<BufferPool> {
        self.buffer_pool.read().clone()
    }

    pub fn next_transaction_id(&self) -> TransactionId {
        self.transaction_ids.next()
    }

    /// Registers the tables of a schema file using the configured page size.
    pub fn load_schema(&self, path: &Path) -> DbResult<Vec<TableId>> {
        self.catalog.load_schema(path, self.config.page_size)
    }

    /// Rolls back transactions left unfinished by a previous run.
    pub fn recover(&self) -> DbResult<Vec<TransactionId>> {
        let recovered = self.log.recover()?;
        if !recovered.is_empty() {
            info!("Recovered {} unfinished transactions", recovered.len());
        }
        Ok(recovered)
    }

    /// Swaps in a new, empty buffer pool of `pages` pages.
    ///
    /// Cached pages and locks of the old pool are forgotten, so this must only
    /// be used while no transaction is running.
    pub fn reset_buffer_pool(&self, pages: usize) -> Arc<BufferPool> {
        let pool = Arc::new(BufferPool::new(pages, self.catalog.clone(), self.log.clone()));
        *self.buffer_pool.write() = pool.clone();
        pool
    }

    pub fn begin(&self) -> DbResult<Transaction<'_>> {
        Transaction::start(self)
    }

    /// Runs `f` in a new transaction: commits if it returns `Ok`, aborts
    /// before returning the error otherwise.
    pub fn run<T, F>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> DbResult<T>,
    {
        let mut txn = Transaction::start(self)?;
        match f(&mut txn) {
            Ok(value) => {
                if txn.state().is_active() {
                    txn.commit()?;
                }
                Ok(value)
            }
            Err(err) => {
                if txn.state().is_active() {
                    if let Err(abort_err) = txn.abort() {
                        warn!("Failed to abort {}: {}", txn.id(), abort_err);
                    }
                }
                Err(err)
            }
        }
    }

    /// Like [`Database::run`], but restarts `f` in a fresh transaction after
    /// a deadlock, up to `attempts` runs in total.
    pub fn run_with_retry<T, F>(&self, attempts: usize, mut f: F) -> DbResult<T>
    where
        F: FnMut(&mut Transaction<'_>) -> DbResult<T>,
    {
        let mut attempt = 1;
        loop {
            match self.run(&mut f) {
                Err(err) if err.is_retryable() && attempt < attempts => {
                    info!("{} (attempt {} of {}), retrying", err, attempt, attempts);
                    attempt += 1;
                    std::thread::yield_now();
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{DataType, DbFile, HeapFile, Tuple, TupleDesc, Value};
    use crate::error::DbError;
    use parking_lot::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingObserver {
        plans: Mutex<Vec<(TransactionId, String)>>,
    }

    impl QueryPlanObserver for RecordingObserver {
        fn on_physical_plan(&self, tid: TransactionId, plan: &str) {
            self.plans.lock().push((tid, plan.to_string()));
        }
    }

    /// Log that only records which calls it received.
    #[derive(Default)]
    struct RecordingLog {
        events: Mutex<Vec<String>>,
    }

    impl WriteAheadLog for RecordingLog {
        fn log_begin(&self, tid: TransactionId) -> DbResult<()> {
            self.events.lock().push(format!("begin {}", tid));
            Ok(())
        }

        fn log_write(
            &self,
            tid: TransactionId,
            _before: &crate::storage::page::HeapPage,
            after: &crate::storage::page::HeapPage,
        ) -> DbResult<()> {
            self.events.lock().push(format!("write {} {}", tid, after.id()));
            Ok(())
        }

        fn log_commit(&self, tid: TransactionId) -> DbResult<()> {
            self.events.lock().push(format!("commit {}", tid));
            Ok(())
        }

        fn log_abort(
            &self,
            tid: TransactionId,
        ) -> DbResult<Vec<crate::storage::page::PageId>> {
            self.events.lock().push(format!("abort {}", tid));
            Ok(Vec::new())
        }

        fn force(&self) -> DbResult<()> {
            Ok(())
        }
    }

    fn open_with_table(dir: &Path) -> DbResult<(Database, TableId)> {
        let db = Database::open(DbConfig::default().with_log_path(dir.join("db.log")))?;
        let desc = Arc::new(TupleDesc::with_names(vec![("id", DataType::Int32)]));
        let file = Arc::new(HeapFile::create(&dir.join("t.dat"), desc, 4096)?);
        let table_id = file.id();
        db.catalog().add_table(file, "t", "id")?;
        Ok((db, table_id))
    }

    fn insert(txn: &mut Transaction<'_>, table_id: TableId, value: i32) -> DbResult<()> {
        let mut tuple = Tuple::new(
            Arc::new(TupleDesc::with_names(vec![("id", DataType::Int32)])),
            vec![Value::Int32(value)],
        )?;
        txn.insert_tuple(table_id, &mut tuple)
    }

    #[test]
    fn test_run_commits_on_ok() -> DbResult<()> {
        let dir = tempdir()?;
        let (db, table_id) = open_with_table(dir.path())?;

        let inserted = db.run(|txn| {
            insert(txn, table_id, 1)?;
            insert(txn, table_id, 2)?;
            Ok(2)
        })?;
        assert_eq!(inserted, 2);

        let rows = db.run(|txn| txn.scan(table_id))?;
        assert_eq!(rows.len(), 2);
        Ok(())
    }

    #[test]
    fn test_run_aborts_on_err() -> DbResult<()> {
        let dir = tempdir()?;
        let (db, table_id) = open_with_table(dir.path())?;

        let result: DbResult<()> = db.run(|txn| {
            insert(txn, table_id, 1)?;
            Err(DbError::InvalidSchema("stop".to_string()))
        });
        assert!(matches!(result, Err(DbError::InvalidSchema(_))));

        assert!(db.run(|txn| txn.scan(table_id))?.is_empty());
        Ok(())
    }

    #[test]
    fn test_run_with_retry_gives_up_on_other_errors() -> DbResult<()> {
        let dir = tempdir()?;
        let (db, _table_id) = open_with_table(dir.path())?;

        let mut calls = 0;
        let result: DbResult<()> = db.run_with_retry(5, |_txn| {
            calls += 1;
            Err(DbError::TableNotFound("x".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
        Ok(())
    }

    #[test]
    fn test_run_with_retry_retries_deadlocks() -> DbResult<()> {
        let dir = tempdir()?;
        let (db, _table_id) = open_with_table(dir.path())?;

        let mut calls = 0;
        let value = db.run_with_retry(3, |txn| {
            calls += 1;
            if calls < 3 {
                return Err(DbError::Deadlock {
                    tid: txn.id(),
                    page_id: crate::storage::page::PageId::new(0, 0),
                });
            }
            Ok(calls)
        })?;
        assert_eq!(value, 3);
        Ok(())
    }

    #[test]
    fn test_scan_reports_plan() -> DbResult<()> {
        let dir = tempdir()?;
        let (db, table_id) = open_with_table(dir.path())?;
        let observer = Arc::new(RecordingObserver::default());
        let db = db.with_observer(observer.clone());

        let tid = db.run(|txn| {
            txn.scan(table_id)?;
            Ok(txn.id())
        })?;

        let plans = observer.plans.lock();
        assert_eq!(plans.as_slice(), &[(tid, "SeqScan(t)".to_string())]);
        Ok(())
    }

    #[test]
    fn test_reset_buffer_pool() -> DbResult<()> {
        let dir = tempdir()?;
        let (db, table_id) = open_with_table(dir.path())?;

        db.run(|txn| insert(txn, table_id, 7))?;
        let pool = db.reset_buffer_pool(3);
        assert_eq!(pool.capacity(), 3);
        assert!(pool.cached_pages().is_empty());
        assert!(Arc::ptr_eq(&pool, &db.buffer_pool()));

        assert_eq!(db.run(|txn| txn.scan(table_id))?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_reopen_continues_transaction_ids() -> DbResult<()> {
        let dir = tempdir()?;
        let last = {
            let (db, table_id) = open_with_table(dir.path())?;
            db.run(|txn| {
                insert(txn, table_id, 1)?;
                Ok(txn.id())
            })?
        };

        let (db, _table_id) = open_with_table(dir.path())?;
        assert!(db.next_transaction_id() > last);
        Ok(())
    }

    #[test]
    fn test_with_log_routes_every_call_to_the_given_log() -> DbResult<()> {
        let dir = tempdir()?;
        let catalog = Arc::new(Catalog::new());
        let log = Arc::new(RecordingLog::default());
        let db = Database::with_log(DbConfig::default(), catalog, log.clone());

        let desc = Arc::new(TupleDesc::with_names(vec![("id", DataType::Int32)]));
        let file = Arc::new(HeapFile::create(&dir.path().join("t.dat"), desc, 4096)?);
        let table_id = file.id();
        db.catalog().add_table(file, "t", "id")?;

        let committed = db.run(|txn| {
            insert(txn, table_id, 1)?;
            Ok(txn.id())
        })?;
        let aborted = db.begin()?.id();

        let page = crate::storage::page::PageId::new(table_id, 0);
        assert_eq!(
            log.events.lock().as_slice(),
            &[
                format!("begin {}", committed),
                format!("write {} {}", committed, page),
                format!("commit {}", committed),
                format!("begin {}", aborted),
                format!("abort {}", aborted),
            ]
        );
        assert!(db.recover()?.is_empty());
        Ok(())
    }
}
