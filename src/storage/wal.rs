//! Write-ahead logging.
//!
//! The buffer pool talks to the log only through [`WriteAheadLog`]: before a
//! dirty page reaches its table file the page's before and after images are
//! logged and the log is forced. [`FileLog`] is the file-backed
//! implementation used by the database context.

pub mod manager;
pub mod record;

pub use manager::FileLog;
pub use record::{LogPayload, LogRecord, LSN};

use crate::error::DbResult;
use crate::storage::page::{HeapPage, PageId};
use crate::transaction::TransactionId;

pub trait WriteAheadLog: Send + Sync {
    fn log_begin(&self, tid: TransactionId) -> DbResult<()>;

    /// Records that `after` is about to overwrite `before` on disk.
    fn log_write(&self, tid: TransactionId, before: &HeapPage, after: &HeapPage) -> DbResult<()>;

    fn log_commit(&self, tid: TransactionId) -> DbResult<()>;

    /// Rolls back every page `tid` wrote to disk and returns their ids so the
    /// caller can drop stale cached copies.
    fn log_abort(&self, tid: TransactionId) -> DbResult<Vec<PageId>>;

    /// Makes every record appended so far durable.
    fn force(&self) -> DbResult<()>;

    /// Highest transaction id a previous run used, so new ids never collide
    /// with logged ones.
    fn last_transaction_id(&self) -> Option<TransactionId> {
        None
    }

    /// Rolls back transactions a previous run left unfinished and returns
    /// them. Needs every table they touched registered in the catalog.
    fn recover(&self) -> DbResult<Vec<TransactionId>> {
        Ok(Vec::new())
    }
}
