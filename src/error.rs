//! Error types shared by every layer of the storage core.

use crate::access::RecordId;
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use thiserror::Error;

/// Errors that can occur while reading, locking or mutating pages.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Deadlock detected: {tid} cannot wait for a lock on {page_id}")]
    Deadlock { tid: TransactionId, page_id: PageId },

    #[error("Buffer pool is full: all {capacity} cached pages are dirty")]
    BufferPoolFull { capacity: usize },

    #[error("Page not found: {0}")]
    PageNotFound(PageId),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },

    #[error("Slot is empty: {record_id}")]
    SlotEmpty { record_id: RecordId },

    #[error("Page is full: {0}")]
    PageFull(PageId),

    #[error("Tuple has no record id")]
    MissingRecordId,

    #[error("Transaction {0} is not active")]
    TransactionNotActive(TransactionId),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Log error: {0}")]
    Log(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    /// Only a deadlock can succeed when the whole transaction is retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::Deadlock { .. })
    }
}

impl From<bincode::Error> for DbError {
    fn from(err: bincode::Error) -> Self {
        DbError::Log(err.to_string())
    }
}

/// Result type for storage-core operations.
pub type DbResult<T> = Result<T, DbError>;
