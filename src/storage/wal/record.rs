//! Log record types.
//!
//! Every record carries the transaction that produced it. Update records hold
//! full page images: the before image is what rollback writes back.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DbResult;
use crate::storage::page::PageId;
use crate::transaction::TransactionId;

/// Log Sequence Number - position of a record in the log.
/// LSNs are monotonically increasing and used to order log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LSN(pub u64);

impl LSN {
    /// Create a new LSN with value 0.
    pub fn new() -> Self {
        LSN(0)
    }

    /// Get the next LSN.
    pub fn next(&self) -> Self {
        LSN(self.0 + 1)
    }
}

impl Default for LSN {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LSN {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LSN({})", self.0)
    }
}

/// What a log record describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogPayload {
    /// Transaction begin record.
    Begin,
    /// A page written to disk on behalf of a transaction.
    Update {
        page_id: PageId,
        before: Vec<u8>,
        after: Vec<u8>,
    },
    /// Transaction commit record.
    Commit,
    /// Transaction abort record, written once rollback finished.
    Abort,
}

/// One entry of the log file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub lsn: LSN,
    pub transaction_id: TransactionId,
    pub payload: LogPayload,
}

impl LogRecord {
    pub fn begin(lsn: LSN, transaction_id: TransactionId) -> Self {
        Self {
            lsn,
            transaction_id,
            payload: LogPayload::Begin,
        }
    }

    pub fn update(
        lsn: LSN,
        transaction_id: TransactionId,
        page_id: PageId,
        before: Vec<u8>,
        after: Vec<u8>,
    ) -> Self {
        Self {
            lsn,
            transaction_id,
            payload: LogPayload::Update {
                page_id,
                before,
                after,
            },
        }
    }

    pub fn commit(lsn: LSN, transaction_id: TransactionId) -> Self {
        Self {
            lsn,
            transaction_id,
            payload: LogPayload::Commit,
        }
    }

    pub fn abort(lsn: LSN, transaction_id: TransactionId) -> Self {
        Self {
            lsn,
            transaction_id,
            payload: LogPayload::Abort,
        }
    }

    /// Whether this record ends its transaction.
    pub fn is_terminal(&self) -> bool {
        matches!(self.payload, LogPayload::Commit | LogPayload::Abort)
    }

    pub fn serialize(&self) -> DbResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn deserialize(data: &[u8]) -> DbResult<Self> {
        Ok(bincode::deserialize(data)?)
    }
}
