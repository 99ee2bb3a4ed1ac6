//! Transaction identifiers.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A unique identifier for a transaction. Later transactions get larger ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(u64);

impl TransactionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Txn{}", self.0)
    }
}

/// Thread-safe source of increasing transaction ids.
pub struct TransactionIdGenerator {
    next_id: AtomicU64,
}

impl TransactionIdGenerator {
    /// Creates a generator starting from 1.
    pub fn new() -> Self {
        Self::starting_after(None)
    }

    /// Creates a generator whose first id is larger than `last`, so ids
    /// found in an existing log are never reused.
    pub fn starting_after(last: Option<TransactionId>) -> Self {
        let first = last.map_or(1, |tid| tid.value() + 1);
        Self {
            next_id: AtomicU64::new(first),
        }
    }

    pub fn next(&self) -> TransactionId {
        TransactionId::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for TransactionIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
