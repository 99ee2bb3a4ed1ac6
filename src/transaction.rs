//! Transactions.
//!
//! A transaction groups page reads and writes under one [`TransactionId`].
//! Its locks are held until it commits or aborts; commit forces its pages
//! to disk, abort drops them from the cache and rolls back anything the log
//! already wrote.

pub mod id;
pub mod txn;

// Re-export commonly used types
pub use id::{TransactionId, TransactionIdGenerator};
pub use txn::{Transaction, TransactionState};
