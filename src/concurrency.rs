//! Concurrency control.
//!
//! Transactions are isolated with strict two-phase locking at page
//! granularity. Locks are acquired on every buffer pool fetch and released
//! only when the transaction commits or aborts. Deadlocks are detected
//! eagerly on a wait-for graph and resolved by failing the requester.

pub mod lock;
pub mod wait_for;

pub use lock::{LockManager, LockMode, PageLock, Permissions};
pub use wait_for::WaitForGraph;
