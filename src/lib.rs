//! A page-oriented heap storage engine with a buffer pool, page-level
//! strict two-phase locking and a write-ahead log.

pub mod access;
pub mod catalog;
pub mod concurrency;
pub mod config;
pub mod database;
pub mod error;
pub mod observer;
pub mod storage;
pub mod transaction;

pub use config::DbConfig;
pub use database::Database;
pub use error::{DbError, DbResult};
