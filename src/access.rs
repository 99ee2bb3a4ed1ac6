//! Access layer for tuple-oriented operations.
//!
//! This module provides the record-level view of tables:
//!
//! - **Value / DataType**: fixed-width typed fields and their comparisons
//! - **TupleDesc / Tuple**: row layouts and rows with their storage location
//! - **DbFile / HeapFile**: tables stored as unordered collections of heap pages
//! - **HeapFileIterator**: lazy sequential scans through the buffer pool
//! - **HeapFileEncoder**: bulk construction of heap files from text

pub mod db_file;
pub mod encoder;
pub mod heap;
pub mod scan;
pub mod tuple;
pub mod tuple_desc;
pub mod value;

pub use db_file::DbFile;
pub use encoder::HeapFileEncoder;
pub use heap::HeapFile;
pub use scan::HeapFileIterator;
pub use tuple::{RecordId, Tuple};
pub use tuple_desc::{TdItem, TupleDesc};
pub use value::{DataType, Op, Value, STRING_LEN};
