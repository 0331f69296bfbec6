//! Document database abstraction for StrataVault.
//!
//! This module provides a trait-based interface over the backing document
//! database: atomic single-document reads/writes, bounded multi-document
//! batches, and range queries over a sortable string field. An in-memory
//! implementation backs tests and development.

pub mod memory;
pub mod store;

pub use memory::MemoryStore;
pub use store::{
    Condition, Document, DocumentStore, Query, WriteBatch, WriteOp, MAX_BATCH_OPS,
};
