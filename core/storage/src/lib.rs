//! Object storage layer for StrataVault.
//!
//! This module provides thin clients for the concrete object-storage
//! backends (a generic S3-protocol client and the platform-native local
//! store) and the [`StorageRouter`], which unifies them behind one
//! interface with retry, backoff, and connectivity-based fallback.
//!
//! # Design Principles
//! - Backend isolation: no provider-specific logic above the router
//! - Async operations: all I/O is async
//! - One backend decision per process: the connectivity probe runs once
//! - Unified error semantics: consistent error types across backends

pub mod backend;
pub mod keys;
pub mod local;
pub mod memory;
pub mod retry;
pub mod router;
pub mod s3;

pub use backend::ObjectStore;
pub use keys::{build_object_key, owner_prefix, ContentCategory};
pub use local::LocalStore;
pub use memory::MemoryObjectStore;
pub use retry::{retry_with_config, RetryConfig};
pub use router::{RouterConfig, SignedUrl, StorageRouter};
pub use s3::{S3Config, S3Store};
