//! Hierarchical vault engine for StrataVault.
//!
//! This module provides:
//! - The materialized-path item tree with iterative path propagation
//! - Access-control evaluation over ownership and share lists
//! - Sharing, share links, and the soft-delete/restore/purge lifecycle
//! - An append-only audit log and the scheduled retention sweep
//!
//! # Architecture
//! The vault module sits between the request layer and the storage
//! router; the document database is the single source of truth for tree
//! and permission state, object backends hold only byte payloads.

pub mod access;
pub mod audit;
pub mod config;
pub mod directory;
pub mod links;
pub mod model;
pub mod repo;
pub mod scheduler;
pub mod service;
pub mod sharing;
pub mod trash;
pub mod tree;

pub use access::{evaluate, AccessDecision, AccessLevel};
pub use audit::AuditPage;
pub use config::VaultServiceConfig;
pub use directory::{StaticDirectory, UserDirectory};
pub use links::{CreatedShareLink, ShareLinkAccess};
pub use model::{AuditAction, AuditLogEntry, ItemKind, Permissions, ShareLink, VaultItem};
pub use repo::VaultRepo;
pub use scheduler::{PurgeScheduler, PurgeSchedulerHandle};
pub use service::{
    CreatedFolder, DownloadTarget, FinalizedUpload, UploadTicket, VaultService,
};
pub use sharing::{SharingEntry, SharingInfo};
pub use trash::{PurgeTarget, Purged, Restored, SoftDeleted};
pub use tree::{join_path, Propagation};
