//! Vault item, share link, and audit log records.
//!
//! These structs mirror the documents persisted in the backing database.
//! Field names serialize as camelCase, matching the document collections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::access::AccessLevel;
use stratavault_common::{ItemId, ShareId, UserId};

/// Kind of a vault item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Folder,
    File,
}

/// Per-item share permission sets.
///
/// `can_write` is always a subset of `can_read`; the mutation helpers
/// below are the only way service code touches the sets, which keeps the
/// invariant intact under grants, downgrades, and revocations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    #[serde(default)]
    pub can_read: BTreeSet<UserId>,
    #[serde(default)]
    pub can_write: BTreeSet<UserId>,
}

impl Permissions {
    /// Grant a level to a collaborator.
    ///
    /// Granting write also grants read. Granting read to a current writer
    /// is a downgrade: the writer leaves `can_write` and stays readable.
    pub fn grant(&mut self, uid: &UserId, level: AccessLevel) {
        match level {
            AccessLevel::Write => {
                self.can_read.insert(uid.clone());
                self.can_write.insert(uid.clone());
            }
            AccessLevel::Read => {
                self.can_read.insert(uid.clone());
                self.can_write.remove(uid);
            }
        }
    }

    /// Remove a collaborator from both sets.
    pub fn revoke(&mut self, uid: &UserId) {
        self.can_read.remove(uid);
        self.can_write.remove(uid);
    }

    /// Whether the collaborator may read.
    pub fn allows_read(&self, uid: &UserId) -> bool {
        self.can_read.contains(uid) || self.can_write.contains(uid)
    }

    /// Whether the collaborator may write.
    pub fn allows_write(&self, uid: &UserId) -> bool {
        self.can_write.contains(uid)
    }

    /// Level currently held by a collaborator, if any.
    pub fn level_of(&self, uid: &UserId) -> Option<AccessLevel> {
        if self.can_write.contains(uid) {
            Some(AccessLevel::Write)
        } else if self.can_read.contains(uid) {
            Some(AccessLevel::Read)
        } else {
            None
        }
    }
}

/// One file or folder record in the hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultItem {
    /// Opaque unique identifier, immutable after creation.
    pub id: ItemId,
    /// Creating user; sharing never transfers ownership.
    pub owner_id: UserId,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    /// Sanitized display name.
    pub name: String,
    /// Containing folder, or None for root-level items.
    pub parent_id: Option<ItemId>,
    /// Materialized `/`-delimited path from root to this item.
    ///
    /// Invariant: always equals `parent.path + "/" + name`, or
    /// `"/" + name` at root. Every structural mutation preserves this.
    pub path: String,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// File size in bytes (files only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Backend that holds the object bytes (files only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_provider: Option<String>,
    /// Backend object key (files only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
    /// Cached signed download URL; an optimization, never a source of truth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url_expires_at: Option<DateTime<Utc>>,
    /// Collaborators with any access at all.
    #[serde(default)]
    pub shared_with: BTreeSet<UserId>,
    #[serde(default)]
    pub permissions: Permissions,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VaultItem {
    /// Whether this item is a folder.
    pub fn is_folder(&self) -> bool {
        self.kind == ItemKind::Folder
    }

    /// Whether this item is a file.
    pub fn is_file(&self) -> bool {
        self.kind == ItemKind::File
    }

    /// Add a collaborator at the given level.
    pub fn grant(&mut self, uid: &UserId, level: AccessLevel) {
        self.shared_with.insert(uid.clone());
        self.permissions.grant(uid, level);
    }

    /// Remove a collaborator entirely.
    pub fn revoke(&mut self, uid: &UserId) {
        self.shared_with.remove(uid);
        self.permissions.revoke(uid);
    }
}

/// One public share link record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareLink {
    pub share_id: ShareId,
    pub item_id: ItemId,
    pub owner_id: UserId,
    pub expires_at: Option<DateTime<Utc>>,
    pub allow_download: bool,
    /// Salted password hash; never the password itself.
    pub password_hash: Option<String>,
    pub access_count: u64,
    pub max_access_count: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

/// Action recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuditAction {
    FolderCreated,
    UploadRequested,
    UploadFinalized,
    ItemRenamed,
    ItemMoved,
    ItemTrashed,
    ItemRestored,
    ItemPurged,
    ItemShared,
    ShareRevoked,
    ShareLinkCreated,
    ShareLinkAccessed,
    DownloadUrlIssued,
    TrashSweepRun,
}

/// Append-only audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<ItemId>,
    pub actor_id: UserId,
    /// Target of a sharing action, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_user_id: Option<UserId>,
    pub action: AuditAction,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}
