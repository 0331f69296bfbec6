//! Access control evaluation.
//!
//! Given an item and a requesting identity, decides owner/read/write/no
//! access from ownership plus the per-item share lists. Structural
//! mutations (rename, move, delete, share, revoke) are owner-only
//! regardless of write shares: write-sharing grants content access, not
//! control over the tree or over who else has access.

use serde::{Deserialize, Serialize};

use crate::model::VaultItem;
use stratavault_common::{Error, Result, UserId};

/// Requested access level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Read,
    Write,
}

/// Outcome of an access evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// Access granted; owners pass every check.
    Granted { is_owner: bool },
    /// Access denied for the stated reason.
    Denied { reason: &'static str },
}

impl AccessDecision {
    /// Whether access was granted.
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted { .. })
    }
}

/// Evaluate whether `uid` holds `level` access on `item`.
pub fn evaluate(item: &VaultItem, uid: &UserId, level: AccessLevel) -> AccessDecision {
    if item.is_deleted {
        return AccessDecision::Denied { reason: "deleted" };
    }

    if item.owner_id == *uid {
        return AccessDecision::Granted { is_owner: true };
    }

    if !item.shared_with.contains(uid) {
        return AccessDecision::Denied { reason: "not shared" };
    }

    let allowed = match level {
        AccessLevel::Read => item.permissions.allows_read(uid),
        AccessLevel::Write => item.permissions.allows_write(uid),
    };

    if allowed {
        AccessDecision::Granted { is_owner: false }
    } else {
        AccessDecision::Denied {
            reason: "insufficient share level",
        }
    }
}

/// Require `level` access, or fail with `PermissionDenied`.
pub fn require_access(item: &VaultItem, uid: &UserId, level: AccessLevel) -> Result<()> {
    match evaluate(item, uid, level) {
        AccessDecision::Granted { .. } => Ok(()),
        AccessDecision::Denied { reason } => Err(Error::PermissionDenied(format!(
            "No {:?} access to '{}': {}",
            level, item.name, reason
        ))),
    }
}

/// Require ownership, or fail with `PermissionDenied`.
pub fn require_owner(item: &VaultItem, uid: &UserId) -> Result<()> {
    if item.owner_id == *uid {
        Ok(())
    } else {
        Err(Error::PermissionDenied(format!(
            "Only the owner may perform this operation on '{}'",
            item.name
        )))
    }
}
