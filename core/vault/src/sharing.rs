//! Sharing and revocation.
//!
//! Share lists live on each item; grants merge idempotently via set
//! union, write implies read, and re-sharing a writer at read level is a
//! downgrade. All of it is owner-only.

use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::access::{self, AccessLevel};
use crate::model::{AuditAction, AuditLogEntry, VaultItem};
use crate::service::VaultService;
use stratavault_common::{Error, ItemId, Result, UserId};
use stratavault_db::WriteBatch;

/// One collaborator's standing on an item.
#[derive(Debug, Clone)]
pub struct SharingEntry {
    pub user_id: UserId,
    pub level: AccessLevel,
}

/// Sharing state of an item, as seen by one requester.
#[derive(Debug, Clone)]
pub struct SharingInfo {
    pub entries: Vec<SharingEntry>,
    pub is_owner: bool,
}

impl VaultService {
    /// Validate share targets: they must exist and must not be the owner.
    async fn validate_targets(&self, owner: &UserId, targets: &[UserId]) -> Result<()> {
        if targets.is_empty() {
            return Err(Error::InvalidArgument(
                "At least one share target is required".to_string(),
            ));
        }

        for target in targets {
            if target == owner {
                return Err(Error::InvalidArgument(
                    "Cannot share an item with its owner".to_string(),
                ));
            }
            if !self.directory.user_exists(target).await? {
                return Err(Error::NotFound(format!(
                    "User '{}' does not exist",
                    target
                )));
            }
        }
        Ok(())
    }

    /// Share an item with a set of users at the given level.
    ///
    /// With `recursive` set on a folder, the same change applies to every
    /// descendant in chunked batch writes.
    pub async fn share(
        &self,
        uid: &UserId,
        item_id: &ItemId,
        targets: &[UserId],
        level: AccessLevel,
        recursive: bool,
    ) -> Result<()> {
        let mut item = self.load_owned_active(uid, item_id).await?;
        self.validate_targets(uid, targets).await?;

        for target in targets {
            item.grant(target, level);
        }
        item.updated_at = Utc::now();
        self.repo.put_item(&item).await?;

        if recursive && item.is_folder() {
            self.apply_to_subtree(&item, |descendant| {
                for target in targets {
                    descendant.grant(target, level);
                }
            })
            .await?;
        }

        info!(item = %item.id, targets = targets.len(), ?level, recursive, "Item shared");
        for target in targets {
            self.record_audit(
                AuditLogEntry::new(uid.clone(), AuditAction::ItemShared)
                    .with_item(item.id.clone())
                    .with_target(target.clone())
                    .with_metadata(json!({ "level": level, "recursive": recursive })),
            )
            .await;
        }

        Ok(())
    }

    /// Remove users from an item's share lists.
    pub async fn revoke(
        &self,
        uid: &UserId,
        item_id: &ItemId,
        targets: &[UserId],
        recursive: bool,
    ) -> Result<()> {
        let mut item = self.load_owned_active(uid, item_id).await?;
        if targets.is_empty() {
            return Err(Error::InvalidArgument(
                "At least one revoke target is required".to_string(),
            ));
        }

        for target in targets {
            item.revoke(target);
        }
        item.updated_at = Utc::now();
        self.repo.put_item(&item).await?;

        if recursive && item.is_folder() {
            self.apply_to_subtree(&item, |descendant| {
                for target in targets {
                    descendant.revoke(target);
                }
            })
            .await?;
        }

        info!(item = %item.id, targets = targets.len(), "Share revoked");
        for target in targets {
            self.record_audit(
                AuditLogEntry::new(uid.clone(), AuditAction::ShareRevoked)
                    .with_item(item.id.clone())
                    .with_target(target.clone()),
            )
            .await;
        }

        Ok(())
    }

    /// Share an item with every member of the owner's family group.
    ///
    /// # Errors
    /// - `FailedPrecondition` if the owner belongs to no group, or the
    ///   group has no other members
    pub async fn share_with_group(
        &self,
        uid: &UserId,
        item_id: &ItemId,
        level: AccessLevel,
        recursive: bool,
    ) -> Result<()> {
        let members = self
            .directory
            .group_members(uid)
            .await?
            .ok_or_else(|| {
                Error::FailedPrecondition(format!(
                    "User '{}' does not belong to a family group",
                    uid
                ))
            })?;

        let targets: Vec<UserId> = members.into_iter().filter(|m| m != uid).collect();
        if targets.is_empty() {
            return Err(Error::FailedPrecondition(
                "The family group has no other members to share with".to_string(),
            ));
        }

        self.share(uid, item_id, &targets, level, recursive).await
    }

    /// Sharing state of an item. Requires read access; only the owner
    /// learns who else the item is shared with.
    pub async fn get_sharing_info(&self, uid: &UserId, item_id: &ItemId) -> Result<SharingInfo> {
        let item = self.repo.require_item(item_id).await?;
        access::require_access(&item, uid, AccessLevel::Read)?;

        let is_owner = item.owner_id == *uid;
        let entries = item
            .shared_with
            .iter()
            .filter(|collaborator| is_owner || *collaborator == uid)
            .filter_map(|collaborator| {
                item.permissions.level_of(collaborator).map(|level| SharingEntry {
                    user_id: collaborator.clone(),
                    level,
                })
            })
            .collect();

        Ok(SharingInfo { entries, is_owner })
    }

    /// Apply a mutation to every live descendant, in chunked batches.
    async fn apply_to_subtree<F>(&self, folder: &VaultItem, mutate: F) -> Result<()>
    where
        F: Fn(&mut VaultItem),
    {
        let descendants = self.repo.subtree(&folder.path, false).await?;
        let mut batch = WriteBatch::new();
        for mut descendant in descendants {
            mutate(&mut descendant);
            descendant.updated_at = Utc::now();
            self.repo.batch_put_item(&mut batch, &descendant)?;
        }
        self.repo.commit_chunked(batch).await
    }
}
