//! Soft-delete, restore, and purge lifecycle.
//!
//! States: live -> trashed -> purged, with restore as the only backward
//! transition. Trashing keeps both the document and the backing object;
//! bytes leave storage only when an item is purged, either explicitly or
//! by the retention sweep.
//!
//! Whole subtrees are discovered with one path-prefix range query rather
//! than per-level traversal, then flipped in chunked batch writes. The
//! writes are idempotent: re-running a partially applied batch converges.

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::access;
use crate::model::{AuditAction, AuditLogEntry, VaultItem};
use crate::service::VaultService;
use stratavault_common::{Error, ItemId, Result, UserId};
use stratavault_db::{WriteBatch, WriteOp};

/// Result of a soft delete.
#[derive(Debug, Clone, Copy)]
pub struct SoftDeleted {
    /// Documents flipped to trashed, including the target itself.
    pub deleted_count: usize,
}

/// Result of a restore.
#[derive(Debug, Clone, Copy)]
pub struct Restored {
    /// Documents flipped back to live; zero when nothing was trashed.
    pub restored_count: usize,
}

/// Result of a permanent delete.
#[derive(Debug, Clone, Copy, Default)]
pub struct Purged {
    /// Documents removed.
    pub deleted_count: usize,
    /// Backing objects actually deleted (best-effort).
    pub files_deleted: usize,
}

/// What an explicit purge applies to.
#[derive(Debug, Clone)]
pub enum PurgeTarget {
    /// Specific trashed items.
    Items(Vec<ItemId>),
    /// Everything in the caller's trash.
    All,
}

impl VaultService {
    /// Move an item (and, for folders, its whole subtree) to the trash.
    ///
    /// Idempotent: trashing an already-trashed item reports zero flips.
    pub async fn soft_delete(&self, uid: &UserId, item_id: &ItemId) -> Result<SoftDeleted> {
        let item = self.repo.require_item(item_id).await?;
        access::require_owner(&item, uid)?;
        if item.is_deleted {
            return Ok(SoftDeleted { deleted_count: 0 });
        }

        let now = Utc::now();
        let mut targets = vec![item.clone()];
        if item.is_folder() {
            targets.extend(self.repo.subtree(&item.path, false).await?);
        }

        let mut batch = WriteBatch::new();
        for target in &mut targets {
            target.is_deleted = true;
            target.deleted_at = Some(now);
            target.updated_at = now;
            self.repo.batch_put_item(&mut batch, target)?;
        }
        let deleted_count = targets.len();
        self.repo.commit_chunked(batch).await?;

        info!(item = %item.id, deleted_count, "Item moved to trash");
        self.record_audit(
            AuditLogEntry::new(uid.clone(), AuditAction::ItemTrashed)
                .with_item(item.id.clone())
                .with_metadata(json!({ "deletedCount": deleted_count })),
        )
        .await;

        Ok(SoftDeleted { deleted_count })
    }

    /// List the caller's trashed items.
    pub async fn list_trash(&self, uid: &UserId) -> Result<Vec<VaultItem>> {
        let mut items = self.repo.trashed_items(uid).await?;
        Self::sort_listing(&mut items);
        Ok(items)
    }

    /// Bring a trashed item (and its trashed descendants) back to life.
    ///
    /// Idempotent: restoring a live item reports zero flips.
    pub async fn restore(&self, uid: &UserId, item_id: &ItemId) -> Result<Restored> {
        let item = self.repo.require_item(item_id).await?;
        access::require_owner(&item, uid)?;
        if !item.is_deleted {
            return Ok(Restored { restored_count: 0 });
        }

        let mut targets = vec![item.clone()];
        if item.is_folder() {
            targets.extend(
                self.repo
                    .subtree(&item.path, true)
                    .await?
                    .into_iter()
                    .filter(|descendant| descendant.is_deleted),
            );
        }

        let now = Utc::now();
        let mut batch = WriteBatch::new();
        for target in &mut targets {
            target.is_deleted = false;
            target.deleted_at = None;
            target.updated_at = now;
            self.repo.batch_put_item(&mut batch, target)?;
        }
        let restored_count = targets.len();
        self.repo.commit_chunked(batch).await?;

        info!(item = %item.id, restored_count, "Item restored from trash");
        self.record_audit(
            AuditLogEntry::new(uid.clone(), AuditAction::ItemRestored)
                .with_item(item.id.clone())
                .with_metadata(json!({ "restoredCount": restored_count })),
        )
        .await;

        Ok(Restored { restored_count })
    }

    /// Permanently delete trashed items.
    ///
    /// # Errors
    /// - `InvalidArgument` without confirmation
    /// - `FailedPrecondition` when a named item is not in the trash
    pub async fn purge(
        &self,
        uid: &UserId,
        target: PurgeTarget,
        confirm: bool,
    ) -> Result<Purged> {
        if !confirm {
            return Err(Error::InvalidArgument(
                "Permanent deletion requires confirmation".to_string(),
            ));
        }

        let items = match target {
            PurgeTarget::Items(ids) => {
                let mut items = Vec::with_capacity(ids.len());
                for id in &ids {
                    let item = self.repo.require_item(id).await?;
                    access::require_owner(&item, uid)?;
                    if !item.is_deleted {
                        return Err(Error::FailedPrecondition(format!(
                            "Item '{}' is not in the trash",
                            item.name
                        )));
                    }
                    items.push(item);
                }
                items
            }
            PurgeTarget::All => self.repo.trashed_items(uid).await?,
        };

        let mut outcome = Purged::default();
        for item in &items {
            // An earlier folder purge may already have covered this item.
            if self.repo.get_item(&item.id).await?.is_none() {
                continue;
            }

            let purged = self.purge_item_documents(item).await?;
            outcome.deleted_count += purged.deleted_count;
            outcome.files_deleted += purged.files_deleted;

            self.record_audit(
                AuditLogEntry::new(uid.clone(), AuditAction::ItemPurged)
                    .with_item(item.id.clone())
                    .with_metadata(json!({
                        "deletedCount": purged.deleted_count,
                        "filesDeleted": purged.files_deleted,
                    })),
            )
            .await;
        }

        info!(
            deleted_count = outcome.deleted_count,
            files_deleted = outcome.files_deleted,
            "Trash purged"
        );
        Ok(outcome)
    }

    /// Purge everything past the retention window, across all owners.
    ///
    /// Invoked by the scheduler, not per-user.
    pub async fn purge_expired_trash(&self) -> Result<Purged> {
        let cutoff = Utc::now() - chrono::Duration::days(self.config.retention_days);
        let expired: Vec<VaultItem> = self
            .repo
            .all_trashed_items()
            .await?
            .into_iter()
            .filter(|item| item.deleted_at.map(|at| at <= cutoff).unwrap_or(false))
            .collect();

        let mut outcome = Purged::default();
        for item in &expired {
            if self.repo.get_item(&item.id).await?.is_none() {
                continue;
            }
            let purged = self.purge_item_documents(item).await?;
            outcome.deleted_count += purged.deleted_count;
            outcome.files_deleted += purged.files_deleted;
        }

        if outcome.deleted_count > 0 {
            info!(
                deleted_count = outcome.deleted_count,
                files_deleted = outcome.files_deleted,
                "Retention sweep purged expired trash"
            );
        }
        self.record_audit(
            AuditLogEntry::new(Self::system_actor(), AuditAction::TrashSweepRun).with_metadata(
                json!({
                    "deletedCount": outcome.deleted_count,
                    "filesDeleted": outcome.files_deleted,
                }),
            ),
        )
        .await;

        Ok(outcome)
    }

    pub(crate) fn system_actor() -> UserId {
        UserId::new("system").expect("system actor id is non-empty")
    }

    /// Remove one trashed item: backing objects (best-effort), descendant
    /// documents, side-records, share links, and the item document itself.
    async fn purge_item_documents(&self, item: &VaultItem) -> Result<Purged> {
        let mut targets = vec![item.clone()];
        if item.is_folder() {
            targets.extend(self.repo.subtree(&item.path, true).await?);
        }

        let mut outcome = Purged::default();
        let mut batch = WriteBatch::new();

        for target in &targets {
            // Object deletion is best-effort: the document removal is the
            // primary outcome, a stranded object is only logged.
            if let Some(key) = &target.storage_key {
                match self
                    .storage
                    .delete_object(key, target.storage_provider.as_deref())
                    .await
                {
                    Ok(()) => outcome.files_deleted += 1,
                    Err(err) => {
                        warn!(item = %target.id, key = %key, error = %err, "Failed to delete backing object");
                    }
                }
            }

            batch.push(WriteOp::Delete {
                collection: crate::repo::ITEMS.to_string(),
                id: target.id.as_str().to_string(),
            });
            batch.push(WriteOp::Delete {
                collection: crate::repo::ENCRYPTION_META.to_string(),
                id: target.id.as_str().to_string(),
            });
            self.repo
                .batch_delete_share_links(&mut batch, &target.id)
                .await?;
            outcome.deleted_count += 1;
        }

        self.repo.commit_chunked(batch).await?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{service_fixture, uid, uploaded_file};

    #[tokio::test]
    async fn test_soft_delete_folder_flips_whole_subtree() {
        let fx = service_fixture().await;
        let user = uid("u1");

        // Folder with 2 files and a subfolder holding 1 file: 5 documents.
        let a = fx.service.create_folder(&user, "A", None).await.unwrap();
        let sub = fx.service.create_folder(&user, "Sub", Some(&a.id)).await.unwrap();
        for (name, parent) in [("f1.txt", &a.id), ("f2.txt", &a.id), ("f3.txt", &sub.id)] {
            let ticket = fx
                .service
                .request_upload_url(&user, name, "text/plain", Some(parent), 1, false)
                .await
                .unwrap();
            fx.cloud.insert_object(&ticket.storage_path);
        }

        let outcome = fx.service.soft_delete(&user, &a.id).await.unwrap();
        assert_eq!(outcome.deleted_count, 5);

        for item in fx.service.repo.trashed_items(&user).await.unwrap() {
            assert!(item.is_deleted);
            assert!(item.deleted_at.is_some());
        }
        assert!(fx.service.list_items(&user, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_soft_delete_keeps_backing_objects() {
        let fx = service_fixture().await;
        let user = uid("u1");
        let file_id = uploaded_file(&fx, &user, "a.txt").await;

        let item = fx.service.repo.require_item(&file_id).await.unwrap();
        let key = item.storage_key.clone().unwrap();

        fx.service.soft_delete(&user, &file_id).await.unwrap();
        assert!(fx.cloud.has_object(&key), "trash must not delete bytes");
    }

    #[tokio::test]
    async fn test_soft_delete_is_idempotent() {
        let fx = service_fixture().await;
        let user = uid("u1");
        let file_id = uploaded_file(&fx, &user, "a.txt").await;

        assert_eq!(
            fx.service.soft_delete(&user, &file_id).await.unwrap().deleted_count,
            1
        );
        assert_eq!(
            fx.service.soft_delete(&user, &file_id).await.unwrap().deleted_count,
            0
        );
    }

    #[tokio::test]
    async fn test_restore_counts_only_trashed_items() {
        let fx = service_fixture().await;
        let user = uid("u1");

        let a = fx.service.create_folder(&user, "A", None).await.unwrap();
        let file_id = {
            let ticket = fx
                .service
                .request_upload_url(&user, "f.txt", "text/plain", Some(&a.id), 1, false)
                .await
                .unwrap();
            fx.cloud.insert_object(&ticket.storage_path);
            ticket.item_id
        };

        fx.service.soft_delete(&user, &a.id).await.unwrap();
        let outcome = fx.service.restore(&user, &a.id).await.unwrap();
        assert_eq!(outcome.restored_count, 2);

        let file = fx.service.repo.require_item(&file_id).await.unwrap();
        assert!(!file.is_deleted);
        assert!(file.deleted_at.is_none());

        // Restoring again is a no-op.
        let outcome = fx.service.restore(&user, &a.id).await.unwrap();
        assert_eq!(outcome.restored_count, 0);
    }

    #[tokio::test]
    async fn test_purge_requires_trash_and_confirmation() {
        let fx = service_fixture().await;
        let user = uid("u1");
        let file_id = uploaded_file(&fx, &user, "a.txt").await;

        let err = fx
            .service
            .purge(&user, PurgeTarget::Items(vec![file_id.clone()]), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = fx
            .service
            .purge(&user, PurgeTarget::Items(vec![file_id.clone()]), true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn test_purge_deletes_documents_objects_and_side_records() {
        let fx = service_fixture().await;
        let user = uid("u1");
        let file_id = uploaded_file(&fx, &user, "a.txt").await;

        let key = fx
            .service
            .repo
            .require_item(&file_id)
            .await
            .unwrap()
            .storage_key
            .clone()
            .unwrap();
        let link = fx
            .service
            .create_share_link(&user, &file_id, None, true, None, None)
            .await
            .unwrap();

        fx.service.soft_delete(&user, &file_id).await.unwrap();
        let outcome = fx
            .service
            .purge(&user, PurgeTarget::Items(vec![file_id.clone()]), true)
            .await
            .unwrap();

        assert_eq!(outcome.deleted_count, 1);
        assert_eq!(outcome.files_deleted, 1);
        assert!(!fx.cloud.has_object(&key));
        assert!(fx.service.repo.get_item(&file_id).await.unwrap().is_none());
        assert!(fx
            .service
            .repo
            .get_share_link(&link.share_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_purge_survives_failed_object_delete() {
        let fx = service_fixture().await;
        let user = uid("u1");
        let file_id = uploaded_file(&fx, &user, "a.txt").await;

        fx.service.soft_delete(&user, &file_id).await.unwrap();
        // Every delete attempt fails; document removal must still win.
        fx.cloud.fail_next(500, 10);

        let outcome = fx
            .service
            .purge(&user, PurgeTarget::Items(vec![file_id.clone()]), true)
            .await
            .unwrap();
        assert_eq!(outcome.deleted_count, 1);
        assert_eq!(outcome.files_deleted, 0);
        assert!(fx.service.repo.get_item(&file_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_trash_purges_everything() {
        let fx = service_fixture().await;
        let user = uid("u1");

        let a = fx.service.create_folder(&user, "A", None).await.unwrap();
        let ticket = fx
            .service
            .request_upload_url(&user, "f.txt", "text/plain", Some(&a.id), 1, false)
            .await
            .unwrap();
        fx.cloud.insert_object(&ticket.storage_path);

        fx.service.soft_delete(&user, &a.id).await.unwrap();
        let outcome = fx.service.purge(&user, PurgeTarget::All, true).await.unwrap();

        assert_eq!(outcome.deleted_count, 2);
        assert!(fx.service.list_trash(&user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retention_sweep_honours_cutoff() {
        let fx = service_fixture().await;
        let user = uid("u1");

        let old_id = uploaded_file(&fx, &user, "old.txt").await;
        let recent_id = uploaded_file(&fx, &user, "recent.txt").await;
        fx.service.soft_delete(&user, &old_id).await.unwrap();
        fx.service.soft_delete(&user, &recent_id).await.unwrap();

        // Backdate one item past the 30-day window.
        let mut old = fx.service.repo.require_item(&old_id).await.unwrap();
        old.deleted_at = Some(Utc::now() - chrono::Duration::days(31));
        fx.service.repo.put_item(&old).await.unwrap();
        let mut recent = fx.service.repo.require_item(&recent_id).await.unwrap();
        recent.deleted_at = Some(Utc::now() - chrono::Duration::days(29));
        fx.service.repo.put_item(&recent).await.unwrap();

        let outcome = fx.service.purge_expired_trash().await.unwrap();
        assert_eq!(outcome.deleted_count, 1);

        assert!(fx.service.repo.get_item(&old_id).await.unwrap().is_none());
        assert!(fx.service.repo.get_item(&recent_id).await.unwrap().is_some());
    }
}
