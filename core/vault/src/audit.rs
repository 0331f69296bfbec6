//! Audit log recording and retrieval.
//!
//! Every mutating action and every sensitive read appends one entry.
//! Audit writes never block the primary operation: a failed append is
//! logged and swallowed.

use chrono::Utc;
use serde_json::Value;
use tracing::error;
use uuid::Uuid;

use crate::model::{AuditAction, AuditLogEntry};
use crate::service::VaultService;
use stratavault_common::{ItemId, Result, UserId};

/// One page of audit entries.
#[derive(Debug, Clone)]
pub struct AuditPage {
    pub entries: Vec<AuditLogEntry>,
    /// Cursor for the next page; None when this page is the last.
    pub next_cursor: Option<String>,
}

impl AuditLogEntry {
    /// Start a new entry for an actor and action.
    pub fn new(actor_id: UserId, action: AuditAction) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            item_id: None,
            actor_id,
            target_user_id: None,
            action,
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    /// Attach the subject item.
    pub fn with_item(mut self, item_id: ItemId) -> Self {
        self.item_id = Some(item_id);
        self
    }

    /// Attach the target user of a sharing action.
    pub fn with_target(mut self, target: UserId) -> Self {
        self.target_user_id = Some(target);
        self
    }

    /// Attach free-form metadata.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

impl VaultService {
    /// Append an audit entry, swallowing failures.
    pub(crate) async fn record_audit(&self, entry: AuditLogEntry) {
        if let Err(err) = self.repo.append_audit(&entry).await {
            error!(
                action = ?entry.action,
                actor = %entry.actor_id,
                error = %err,
                "Failed to write audit entry"
            );
        }
    }

    /// The caller's own audit entries, newest first.
    pub async fn get_audit_logs(
        &self,
        uid: &UserId,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<AuditPage> {
        let entries = self.repo.audit_for_actor(uid, limit, cursor).await?;
        let next_cursor = if entries.len() == limit {
            entries.last().map(|entry| entry.id.clone())
        } else {
            None
        };
        Ok(AuditPage {
            entries,
            next_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AuditAction;
    use crate::test_support::{service_fixture, uid};

    #[tokio::test]
    async fn test_mutations_leave_audit_entries() {
        let fx = service_fixture().await;
        let user = uid("u1");

        let folder = fx.service.create_folder(&user, "A", None).await.unwrap();
        fx.service.rename(&user, &folder.id, "B").await.unwrap();
        fx.service.soft_delete(&user, &folder.id).await.unwrap();

        let page = fx.service.get_audit_logs(&user, 10, None).await.unwrap();
        let actions: Vec<AuditAction> = page.entries.iter().map(|e| e.action).collect();

        assert!(actions.contains(&AuditAction::FolderCreated));
        assert!(actions.contains(&AuditAction::ItemRenamed));
        assert!(actions.contains(&AuditAction::ItemTrashed));
    }

    #[tokio::test]
    async fn test_audit_logs_are_scoped_to_actor() {
        let fx = service_fixture().await;
        fx.service.create_folder(&uid("u1"), "A", None).await.unwrap();
        fx.service.create_folder(&uid("u2"), "B", None).await.unwrap();

        let page = fx.service.get_audit_logs(&uid("u1"), 10, None).await.unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].actor_id, uid("u1"));
    }

    #[tokio::test]
    async fn test_audit_pagination() {
        let fx = service_fixture().await;
        let user = uid("u1");
        for i in 0..5 {
            fx.service
                .create_folder(&user, &format!("F{}", i), None)
                .await
                .unwrap();
        }

        let first = fx.service.get_audit_logs(&user, 3, None).await.unwrap();
        assert_eq!(first.entries.len(), 3);
        let cursor = first.next_cursor.expect("more pages remain");

        let second = fx
            .service
            .get_audit_logs(&user, 3, Some(&cursor))
            .await
            .unwrap();
        assert_eq!(second.entries.len(), 2);

        // No entry appears on both pages.
        for entry in &second.entries {
            assert!(first.entries.iter().all(|e| e.id != entry.id));
        }
    }

    #[tokio::test]
    async fn test_share_audits_one_entry_per_target() {
        let fx = service_fixture().await;
        let owner = uid("u1");
        let folder = fx.service.create_folder(&owner, "A", None).await.unwrap();

        fx.service
            .share(
                &owner,
                &folder.id,
                &[uid("u2"), uid("u3")],
                crate::access::AccessLevel::Read,
                false,
            )
            .await
            .unwrap();

        let page = fx.service.get_audit_logs(&owner, 10, None).await.unwrap();
        let share_entries: Vec<_> = page
            .entries
            .iter()
            .filter(|e| e.action == AuditAction::ItemShared)
            .collect();
        assert_eq!(share_entries.len(), 2);
        assert!(share_entries.iter().all(|e| e.target_user_id.is_some()));
    }
}
