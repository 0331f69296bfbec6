//! Materialized-path tree operations.
//!
//! Paths are stored directly on each item and recomputed on structural
//! change. Rename and move recompute the target's path, then walk the
//! subtree iteratively to rewrite descendant paths level by level.

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::model::{AuditAction, AuditLogEntry, ItemKind};
use crate::repo::VaultRepo;
use crate::service::VaultService;
use stratavault_common::{
    sanitize_file_name, sanitize_folder_name, Error, ItemId, Result, UserId,
};

/// Join a parent path and a child name into a materialized path.
pub fn join_path(parent_path: Option<&str>, name: &str) -> String {
    match parent_path {
        Some(parent) => format!("{}/{}", parent, name),
        None => format!("/{}", name),
    }
}

/// Outcome of a descendant path propagation pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct Propagation {
    /// Documents rewritten.
    pub updated: usize,
    /// Whether the depth ceiling cut the walk short, leaving deeper
    /// descendants with a stale path prefix.
    pub truncated: bool,
}

/// Rewrite descendant paths under a folder whose path just changed.
///
/// Iterative, stack-based walk: each popped folder queries its direct
/// children by parent link, rewrites each child's path from the parent's
/// new path, and pushes child folders for the next level. Depth is
/// capped; hitting the cap logs a warning instead of failing the whole
/// operation, which bounds cost on pathological trees at the price of
/// stale paths below the cap.
pub(crate) async fn propagate_paths(
    repo: &VaultRepo,
    folder_id: &ItemId,
    new_path: &str,
    depth_ceiling: usize,
) -> Result<Propagation> {
    let mut stats = Propagation::default();
    let mut stack: Vec<(ItemId, String, usize)> =
        vec![(folder_id.clone(), new_path.to_string(), 1)];

    while let Some((id, parent_path, depth)) = stack.pop() {
        let children = repo.children_of(&id, true).await?;
        for mut child in children {
            child.path = join_path(Some(&parent_path), &child.name);
            child.updated_at = Utc::now();
            repo.put_item(&child).await?;
            stats.updated += 1;

            if child.kind == ItemKind::Folder {
                if depth >= depth_ceiling {
                    warn!(
                        folder = %child.id,
                        depth_ceiling,
                        "Path propagation stopped at depth ceiling; deeper descendants keep stale paths"
                    );
                    stats.truncated = true;
                } else {
                    stack.push((child.id.clone(), child.path.clone(), depth + 1));
                }
            }
        }
    }

    Ok(stats)
}

impl VaultService {
    /// Rename an item. Owner-only; write shares do not cover structural
    /// mutation.
    pub async fn rename(&self, uid: &UserId, item_id: &ItemId, new_name: &str) -> Result<()> {
        let mut item = self.load_owned_active(uid, item_id).await?;
        let new_name = match item.kind {
            ItemKind::Folder => sanitize_folder_name(new_name)?,
            ItemKind::File => sanitize_file_name(new_name)?,
        };

        if new_name == item.name {
            return Ok(());
        }
        self.check_sibling_name(uid, item.parent_id.as_ref(), &new_name, Some(&item.id))
            .await?;

        let parent_path = match &item.parent_id {
            Some(parent_id) => Some(self.repo.require_item(parent_id).await?.path),
            None => None,
        };

        let old_name = std::mem::replace(&mut item.name, new_name.clone());
        item.path = join_path(parent_path.as_deref(), &new_name);
        item.updated_at = Utc::now();
        self.repo.put_item(&item).await?;

        if item.is_folder() {
            let stats =
                propagate_paths(&self.repo, &item.id, &item.path, self.config.depth_ceiling)
                    .await?;
            info!(item = %item.id, updated = stats.updated, "Folder renamed");
        }

        self.record_audit(
            AuditLogEntry::new(uid.clone(), AuditAction::ItemRenamed)
                .with_item(item.id.clone())
                .with_metadata(json!({ "from": old_name, "to": new_name })),
        )
        .await;

        Ok(())
    }

    /// Move an item under a new parent (None = root). Owner-only.
    pub async fn move_item(
        &self,
        uid: &UserId,
        item_id: &ItemId,
        new_parent_id: Option<&ItemId>,
    ) -> Result<()> {
        let mut item = self.load_owned_active(uid, item_id).await?;

        if new_parent_id == Some(&item.id) {
            return Err(Error::InvalidArgument(
                "Cannot move an item into itself".to_string(),
            ));
        }

        let new_parent = self.resolve_parent(uid, new_parent_id).await?;
        if let Some(parent) = &new_parent {
            // A folder may not move under its own descendant; the parent
            // chain must stay acyclic.
            if parent.path == item.path || parent.path.starts_with(&format!("{}/", item.path)) {
                return Err(Error::InvalidArgument(format!(
                    "Cannot move '{}' into its own subtree",
                    item.name
                )));
            }
        }
        self.check_sibling_name(uid, new_parent_id, &item.name, Some(&item.id))
            .await?;

        let old_path = item.path.clone();
        item.parent_id = new_parent.as_ref().map(|p| p.id.clone());
        item.path = join_path(new_parent.as_ref().map(|p| p.path.as_str()), &item.name);
        item.updated_at = Utc::now();
        self.repo.put_item(&item).await?;

        if item.is_folder() {
            let stats =
                propagate_paths(&self.repo, &item.id, &item.path, self.config.depth_ceiling)
                    .await?;
            info!(
                item = %item.id,
                from = %old_path,
                to = %item.path,
                updated = stats.updated,
                "Folder moved"
            );
        }

        self.record_audit(
            AuditLogEntry::new(uid.clone(), AuditAction::ItemMoved)
                .with_item(item.id.clone())
                .with_metadata(json!({ "from": old_path, "to": item.path })),
        )
        .await;

        Ok(())
    }
}
