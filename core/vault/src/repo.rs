//! Typed repository over the document store.
//!
//! One collection of vault items, one of share links, one append-only
//! audit log collection, and one side-record collection for encryption
//! metadata. The item `path` field doubles as a sortable secondary key
//! for subtree prefix-range queries.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::model::{AuditLogEntry, ShareLink, VaultItem};
use stratavault_common::{Error, ItemId, Result, ShareId, UserId};
use stratavault_db::{Document, DocumentStore, Query, WriteBatch, WriteOp, MAX_BATCH_OPS};

/// Collection names in the backing database.
pub const ITEMS: &str = "vaultItems";
pub const SHARE_LINKS: &str = "shareLinks";
pub const AUDIT_LOGS: &str = "auditLogs";
pub const ENCRYPTION_META: &str = "encryptionMeta";

/// Everything lexicographically above any real path character.
const RANGE_END_SENTINEL: char = '\u{10FFFF}';

/// Typed access to the vault collections.
#[derive(Clone)]
pub struct VaultRepo {
    db: Arc<dyn DocumentStore>,
}

impl VaultRepo {
    /// Create a repository over a document store.
    pub fn new(db: Arc<dyn DocumentStore>) -> Self {
        Self { db }
    }

    fn to_doc<T: Serialize>(value: &T) -> Result<Value> {
        serde_json::to_value(value).map_err(|e| Error::Serialization(e.to_string()))
    }

    fn from_doc<T: DeserializeOwned>(doc: Document) -> Result<T> {
        serde_json::from_value(doc.data).map_err(|e| Error::Serialization(e.to_string()))
    }

    fn from_docs<T: DeserializeOwned>(docs: Vec<Document>) -> Result<Vec<T>> {
        docs.into_iter().map(Self::from_doc).collect()
    }

    // --- vault items ---

    /// Fetch an item by id.
    pub async fn get_item(&self, id: &ItemId) -> Result<Option<VaultItem>> {
        match self.db.get(ITEMS, id.as_str()).await? {
            Some(doc) => Ok(Some(Self::from_doc(doc)?)),
            None => Ok(None),
        }
    }

    /// Fetch an item by id, failing with `NotFound` when absent.
    pub async fn require_item(&self, id: &ItemId) -> Result<VaultItem> {
        self.get_item(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Item '{}' does not exist", id)))
    }

    /// Create or replace an item document.
    pub async fn put_item(&self, item: &VaultItem) -> Result<()> {
        self.db
            .put(ITEMS, item.id.as_str(), Self::to_doc(item)?)
            .await
    }

    /// Delete an item document.
    pub async fn delete_item(&self, id: &ItemId) -> Result<()> {
        self.db.delete(ITEMS, id.as_str()).await
    }

    /// Direct children of a folder, by parent link.
    pub async fn children_of(&self, parent: &ItemId, include_deleted: bool) -> Result<Vec<VaultItem>> {
        let mut query = Query::new(ITEMS).filter_eq("parentId", parent.as_str());
        if !include_deleted {
            query = query.filter_eq("isDeleted", false);
        }
        Self::from_docs(self.db.run_query(&query).await?)
    }

    /// Live items owned by a user under the given parent (None = root).
    pub async fn owned_items_in(
        &self,
        owner: &UserId,
        parent: Option<&ItemId>,
    ) -> Result<Vec<VaultItem>> {
        let parent_value = match parent {
            Some(id) => Value::from(id.as_str()),
            None => Value::Null,
        };
        let query = Query::new(ITEMS)
            .filter_eq("ownerId", owner.as_str())
            .filter_eq("parentId", parent_value)
            .filter_eq("isDeleted", false);
        Self::from_docs(self.db.run_query(&query).await?)
    }

    /// Live items shared with a user.
    pub async fn shared_with(&self, uid: &UserId) -> Result<Vec<VaultItem>> {
        let query = Query::new(ITEMS)
            .filter_contains("sharedWith", uid.as_str())
            .filter_eq("isDeleted", false);
        Self::from_docs(self.db.run_query(&query).await?)
    }

    /// Every descendant of a folder path, via one prefix-range query.
    ///
    /// The range covers `path + "/"` up to the end-of-range sentinel, so
    /// `/A` matches `/A/x` but not its sibling `/AB`.
    pub async fn subtree(&self, path: &str, include_deleted: bool) -> Result<Vec<VaultItem>> {
        let lower = format!("{}/", path);
        let upper = format!("{}/{}", path, RANGE_END_SENTINEL);
        let mut query = Query::new(ITEMS).range_gte("path", lower).range_lt("path", upper);
        if !include_deleted {
            query = query.filter_eq("isDeleted", false);
        }
        Self::from_docs(self.db.run_query(&query).await?)
    }

    /// Find the file record holding a storage key.
    pub async fn find_by_storage_key(&self, key: &str) -> Result<Option<VaultItem>> {
        let query = Query::new(ITEMS).filter_eq("storageKey", key);
        Ok(Self::from_docs(self.db.run_query(&query).await?)?.into_iter().next())
    }

    /// Trashed items owned by a user.
    pub async fn trashed_items(&self, owner: &UserId) -> Result<Vec<VaultItem>> {
        let query = Query::new(ITEMS)
            .filter_eq("ownerId", owner.as_str())
            .filter_eq("isDeleted", true);
        Self::from_docs(self.db.run_query(&query).await?)
    }

    /// Every trashed item, across all owners (used by the purge sweep).
    pub async fn all_trashed_items(&self) -> Result<Vec<VaultItem>> {
        let query = Query::new(ITEMS).filter_eq("isDeleted", true);
        Self::from_docs(self.db.run_query(&query).await?)
    }

    /// Queue an item write onto a batch.
    pub fn batch_put_item(&self, batch: &mut WriteBatch, item: &VaultItem) -> Result<()> {
        batch.put(ITEMS, item.id.as_str(), Self::to_doc(item)?);
        Ok(())
    }

    /// Commit a batch of any size, chunked under the per-batch ceiling.
    ///
    /// Chunk boundaries are not transactional; callers rely on the
    /// individual writes being idempotent.
    pub async fn commit_chunked(&self, batch: WriteBatch) -> Result<()> {
        let mut ops = batch.into_ops();
        while !ops.is_empty() {
            let rest = ops.split_off(ops.len().min(MAX_BATCH_OPS));
            let mut chunk = WriteBatch::new();
            for op in ops {
                chunk.push(op);
            }
            self.db.commit(chunk).await?;
            ops = rest;
        }
        Ok(())
    }

    // --- share links ---

    /// Fetch a share link by token.
    pub async fn get_share_link(&self, share_id: &ShareId) -> Result<Option<ShareLink>> {
        match self.db.get(SHARE_LINKS, share_id.as_str()).await? {
            Some(doc) => Ok(Some(Self::from_doc(doc)?)),
            None => Ok(None),
        }
    }

    /// Create or replace a share link document.
    pub async fn put_share_link(&self, link: &ShareLink) -> Result<()> {
        self.db
            .put(SHARE_LINKS, link.share_id.as_str(), Self::to_doc(link)?)
            .await
    }

    /// Share links pointing at an item.
    pub async fn share_links_for_item(&self, item_id: &ItemId) -> Result<Vec<ShareLink>> {
        let query = Query::new(SHARE_LINKS).filter_eq("itemId", item_id.as_str());
        Self::from_docs(self.db.run_query(&query).await?)
    }

    /// Queue deletion of every share link pointing at an item.
    pub async fn batch_delete_share_links(
        &self,
        batch: &mut WriteBatch,
        item_id: &ItemId,
    ) -> Result<()> {
        for link in self.share_links_for_item(item_id).await? {
            batch.push(WriteOp::Delete {
                collection: SHARE_LINKS.to_string(),
                id: link.share_id.as_str().to_string(),
            });
        }
        Ok(())
    }

    // --- encryption metadata side-records ---

    /// Store encryption metadata for a file.
    pub async fn put_encryption_meta(&self, item_id: &ItemId, meta: Value) -> Result<()> {
        self.db.put(ENCRYPTION_META, item_id.as_str(), meta).await
    }

    /// Fetch encryption metadata for a file.
    pub async fn get_encryption_meta(&self, item_id: &ItemId) -> Result<Option<Value>> {
        Ok(self
            .db
            .get(ENCRYPTION_META, item_id.as_str())
            .await?
            .map(|doc| doc.data))
    }

    // --- audit log ---

    /// Append an audit entry.
    pub async fn append_audit(&self, entry: &AuditLogEntry) -> Result<()> {
        self.db
            .put(AUDIT_LOGS, &entry.id, Self::to_doc(entry)?)
            .await
    }

    /// Audit entries for one actor, newest first, with cursor pagination.
    pub async fn audit_for_actor(
        &self,
        actor: &UserId,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Vec<AuditLogEntry>> {
        let mut query = Query::new(AUDIT_LOGS)
            .filter_eq("actorId", actor.as_str())
            .order_by("timestamp", true)
            .limit(limit);
        if let Some(cursor) = cursor {
            query = query.start_after(cursor);
        }
        Self::from_docs(self.db.run_query(&query).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemKind, Permissions};
    use chrono::Utc;
    use std::collections::BTreeSet;
    use stratavault_db::MemoryStore;

    fn repo() -> VaultRepo {
        VaultRepo::new(Arc::new(MemoryStore::new()))
    }

    fn folder(id: &str, owner: &str, parent: Option<&str>, path: &str) -> VaultItem {
        VaultItem {
            id: ItemId::new(id).unwrap(),
            owner_id: UserId::new(owner).unwrap(),
            kind: ItemKind::Folder,
            name: path.rsplit('/').next().unwrap().to_string(),
            parent_id: parent.map(|p| ItemId::new(p).unwrap()),
            path: path.to_string(),
            is_deleted: false,
            deleted_at: None,
            size: None,
            mime_type: None,
            storage_provider: None,
            storage_key: None,
            download_url: None,
            download_url_expires_at: None,
            shared_with: BTreeSet::new(),
            permissions: Permissions::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_item_round_trip() {
        let repo = repo();
        let item = folder("f1", "u1", None, "/Docs");
        repo.put_item(&item).await.unwrap();

        let loaded = repo.require_item(&item.id).await.unwrap();
        assert_eq!(loaded.path, "/Docs");
        assert_eq!(loaded.kind, ItemKind::Folder);
    }

    #[tokio::test]
    async fn test_require_missing_item_is_not_found() {
        let repo = repo();
        let err = repo
            .require_item(&ItemId::new("ghost").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_subtree_excludes_sibling_prefixes() {
        let repo = repo();
        repo.put_item(&folder("a", "u1", None, "/A")).await.unwrap();
        repo.put_item(&folder("ax", "u1", Some("a"), "/A/x"))
            .await
            .unwrap();
        repo.put_item(&folder("axy", "u1", Some("ax"), "/A/x/y"))
            .await
            .unwrap();
        repo.put_item(&folder("ab", "u1", None, "/AB")).await.unwrap();

        let subtree = repo.subtree("/A", false).await.unwrap();
        let paths: Vec<&str> = subtree.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(subtree.len(), 2);
        assert!(paths.contains(&"/A/x"));
        assert!(paths.contains(&"/A/x/y"));
    }

    #[tokio::test]
    async fn test_owned_items_at_root_and_under_parent() {
        let repo = repo();
        repo.put_item(&folder("a", "u1", None, "/A")).await.unwrap();
        repo.put_item(&folder("b", "u1", Some("a"), "/A/B"))
            .await
            .unwrap();

        let root = repo
            .owned_items_in(&UserId::new("u1").unwrap(), None)
            .await
            .unwrap();
        assert_eq!(root.len(), 1);
        assert_eq!(root[0].path, "/A");

        let nested = repo
            .owned_items_in(&UserId::new("u1").unwrap(), Some(&ItemId::new("a").unwrap()))
            .await
            .unwrap();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].path, "/A/B");
    }

    #[tokio::test]
    async fn test_commit_chunked_handles_oversized_batches() {
        let repo = repo();
        let mut batch = WriteBatch::new();
        for i in 0..(MAX_BATCH_OPS + 10) {
            batch.put(ITEMS, format!("doc-{}", i), Value::Null);
        }

        repo.commit_chunked(batch).await.unwrap();

        let all = repo
            .db
            .run_query(&Query::new(ITEMS))
            .await
            .unwrap();
        assert_eq!(all.len(), MAX_BATCH_OPS + 10);
    }
}
