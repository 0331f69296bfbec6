//! Vault service facade.
//!
//! One entry point per public operation. Callers arrive authenticated;
//! every operation re-checks authorization against the item it touches,
//! goes through the storage router for byte-level work, and terminates
//! in an audit entry.

use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::access::{self, AccessLevel};
use crate::config::VaultServiceConfig;
use crate::directory::UserDirectory;
use crate::model::{AuditAction, AuditLogEntry, ItemKind, Permissions, VaultItem};
use crate::repo::VaultRepo;
use crate::tree;
use stratavault_common::{
    sanitize_file_name, sanitize_folder_name, Error, ItemId, Result, UserId,
};
use stratavault_db::DocumentStore;
use stratavault_storage::{build_object_key, StorageRouter};

/// Result of creating a folder.
#[derive(Debug, Clone)]
pub struct CreatedFolder {
    pub id: ItemId,
}

/// Result of requesting an upload URL.
#[derive(Debug, Clone)]
pub struct UploadTicket {
    pub signed_url: String,
    pub item_id: ItemId,
    pub storage_provider: String,
    pub storage_path: String,
}

/// Result of finalizing an upload.
#[derive(Debug, Clone)]
pub struct FinalizedUpload {
    pub id: ItemId,
    pub download_url: String,
    pub is_encrypted: bool,
}

/// Target of a download-URL request.
#[derive(Debug, Clone)]
pub enum DownloadTarget {
    Item(ItemId),
    StoragePath(String),
}

/// The hierarchical vault engine.
pub struct VaultService {
    pub(crate) repo: VaultRepo,
    pub(crate) storage: Arc<StorageRouter>,
    pub(crate) directory: Arc<dyn UserDirectory>,
    pub(crate) config: VaultServiceConfig,
}

impl VaultService {
    /// Create a service over a document store, storage router, and
    /// user directory.
    pub fn new(
        db: Arc<dyn DocumentStore>,
        storage: Arc<StorageRouter>,
        directory: Arc<dyn UserDirectory>,
        config: VaultServiceConfig,
    ) -> Self {
        Self {
            repo: VaultRepo::new(db),
            storage,
            directory,
            config,
        }
    }

    pub(crate) fn generate_item_id() -> ItemId {
        ItemId::new(Uuid::new_v4().to_string()).expect("generated id is non-empty")
    }

    /// Load an item the caller owns and that is not in the trash.
    ///
    /// Owner-only structural operations (rename, move, share, delete)
    /// start here.
    pub(crate) async fn load_owned_active(&self, uid: &UserId, id: &ItemId) -> Result<VaultItem> {
        let item = self.repo.require_item(id).await?;
        access::require_owner(&item, uid)?;
        if item.is_deleted {
            return Err(Error::FailedPrecondition(format!(
                "Item '{}' is in the trash",
                item.name
            )));
        }
        Ok(item)
    }

    /// Resolve a parent folder the caller owns; `None` means root.
    pub(crate) async fn resolve_parent(
        &self,
        uid: &UserId,
        parent_id: Option<&ItemId>,
    ) -> Result<Option<VaultItem>> {
        let Some(parent_id) = parent_id else {
            return Ok(None);
        };

        let parent = self.repo.require_item(parent_id).await?;
        if !parent.is_folder() {
            return Err(Error::InvalidArgument(format!(
                "Parent '{}' is not a folder",
                parent.name
            )));
        }
        if parent.is_deleted {
            return Err(Error::NotFound(format!(
                "Parent folder '{}' does not exist",
                parent.name
            )));
        }
        access::require_owner(&parent, uid)?;
        Ok(Some(parent))
    }

    /// Fail with `AlreadyExists` when a live sibling carries the name.
    pub(crate) async fn check_sibling_name(
        &self,
        owner: &UserId,
        parent: Option<&ItemId>,
        name: &str,
        exclude: Option<&ItemId>,
    ) -> Result<()> {
        let siblings = self.repo.owned_items_in(owner, parent).await?;
        let taken = siblings
            .iter()
            .any(|s| s.name == name && Some(&s.id) != exclude);
        if taken {
            return Err(Error::AlreadyExists(format!(
                "An item named '{}' already exists here",
                name
            )));
        }
        Ok(())
    }

    /// Folders sort before files, then lexicographically by name.
    pub(crate) fn sort_listing(items: &mut [VaultItem]) {
        items.sort_by(|a, b| {
            let rank = |item: &VaultItem| match item.kind {
                ItemKind::Folder => 0,
                ItemKind::File => 1,
            };
            rank(a).cmp(&rank(b)).then_with(|| a.name.cmp(&b.name))
        });
    }

    /// Create a folder.
    pub async fn create_folder(
        &self,
        uid: &UserId,
        name: &str,
        parent_id: Option<&ItemId>,
    ) -> Result<CreatedFolder> {
        let name = sanitize_folder_name(name)?;
        let parent = self.resolve_parent(uid, parent_id).await?;
        self.check_sibling_name(uid, parent_id, &name, None).await?;

        let now = Utc::now();
        let item = VaultItem {
            id: Self::generate_item_id(),
            owner_id: uid.clone(),
            kind: ItemKind::Folder,
            name: name.clone(),
            parent_id: parent.as_ref().map(|p| p.id.clone()),
            path: tree::join_path(parent.as_ref().map(|p| p.path.as_str()), &name),
            is_deleted: false,
            deleted_at: None,
            size: None,
            mime_type: None,
            storage_provider: None,
            storage_key: None,
            download_url: None,
            download_url_expires_at: None,
            shared_with: Default::default(),
            permissions: Permissions::default(),
            created_at: now,
            updated_at: now,
        };
        self.repo.put_item(&item).await?;

        info!(item = %item.id, path = %item.path, "Folder created");
        self.record_audit(
            AuditLogEntry::new(uid.clone(), AuditAction::FolderCreated)
                .with_item(item.id.clone())
                .with_metadata(json!({ "path": item.path })),
        )
        .await;

        Ok(CreatedFolder { id: item.id })
    }

    /// List a folder (or the root): owned children plus, at root, items
    /// shared with the caller.
    pub async fn list_items(
        &self,
        uid: &UserId,
        parent_id: Option<&ItemId>,
    ) -> Result<Vec<VaultItem>> {
        let mut items = match parent_id {
            Some(parent_id) => {
                let parent = self.repo.require_item(parent_id).await?;
                access::require_access(&parent, uid, AccessLevel::Read)?;
                self.repo.children_of(parent_id, false).await?
            }
            None => {
                let mut items = self.repo.owned_items_in(uid, None).await?;
                items.extend(self.repo.shared_with(uid).await?);
                items
            }
        };

        Self::sort_listing(&mut items);
        Ok(items)
    }

    /// Request a signed upload URL and create the file record.
    pub async fn request_upload_url(
        &self,
        uid: &UserId,
        file_name: &str,
        mime_type: &str,
        parent_id: Option<&ItemId>,
        file_size: u64,
        is_encrypted: bool,
    ) -> Result<UploadTicket> {
        let name = sanitize_file_name(file_name)?;
        if file_size > self.config.max_file_size {
            return Err(Error::ResourceExhausted(format!(
                "File of {} bytes exceeds the {} byte limit",
                file_size, self.config.max_file_size
            )));
        }

        let parent = self.resolve_parent(uid, parent_id).await?;
        self.check_sibling_name(uid, parent_id, &name, None).await?;

        let key = build_object_key(self.config.category, uid, parent_id, &name)?;
        let mut metadata = HashMap::new();
        metadata.insert("owner".to_string(), uid.to_string());
        if is_encrypted {
            metadata.insert("encrypted".to_string(), "true".to_string());
        }

        let signed = self
            .storage
            .upload_url(
                &key,
                mime_type,
                Some(self.config.upload_url_ttl),
                &metadata,
                None,
            )
            .await?;

        let now = Utc::now();
        let item = VaultItem {
            id: Self::generate_item_id(),
            owner_id: uid.clone(),
            kind: ItemKind::File,
            name: name.clone(),
            parent_id: parent.as_ref().map(|p| p.id.clone()),
            path: tree::join_path(parent.as_ref().map(|p| p.path.as_str()), &name),
            is_deleted: false,
            deleted_at: None,
            size: Some(file_size),
            mime_type: Some(mime_type.to_string()),
            storage_provider: Some(signed.provider.clone()),
            storage_key: Some(key.clone()),
            download_url: None,
            download_url_expires_at: None,
            shared_with: Default::default(),
            permissions: Permissions::default(),
            created_at: now,
            updated_at: now,
        };
        self.repo.put_item(&item).await?;

        debug!(item = %item.id, key = %key, provider = %signed.provider, "Upload URL issued");
        self.record_audit(
            AuditLogEntry::new(uid.clone(), AuditAction::UploadRequested)
                .with_item(item.id.clone())
                .with_metadata(json!({ "size": file_size, "mimeType": mime_type })),
        )
        .await;

        Ok(UploadTicket {
            signed_url: signed.url,
            item_id: item.id,
            storage_provider: signed.provider,
            storage_path: key,
        })
    }

    /// Finalize an upload once the client has PUT the bytes.
    pub async fn finalize_upload(
        &self,
        uid: &UserId,
        item_id: &ItemId,
        size: Option<u64>,
        encryption_meta: Option<serde_json::Value>,
    ) -> Result<FinalizedUpload> {
        let mut item = self.load_owned_active(uid, item_id).await?;
        if !item.is_file() {
            return Err(Error::InvalidArgument(format!(
                "'{}' is a folder, not an uploaded file",
                item.name
            )));
        }

        let key = item
            .storage_key
            .clone()
            .ok_or_else(|| Error::Internal(format!("File '{}' has no storage key", item.id)))?;
        let provider = item.storage_provider.clone();

        let exists = self
            .storage
            .object_exists(&key, provider.as_deref())
            .await?;
        if !exists {
            return Err(Error::FailedPrecondition(format!(
                "No object was uploaded for '{}'",
                item.name
            )));
        }

        let is_encrypted = encryption_meta.is_some();
        if let Some(meta) = encryption_meta {
            self.repo.put_encryption_meta(&item.id, meta).await?;
        }

        let signed = self
            .storage
            .download_url(&key, Some(self.config.download_url_ttl), provider.as_deref())
            .await?;

        if let Some(size) = size {
            item.size = Some(size);
        }
        item.download_url = Some(signed.url.clone());
        item.download_url_expires_at = Some(signed.expires_at);
        item.updated_at = Utc::now();
        self.repo.put_item(&item).await?;

        info!(item = %item.id, "Upload finalized");
        self.record_audit(
            AuditLogEntry::new(uid.clone(), AuditAction::UploadFinalized)
                .with_item(item.id.clone())
                .with_metadata(json!({ "encrypted": is_encrypted })),
        )
        .await;

        Ok(FinalizedUpload {
            id: item.id,
            download_url: signed.url,
            is_encrypted,
        })
    }

    /// Issue a download URL for a file the caller may read.
    pub async fn get_download_url(&self, uid: &UserId, target: DownloadTarget) -> Result<String> {
        let mut item = match target {
            DownloadTarget::Item(item_id) => self.repo.require_item(&item_id).await?,
            DownloadTarget::StoragePath(path) => {
                self.find_item_by_storage_path(&path).await?
            }
        };
        access::require_access(&item, uid, AccessLevel::Read)?;
        if !item.is_file() {
            return Err(Error::InvalidArgument(format!(
                "'{}' is a folder and has no download URL",
                item.name
            )));
        }

        let url = self.fresh_download_url(&mut item).await?;

        self.record_audit(
            AuditLogEntry::new(uid.clone(), AuditAction::DownloadUrlIssued)
                .with_item(item.id.clone()),
        )
        .await;

        Ok(url)
    }

    /// Return the cached download URL when still valid, minting and
    /// re-caching a fresh one otherwise.
    pub(crate) async fn fresh_download_url(&self, item: &mut VaultItem) -> Result<String> {
        let margin = chrono::Duration::seconds(60);
        if let (Some(url), Some(expires_at)) = (&item.download_url, item.download_url_expires_at) {
            if expires_at > Utc::now() + margin {
                return Ok(url.clone());
            }
        }

        let key = item
            .storage_key
            .as_deref()
            .ok_or_else(|| Error::Internal(format!("File '{}' has no storage key", item.id)))?;
        let signed = self
            .storage
            .download_url(
                key,
                Some(self.config.download_url_ttl),
                item.storage_provider.as_deref(),
            )
            .await?;

        item.download_url = Some(signed.url.clone());
        item.download_url_expires_at = Some(signed.expires_at);
        // The cache is an optimization; failing to persist it must not
        // fail the read.
        if let Err(err) = self.repo.put_item(item).await {
            warn!(item = %item.id, error = %err, "Failed to cache download URL");
        }

        Ok(signed.url)
    }

    async fn find_item_by_storage_path(&self, storage_path: &str) -> Result<VaultItem> {
        self.repo
            .find_by_storage_key(storage_path)
            .await?
            .ok_or_else(|| Error::NotFound(format!("No file stored at '{}'", storage_path)))
    }

    /// Encryption metadata stored for a file, if any.
    pub async fn encryption_meta(
        &self,
        uid: &UserId,
        item_id: &ItemId,
    ) -> Result<Option<serde_json::Value>> {
        let item = self.repo.require_item(item_id).await?;
        access::require_access(&item, uid, AccessLevel::Read)?;
        self.repo.get_encryption_meta(item_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::StaticDirectory;
    use crate::test_support::{service_fixture, uid};

    #[tokio::test]
    async fn test_create_folder_and_list() {
        let fx = service_fixture().await;
        let user = uid("u1");

        let folder = fx.service.create_folder(&user, "Docs", None).await.unwrap();
        fx.service
            .create_folder(&user, "Sub", Some(&folder.id))
            .await
            .unwrap();

        let root = fx.service.list_items(&user, None).await.unwrap();
        assert_eq!(root.len(), 1);
        assert_eq!(root[0].path, "/Docs");

        let children = fx.service.list_items(&user, Some(&folder.id)).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].path, "/Docs/Sub");
    }

    #[tokio::test]
    async fn test_create_folder_rejects_duplicate_sibling() {
        let fx = service_fixture().await;
        let user = uid("u1");

        fx.service.create_folder(&user, "Docs", None).await.unwrap();
        let err = fx
            .service
            .create_folder(&user, "Docs", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_create_folder_missing_parent_fails() {
        let fx = service_fixture().await;
        let err = fx
            .service
            .create_folder(&uid("u1"), "X", Some(&ItemId::new("ghost").unwrap()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_upload_flow() {
        let fx = service_fixture().await;
        let user = uid("u1");

        let ticket = fx
            .service
            .request_upload_url(&user, "photo.jpg", "image/jpeg", None, 1024, false)
            .await
            .unwrap();
        assert_eq!(ticket.storage_provider, "cloud");
        assert!(ticket.storage_path.starts_with("vault/u1/"));

        // Simulate the client PUT, then finalize.
        fx.cloud.insert_object(&ticket.storage_path);
        let finalized = fx
            .service
            .finalize_upload(&user, &ticket.item_id, Some(2048), None)
            .await
            .unwrap();
        assert!(!finalized.is_encrypted);

        let item = fx.service.repo.require_item(&ticket.item_id).await.unwrap();
        assert_eq!(item.size, Some(2048));
        assert!(item.download_url.is_some());
    }

    #[tokio::test]
    async fn test_finalize_without_uploaded_object_fails() {
        let fx = service_fixture().await;
        let user = uid("u1");

        let ticket = fx
            .service
            .request_upload_url(&user, "a.txt", "text/plain", None, 10, false)
            .await
            .unwrap();

        let err = fx
            .service
            .finalize_upload(&user, &ticket.item_id, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn test_oversized_upload_rejected() {
        let fx = service_fixture().await;
        let err = fx
            .service
            .request_upload_url(&uid("u1"), "big.bin", "application/octet-stream", None, u64::MAX, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ResourceExhausted(_)));
    }

    #[tokio::test]
    async fn test_listing_sorts_folders_before_files() {
        let fx = service_fixture().await;
        let user = uid("u1");

        let ticket = fx
            .service
            .request_upload_url(&user, "aaa.txt", "text/plain", None, 1, false)
            .await
            .unwrap();
        fx.cloud.insert_object(&ticket.storage_path);
        fx.service.create_folder(&user, "zzz", None).await.unwrap();

        let root = fx.service.list_items(&user, None).await.unwrap();
        assert_eq!(root[0].name, "zzz");
        assert_eq!(root[1].name, "aaa.txt");
    }

    #[tokio::test]
    async fn test_download_url_requires_read_access() {
        let fx = service_fixture().await;
        let user = uid("u1");

        let ticket = fx
            .service
            .request_upload_url(&user, "a.txt", "text/plain", None, 1, false)
            .await
            .unwrap();
        fx.cloud.insert_object(&ticket.storage_path);

        let err = fx
            .service
            .get_download_url(&uid("u2"), DownloadTarget::Item(ticket.item_id.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));

        let url = fx
            .service
            .get_download_url(&user, DownloadTarget::Item(ticket.item_id))
            .await
            .unwrap();
        assert!(url.starts_with("memory://cloud/"));
    }

    #[tokio::test]
    async fn test_download_url_by_storage_path() {
        let fx = service_fixture().await;
        let user = uid("u1");

        let ticket = fx
            .service
            .request_upload_url(&user, "a.txt", "text/plain", None, 1, false)
            .await
            .unwrap();
        fx.cloud.insert_object(&ticket.storage_path);

        let url = fx
            .service
            .get_download_url(&user, DownloadTarget::StoragePath(ticket.storage_path))
            .await
            .unwrap();
        assert!(url.contains("op=get"));
    }

    #[tokio::test]
    async fn test_unknown_share_target_directory() {
        // Directory trait object wiring sanity check.
        let dir = StaticDirectory::new().with_user(uid("known"));
        assert!(dir.user_exists(&uid("known")).await.unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_cloud_falls_back_to_native() {
        let fx = service_fixture().await;
        fx.cloud.set_reachable(false);
        let user = uid("u1");

        let ticket = fx
            .service
            .request_upload_url(&user, "a.txt", "text/plain", None, 1, false)
            .await
            .unwrap();
        assert_eq!(ticket.storage_provider, "native");

        fx.native.insert_object(&ticket.storage_path);
        let finalized = fx
            .service
            .finalize_upload(&user, &ticket.item_id, None, None)
            .await
            .unwrap();
        assert!(finalized.download_url.starts_with("memory://native/"));
    }

    #[tokio::test]
    async fn test_encryption_meta_side_record() {
        let fx = service_fixture().await;
        let user = uid("u1");

        let ticket = fx
            .service
            .request_upload_url(&user, "secret.bin", "application/octet-stream", None, 1, true)
            .await
            .unwrap();
        fx.cloud.insert_object(&ticket.storage_path);

        let meta = json!({ "algorithm": "aes-256-gcm", "iv": "abcd" });
        let finalized = fx
            .service
            .finalize_upload(&user, &ticket.item_id, None, Some(meta.clone()))
            .await
            .unwrap();
        assert!(finalized.is_encrypted);

        let stored = fx
            .service
            .encryption_meta(&user, &ticket.item_id)
            .await
            .unwrap();
        assert_eq!(stored, Some(meta));

        // Strangers cannot read the side-record either.
        assert!(fx
            .service
            .encryption_meta(&uid("u2"), &ticket.item_id)
            .await
            .is_err());
    }
}
