//! Public share links.
//!
//! A share link is a token-addressable pointer to one item, optionally
//! password-protected and expiring, exercised with the owner's storage
//! rights rather than the requester's. Passwords are stored as salted
//! Argon2 hashes; the password itself never persists.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde_json::json;
use tracing::info;

use crate::model::{AuditAction, AuditLogEntry, ShareLink};
use crate::service::VaultService;
use stratavault_common::{Error, ItemId, Result, ShareId, UserId};

/// Result of creating a share link.
#[derive(Debug, Clone)]
pub struct CreatedShareLink {
    pub share_id: ShareId,
    /// Public URL addressing the link.
    pub share_link: String,
}

/// Result of a successful share-link access.
#[derive(Debug, Clone)]
pub struct ShareLinkAccess {
    /// Present when the link allows downloading and the item is a file.
    pub download_url: Option<String>,
    pub allow_download: bool,
    pub item_name: String,
}

fn generate_token() -> ShareId {
    let mut raw = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut raw);
    ShareId::new(URL_SAFE_NO_PAD.encode(raw)).expect("generated token is non-empty")
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Internal(format!("Password hashing failed: {}", e)))
}

fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| Error::Internal(format!("Stored password hash is invalid: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

impl VaultService {
    /// Create a public share link for an item. Owner-only.
    pub async fn create_share_link(
        &self,
        uid: &UserId,
        item_id: &ItemId,
        expires_at: Option<DateTime<Utc>>,
        allow_download: bool,
        password: Option<&str>,
        max_access_count: Option<u64>,
    ) -> Result<CreatedShareLink> {
        let item = self.load_owned_active(uid, item_id).await?;

        if let Some(expiry) = expires_at {
            if expiry <= Utc::now() {
                return Err(Error::InvalidArgument(
                    "Share link expiry must be in the future".to_string(),
                ));
            }
        }

        let password_hash = match password {
            Some(password) if !password.is_empty() => Some(hash_password(password)?),
            Some(_) => {
                return Err(Error::InvalidArgument(
                    "Share link password must not be empty".to_string(),
                ))
            }
            None => None,
        };

        let link = ShareLink {
            share_id: generate_token(),
            item_id: item.id.clone(),
            owner_id: uid.clone(),
            expires_at,
            allow_download,
            password_hash,
            access_count: 0,
            max_access_count,
            created_at: Utc::now(),
            last_accessed_at: None,
        };
        self.repo.put_share_link(&link).await?;

        info!(item = %item.id, share = %link.share_id, "Share link created");
        self.record_audit(
            AuditLogEntry::new(uid.clone(), AuditAction::ShareLinkCreated)
                .with_item(item.id.clone())
                .with_metadata(json!({
                    "protected": link.password_hash.is_some(),
                    "allowDownload": allow_download,
                })),
        )
        .await;

        let share_link = format!("{}/{}", self.config.public_link_base, link.share_id);
        Ok(CreatedShareLink {
            share_id: link.share_id,
            share_link,
        })
    }

    /// Access a share link by token. Public: the link itself, not the
    /// requester, carries the authority.
    pub async fn access_share_link(
        &self,
        share_id: &ShareId,
        password: Option<&str>,
    ) -> Result<ShareLinkAccess> {
        let mut link = self
            .repo
            .get_share_link(share_id)
            .await?
            .ok_or_else(|| Error::NotFound("Share link does not exist".to_string()))?;

        if let Some(expiry) = link.expires_at {
            if expiry <= Utc::now() {
                return Err(Error::PermissionDenied("Share link has expired".to_string()));
            }
        }

        if let Some(hash) = &link.password_hash {
            let supplied = password.ok_or_else(|| {
                Error::PermissionDenied("Share link requires a password".to_string())
            })?;
            if !verify_password(supplied, hash)? {
                return Err(Error::PermissionDenied(
                    "Incorrect share link password".to_string(),
                ));
            }
        }

        if let Some(max) = link.max_access_count {
            if link.access_count >= max {
                return Err(Error::ResourceExhausted(
                    "Share link access limit reached".to_string(),
                ));
            }
        }

        let mut item = self.repo.require_item(&link.item_id).await?;
        if item.is_deleted {
            return Err(Error::NotFound(
                "The shared content is no longer available".to_string(),
            ));
        }

        link.access_count += 1;
        link.last_accessed_at = Some(Utc::now());
        self.repo.put_share_link(&link).await?;

        // The URL is minted under the owner's storage rights.
        let download_url = if link.allow_download && item.is_file() {
            Some(self.fresh_download_url(&mut item).await?)
        } else {
            None
        };

        self.record_audit(
            AuditLogEntry::new(link.owner_id.clone(), AuditAction::ShareLinkAccessed)
                .with_item(item.id.clone())
                .with_metadata(json!({ "shareId": link.share_id, "accessCount": link.access_count })),
        )
        .await;

        Ok(ShareLinkAccess {
            download_url,
            allow_download: link.allow_download,
            item_name: item.name,
        })
    }
}
