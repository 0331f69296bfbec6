//! Platform-native object store backed by the local filesystem.
//!
//! Serves as the fallback backend when no cloud provider is reachable.
//! "Signed" URLs are `file://` URLs carrying an expiry marker; delete,
//! existence, and listing operate directly on the filesystem.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::backend::ObjectStore;
use stratavault_common::{Error, Result};

/// Filesystem-backed object store.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create a new local store rooted at the given directory.
    ///
    /// # Postconditions
    /// - Root directory exists
    ///
    /// # Errors
    /// - Invalid path or permission denied
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }
        Ok(Self { root })
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let key = key.trim_start_matches('/');
        if key.is_empty() || key.split('/').any(|seg| seg.is_empty() || seg == "..") {
            return Err(Error::InvalidArgument(format!(
                "Invalid object key: '{}'",
                key
            )));
        }
        Ok(self.root.join(key))
    }

    fn file_url(&self, path: &Path, ttl: Duration) -> String {
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        format!("file://{}?expires={}", path.display(), expires)
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    fn max_url_ttl(&self) -> Duration {
        Duration::from_secs(24 * 3600)
    }

    async fn generate_upload_url(
        &self,
        key: &str,
        _content_type: &str,
        ttl: Duration,
        _metadata: &HashMap<String, String>,
    ) -> Result<String> {
        let path = self.object_path(key)?;

        // Writers expect the parent to exist, mirroring bucket semantics.
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        Ok(self.file_url(&path, ttl.min(self.max_url_ttl())))
    }

    async fn generate_download_url(&self, key: &str, ttl: Duration) -> Result<String> {
        let path = self.object_path(key)?;
        Ok(self.file_url(&path, ttl.min(self.max_url_ttl())))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn object_exists(&self, key: &str) -> Result<bool> {
        let path = self.object_path(key)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_keys(&self, prefix: &str, max: usize) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        // Iterative directory walk; no recursion on untrusted tree shapes.
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            if keys.len() >= max {
                break;
            }

            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }

                let key = path
                    .strip_prefix(&self.root)
                    .map_err(|e| Error::Internal(e.to_string()))?
                    .to_string_lossy()
                    .replace(std::path::MAIN_SEPARATOR, "/");

                if key.starts_with(prefix) {
                    keys.push(key);
                    if keys.len() >= max {
                        break;
                    }
                }
            }
        }

        Ok(keys)
    }
}
