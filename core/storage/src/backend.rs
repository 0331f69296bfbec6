//! Object storage backend trait definition.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use stratavault_common::Result;

/// Object storage backend client.
///
/// Each concrete backend (S3-compatible cloud providers, the local
/// platform store) implements this thin contract; everything above it
/// goes through the [`StorageRouter`](crate::StorageRouter), which adds
/// retry, backoff, and connectivity-based backend selection.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Backend name, used as the provider selector (e.g. "wasabi", "local").
    fn name(&self) -> &str;

    /// Longest signed-URL lifetime this backend supports.
    ///
    /// Requested TTLs above this are clamped, not rejected.
    fn max_url_ttl(&self) -> Duration;

    /// Generate a signed URL that allows uploading an object.
    ///
    /// # Postconditions
    /// - A PUT to the returned URL with the given content type stores the
    ///   object under `key`
    ///
    /// # Errors
    /// - Network failure reaching the backend
    /// - Backend rejection (credentials, malformed key)
    async fn generate_upload_url(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
        metadata: &HashMap<String, String>,
    ) -> Result<String>;

    /// Generate a signed URL that allows downloading an object.
    async fn generate_download_url(&self, key: &str, ttl: Duration) -> Result<String>;

    /// Delete an object. Deleting an absent object is not an error.
    async fn delete_object(&self, key: &str) -> Result<()>;

    /// Check whether an object exists.
    async fn object_exists(&self, key: &str) -> Result<bool>;

    /// List up to `max` object keys under a prefix.
    ///
    /// Also serves as the connectivity probe: a `max = 1` listing with a
    /// hard timeout decides whether this backend is reachable.
    async fn list_keys(&self, prefix: &str, max: usize) -> Result<Vec<String>>;
}
