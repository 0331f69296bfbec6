//! In-memory object store for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::backend::ObjectStore;
use stratavault_common::{Error, Result};

/// In-memory object store.
///
/// Useful for testing and development. Failures can be scripted: queued
/// error statuses are returned by the next operations, and an unreachable
/// flag makes listing fail the way a dead backend would, which is what the
/// connectivity probe observes.
pub struct MemoryObjectStore {
    name: String,
    objects: Mutex<HashSet<String>>,
    queued_failures: Mutex<VecDeque<u16>>,
    reachable: Mutex<bool>,
}

impl MemoryObjectStore {
    /// Create a new empty store with the given backend name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: Mutex::new(HashSet::new()),
            queued_failures: Mutex::new(VecDeque::new()),
            reachable: Mutex::new(true),
        }
    }

    /// Simulate a completed client upload.
    pub fn insert_object(&self, key: &str) {
        self.objects.lock().unwrap().insert(key.to_string());
    }

    /// Whether an object is currently stored (test assertion helper).
    pub fn has_object(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains(key)
    }

    /// Queue an error status to be returned by upcoming operations.
    pub fn fail_next(&self, status: u16, times: usize) {
        let mut queue = self.queued_failures.lock().unwrap();
        for _ in 0..times {
            queue.push_back(status);
        }
    }

    /// Mark the backend unreachable (listing fails with a network error).
    pub fn set_reachable(&self, reachable: bool) {
        *self.reachable.lock().unwrap() = reachable;
    }

    fn take_queued_failure(&self) -> Result<()> {
        if let Some(status) = self.queued_failures.lock().unwrap().pop_front() {
            return Err(Error::Backend {
                status,
                message: format!("{}: scripted failure", self.name),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_url_ttl(&self) -> Duration {
        Duration::from_secs(7 * 24 * 3600)
    }

    async fn generate_upload_url(
        &self,
        key: &str,
        _content_type: &str,
        ttl: Duration,
        _metadata: &HashMap<String, String>,
    ) -> Result<String> {
        self.take_queued_failure()?;
        Ok(format!(
            "memory://{}/{}?op=put&expires={}",
            self.name,
            key,
            ttl.as_secs()
        ))
    }

    async fn generate_download_url(&self, key: &str, ttl: Duration) -> Result<String> {
        self.take_queued_failure()?;
        Ok(format!(
            "memory://{}/{}?op=get&expires={}",
            self.name,
            key,
            ttl.as_secs()
        ))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.take_queued_failure()?;
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn object_exists(&self, key: &str) -> Result<bool> {
        self.take_queued_failure()?;
        Ok(self.objects.lock().unwrap().contains(key))
    }

    async fn list_keys(&self, prefix: &str, max: usize) -> Result<Vec<String>> {
        if !*self.reachable.lock().unwrap() {
            return Err(Error::Network(format!("{}: unreachable", self.name)));
        }
        self.take_queued_failure()?;

        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|k| k.starts_with(prefix))
            .take(max)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_object_lifecycle() {
        let store = MemoryObjectStore::new("memory");
        store.insert_object("vault/u1/a.txt");

        assert!(store.object_exists("vault/u1/a.txt").await.unwrap());
        store.delete_object("vault/u1/a.txt").await.unwrap();
        assert!(!store.object_exists("vault/u1/a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_scripted_failures_drain_in_order() {
        let store = MemoryObjectStore::new("memory");
        store.insert_object("k");
        store.fail_next(500, 2);

        assert!(store.object_exists("k").await.is_err());
        assert!(store.object_exists("k").await.is_err());
        assert!(store.object_exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_listing() {
        let store = MemoryObjectStore::new("memory");
        store.set_reachable(false);
        assert!(matches!(
            store.list_keys("", 1).await,
            Err(Error::Network(_))
        ));
    }
}
