//! Provider-agnostic storage routing.
//!
//! The router owns every configured backend and presents one interface to
//! the rest of the system. A single connectivity probe at first use
//! decides whether the preferred cloud backend is reachable; if not, the
//! router downgrades to the platform-native backend for the lifetime of
//! the process. Every backend call is wrapped in the retry policy.

use chrono::{DateTime, Utc};
use reqwest::Client;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::backend::ObjectStore;
use crate::retry::{retry_with_config, RetryConfig};
use stratavault_common::{Error, Result};

/// A signed URL together with its provider and expiry.
#[derive(Debug, Clone)]
pub struct SignedUrl {
    pub url: String,
    /// Backend that minted the URL.
    pub provider: String,
    pub expires_at: DateTime<Utc>,
}

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Backend used when reachable.
    pub preferred: String,
    /// Platform-native backend used after a failed connectivity probe.
    pub fallback: String,
    /// Hard timeout for the connectivity probe; timeout means unreachable.
    pub probe_timeout: Duration,
    /// TTL applied when the caller does not specify one.
    pub default_url_ttl: Duration,
    pub retry: RetryConfig,
}

impl RouterConfig {
    /// Create a configuration with default probe timeout, TTL, and retry.
    pub fn new(preferred: impl Into<String>, fallback: impl Into<String>) -> Self {
        Self {
            preferred: preferred.into(),
            fallback: fallback.into(),
            probe_timeout: Duration::from_secs(5),
            default_url_ttl: Duration::from_secs(3600),
            retry: RetryConfig::default(),
        }
    }

    /// Override the probe timeout.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Override the default signed-URL TTL.
    pub fn with_default_url_ttl(mut self, ttl: Duration) -> Self {
        self.default_url_ttl = ttl;
        self
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Storage provider abstraction over the registered backends.
pub struct StorageRouter {
    backends: HashMap<String, Arc<dyn ObjectStore>>,
    config: RouterConfig,
    /// One backend decision per process instance.
    active: OnceCell<String>,
    http: Client,
}

impl StorageRouter {
    /// Create a router with no backends registered yet.
    pub fn new(config: RouterConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            backends: HashMap::new(),
            config,
            active: OnceCell::new(),
            http,
        }
    }

    /// Register a backend under its own name.
    ///
    /// # Errors
    /// - `AlreadyExists` if a backend with the same name is registered
    pub fn register(&mut self, backend: Arc<dyn ObjectStore>) -> Result<()> {
        let name = backend.name().to_string();
        if self.backends.contains_key(&name) {
            return Err(Error::AlreadyExists(format!(
                "Backend '{}' is already registered",
                name
            )));
        }
        self.backends.insert(name, backend);
        Ok(())
    }

    /// Look up a backend by name.
    pub fn backend(&self, name: &str) -> Result<Arc<dyn ObjectStore>> {
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Backend '{}' is not registered", name)))
    }

    /// Name of the active backend, probing connectivity on first use.
    ///
    /// The decision is made once: a preferred backend that fails the
    /// bounded-timeout listing probe is downgraded to the fallback for the
    /// rest of the process lifetime.
    pub async fn active_backend_name(&self) -> &str {
        self.active
            .get_or_init(|| async {
                let preferred = match self.backend(&self.config.preferred) {
                    Ok(backend) => backend,
                    Err(_) => {
                        warn!(
                            preferred = %self.config.preferred,
                            fallback = %self.config.fallback,
                            "Preferred backend not registered, using fallback"
                        );
                        return self.config.fallback.clone();
                    }
                };

                match timeout(self.config.probe_timeout, preferred.list_keys("", 1)).await {
                    Ok(Ok(_)) => {
                        info!(backend = %self.config.preferred, "Connectivity probe passed");
                        self.config.preferred.clone()
                    }
                    Ok(Err(err)) => {
                        warn!(
                            backend = %self.config.preferred,
                            error = %err,
                            fallback = %self.config.fallback,
                            "Connectivity probe failed, downgrading"
                        );
                        self.config.fallback.clone()
                    }
                    Err(_) => {
                        warn!(
                            backend = %self.config.preferred,
                            fallback = %self.config.fallback,
                            "Connectivity probe timed out, downgrading"
                        );
                        self.config.fallback.clone()
                    }
                }
            })
            .await
    }

    /// Resolve the backend for a call: explicit override or the active one.
    async fn resolve(&self, provider: Option<&str>) -> Result<Arc<dyn ObjectStore>> {
        match provider {
            Some(name) => self.backend(name),
            None => {
                let name = self.active_backend_name().await.to_string();
                self.backend(&name)
            }
        }
    }

    /// Run a backend call under the retry policy.
    ///
    /// Transient errors that survive every attempt surface as `Internal`;
    /// non-retryable errors propagate unchanged.
    async fn run_with_retry<F, Fut, T>(&self, op_name: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match retry_with_config(&self.config.retry, op_name, operation).await {
            Ok(value) => Ok(value),
            Err(err) if err.is_transient() => Err(Error::Internal(format!(
                "Storage {} failed after {} attempts: {}",
                op_name, self.config.retry.max_attempts, err
            ))),
            Err(err) => Err(err),
        }
    }

    fn effective_ttl(&self, requested: Option<Duration>, backend: &dyn ObjectStore) -> Duration {
        requested
            .unwrap_or(self.config.default_url_ttl)
            .min(backend.max_url_ttl())
    }

    /// Generate a signed upload URL.
    pub async fn upload_url(
        &self,
        key: &str,
        content_type: &str,
        ttl: Option<Duration>,
        metadata: &HashMap<String, String>,
        provider: Option<&str>,
    ) -> Result<SignedUrl> {
        let backend = self.resolve(provider).await?;
        let ttl = self.effective_ttl(ttl, backend.as_ref());

        let url = self
            .run_with_retry("upload-url", || {
                backend.generate_upload_url(key, content_type, ttl, metadata)
            })
            .await?;

        Ok(SignedUrl {
            url,
            provider: backend.name().to_string(),
            expires_at: Utc::now() + chrono::Duration::seconds(ttl.as_secs() as i64),
        })
    }

    /// Generate a signed download URL.
    pub async fn download_url(
        &self,
        key: &str,
        ttl: Option<Duration>,
        provider: Option<&str>,
    ) -> Result<SignedUrl> {
        let backend = self.resolve(provider).await?;
        let ttl = self.effective_ttl(ttl, backend.as_ref());

        let url = self
            .run_with_retry("download-url", || backend.generate_download_url(key, ttl))
            .await?;

        Ok(SignedUrl {
            url,
            provider: backend.name().to_string(),
            expires_at: Utc::now() + chrono::Duration::seconds(ttl.as_secs() as i64),
        })
    }

    /// Delete an object.
    pub async fn delete_object(&self, key: &str, provider: Option<&str>) -> Result<()> {
        let backend = self.resolve(provider).await?;
        self.run_with_retry("delete", || backend.delete_object(key))
            .await
    }

    /// Check whether an object exists.
    pub async fn object_exists(&self, key: &str, provider: Option<&str>) -> Result<bool> {
        let backend = self.resolve(provider).await?;
        self.run_with_retry("exists", || backend.object_exists(key))
            .await
    }

    /// Copy one object between two different providers.
    ///
    /// Downloads from the source via a short-lived signed URL and
    /// re-uploads to the destination the same way. Used for migration.
    ///
    /// # Errors
    /// - `InvalidArgument` if source and destination are the same provider
    pub async fn copy_object(&self, source: &str, dest: &str, key: &str) -> Result<()> {
        if source == dest {
            return Err(Error::InvalidArgument(
                "Cross-provider copy requires two different providers".to_string(),
            ));
        }

        let src = self.backend(source)?;
        let dst = self.backend(dest)?;
        let ttl = Duration::from_secs(300);
        let upload_metadata = HashMap::new();

        let download_url = self
            .run_with_retry("copy-download-url", || {
                src.generate_download_url(key, ttl)
            })
            .await?;
        let upload_url = self
            .run_with_retry("copy-upload-url", || {
                dst.generate_upload_url(key, "application/octet-stream", ttl, &upload_metadata)
            })
            .await?;

        let response = self
            .http
            .get(&download_url)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Copy download: {}", e)))?;
        if !response.status().is_success() {
            return Err(Error::Backend {
                status: response.status().as_u16(),
                message: format!("Copy download of '{}' from '{}' failed", key, source),
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("Copy download: {}", e)))?;

        let response = self
            .http
            .put(&upload_url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Copy upload: {}", e)))?;
        if !response.status().is_success() {
            return Err(Error::Backend {
                status: response.status().as_u16(),
                message: format!("Copy upload of '{}' to '{}' failed", key, dest),
            });
        }

        debug!(key, source, dest, "Object copied between providers");
        Ok(())
    }
}
