//! Vault service configuration.

use std::time::Duration;

use stratavault_storage::ContentCategory;

/// Tunables for the vault service.
#[derive(Debug, Clone)]
pub struct VaultServiceConfig {
    /// Days a trashed item survives before the sweep purges it.
    pub retention_days: i64,
    /// Maximum folder depth covered by descendant path propagation.
    pub depth_ceiling: usize,
    /// Lifetime of signed upload URLs.
    pub upload_url_ttl: Duration,
    /// Lifetime of signed download URLs.
    pub download_url_ttl: Duration,
    /// Largest accepted file size, in bytes.
    pub max_file_size: u64,
    /// Content category used for object key namespacing.
    pub category: ContentCategory,
    /// Base URL that public share links are minted under.
    pub public_link_base: String,
}

impl VaultServiceConfig {
    /// Override the trash retention window.
    pub fn with_retention_days(mut self, days: i64) -> Self {
        self.retention_days = days;
        self
    }

    /// Override the propagation depth ceiling.
    pub fn with_depth_ceiling(mut self, ceiling: usize) -> Self {
        self.depth_ceiling = ceiling;
        self
    }

    /// Override the public share-link base URL.
    pub fn with_public_link_base(mut self, base: impl Into<String>) -> Self {
        self.public_link_base = base.into();
        self
    }

    /// Override the maximum accepted file size.
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }
}

impl Default for VaultServiceConfig {
    fn default() -> Self {
        Self {
            retention_days: 30,
            depth_ceiling: 10,
            upload_url_ttl: Duration::from_secs(15 * 60),
            download_url_ttl: Duration::from_secs(3600),
            max_file_size: 10 * 1024 * 1024 * 1024,
            category: ContentCategory::Vault,
            public_link_base: "https://vault.example.com/s".to_string(),
        }
    }
}
