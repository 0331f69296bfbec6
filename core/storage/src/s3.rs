//! Generic S3-protocol object storage client.
//!
//! One client covers every S3-compatible provider (AWS S3, Wasabi,
//! Backblaze B2, MinIO, Cloudflare R2, ...); provider differences such as
//! endpoint, addressing style, and the maximum signed-URL lifetime are
//! expressed as configuration rather than separate implementations.
//!
//! Requests are signed with AWS Signature Version 4 directly over
//! `reqwest`, avoiding the heavyweight vendor SDK.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, Method, StatusCode};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;

use crate::backend::ObjectStore;
use stratavault_common::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Characters left unescaped in SigV4 canonical encoding (RFC 3986 unreserved).
const SIGV4_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Configuration for one S3-compatible backend.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Provider label used as the backend selector (e.g. "wasabi").
    pub name: String,
    /// Custom endpoint; None means AWS S3 regional endpoint.
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Path-style addressing (required by MinIO and some providers).
    pub path_style: bool,
    /// Provider quirk: longest presigned-URL lifetime supported.
    pub max_url_ttl: Duration,
}

impl S3Config {
    /// Configuration with AWS defaults (virtual-hosted style, 7-day URL cap).
    pub fn new(
        name: impl Into<String>,
        region: impl Into<String>,
        bucket: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: None,
            region: region.into(),
            bucket: bucket.into(),
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            path_style: false,
            max_url_ttl: Duration::from_secs(7 * 24 * 3600),
        }
    }

    /// Use a custom endpoint (non-AWS providers).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Switch to path-style addressing.
    pub fn with_path_style(mut self) -> Self {
        self.path_style = true;
        self
    }

    /// Override the signed-URL lifetime cap.
    pub fn with_max_url_ttl(mut self, ttl: Duration) -> Self {
        self.max_url_ttl = ttl;
        self
    }
}

/// S3-protocol storage backend.
pub struct S3Store {
    config: S3Config,
    http: Client,
}

impl S3Store {
    /// Create a new client for the configured backend.
    pub fn new(config: S3Config) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");

        Self { config, http }
    }

    fn endpoint(&self) -> String {
        match &self.config.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://s3.{}.amazonaws.com", self.config.region),
        }
    }

    /// Percent-encode an object key, preserving `/` separators.
    fn encode_key(key: &str) -> String {
        key.split('/')
            .map(|seg| utf8_percent_encode(seg, SIGV4_ENCODE).to_string())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Build the object URL for a key.
    fn build_url(&self, key: &str) -> String {
        let endpoint = self.endpoint();
        let key = Self::encode_key(key.trim_start_matches('/'));

        if self.config.path_style {
            if key.is_empty() {
                format!("{}/{}", endpoint, self.config.bucket)
            } else {
                format!("{}/{}/{}", endpoint, self.config.bucket, key)
            }
        } else {
            let (scheme, host) = match endpoint.split_once("://") {
                Some((scheme, host)) => (scheme, host),
                None => ("https", endpoint.as_str()),
            };
            if key.is_empty() {
                format!("{}://{}.{}", scheme, self.config.bucket, host)
            } else {
                format!("{}://{}.{}/{}", scheme, self.config.bucket, host, key)
            }
        }
    }

    fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key size");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }

    fn sha256_hex(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    /// Derive the SigV4 signing key for a date.
    fn signing_key(&self, date_stamp: &str) -> Vec<u8> {
        let k_date = Self::hmac_sha256(
            format!("AWS4{}", self.config.secret_access_key).as_bytes(),
            date_stamp.as_bytes(),
        );
        let k_region = Self::hmac_sha256(&k_date, self.config.region.as_bytes());
        let k_service = Self::hmac_sha256(&k_region, b"s3");
        Self::hmac_sha256(&k_service, b"aws4_request")
    }

    /// Canonical query string: encoded pairs sorted by parameter name.
    fn canonical_query(params: &[(String, String)]) -> String {
        let mut encoded: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| {
                (
                    utf8_percent_encode(k, SIGV4_ENCODE).to_string(),
                    utf8_percent_encode(v, SIGV4_ENCODE).to_string(),
                )
            })
            .collect();
        encoded.sort();
        encoded
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Generate a presigned URL for the given method and key.
    fn presign(
        &self,
        method: &str,
        key: &str,
        ttl: Duration,
        content_type: Option<&str>,
        metadata: &HashMap<String, String>,
    ) -> Result<String> {
        let expires = ttl.min(self.config.max_url_ttl).as_secs().max(1);

        let now: DateTime<Utc> = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.config.region);
        let credential = format!("{}/{}", self.config.access_key_id, credential_scope);

        let url = self.build_url(key);
        let parsed = url::Url::parse(&url)
            .map_err(|e| Error::InvalidArgument(format!("Invalid object URL: {}", e)))?;
        let host = parsed.host_str().unwrap_or_default().to_string();
        let path = parsed.path().to_string();

        let signed_headers = if content_type.is_some() {
            "content-type;host"
        } else {
            "host"
        };

        let mut params: Vec<(String, String)> = vec![
            ("X-Amz-Algorithm".to_string(), "AWS4-HMAC-SHA256".to_string()),
            ("X-Amz-Credential".to_string(), credential),
            ("X-Amz-Date".to_string(), amz_date.clone()),
            ("X-Amz-Expires".to_string(), expires.to_string()),
            ("X-Amz-SignedHeaders".to_string(), signed_headers.to_string()),
        ];
        for (name, value) in metadata {
            params.push((format!("x-amz-meta-{}", name), value.clone()));
        }

        let canonical_query = Self::canonical_query(&params);

        let canonical_headers = match content_type {
            Some(ct) => format!("content-type:{}\nhost:{}\n", ct, host),
            None => format!("host:{}\n", host),
        };

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method, path, canonical_query, canonical_headers, signed_headers, UNSIGNED_PAYLOAD
        );

        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            Self::sha256_hex(canonical_request.as_bytes())
        );

        let signature = hex::encode(Self::hmac_sha256(
            &self.signing_key(&date_stamp),
            string_to_sign.as_bytes(),
        ));

        Ok(format!(
            "{}?{}&X-Amz-Signature={}",
            url, canonical_query, signature
        ))
    }

    /// Send a header-signed request (used for delete/head/list).
    async fn send_signed(
        &self,
        method: Method,
        key: &str,
        query: &[(String, String)],
    ) -> Result<reqwest::Response> {
        let base_url = self.build_url(key);
        let canonical_query = Self::canonical_query(query);
        let full_url = if canonical_query.is_empty() {
            base_url.clone()
        } else {
            format!("{}?{}", base_url, canonical_query)
        };

        let now: DateTime<Utc> = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        let parsed = url::Url::parse(&base_url)
            .map_err(|e| Error::InvalidArgument(format!("Invalid object URL: {}", e)))?;
        let host = parsed.host_str().unwrap_or_default().to_string();
        let path = parsed.path().to_string();

        let payload_hash = Self::sha256_hex(b"");
        let canonical_headers = format!(
            "host:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n",
            host, payload_hash, amz_date
        );
        let signed_headers = "host;x-amz-content-sha256;x-amz-date";

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method.as_str(),
            path,
            canonical_query,
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            Self::sha256_hex(canonical_request.as_bytes())
        );

        let signature = hex::encode(Self::hmac_sha256(
            &self.signing_key(&date_stamp),
            string_to_sign.as_bytes(),
        ));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.config.access_key_id, credential_scope, signed_headers, signature
        );

        self.http
            .request(method, &full_url)
            .header("x-amz-date", &amz_date)
            .header("x-amz-content-sha256", &payload_hash)
            .header("Authorization", authorization)
            .send()
            .await
            .map_err(|e| Error::Network(format!("{}: {}", self.config.name, e)))
    }

    fn status_error(&self, status: StatusCode, context: &str) -> Error {
        Error::Backend {
            status: status.as_u16(),
            message: format!("{}: {}", self.config.name, context),
        }
    }

    /// Extract the text content of every `<Key>` element in a ListObjectsV2 body.
    fn parse_list_keys(xml: &str) -> Vec<String> {
        let mut keys = Vec::new();
        let mut rest = xml;
        while let Some(start) = rest.find("<Key>") {
            let after = &rest[start + 5..];
            match after.find("</Key>") {
                Some(end) => {
                    keys.push(Self::xml_unescape(&after[..end]));
                    rest = &after[end + 6..];
                }
                None => break,
            }
        }
        keys
    }

    fn xml_unescape(value: &str) -> String {
        value
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&apos;", "'")
            .replace("&amp;", "&")
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn max_url_ttl(&self) -> Duration {
        self.config.max_url_ttl
    }

    async fn generate_upload_url(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
        metadata: &HashMap<String, String>,
    ) -> Result<String> {
        self.presign("PUT", key, ttl, Some(content_type), metadata)
    }

    async fn generate_download_url(&self, key: &str, ttl: Duration) -> Result<String> {
        self.presign("GET", key, ttl, None, &HashMap::new())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let response = self.send_signed(Method::DELETE, key, &[]).await?;
        let status = response.status();

        // S3 delete is idempotent; a missing object is not an error.
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(self.status_error(status, "delete failed"))
        }
    }

    async fn object_exists(&self, key: &str) -> Result<bool> {
        let response = self.send_signed(Method::HEAD, key, &[]).await?;
        let status = response.status();

        match status {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(self.status_error(s, "head failed")),
        }
    }

    async fn list_keys(&self, prefix: &str, max: usize) -> Result<Vec<String>> {
        let query = vec![
            ("list-type".to_string(), "2".to_string()),
            ("prefix".to_string(), prefix.to_string()),
            ("max-keys".to_string(), max.to_string()),
        ];

        let response = self.send_signed(Method::GET, "", &query).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(self.status_error(status, "list failed"));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("{}: {}", self.config.name, e)))?;

        Ok(Self::parse_list_keys(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> S3Config {
        S3Config::new("minio", "us-east-1", "test-bucket", "minioadmin", "minioadmin")
            .with_endpoint("http://localhost:9000")
            .with_path_style()
    }

    #[test]
    fn test_build_url_path_style() {
        let store = S3Store::new(test_config());
        assert_eq!(
            store.build_url("path/to/file.txt"),
            "http://localhost:9000/test-bucket/path/to/file.txt"
        );
    }

    #[test]
    fn test_build_url_virtual_hosted() {
        let store = S3Store::new(S3Config::new(
            "aws", "us-west-2", "my-bucket", "key", "secret",
        ));
        assert_eq!(
            store.build_url("path/to/file.txt"),
            "https://my-bucket.s3.us-west-2.amazonaws.com/path/to/file.txt"
        );
    }

    #[test]
    fn test_key_segments_are_encoded() {
        let store = S3Store::new(test_config());
        let url = store.build_url("vault/user 1/a+b.txt");
        assert_eq!(
            url,
            "http://localhost:9000/test-bucket/vault/user%201/a%2Bb.txt"
        );
    }

    #[test]
    fn test_presign_includes_signature_params() {
        let store = S3Store::new(test_config());
        let url = store
            .presign(
                "GET",
                "vault/u1/file.txt",
                Duration::from_secs(600),
                None,
                &HashMap::new(),
            )
            .unwrap();

        assert!(url.contains("X-Amz-Algorithm=AWS4-HMAC-SHA256"));
        assert!(url.contains("X-Amz-Expires=600"));
        assert!(url.contains("X-Amz-SignedHeaders=host"));
        assert!(url.contains("X-Amz-Signature="));
    }

    #[test]
    fn test_presign_clamps_ttl_to_provider_cap() {
        let config = test_config().with_max_url_ttl(Duration::from_secs(3600));
        let store = S3Store::new(config);
        let url = store
            .presign(
                "GET",
                "file.txt",
                Duration::from_secs(86400),
                None,
                &HashMap::new(),
            )
            .unwrap();

        assert!(url.contains("X-Amz-Expires=3600"));
    }

    #[test]
    fn test_upload_presign_signs_content_type() {
        let store = S3Store::new(test_config());
        let url = store
            .presign(
                "PUT",
                "file.bin",
                Duration::from_secs(300),
                Some("application/octet-stream"),
                &HashMap::new(),
            )
            .unwrap();

        assert!(url.contains("X-Amz-SignedHeaders=content-type%3Bhost"));
    }

    #[test]
    fn test_parse_list_keys() {
        let xml = r#"<?xml version="1.0"?><ListBucketResult>
            <Contents><Key>vault/u1/a.txt</Key><Size>10</Size></Contents>
            <Contents><Key>vault/u1/b &amp; c.txt</Key><Size>20</Size></Contents>
        </ListBucketResult>"#;

        let keys = S3Store::parse_list_keys(xml);
        assert_eq!(keys, vec!["vault/u1/a.txt", "vault/u1/b & c.txt"]);
    }
}
