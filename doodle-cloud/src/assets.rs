//! Asset resolver: storage path or URL → fetchable URL → bytes
//!
//! Resolution never throws into assembly. A failure yields `None` and the
//! caller decides whether the asset was mandatory.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use thiserror::Error;

use crate::retry::{IsTransient, RetryConfig, retry_on_transient};
use crate::storage::ObjectStorage;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Asset not found")]
    NotFound,

    #[error("Asset request returned HTTP {0}")]
    Status(u16),

    #[error("Asset request failed: {0}")]
    Transport(String),
}

impl IsTransient for FetchError {
    fn is_transient(&self) -> bool {
        match self {
            FetchError::NotFound => false,
            FetchError::Status(code) => *code >= 500 || *code == 429,
            FetchError::Transport(_) => true,
        }
    }
}

/// Download bytes from a URL
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// reqwest-backed fetcher
#[derive(Clone)]
pub struct HttpFetch {
    client: reqwest::Client,
}

impl HttpFetch {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetch for HttpFetch {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::FORBIDDEN {
            // S3 answers 403 for missing keys when the signer lacks ListBucket
            return Err(FetchError::NotFound);
        }
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Resolves image references from one bucket
#[derive(Clone)]
pub struct AssetResolver {
    storage: Arc<dyn ObjectStorage>,
    fetch: Arc<dyn Fetch>,
    bucket: String,
    ttl: Duration,
    retry: RetryConfig,
}

/// Fully-qualified references pass through unchanged
pub fn is_absolute_url(reference: &str) -> bool {
    reference.starts_with("https://") || reference.starts_with("http://")
}

impl AssetResolver {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        fetch: Arc<dyn Fetch>,
        bucket: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            storage,
            fetch,
            bucket: bucket.into(),
            ttl,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Fetchable URL valid for the resolver's TTL, or `None` on failure
    pub async fn url_for(&self, reference: &str) -> Option<String> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }
        if is_absolute_url(reference) {
            return Some(reference.to_string());
        }
        let path = reference.trim_start_matches('/');
        match self.storage.signed_url(&self.bucket, path, self.ttl).await {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(bucket = %self.bucket, path, error = %e, "Asset URL resolution failed");
                None
            }
        }
    }

    /// Bytes behind `reference`, or `None` when missing or unreachable
    pub async fn fetch(&self, reference: &str) -> Option<Vec<u8>> {
        let url = self.url_for(reference).await?;
        let result = retry_on_transient(&self.retry, "asset_fetch", |_| self.fetch.get(&url))
            .await
            .into_result();
        match result {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(reference, error = %e, "Asset fetch failed");
                None
            }
        }
    }

    /// Optional reference; `None` in, `None` out
    pub async fn fetch_optional(&self, reference: Option<&str>) -> Option<Vec<u8>> {
        match reference {
            Some(r) => self.fetch(r).await,
            None => None,
        }
    }

    /// Resolve independent references concurrently; output order matches input
    pub async fn fetch_all<K: Copy>(&self, references: &[(K, String)]) -> Vec<(K, Option<Vec<u8>>)> {
        let futures = references
            .iter()
            .map(|(key, reference)| async move { (*key, self.fetch(reference).await) });
        join_all(futures).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeFetch, MemoryStorage};

    fn resolver(storage: Arc<MemoryStorage>, fetch: Arc<FakeFetch>) -> AssetResolver {
        AssetResolver::new(storage, fetch, "images", Duration::from_secs(3600)).with_retry(RetryConfig {
            initial_delay: Duration::from_millis(1),
            ..RetryConfig::default()
        })
    }

    #[tokio::test]
    async fn test_absolute_url_passes_through() {
        let storage = Arc::new(MemoryStorage::default());
        let fetch = Arc::new(FakeFetch::new(storage.clone()));
        let r = resolver(storage, fetch);
        assert_eq!(
            r.url_for("https://cdn.example.com/a.png").await.as_deref(),
            Some("https://cdn.example.com/a.png")
        );
    }

    #[tokio::test]
    async fn test_storage_path_is_signed() {
        let storage = Arc::new(MemoryStorage::default());
        let fetch = Arc::new(FakeFetch::new(storage.clone()));
        let r = resolver(storage, fetch);
        let url = r.url_for("creations/1/page-1.png").await.unwrap();
        assert!(url.starts_with("memory://images/creations/1/page-1.png"));
        assert!(url.contains("ttl=3600"));
    }

    #[tokio::test]
    async fn test_missing_object_yields_none() {
        let storage = Arc::new(MemoryStorage::default());
        storage.insert("images", "present.png", b"png".to_vec());
        let fetch = Arc::new(FakeFetch::new(storage.clone()));
        let r = resolver(storage, fetch.clone());

        assert_eq!(r.fetch("present.png").await, Some(b"png".to_vec()));
        assert_eq!(r.fetch("absent.png").await, None);
        assert_eq!(r.fetch("  ").await, None);
        // 404 is permanent: one request only
        assert_eq!(fetch.requests_for("absent.png"), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let storage = Arc::new(MemoryStorage::default());
        storage.insert("images", "flaky.png", b"ok".to_vec());
        let fetch = Arc::new(FakeFetch::new(storage.clone()));
        fetch.fail_next("flaky.png", 2);
        let r = resolver(storage, fetch.clone());

        assert_eq!(r.fetch("flaky.png").await, Some(b"ok".to_vec()));
        assert_eq!(fetch.requests_for("flaky.png"), 3);
    }

    #[tokio::test]
    async fn test_fetch_all_keeps_order() {
        let storage = Arc::new(MemoryStorage::default());
        storage.insert("images", "1.png", b"one".to_vec());
        storage.insert("images", "3.png", b"three".to_vec());
        let fetch = Arc::new(FakeFetch::new(storage.clone()));
        let r = resolver(storage, fetch);

        let refs = vec![(1u32, "1.png".to_string()), (2, "2.png".to_string()), (3, "3.png".to_string())];
        let got = r.fetch_all(&refs).await;
        assert_eq!(
            got,
            vec![(1, Some(b"one".to_vec())), (2, None), (3, Some(b"three".to_vec()))]
        );
    }
}
