//! Object storage collaborator
//!
//! The pipeline only needs two operations: a time-limited signed GET URL
//! and an upload. `S3Storage` implements them on S3.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::presigning::PresigningConfig;
use thiserror::Error;

use crate::retry::IsTransient;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid presign request: {0}")]
    Presign(String),

    #[error("Storage request failed: {0}")]
    Request(String),
}

impl IsTransient for StorageError {
    fn is_transient(&self) -> bool {
        matches!(self, StorageError::Request(_))
    }
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Fetchable URL for `bucket/path`, valid for `ttl`
    async fn signed_url(&self, bucket: &str, path: &str, ttl: Duration) -> Result<String, StorageError>;

    /// Store `bytes` at `bucket/path`
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;
}

/// S3-backed storage
#[derive(Clone)]
pub struct S3Storage {
    client: S3Client,
}

impl S3Storage {
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn signed_url(&self, bucket: &str, path: &str, ttl: Duration) -> Result<String, StorageError> {
        let presigning = PresigningConfig::expires_in(ttl).map_err(|e| {
            tracing::error!(error = %e, "Failed to create presigning config");
            StorageError::Presign(e.to_string())
        })?;

        let presigned = self
            .client
            .get_object()
            .bucket(bucket)
            .key(path)
            .presigned(presigning)
            .await
            .map_err(|e| {
                tracing::error!(bucket, path, error = %e, "Failed to generate presigned URL");
                StorageError::Request(e.to_string())
            })?;

        Ok(presigned.uri().to_string())
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(bucket)
            .key(path)
            .body(bytes.into())
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(bucket, path, error = %e, "S3 upload failed");
                StorageError::Request(e.to_string())
            })?;

        tracing::info!(bucket, path, byte_size = size, "Artifact uploaded");
        Ok(())
    }
}
