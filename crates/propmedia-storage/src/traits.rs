//! Storage abstraction trait
//!
//! All backends (S3, local filesystem, in-memory) implement [`Storage`]; the
//! media gateway and the pipeline workers only ever see the trait.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use std::collections::BTreeMap;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Checksum mismatch for {key}")]
    ChecksumMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Metadata returned by a HEAD request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectInfo {
    pub key: String,
    pub size_bytes: i64,
    /// Base64 SHA-256, when the backend knows it.
    pub checksum: Option<String>,
    pub etag: Option<String>,
    pub content_type: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// A signed HTTP request a client can perform without credentials.
#[derive(Debug, Clone, PartialEq)]
pub struct PresignedRequest {
    pub url: String,
    pub method: String,
    /// Headers the client must send verbatim.
    pub headers: BTreeMap<String, String>,
    pub expires_in: Duration,
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Signed PUT. When `checksum` is set it is bound into the signature as
    /// `x-amz-checksum-sha256`.
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        checksum: Option<&str>,
        expires_in: Duration,
    ) -> StorageResult<PresignedRequest>;

    async fn presign_get(&self, key: &str, expires_in: Duration)
        -> StorageResult<PresignedRequest>;

    /// `NotFound` when the object is missing.
    async fn head(&self, key: &str) -> StorageResult<ObjectInfo>;

    async fn download(&self, key: &str) -> StorageResult<Bytes>;

    /// Download as a stream of chunks without buffering the object.
    async fn download_stream(&self, key: &str) -> StorageResult<ByteStream>;

    async fn upload(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()>;

    /// Multipart upload fed from `reader` until EOF. Returns the bytes written.
    async fn upload_stream(
        &self,
        key: &str,
        content_type: &str,
        reader: Pin<Box<dyn AsyncRead + Send>>,
    ) -> StorageResult<u64>;

    async fn copy(&self, from_key: &str, to_key: &str, content_type: &str) -> StorageResult<()>;

    /// Deletes every key; missing objects are not an error.
    async fn delete_keys(&self, keys: &[String]) -> StorageResult<()>;

    fn backend_type(&self) -> StorageBackend;
}
