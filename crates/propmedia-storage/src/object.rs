//! `object_store`-backed storage for the local filesystem and in-memory
//! backends.
//!
//! Signed URLs are not real signatures here: they are `{base_url}/{key}` with
//! the expiry appended, which is enough for development setups and tests.

use crate::checksum::sha256_base64;
use crate::traits::{ByteStream, ObjectInfo, PresignedRequest, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{Error as ObjectStoreError, ObjectStore, ObjectStoreExt, PutPayload, WriteMultipart};
use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

const CHUNK_SIZE: usize = 5 * 1024 * 1024;
const MAX_IN_FLIGHT_PARTS: usize = 4;

#[derive(Clone)]
pub struct ObjectStoreStorage {
    store: Arc<dyn ObjectStore>,
    base_url: String,
    backend: StorageBackend,
}

fn map_err(key: &str, err: ObjectStoreError) -> StorageError {
    match err {
        ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
        ObjectStoreError::PermissionDenied { .. } | ObjectStoreError::Unauthenticated { .. } => {
            StorageError::AccessDenied(key.to_string())
        }
        other => StorageError::BackendError(other.to_string()),
    }
}

impl ObjectStoreStorage {
    /// Filesystem storage rooted at `base_path`, served under `base_url`.
    pub fn local(base_path: &str, base_url: impl Into<String>) -> StorageResult<Self> {
        std::fs::create_dir_all(base_path).map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path, e
            ))
        })?;
        let store = LocalFileSystem::new_with_prefix(base_path)
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;
        Ok(Self {
            store: Arc::new(store),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            backend: StorageBackend::Local,
        })
    }

    pub fn memory() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            base_url: "memory://".to_string(),
            backend: StorageBackend::Memory,
        }
    }

    fn location(key: &str) -> StorageResult<Path> {
        let key = key.trim();
        if key.is_empty() || key.starts_with('/') || key.split('/').any(|s| s == "..") {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(Path::from(key))
    }

    fn signed(&self, method: &str, key: &str, expires_in: Duration) -> PresignedRequest {
        let base = self.base_url.trim_end_matches('/');
        PresignedRequest {
            url: format!("{}/{}?expires_in={}", base, key, expires_in.as_secs()),
            method: method.to_string(),
            headers: BTreeMap::new(),
            expires_in,
        }
    }
}

#[async_trait]
impl Storage for ObjectStoreStorage {
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        checksum: Option<&str>,
        expires_in: Duration,
    ) -> StorageResult<PresignedRequest> {
        Self::location(key)?;
        let mut request = self.signed("PUT", key, expires_in);
        if !content_type.is_empty() {
            request
                .headers
                .insert("Content-Type".to_string(), content_type.to_string());
        }
        if let Some(checksum) = checksum {
            request
                .headers
                .insert("x-amz-checksum-sha256".to_string(), checksum.to_string());
        }
        Ok(request)
    }

    async fn presign_get(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> StorageResult<PresignedRequest> {
        Self::location(key)?;
        Ok(self.signed("GET", key, expires_in))
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectInfo> {
        let location = Self::location(key)?;
        let meta = self.store.head(&location).await.map_err(|e| map_err(key, e))?;
        // No stored checksum on these backends; hash the content instead.
        let data = self.download(key).await?;
        Ok(ObjectInfo {
            key: key.to_string(),
            size_bytes: meta.size as i64,
            checksum: Some(sha256_base64(&data)),
            etag: meta.e_tag,
            content_type: None,
            last_modified: Some(meta.last_modified),
        })
    }

    async fn download(&self, key: &str) -> StorageResult<Bytes> {
        let location = Self::location(key)?;
        let result = self.store.get(&location).await.map_err(|e| map_err(key, e))?;
        result
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))
    }

    async fn download_stream(&self, key: &str) -> StorageResult<ByteStream> {
        let location = Self::location(key)?;
        let result = self.store.get(&location).await.map_err(|e| map_err(key, e))?;
        let stream = result
            .into_stream()
            .map(|chunk| chunk.map_err(|e| StorageError::DownloadFailed(e.to_string())));
        Ok(Box::pin(stream))
    }

    async fn upload(&self, key: &str, data: Bytes, _content_type: &str) -> StorageResult<()> {
        let location = Self::location(key)?;
        self.store
            .put(&location, PutPayload::from(data))
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;
        Ok(())
    }

    async fn upload_stream(
        &self,
        key: &str,
        _content_type: &str,
        mut reader: Pin<Box<dyn AsyncRead + Send>>,
    ) -> StorageResult<u64> {
        let location = Self::location(key)?;
        let upload = self
            .store
            .put_multipart(&location)
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, CHUNK_SIZE);

        let mut total = 0u64;
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = match reader.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    let _ = writer.abort().await;
                    return Err(StorageError::UploadFailed(format!(
                        "Failed to read from stream: {}",
                        e
                    )));
                }
            };
            if n == 0 {
                break;
            }
            if let Err(e) = writer.wait_for_capacity(MAX_IN_FLIGHT_PARTS).await {
                let _ = writer.abort().await;
                return Err(StorageError::UploadFailed(e.to_string()));
            }
            writer.write(&buf[..n]);
            total += n as u64;
        }

        writer
            .finish()
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;
        Ok(total)
    }

    async fn copy(&self, from_key: &str, to_key: &str, _content_type: &str) -> StorageResult<()> {
        let from = Self::location(from_key)?;
        let to = Self::location(to_key)?;
        self.store
            .copy(&from, &to)
            .await
            .map_err(|e| map_err(from_key, e))
    }

    async fn delete_keys(&self, keys: &[String]) -> StorageResult<()> {
        for key in keys {
            let location = Self::location(key)?;
            match self.store.delete(&location).await {
                Ok(()) | Err(ObjectStoreError::NotFound { .. }) => {}
                Err(e) => return Err(StorageError::DeleteFailed(e.to_string())),
            }
        }
        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        self.backend
    }
}
