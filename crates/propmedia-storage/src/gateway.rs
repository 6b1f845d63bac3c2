//! Media storage gateway.
//!
//! Thin policy layer over a [`Storage`] backend: it derives object keys for
//! listing assets, binds checksums into upload signatures and applies the
//! configured URL lifetimes.

use crate::checksum::normalize_checksum;
use crate::keys::{dedupe_keys, processed_download_key, raw_object_key, Resolution};
use crate::traits::{ObjectInfo, PresignedRequest, Storage, StorageError, StorageResult};
use bytes::Bytes;
use propmedia_core::models::MediaAsset;
use propmedia_core::StorageConfig;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Signed URL handed back to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrl {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub object_key: String,
    /// Seconds.
    pub expires_in: u64,
}

impl SignedUrl {
    fn from_request(object_key: String, request: PresignedRequest) -> Self {
        Self {
            url: request.url,
            method: request.method,
            headers: request.headers,
            object_key,
            expires_in: request.expires_in.as_secs(),
        }
    }
}

#[derive(Clone)]
pub struct MediaStorageGateway {
    storage: Arc<dyn Storage>,
    upload_ttl: Duration,
    download_ttl: Duration,
}

impl MediaStorageGateway {
    pub fn new(storage: Arc<dyn Storage>, upload_ttl: Duration, download_ttl: Duration) -> Self {
        Self {
            storage,
            upload_ttl,
            download_ttl,
        }
    }

    pub fn from_config(storage: Arc<dyn Storage>, config: &StorageConfig) -> Self {
        Self::new(storage, config.upload_url_ttl, config.download_url_ttl)
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn download_ttl(&self) -> Duration {
        self.download_ttl
    }

    /// Signed PUT for the asset's raw object.
    ///
    /// A checksum that normalises to base64 is bound into the signature; one that
    /// does not is left out so the upload still succeeds.
    #[tracing::instrument(skip(self, asset), fields(asset_type = %asset.asset_type, sequence = asset.sequence))]
    pub async fn generate_raw_upload_url(
        &self,
        listing_identity_id: i64,
        asset: &MediaAsset,
        content_type: &str,
        checksum: Option<&str>,
    ) -> StorageResult<SignedUrl> {
        let key = raw_object_key(listing_identity_id, asset);
        let checksum = checksum.and_then(normalize_checksum);
        if checksum.is_none() && asset.checksum().is_some() {
            tracing::debug!(key = %key, "Checksum not in a signable format, omitting");
        }
        let request = self
            .storage
            .presign_put(&key, content_type.trim(), checksum.as_deref(), self.upload_ttl)
            .await?;
        Ok(SignedUrl::from_request(key, request))
    }

    /// HEADs the object and, when `expected` is a usable checksum and the store
    /// recorded one, compares the two.
    pub async fn validate_object_checksum(
        &self,
        key: &str,
        expected: Option<&str>,
    ) -> StorageResult<ObjectInfo> {
        let info = self.storage.head(key).await?;
        let expected = expected.and_then(normalize_checksum);
        match (expected, info.checksum.as_deref()) {
            (Some(expected), Some(actual)) if actual != expected => {
                return Err(StorageError::ChecksumMismatch {
                    key: key.to_string(),
                    expected,
                    actual: actual.to_string(),
                });
            }
            (Some(_), None) => {
                tracing::debug!(key = %key, "Store reported no checksum, skipping comparison");
            }
            _ => {}
        }
        Ok(info)
    }

    pub async fn head_object(&self, key: &str) -> StorageResult<ObjectInfo> {
        self.storage.head(key).await
    }

    pub async fn generate_processed_download_url(
        &self,
        listing_identity_id: i64,
        asset: &MediaAsset,
        resolution: Resolution,
    ) -> StorageResult<SignedUrl> {
        let key = processed_download_key(listing_identity_id, asset, resolution);
        self.generate_download_url(&key).await
    }

    pub async fn generate_download_url(&self, key: &str) -> StorageResult<SignedUrl> {
        let request = self.storage.presign_get(key, self.download_ttl).await?;
        Ok(SignedUrl::from_request(key.to_string(), request))
    }

    pub async fn download_file(&self, key: &str) -> StorageResult<Bytes> {
        self.storage.download(key).await
    }

    pub async fn upload_file(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        self.storage.upload(key, data, content_type).await
    }

    pub async fn copy_object(&self, from_key: &str, to_key: &str, content_type: &str) -> StorageResult<()> {
        self.storage.copy(from_key, to_key, content_type).await
    }

    /// Deletes the given keys after trimming and de-duplication. Returns the
    /// number of distinct keys sent to the store.
    pub async fn delete_keys<I, S>(&self, keys: I) -> StorageResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = dedupe_keys(keys);
        if keys.is_empty() {
            return Ok(0);
        }
        self.storage.delete_keys(&keys).await?;
        tracing::info!(count = keys.len(), "Deleted objects");
        Ok(keys.len())
    }
}
