use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::error::{AppError, AppResult};

/// Metadata keys written by the core.
pub mod metadata_keys {
    pub const THUMBNAIL_KEY: &str = "thumbnailKey";
    pub const ERROR: &str = "error";
    pub const ERROR_CODE: &str = "errorCode";
    pub const CHECKSUM: &str = "checksum";
    pub const FILENAME: &str = "filename";
    pub const CONTENT_TYPE: &str = "content_type";
    pub const SIZE_BYTES: &str = "size_bytes";
    pub const REQUESTED_BY: &str = "requested_by";
    pub const CLIENT_ID: &str = "client_id";
    pub const ETAG: &str = "etag";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaAssetType {
    PhotoVertical,
    PhotoHorizontal,
    VideoVertical,
    VideoHorizontal,
    Thumbnail,
    Zip,
    ProjectDoc,
    ProjectRender,
}

impl MediaAssetType {
    pub const ALL: [MediaAssetType; 8] = [
        MediaAssetType::PhotoVertical,
        MediaAssetType::PhotoHorizontal,
        MediaAssetType::VideoVertical,
        MediaAssetType::VideoHorizontal,
        MediaAssetType::Thumbnail,
        MediaAssetType::Zip,
        MediaAssetType::ProjectDoc,
        MediaAssetType::ProjectRender,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaAssetType::PhotoVertical => "PHOTO_VERTICAL",
            MediaAssetType::PhotoHorizontal => "PHOTO_HORIZONTAL",
            MediaAssetType::VideoVertical => "VIDEO_VERTICAL",
            MediaAssetType::VideoHorizontal => "VIDEO_HORIZONTAL",
            MediaAssetType::Thumbnail => "THUMBNAIL",
            MediaAssetType::Zip => "ZIP",
            MediaAssetType::ProjectDoc => "PROJECT_DOC",
            MediaAssetType::ProjectRender => "PROJECT_RENDER",
        }
    }

    /// Object key segment for this type (`photo/vertical`, `thumb`, `zip`, ...).
    pub fn path_segment(&self) -> &'static str {
        match self {
            MediaAssetType::PhotoVertical => "photo/vertical",
            MediaAssetType::PhotoHorizontal => "photo/horizontal",
            MediaAssetType::VideoVertical => "video/vertical",
            MediaAssetType::VideoHorizontal => "video/horizontal",
            MediaAssetType::ProjectDoc => "project/doc",
            MediaAssetType::ProjectRender => "project/render",
            MediaAssetType::Thumbnail => "thumb",
            MediaAssetType::Zip => "zip",
        }
    }

    pub fn orientation(&self) -> Option<&'static str> {
        match self {
            MediaAssetType::PhotoVertical | MediaAssetType::VideoVertical => Some("vertical"),
            MediaAssetType::PhotoHorizontal | MediaAssetType::VideoHorizontal => {
                Some("horizontal")
            }
            _ => None,
        }
    }

    pub fn is_photo(&self) -> bool {
        matches!(
            self,
            MediaAssetType::PhotoVertical | MediaAssetType::PhotoHorizontal
        )
    }

    pub fn is_video(&self) -> bool {
        matches!(
            self,
            MediaAssetType::VideoVertical | MediaAssetType::VideoHorizontal
        )
    }

    pub fn is_project(&self) -> bool {
        matches!(
            self,
            MediaAssetType::ProjectDoc | MediaAssetType::ProjectRender
        )
    }

    /// Derived artifacts (thumbnails, zip bundles) rather than uploaded media.
    pub fn is_derived(&self) -> bool {
        matches!(self, MediaAssetType::Thumbnail | MediaAssetType::Zip)
    }
}

impl Display for MediaAssetType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MediaAssetType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase();
        MediaAssetType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| anyhow::anyhow!("Invalid media asset type: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaAssetStatus {
    PendingUpload,
    Processing,
    Processed,
    Failed,
}

impl MediaAssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaAssetStatus::PendingUpload => "PENDING_UPLOAD",
            MediaAssetStatus::Processing => "PROCESSING",
            MediaAssetStatus::Processed => "PROCESSED",
            MediaAssetStatus::Failed => "FAILED",
        }
    }
}

impl Display for MediaAssetStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MediaAssetStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING_UPLOAD" => Ok(MediaAssetStatus::PendingUpload),
            "PROCESSING" => Ok(MediaAssetStatus::Processing),
            "PROCESSED" => Ok(MediaAssetStatus::Processed),
            "FAILED" => Ok(MediaAssetStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid media asset status: {}", s)),
        }
    }
}

/// A single media file owned by a listing, identified by `(listing, type, sequence)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAsset {
    /// Surrogate id; zero until the row is persisted.
    pub id: i64,
    pub listing_identity_id: i64,
    pub batch_id: Option<i64>,
    pub asset_type: MediaAssetType,
    pub sequence: i32,
    pub status: MediaAssetStatus,
    pub raw_key: Option<String>,
    pub processed_key: Option<String>,
    pub title: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl MediaAsset {
    pub fn new(listing_identity_id: i64, asset_type: MediaAssetType, sequence: i32) -> Self {
        Self {
            id: 0,
            listing_identity_id,
            batch_id: None,
            asset_type,
            sequence,
            status: MediaAssetStatus::PendingUpload,
            raw_key: None,
            processed_key: None,
            title: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn raw_key(&self) -> Option<&str> {
        non_empty(&self.raw_key)
    }

    pub fn processed_key(&self) -> Option<&str> {
        non_empty(&self.processed_key)
    }

    pub fn thumbnail_key(&self) -> Option<&str> {
        self.metadata_value(metadata_keys::THUMBNAIL_KEY)
    }

    pub fn checksum(&self) -> Option<&str> {
        self.metadata_value(metadata_keys::CHECKSUM)
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// PENDING_UPLOAD/FAILED -> PROCESSING. The raw object must be known.
    pub fn start_processing(&mut self) -> AppResult<()> {
        if self.raw_key().is_none() {
            return Err(AppError::conflict("asset has no raw object key")
                .with_detail("assetType", self.asset_type.as_str())
                .with_detail("sequence", self.sequence));
        }
        self.status = MediaAssetStatus::Processing;
        Ok(())
    }

    pub fn mark_processed(&mut self, processed_key: &str) -> AppResult<()> {
        let processed_key = processed_key.trim();
        if processed_key.is_empty() {
            return Err(AppError::validation(
                "processed asset returned without processedKey",
            ));
        }
        if self.raw_key().is_none() {
            return Err(AppError::conflict("asset has no raw object key")
                .with_detail("assetType", self.asset_type.as_str())
                .with_detail("sequence", self.sequence));
        }
        self.status = MediaAssetStatus::Processed;
        self.processed_key = Some(processed_key.to_string());
        Ok(())
    }

    pub fn mark_failed(&mut self) {
        self.status = MediaAssetStatus::Failed;
    }

    /// Re-requested uploads start over from PENDING_UPLOAD. Only finished
    /// assets are reset.
    pub fn reset_for_upload(&mut self) {
        if matches!(
            self.status,
            MediaAssetStatus::Failed | MediaAssetStatus::Processed
        ) {
            self.restart_upload();
        }
    }

    /// Back to PENDING_UPLOAD whatever the current status. The processed key
    /// belongs to the replaced upload and is dropped.
    pub fn restart_upload(&mut self) {
        self.status = MediaAssetStatus::PendingUpload;
        self.processed_key = None;
    }

    /// Last-writer-wins merge; empty keys and values are skipped.
    pub fn merge_metadata<I, K, V>(&mut self, updates: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in updates {
            let (key, value) = (key.as_ref(), value.as_ref());
            if key.is_empty() || value.is_empty() {
                continue;
            }
            self.metadata.insert(key.to_string(), value.to_string());
        }
    }

    /// Metadata as persisted (JSON object of strings), `None` when empty.
    pub fn metadata_json(&self) -> Option<String> {
        if self.metadata.is_empty() {
            None
        } else {
            serde_json::to_string(&self.metadata).ok()
        }
    }

    /// Decode persisted metadata. Non-string values are stringified; undecodable
    /// payloads yield an empty map.
    pub fn decode_metadata(raw: Option<&str>) -> BTreeMap<String, String> {
        let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
            return BTreeMap::new();
        };
        match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(raw) {
            Ok(map) => map
                .into_iter()
                .filter_map(|(k, v)| {
                    let value = match v {
                        serde_json::Value::String(s) => s,
                        serde_json::Value::Null => return None,
                        other => other.to_string(),
                    };
                    Some((k, value))
                })
                .collect(),
            Err(_) => BTreeMap::new(),
        }
    }
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for MediaAsset {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        let metadata: Option<String> = row.try_get("metadata")?;
        Ok(MediaAsset {
            id: row.try_get("id")?,
            listing_identity_id: row.try_get("listing_identity_id")?,
            batch_id: row.try_get("batch_id")?,
            asset_type: row
                .try_get::<String, _>("asset_type")?
                .parse()
                .map_err(|e| {
                    sqlx::Error::Decode(format!("Failed to parse asset_type: {}", e).into())
                })?,
            sequence: row.try_get("sequence")?,
            status: row.try_get::<String, _>("status")?.parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse asset status: {}", e).into())
            })?,
            raw_key: row.try_get("s3_key_raw")?,
            processed_key: row.try_get("s3_key_processed")?,
            title: row.try_get("title")?,
            metadata: MediaAsset::decode_metadata(metadata.as_deref()),
        })
    }
}
