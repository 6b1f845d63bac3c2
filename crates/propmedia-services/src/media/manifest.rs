//! Upload manifest validation.
//!
//! Runs before any transaction is opened, so a rejected manifest leaves no
//! asset, batch, job or signed URL behind. Checks run per file in a fixed
//! order and the first failure wins; batch limits are checked last.

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use propmedia_core::models::{metadata_keys, MediaAssetType};
use propmedia_core::{AppError, AppResult, MediaProcessingConfig};

use super::types::UploadFileRequest;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ValidatedFile {
    pub client_id: Option<String>,
    pub asset_type: MediaAssetType,
    pub sequence: i32,
    pub filename: String,
    pub content_type: String,
    pub bytes: i64,
    pub checksum: String,
    pub title: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl ValidatedFile {
    /// Metadata persisted on the asset: caller keys first, then the reserved
    /// keys describing the upload.
    pub fn asset_metadata(&self, requested_by: i64) -> BTreeMap<String, String> {
        let mut metadata: BTreeMap<String, String> = self
            .metadata
            .iter()
            .filter(|(k, v)| !k.trim().is_empty() && !v.trim().is_empty())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        metadata.insert(metadata_keys::REQUESTED_BY.to_string(), requested_by.to_string());
        metadata.insert(metadata_keys::FILENAME.to_string(), self.filename.clone());
        metadata.insert(metadata_keys::CONTENT_TYPE.to_string(), self.content_type.clone());
        metadata.insert(metadata_keys::CHECKSUM.to_string(), self.checksum.clone());
        metadata.insert(metadata_keys::SIZE_BYTES.to_string(), self.bytes.to_string());
        if let Some(client_id) = &self.client_id {
            metadata.insert(metadata_keys::CLIENT_ID.to_string(), client_id.clone());
        }
        metadata
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ValidatedManifest {
    pub files: Vec<ValidatedFile>,
    pub total_bytes: i64,
}

fn field(idx: usize, name: &str) -> String {
    format!("files[{}].{}", idx, name)
}

/// Validates a manifest. `require_client_id` enables the batch flow's unique,
/// non-empty `clientId` rule.
pub(crate) fn validate_manifest(
    config: &MediaProcessingConfig,
    files: &[UploadFileRequest],
    require_client_id: bool,
) -> AppResult<ValidatedManifest> {
    if files.is_empty() {
        return Err(AppError::validation("files are required").with_detail("files", "min=1"));
    }

    let mut seen_keys = HashSet::with_capacity(files.len());
    let mut seen_clients = HashSet::with_capacity(files.len());
    let mut validated = Vec::with_capacity(files.len());
    let mut total_bytes: i64 = 0;

    for (idx, file) in files.iter().enumerate() {
        let client_id = file.client_id.trim();
        if require_client_id {
            if client_id.is_empty() {
                return Err(AppError::validation("clientId is required")
                    .with_detail(field(idx, "clientId"), "required"));
            }
            if !seen_clients.insert(client_id.to_string()) {
                return Err(AppError::validation("clientId must be unique")
                    .with_detail(field(idx, "clientId"), client_id));
            }
        }

        if file.sequence <= 0 {
            return Err(AppError::validation("sequence must be greater than zero")
                .with_detail(field(idx, "sequence"), "required"));
        }

        let type_name = file.asset_type.trim().to_uppercase();
        let key = format!("{}-{}", type_name, file.sequence);
        if !seen_keys.insert(key.clone()) {
            return Err(AppError::validation("duplicate asset type and sequence")
                .with_detail("key", key)
                .with_detail("index", idx));
        }

        let content_type = file.content_type.trim().to_lowercase();
        if !config.is_content_type_allowed(&content_type) {
            return Err(AppError::validation("unsupported content type")
                .with_detail(field(idx, "contentType"), file.content_type.clone()));
        }

        if file.bytes <= 0 {
            return Err(AppError::validation("bytes must be greater than zero")
                .with_detail(field(idx, "bytes"), file.bytes));
        }
        if config.max_file_bytes > 0 && file.bytes > config.max_file_bytes {
            return Err(AppError::validation("file exceeds allowed size")
                .with_detail(field(idx, "bytes"), file.bytes)
                .with_detail("maxBytes", config.max_file_bytes));
        }

        let checksum = file.checksum.trim();
        if checksum.is_empty() {
            return Err(AppError::validation("checksum is required")
                .with_detail(field(idx, "checksum"), "required"));
        }

        let asset_type = MediaAssetType::from_str(&type_name).map_err(|_| {
            AppError::validation("unsupported asset type")
                .with_detail(field(idx, "assetType"), file.asset_type.clone())
        })?;

        total_bytes = total_bytes.saturating_add(file.bytes);
        validated.push(ValidatedFile {
            client_id: Some(client_id.to_string()).filter(|c| !c.is_empty()),
            asset_type,
            sequence: file.sequence,
            filename: file.filename.trim().to_string(),
            content_type,
            bytes: file.bytes,
            checksum: checksum.to_string(),
            title: Some(file.title.trim().to_string()).filter(|t| !t.is_empty()),
            metadata: file.metadata.clone(),
        });
    }

    if config.max_files_per_batch > 0 && validated.len() > config.max_files_per_batch {
        return Err(AppError::validation("too many files in batch")
            .with_detail("files", validated.len())
            .with_detail("maxFiles", config.max_files_per_batch));
    }
    if config.max_total_bytes > 0 && total_bytes > config.max_total_bytes {
        return Err(AppError::validation("batch exceeds maximum allowed payload")
            .with_detail("totalBytes", total_bytes)
            .with_detail("maxTotalBytes", config.max_total_bytes));
    }

    Ok(ValidatedManifest {
        files: validated,
        total_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use propmedia_core::ErrorKind;

    fn file(asset_type: &str, sequence: i32) -> UploadFileRequest {
        UploadFileRequest {
            asset_type: asset_type.to_string(),
            sequence,
            filename: "front.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            bytes: 500_000,
            checksum: "abc".to_string(),
            ..Default::default()
        }
    }

    fn message(result: AppResult<ValidatedManifest>) -> String {
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        err.message()
    }

    #[test]
    fn test_accepts_valid_manifest() {
        let config = MediaProcessingConfig::default();
        let manifest = validate_manifest(
            &config,
            &[file("photo_horizontal", 1), file("PHOTO_VERTICAL", 2)],
            false,
        )
        .unwrap();
        assert_eq!(manifest.files.len(), 2);
        assert_eq!(manifest.total_bytes, 1_000_000);
        assert_eq!(manifest.files[0].asset_type, MediaAssetType::PhotoHorizontal);
        assert_eq!(manifest.files[0].client_id, None);
    }

    #[test]
    fn test_first_failure_wins_in_order() {
        let config = MediaProcessingConfig::default();

        let mut bad = file("PHOTO_VERTICAL", 0);
        bad.content_type = "text/plain".into();
        assert_eq!(
            message(validate_manifest(&config, &[bad], false)),
            "sequence must be greater than zero"
        );

        assert_eq!(
            message(validate_manifest(
                &config,
                &[file("PHOTO_VERTICAL", 1), file("photo_vertical", 1)],
                false
            )),
            "duplicate asset type and sequence"
        );

        let mut bad = file("NOT_A_TYPE", 1);
        bad.content_type = "text/plain".into();
        assert_eq!(
            message(validate_manifest(&config, &[bad], false)),
            "unsupported content type"
        );

        let mut bad = file("PHOTO_VERTICAL", 1);
        bad.bytes = 0;
        assert_eq!(
            message(validate_manifest(&config, &[bad], false)),
            "bytes must be greater than zero"
        );

        let mut bad = file("PHOTO_VERTICAL", 1);
        bad.checksum = "  ".into();
        assert_eq!(
            message(validate_manifest(&config, &[bad], false)),
            "checksum is required"
        );

        assert_eq!(
            message(validate_manifest(&config, &[file("AUDIO", 1)], false)),
            "unsupported asset type"
        );
    }

    #[test]
    fn test_batch_limits() {
        let config = MediaProcessingConfig {
            max_files_per_batch: 1,
            ..Default::default()
        };
        assert_eq!(
            message(validate_manifest(
                &config,
                &[file("PHOTO_VERTICAL", 1), file("PHOTO_VERTICAL", 2)],
                false
            )),
            "too many files in batch"
        );

        let config = MediaProcessingConfig {
            max_total_bytes: 600_000,
            ..Default::default()
        };
        assert_eq!(
            message(validate_manifest(
                &config,
                &[file("PHOTO_VERTICAL", 1), file("PHOTO_VERTICAL", 2)],
                false
            )),
            "batch exceeds maximum allowed payload"
        );

        let config = MediaProcessingConfig {
            max_file_bytes: 100,
            ..Default::default()
        };
        let err = validate_manifest(&config, &[file("PHOTO_VERTICAL", 1)], false).unwrap_err();
        assert_eq!(err.message(), "file exceeds allowed size");
        assert_eq!(err.details()["maxBytes"], 100);

        assert_eq!(message(validate_manifest(&config, &[], false)), "files are required");
    }

    #[test]
    fn test_client_id_rules() {
        let config = MediaProcessingConfig::default();
        assert_eq!(
            message(validate_manifest(&config, &[file("PHOTO_VERTICAL", 1)], true)),
            "clientId is required"
        );

        let mut a = file("PHOTO_VERTICAL", 1);
        a.client_id = "front".into();
        let mut b = file("PHOTO_VERTICAL", 2);
        b.client_id = "front".into();
        assert_eq!(
            message(validate_manifest(&config, &[a.clone(), b], true)),
            "clientId must be unique"
        );

        let manifest = validate_manifest(&config, &[a], true).unwrap();
        let metadata = manifest.files[0].asset_metadata(7);
        assert_eq!(metadata[metadata_keys::CLIENT_ID], "front");
        assert_eq!(metadata[metadata_keys::REQUESTED_BY], "7");
        assert_eq!(metadata[metadata_keys::SIZE_BYTES], "500000");
    }
}
