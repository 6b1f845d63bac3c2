use propmedia_core::AppError;

use crate::traits::StorageError;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::not_found(format!("object {} not found", key)),
            StorageError::ChecksumMismatch {
                key,
                expected,
                actual,
            } => AppError::conflict("checksum mismatch")
                .with_detail("objectKey", key)
                .with_detail("expected", expected)
                .with_detail("actual", actual),
            StorageError::AccessDenied(msg) => {
                AppError::forbidden_with_reason(msg, "storage_access_denied")
            }
            StorageError::InvalidKey(key) => {
                AppError::validation("invalid object key").with_detail("objectKey", key)
            }
            other => AppError::infra("object store operation failed", other),
        }
    }
}
