//! Configuration module
//!
//! Environment-driven configuration for each process role: the service layer
//! (manifest limits, feature flags, reconciler and retention cadence), the object
//! store, queues, the finalization workflow, the database pool and the video
//! thumbnail worker.

use std::env;
use std::time::Duration;

// Common constants
const MAX_FILES_PER_BATCH: usize = 60;
const MAX_TOTAL_BYTES: i64 = 1024 * 1024 * 1024;
const MAX_FILE_BYTES: i64 = 256 * 1024 * 1024;
const DEFAULT_ALLOWED_CONTENT_TYPES: &str =
    "image/jpeg,image/png,image/heic,video/mp4,video/quicktime,application/pdf";
const STUCK_JOB_TIMEOUT_SECS: u64 = 3600;
const RECONCILE_INTERVAL_SECS: u64 = 300;
const RETENTION_DAYS: i64 = 30;
const RETENTION_INTERVAL_SECS: u64 = 3600;

/// Upper bound on jobs deleted by a single retention pass.
pub const MAX_RETENTION_LIMIT: i64 = 5000;

const UPLOAD_URL_TTL_SECS: u64 = 900;
const DOWNLOAD_URL_TTL_SECS: u64 = 3600;
const CALLBACK_WAIT_SECS: i32 = 20;
const CALLBACK_MAX_MESSAGES: i32 = 10;
const MAX_CONNECTIONS: u32 = 10;
const CONNECTION_TIMEOUT_SECS: u64 = 30;

const FFMPEG_PATH: &str = "/opt/ffmpeg/ffmpeg";
const VIDEO_THUMBNAIL_SECOND: u32 = 1;
const VIDEO_THUMBNAIL_WIDTH: u32 = 200;
const VIDEO_THUMBNAIL_QUALITY: u8 = 85;

/// Parse a boolean flag. Accepts true/1/yes and false/0/no (case-insensitive).
pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Clamp a retention limit into `(0, MAX_RETENTION_LIMIT]`. Non-positive values
/// select the maximum.
pub fn clamp_retention_limit(limit: i64) -> i64 {
    if limit <= 0 || limit > MAX_RETENTION_LIMIT {
        MAX_RETENTION_LIMIT
    } else {
        limit
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| parse_bool_flag(&v))
        .unwrap_or(default)
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Manifest limits, feature flags and background task cadence for the service layer.
#[derive(Clone, Debug)]
pub struct MediaProcessingConfig {
    pub max_files_per_batch: usize,
    pub max_total_bytes: i64,
    pub max_file_bytes: i64,
    pub allowed_content_types: Vec<String>,
    pub allow_owner_project_upload: bool,
    pub require_admin_review: bool,
    /// Zero disables the reconciler.
    pub stuck_job_timeout: Duration,
    pub reconcile_interval: Duration,
    pub retention_days: i64,
    pub retention_limit: i64,
    pub retention_interval: Duration,
}

impl Default for MediaProcessingConfig {
    fn default() -> Self {
        Self {
            max_files_per_batch: MAX_FILES_PER_BATCH,
            max_total_bytes: MAX_TOTAL_BYTES,
            max_file_bytes: MAX_FILE_BYTES,
            allowed_content_types: parse_content_types(DEFAULT_ALLOWED_CONTENT_TYPES),
            allow_owner_project_upload: false,
            require_admin_review: false,
            stuck_job_timeout: Duration::from_secs(STUCK_JOB_TIMEOUT_SECS),
            reconcile_interval: Duration::from_secs(RECONCILE_INTERVAL_SECS),
            retention_days: RETENTION_DAYS,
            retention_limit: MAX_RETENTION_LIMIT,
            retention_interval: Duration::from_secs(RETENTION_INTERVAL_SECS),
        }
    }
}

fn parse_content_types(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl MediaProcessingConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let allowed_content_types = parse_content_types(
            &env::var("ALLOWED_CONTENT_TYPES")
                .unwrap_or_else(|_| DEFAULT_ALLOWED_CONTENT_TYPES.to_string()),
        );

        Self {
            max_files_per_batch: env::var("MAX_FILES_PER_BATCH")
                .unwrap_or_else(|_| MAX_FILES_PER_BATCH.to_string())
                .parse()
                .ok()
                .filter(|v| *v > 0)
                .unwrap_or(MAX_FILES_PER_BATCH),
            max_total_bytes: env::var("MAX_TOTAL_BYTES")
                .unwrap_or_else(|_| MAX_TOTAL_BYTES.to_string())
                .parse()
                .ok()
                .filter(|v| *v > 0)
                .unwrap_or(MAX_TOTAL_BYTES),
            max_file_bytes: env::var("MAX_FILE_BYTES")
                .unwrap_or_else(|_| MAX_FILE_BYTES.to_string())
                .parse()
                .ok()
                .filter(|v| *v > 0)
                .unwrap_or(MAX_FILE_BYTES),
            allowed_content_types: if allowed_content_types.is_empty() {
                parse_content_types(DEFAULT_ALLOWED_CONTENT_TYPES)
            } else {
                allowed_content_types
            },
            allow_owner_project_upload: env_flag("ALLOW_OWNER_PROJECT_UPLOAD", false),
            require_admin_review: env_flag("LISTING_APPROVAL_ADMIN_REVIEW", false),
            stuck_job_timeout: Duration::from_secs(
                env::var("STUCK_JOB_TIMEOUT_SECS")
                    .unwrap_or_else(|_| STUCK_JOB_TIMEOUT_SECS.to_string())
                    .parse()
                    .unwrap_or(STUCK_JOB_TIMEOUT_SECS),
            ),
            reconcile_interval: Duration::from_secs(
                env::var("RECONCILE_INTERVAL_SECS")
                    .unwrap_or_else(|_| RECONCILE_INTERVAL_SECS.to_string())
                    .parse()
                    .ok()
                    .filter(|v| *v > 0)
                    .unwrap_or(RECONCILE_INTERVAL_SECS),
            ),
            retention_days: env::var("RETENTION_DAYS")
                .unwrap_or_else(|_| RETENTION_DAYS.to_string())
                .parse()
                .ok()
                .filter(|v| *v > 0)
                .unwrap_or(RETENTION_DAYS),
            retention_limit: clamp_retention_limit(
                env::var("RETENTION_LIMIT")
                    .unwrap_or_else(|_| MAX_RETENTION_LIMIT.to_string())
                    .parse()
                    .unwrap_or(MAX_RETENTION_LIMIT),
            ),
            retention_interval: Duration::from_secs(
                env::var("RETENTION_INTERVAL_SECS")
                    .unwrap_or_else(|_| RETENTION_INTERVAL_SECS.to_string())
                    .parse()
                    .ok()
                    .filter(|v| *v > 0)
                    .unwrap_or(RETENTION_INTERVAL_SECS),
            ),
        }
    }

    /// Whether a (trimmed, lower-cased) content type is in the allowed set.
    pub fn is_content_type_allowed(&self, content_type: &str) -> bool {
        let normalized = content_type.trim().to_lowercase();
        self.allowed_content_types.iter().any(|ct| *ct == normalized)
    }
}

/// Storage backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    S3,
    Local,
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "s3" => Ok(StorageBackend::S3),
            "local" => Ok(StorageBackend::Local),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(anyhow::anyhow!("Invalid storage backend: {}", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub bucket: Option<String>,
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible providers (MinIO, LocalStack)
    pub endpoint_url: Option<String>,
    pub local_path: Option<String>,
    pub local_base_url: Option<String>,
    pub upload_url_ttl: Duration,
    pub download_url_ttl: Duration,
}

impl StorageConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let backend: StorageBackend = env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "s3".to_string())
            .parse()?;

        let config = Self {
            backend,
            bucket: env_optional("MEDIA_BUCKET"),
            region: env_optional("AWS_REGION"),
            endpoint_url: env_optional("S3_ENDPOINT_URL"),
            local_path: env_optional("LOCAL_STORAGE_PATH"),
            local_base_url: env_optional("LOCAL_STORAGE_BASE_URL"),
            upload_url_ttl: Duration::from_secs(
                env::var("UPLOAD_URL_TTL_SECS")
                    .unwrap_or_else(|_| UPLOAD_URL_TTL_SECS.to_string())
                    .parse()
                    .ok()
                    .filter(|v| *v > 0)
                    .unwrap_or(UPLOAD_URL_TTL_SECS),
            ),
            download_url_ttl: Duration::from_secs(
                env::var("DOWNLOAD_URL_TTL_SECS")
                    .unwrap_or_else(|_| DOWNLOAD_URL_TTL_SECS.to_string())
                    .parse()
                    .ok()
                    .filter(|v| *v > 0)
                    .unwrap_or(DOWNLOAD_URL_TTL_SECS),
            ),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match self.backend {
            StorageBackend::S3 if self.bucket.is_none() => Err(anyhow::anyhow!(
                "MEDIA_BUCKET must be set when STORAGE_BACKEND=s3"
            )),
            StorageBackend::Local if self.local_path.is_none() => Err(anyhow::anyhow!(
                "LOCAL_STORAGE_PATH must be set when STORAGE_BACKEND=local"
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub job_queue_url: String,
    /// Falls back to the job queue when unset.
    pub retry_queue_url: Option<String>,
    pub callback_queue_url: Option<String>,
    pub callback_wait_secs: i32,
    pub callback_max_messages: i32,
}

impl QueueConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        Ok(Self {
            job_queue_url: env_optional("MEDIA_JOB_QUEUE_URL")
                .ok_or_else(|| anyhow::anyhow!("MEDIA_JOB_QUEUE_URL must be set"))?,
            retry_queue_url: env_optional("MEDIA_RETRY_QUEUE_URL"),
            callback_queue_url: env_optional("MEDIA_CALLBACK_QUEUE_URL"),
            callback_wait_secs: env::var("CALLBACK_WAIT_SECS")
                .unwrap_or_else(|_| CALLBACK_WAIT_SECS.to_string())
                .parse()
                .ok()
                .filter(|v| (0..=20).contains(v))
                .unwrap_or(CALLBACK_WAIT_SECS),
            callback_max_messages: env::var("CALLBACK_MAX_MESSAGES")
                .unwrap_or_else(|_| CALLBACK_MAX_MESSAGES.to_string())
                .parse()
                .ok()
                .filter(|v| (1..=10).contains(v))
                .unwrap_or(CALLBACK_MAX_MESSAGES),
        })
    }
}

#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    pub finalization_state_machine_arn: String,
}

impl WorkflowConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        Ok(Self {
            finalization_state_machine_arn: env_optional("FINALIZATION_STATE_MACHINE_ARN")
                .ok_or_else(|| anyhow::anyhow!("FINALIZATION_STATE_MACHINE_ARN must be set"))?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub timeout_seconds: u64,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
        })
    }
}

/// Frame extraction settings for the video thumbnail worker.
#[derive(Clone, Debug)]
pub struct VideoThumbnailConfig {
    pub ffmpeg_path: String,
    pub seek_seconds: u32,
    pub width: u32,
    /// JPEG quality in 1..=100.
    pub quality: u8,
}

impl Default for VideoThumbnailConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: FFMPEG_PATH.to_string(),
            seek_seconds: VIDEO_THUMBNAIL_SECOND,
            width: VIDEO_THUMBNAIL_WIDTH,
            quality: VIDEO_THUMBNAIL_QUALITY,
        }
    }
}

impl VideoThumbnailConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            ffmpeg_path: env_optional("FFMPEG_PATH").unwrap_or_else(|| FFMPEG_PATH.to_string()),
            seek_seconds: env::var("VIDEO_THUMBNAIL_SECOND")
                .unwrap_or_else(|_| VIDEO_THUMBNAIL_SECOND.to_string())
                .parse()
                .unwrap_or(VIDEO_THUMBNAIL_SECOND),
            width: env::var("VIDEO_THUMBNAIL_WIDTH")
                .unwrap_or_else(|_| VIDEO_THUMBNAIL_WIDTH.to_string())
                .parse()
                .ok()
                .filter(|v| *v > 0)
                .unwrap_or(VIDEO_THUMBNAIL_WIDTH),
            quality: env::var("VIDEO_THUMBNAIL_QUALITY")
                .unwrap_or_else(|_| VIDEO_THUMBNAIL_QUALITY.to_string())
                .parse()
                .ok()
                .filter(|v| (1..=100).contains(v))
                .unwrap_or(VIDEO_THUMBNAIL_QUALITY),
        }
    }
}

/// Full configuration of the `serve` role.
#[derive(Clone, Debug)]
pub struct Config {
    pub media: MediaProcessingConfig,
    pub storage: StorageConfig,
    pub queue: QueueConfig,
    pub workflow: WorkflowConfig,
    pub database: DatabaseConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        Ok(Self {
            media: MediaProcessingConfig::from_env(),
            storage: StorageConfig::from_env()?,
            queue: QueueConfig::from_env()?,
            workflow: WorkflowConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_flag() {
        assert_eq!(parse_bool_flag("TRUE"), Some(true));
        assert_eq!(parse_bool_flag(" yes "), Some(true));
        assert_eq!(parse_bool_flag("1"), Some(true));
        assert_eq!(parse_bool_flag("no"), Some(false));
        assert_eq!(parse_bool_flag("0"), Some(false));
        assert_eq!(parse_bool_flag("maybe"), None);
    }

    #[test]
    fn test_clamp_retention_limit() {
        assert_eq!(clamp_retention_limit(0), MAX_RETENTION_LIMIT);
        assert_eq!(clamp_retention_limit(-3), MAX_RETENTION_LIMIT);
        assert_eq!(clamp_retention_limit(500), 500);
        assert_eq!(clamp_retention_limit(9000), MAX_RETENTION_LIMIT);
    }

    #[test]
    fn test_default_media_config() {
        let cfg = MediaProcessingConfig::default();
        assert_eq!(cfg.max_files_per_batch, 60);
        assert_eq!(cfg.max_total_bytes, 1 << 30);
        assert_eq!(cfg.max_file_bytes, 256 << 20);
        assert!(cfg.is_content_type_allowed(" Image/JPEG "));
        assert!(cfg.is_content_type_allowed("video/quicktime"));
        assert!(!cfg.is_content_type_allowed("image/gif"));
    }

    #[test]
    fn test_storage_backend_from_str() {
        assert_eq!("S3".parse::<StorageBackend>().ok(), Some(StorageBackend::S3));
        assert_eq!(
            "local".parse::<StorageBackend>().ok(),
            Some(StorageBackend::Local)
        );
        assert!("gcs".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_storage_config_validation() {
        let cfg = StorageConfig {
            backend: StorageBackend::S3,
            bucket: None,
            region: None,
            endpoint_url: None,
            local_path: None,
            local_base_url: None,
            upload_url_ttl: Duration::from_secs(900),
            download_url_ttl: Duration::from_secs(3600),
        };
        assert!(cfg.validate().is_err());

        let cfg = StorageConfig {
            backend: StorageBackend::Memory,
            ..cfg
        };
        assert!(cfg.validate().is_ok());
    }
}
