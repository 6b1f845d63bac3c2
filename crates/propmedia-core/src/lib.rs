//! Propmedia Core Library
//!
//! Domain models, error taxonomy, configuration and wire DTOs shared by every
//! crate of the media processing core. Nothing in here performs I/O.

pub mod clock;
pub mod config;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{
    Config, DatabaseConfig, MediaProcessingConfig, QueueConfig, StorageBackend, StorageConfig,
    VideoThumbnailConfig, WorkflowConfig,
};
pub use error::{AppError, AppResult, Details, ErrorKind, ErrorMetadata, LogLevel};
