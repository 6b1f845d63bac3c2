//! Propmedia Services Layer
//!
//! This crate is the **business service layer** of the media core. It hosts
//! the use cases that coordinate the job ledger, the object store, the job
//! queue and the finalization workflow:
//!
//! - intake of upload manifests and signed upload URLs
//! - dispatch of processing and finalization jobs
//! - application of workflow callbacks
//! - reconciliation of stuck jobs and retention of old ones
//! - download URLs, listing and deletion of media
//! - the legacy upload batch flow
//!
//! Ports are injected as trait objects so every use case runs unchanged
//! against Postgres/S3/SQS in production and in-memory fakes in tests.

pub mod consumer;
pub mod media;

#[cfg(feature = "cleanup")]
pub mod cleanup;

#[cfg(feature = "cleanup")]
pub use cleanup::MaintenanceService;
pub use consumer::{CallbackConsumer, PollSummary};
pub use media::types::*;
pub use media::MediaProcessingService;
pub use propmedia_storage::{MediaStorageGateway, Resolution, SignedUrl};
