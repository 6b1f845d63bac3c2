//! Job queue and callback queue ports.
//!
//! Jobs are published as JSON [`MediaProcessingJobMessage`] bodies with string
//! attributes `ListingIdentityId`, `JobId`, `RetryCount` and `Traceparent`.
//! Retries go to the retry queue when one is configured, else to the primary
//! queue.

mod memory;
#[cfg(feature = "aws")]
mod sqs;

pub use memory::{InMemoryQueue, QueueKind, RecordedMessage};
#[cfg(feature = "aws")]
pub use sqs::SqsQueueGateway;

use async_trait::async_trait;
use propmedia_core::models::{MediaProcessingJobMessage, ProcessingCallback};
use propmedia_core::AppResult;
use std::collections::BTreeMap;

use crate::error::QueueError;
use crate::trace_context;

pub const ATTR_LISTING_IDENTITY_ID: &str = "ListingIdentityId";
pub const ATTR_JOB_ID: &str = "JobId";
pub const ATTR_RETRY_COUNT: &str = "RetryCount";
pub const ATTR_TRACEPARENT: &str = "Traceparent";

/// A message received from the callback queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Publishes a job. Returns the provider message id.
    async fn enqueue_job(&self, message: &MediaProcessingJobMessage) -> Result<String, QueueError>;

    async fn enqueue_retry(&self, message: &MediaProcessingJobMessage)
        -> Result<String, QueueError>;
}

#[async_trait]
pub trait CallbackSource: Send + Sync {
    /// Long-polls for callback messages. An empty batch is not an error.
    async fn receive(&self) -> Result<Vec<QueueMessage>, QueueError>;

    async fn acknowledge(&self, receipt_handle: &str) -> Result<(), QueueError>;
}

/// Parses a callback body. Ids may be numbers or numeric strings.
pub fn decode_message(body: &str) -> AppResult<ProcessingCallback> {
    ProcessingCallback::decode(body)
}

/// String attributes attached to a published job.
pub fn message_attributes(message: &MediaProcessingJobMessage) -> BTreeMap<String, String> {
    let mut attributes = BTreeMap::new();
    attributes.insert(
        ATTR_LISTING_IDENTITY_ID.to_string(),
        message.listing_identity_id.to_string(),
    );
    attributes.insert(ATTR_JOB_ID.to_string(), message.job_id.to_string());
    attributes.insert(ATTR_RETRY_COUNT.to_string(), message.retry.to_string());
    attributes.insert(ATTR_TRACEPARENT.to_string(), trace_context::new_traceparent());
    attributes
}
