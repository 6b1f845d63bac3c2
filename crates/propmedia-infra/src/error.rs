//! Port-level errors for the queue and workflow adapters.
//!
//! Provider SDK errors are flattened into strings here so that callers never
//! see an AWS type.

use propmedia_core::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue not configured: {0}")]
    NotConfigured(String),

    #[error("Failed to encode queue message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Queue provider error: {0}")]
    Provider(String),
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The workflow provider refused the call for lack of permissions.
    #[error("Workflow access denied: {0}")]
    AccessDenied(String),

    #[error("Failed to encode workflow input: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Workflow provider error: {0}")]
    Provider(String),
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        AppError::infra("failed to publish media processing message", err)
    }
}

impl From<WorkflowError> for AppError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::AccessDenied(reason) => {
                tracing::warn!(reason = %reason, "Workflow provider denied access");
                AppError::forbidden_with_reason(
                    "media finalization temporarily unavailable",
                    "workflow_access_denied",
                )
            }
            other => AppError::infra("failed to start media finalization", other),
        }
    }
}
