//! Propmedia Infrastructure Library
//!
//! Adapters for the external collaborators of the media core:
//! - Job and callback queues (SQS, in-memory)
//! - Finalization workflow (Step Functions, in-memory)
//! - Telemetry initialization
//! - W3C trace context propagation

pub mod error;
pub mod queue;
pub mod trace_context;
pub mod workflow;

#[cfg(feature = "observability-basic")]
pub mod telemetry;

// Re-export commonly used types
pub use error::{QueueError, WorkflowError};
pub use queue::{
    decode_message, CallbackSource, InMemoryQueue, JobQueue, QueueKind, QueueMessage,
    RecordedMessage,
};
#[cfg(feature = "aws")]
pub use queue::SqsQueueGateway;
pub use workflow::{RecordingWorkflow, WorkflowStarter};
#[cfg(feature = "aws")]
pub use workflow::SfnWorkflowGateway;

#[cfg(feature = "observability-basic")]
pub use telemetry::{init_telemetry, shutdown_telemetry, LogFormat};
