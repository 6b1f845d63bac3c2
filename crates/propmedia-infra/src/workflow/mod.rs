//! Finalization workflow port.

mod memory;
#[cfg(feature = "aws")]
mod sfn;

pub use memory::RecordingWorkflow;
#[cfg(feature = "aws")]
pub use sfn::SfnWorkflowGateway;

use async_trait::async_trait;
use propmedia_core::models::FinalizationInput;

use crate::error::WorkflowError;

#[async_trait]
pub trait WorkflowStarter: Send + Sync {
    /// Starts the finalization workflow for a job. Returns the execution handle.
    ///
    /// The execution is named `finalization-{listingId}-{jobId}` so a repeated
    /// start for the same job is deduplicated by the provider.
    async fn start_media_finalization(
        &self,
        input: &FinalizationInput,
    ) -> Result<String, WorkflowError>;
}
