use async_trait::async_trait;
use aws_sdk_sfn::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_sfn::Client;
use propmedia_core::models::FinalizationInput;
use propmedia_core::WorkflowConfig;

use super::WorkflowStarter;
use crate::error::WorkflowError;

/// Step Functions client for the finalization state machine.
#[derive(Clone)]
pub struct SfnWorkflowGateway {
    client: Client,
    state_machine_arn: String,
}

fn is_access_denied(code: Option<&str>) -> bool {
    matches!(
        code,
        Some("AccessDeniedException") | Some("AccessDenied") | Some("UnauthorizedOperation")
    )
}

impl SfnWorkflowGateway {
    pub async fn from_config(config: &WorkflowConfig) -> Self {
        let shared = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&shared), config.finalization_state_machine_arn.clone())
    }

    pub fn new(client: Client, state_machine_arn: String) -> Self {
        Self {
            client,
            state_machine_arn,
        }
    }
}

#[async_trait]
impl WorkflowStarter for SfnWorkflowGateway {
    #[tracing::instrument(skip(self, input), fields(job_id = input.job_id, listing_id = input.listing_id))]
    async fn start_media_finalization(
        &self,
        input: &FinalizationInput,
    ) -> Result<String, WorkflowError> {
        let payload = serde_json::to_string(input)?;

        let output = self
            .client
            .start_execution()
            .state_machine_arn(&self.state_machine_arn)
            .name(input.execution_name())
            .input(payload)
            .send()
            .await
            .map_err(|e| {
                if is_access_denied(e.code()) {
                    WorkflowError::AccessDenied(DisplayErrorContext(&e).to_string())
                } else {
                    tracing::error!(error = %DisplayErrorContext(&e), "Failed to start finalization workflow");
                    WorkflowError::Provider(DisplayErrorContext(&e).to_string())
                }
            })?;

        let execution_arn = output.execution_arn().to_string();
        tracing::info!(execution_arn = %execution_arn, "Finalization workflow started");
        Ok(execution_arn)
    }
}
