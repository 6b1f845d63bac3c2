use async_trait::async_trait;
use propmedia_core::models::FinalizationInput;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::WorkflowStarter;
use crate::error::WorkflowError;

/// Records started executions instead of calling a provider.
#[derive(Default)]
pub struct RecordingWorkflow {
    started: Mutex<Vec<FinalizationInput>>,
    deny: AtomicBool,
    fail: AtomicBool,
}

impl RecordingWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subsequent starts fail with `AccessDenied`.
    pub fn deny_access(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }

    /// Subsequent starts fail with a provider error.
    pub fn fail_starts(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn started(&self) -> Vec<FinalizationInput> {
        self.started
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl WorkflowStarter for RecordingWorkflow {
    async fn start_media_finalization(
        &self,
        input: &FinalizationInput,
    ) -> Result<String, WorkflowError> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(WorkflowError::AccessDenied("denied by test double".to_string()));
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(WorkflowError::Provider("execution limit exceeded".to_string()));
        }
        self.started
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(input.clone());
        Ok(format!(
            "arn:aws:states:local:000000000000:execution:finalization:{}",
            input.execution_name()
        ))
    }
}
