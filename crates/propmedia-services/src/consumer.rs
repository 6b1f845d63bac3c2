//! Callback queue consumer.
//!
//! Drains the callback queue and feeds each message to
//! [`MediaProcessingService::handle_processing_callback`]. Messages are only
//! acknowledged once their effects are committed; anything that fails is left
//! on the queue for redelivery.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use propmedia_core::ErrorKind;
use propmedia_infra::{decode_message, CallbackSource, QueueMessage};

use crate::media::types::HandleProcessingCallbackInput;
use crate::media::MediaProcessingService;

/// Outcome of one receive round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub received: usize,
    pub applied: usize,
    pub failed: usize,
}

pub struct CallbackConsumer {
    service: MediaProcessingService,
    source: Arc<dyn CallbackSource>,
    idle_backoff: Duration,
}

impl CallbackConsumer {
    pub fn new(service: MediaProcessingService, source: Arc<dyn CallbackSource>) -> Self {
        Self {
            service: service.with_callback_source(source.clone()),
            source,
            idle_backoff: Duration::from_secs(1),
        }
    }

    /// Pause between empty or failed receives.
    pub fn with_idle_backoff(mut self, idle_backoff: Duration) -> Self {
        self.idle_backoff = idle_backoff;
        self
    }

    /// Receives one round of messages and applies them in order.
    pub async fn poll_once(&self) -> anyhow::Result<PollSummary> {
        let messages = self.source.receive().await?;
        let mut summary = PollSummary {
            received: messages.len(),
            ..Default::default()
        };
        for message in messages {
            if self.handle_message(message).await {
                summary.applied += 1;
            } else {
                summary.failed += 1;
            }
        }
        Ok(summary)
    }

    async fn handle_message(&self, message: QueueMessage) -> bool {
        let callback = match decode_message(&message.body) {
            Ok(callback) => callback,
            Err(e) => {
                tracing::error!(
                    message_id = %message.message_id,
                    error = %e,
                    "Undecodable callback message left on queue"
                );
                return false;
            }
        };

        let input = HandleProcessingCallbackInput {
            callback,
            receipt_handle: Some(message.receipt_handle),
        };
        match self.service.handle_processing_callback(input).await {
            Ok(output) => {
                tracing::debug!(
                    message_id = %message.message_id,
                    job_id = output.job_id,
                    duplicate = output.duplicate,
                    "Callback message handled"
                );
                true
            }
            Err(e) => {
                let retryable = e.kind() == ErrorKind::Infra;
                tracing::error!(
                    message_id = %message.message_id,
                    error = %e,
                    retryable,
                    "Failed to apply callback message"
                );
                false
            }
        }
    }

    /// Polls until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!("Callback consumer started");
        loop {
            let idle = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.poll_once() => match result {
                    Ok(summary) => summary.received == 0,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to receive callback messages");
                        true
                    }
                },
            };
            if idle {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.idle_backoff) => {}
                }
            }
        }
        tracing::info!("Callback consumer stopped");
    }
}
