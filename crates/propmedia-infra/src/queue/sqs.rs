use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::MessageAttributeValue;
use aws_sdk_sqs::Client;
use propmedia_core::models::MediaProcessingJobMessage;
use propmedia_core::QueueConfig;
use std::collections::HashMap;

use super::{message_attributes, CallbackSource, JobQueue, QueueMessage};
use crate::error::QueueError;

/// SQS-backed job publisher and callback consumer.
#[derive(Clone)]
pub struct SqsQueueGateway {
    client: Client,
    job_queue_url: String,
    retry_queue_url: Option<String>,
    callback_queue_url: Option<String>,
    wait_secs: i32,
    max_messages: i32,
}

impl SqsQueueGateway {
    pub async fn from_config(config: &QueueConfig) -> Self {
        let shared = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&shared), config)
    }

    pub fn new(client: Client, config: &QueueConfig) -> Self {
        Self {
            client,
            job_queue_url: config.job_queue_url.clone(),
            retry_queue_url: config.retry_queue_url.clone(),
            callback_queue_url: config.callback_queue_url.clone(),
            wait_secs: config.callback_wait_secs,
            max_messages: config.callback_max_messages,
        }
    }

    async fn publish(
        &self,
        queue_url: &str,
        message: &MediaProcessingJobMessage,
    ) -> Result<String, QueueError> {
        let body = serde_json::to_string(message)?;

        let mut attributes = HashMap::new();
        for (name, value) in message_attributes(message) {
            let value = MessageAttributeValue::builder()
                .data_type("String")
                .string_value(value)
                .build()
                .map_err(|e| QueueError::Provider(e.to_string()))?;
            attributes.insert(name, value);
        }

        let output = self
            .client
            .send_message()
            .queue_url(queue_url)
            .message_body(body)
            .set_message_attributes(Some(attributes))
            .send()
            .await
            .map_err(|e| QueueError::Provider(DisplayErrorContext(&e).to_string()))?;

        let message_id = output.message_id().unwrap_or_default().to_string();
        tracing::info!(
            job_id = message.job_id,
            listing_identity_id = message.listing_identity_id,
            retry = message.retry,
            message_id = %message_id,
            "Media processing job enqueued"
        );
        Ok(message_id)
    }

    fn callback_queue(&self) -> Result<&str, QueueError> {
        self.callback_queue_url
            .as_deref()
            .ok_or_else(|| QueueError::NotConfigured("MEDIA_CALLBACK_QUEUE_URL".to_string()))
    }
}

#[async_trait]
impl JobQueue for SqsQueueGateway {
    async fn enqueue_job(&self, message: &MediaProcessingJobMessage) -> Result<String, QueueError> {
        self.publish(&self.job_queue_url, message).await
    }

    async fn enqueue_retry(
        &self,
        message: &MediaProcessingJobMessage,
    ) -> Result<String, QueueError> {
        let queue_url = self
            .retry_queue_url
            .as_deref()
            .unwrap_or(&self.job_queue_url);
        self.publish(queue_url, message).await
    }
}

#[async_trait]
impl CallbackSource for SqsQueueGateway {
    async fn receive(&self) -> Result<Vec<QueueMessage>, QueueError> {
        let output = self
            .client
            .receive_message()
            .queue_url(self.callback_queue()?)
            .max_number_of_messages(self.max_messages)
            .wait_time_seconds(self.wait_secs)
            .message_attribute_names("All")
            .send()
            .await
            .map_err(|e| QueueError::Provider(DisplayErrorContext(&e).to_string()))?;

        Ok(output
            .messages()
            .iter()
            .filter_map(|m| {
                Some(QueueMessage {
                    message_id: m.message_id().unwrap_or_default().to_string(),
                    receipt_handle: m.receipt_handle()?.to_string(),
                    body: m.body().unwrap_or_default().to_string(),
                })
            })
            .collect())
    }

    async fn acknowledge(&self, receipt_handle: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(self.callback_queue()?)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Provider(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }
}
