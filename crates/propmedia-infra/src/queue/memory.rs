use async_trait::async_trait;
use propmedia_core::models::MediaProcessingJobMessage;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{message_attributes, CallbackSource, JobQueue, QueueMessage};
use crate::error::QueueError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Job,
    Retry,
}

#[derive(Debug, Clone)]
pub struct RecordedMessage {
    pub queue: QueueKind,
    pub message: MediaProcessingJobMessage,
    pub attributes: BTreeMap<String, String>,
}

/// In-process queue used by tests and the `memory` deployment.
#[derive(Default)]
pub struct InMemoryQueue {
    published: Mutex<Vec<RecordedMessage>>,
    callbacks: Mutex<VecDeque<QueueMessage>>,
    acknowledged: Mutex<Vec<String>>,
    next_id: AtomicU64,
    fail_publish: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent publish fail.
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<RecordedMessage> {
        lock(&self.published).clone()
    }

    /// Queues a callback body; returns its receipt handle.
    pub fn push_callback(&self, body: impl Into<String>) -> String {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let receipt_handle = format!("receipt-{}", id);
        lock(&self.callbacks).push_back(QueueMessage {
            message_id: format!("msg-{}", id),
            receipt_handle: receipt_handle.clone(),
            body: body.into(),
        });
        receipt_handle
    }

    pub fn acknowledged(&self) -> Vec<String> {
        lock(&self.acknowledged).clone()
    }

    fn record(
        &self,
        queue: QueueKind,
        message: &MediaProcessingJobMessage,
    ) -> Result<String, QueueError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(QueueError::Provider("publish rejected".to_string()));
        }
        lock(&self.published).push(RecordedMessage {
            queue,
            message: message.clone(),
            attributes: message_attributes(message),
        });
        Ok(format!("msg-{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
    }
}

#[async_trait]
impl JobQueue for InMemoryQueue {
    async fn enqueue_job(&self, message: &MediaProcessingJobMessage) -> Result<String, QueueError> {
        self.record(QueueKind::Job, message)
    }

    async fn enqueue_retry(
        &self,
        message: &MediaProcessingJobMessage,
    ) -> Result<String, QueueError> {
        self.record(QueueKind::Retry, message)
    }
}

#[async_trait]
impl CallbackSource for InMemoryQueue {
    async fn receive(&self) -> Result<Vec<QueueMessage>, QueueError> {
        Ok(lock(&self.callbacks).drain(..).collect())
    }

    async fn acknowledge(&self, receipt_handle: &str) -> Result<(), QueueError> {
        lock(&self.acknowledged).push(receipt_handle.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(retry: u16) -> MediaProcessingJobMessage {
        MediaProcessingJobMessage {
            job_id: 1,
            listing_identity_id: 2,
            batch_id: None,
            assets: vec![],
            retry,
        }
    }

    #[tokio::test]
    async fn test_records_queue_kind() {
        let queue = InMemoryQueue::new();
        queue.enqueue_job(&message(0)).await.unwrap();
        queue.enqueue_retry(&message(1)).await.unwrap();
        let published = queue.published();
        assert_eq!(published[0].queue, QueueKind::Job);
        assert_eq!(published[1].queue, QueueKind::Retry);
        assert_eq!(published[1].attributes["RetryCount"], "1");

        queue.fail_publishes(true);
        assert!(queue.enqueue_job(&message(0)).await.is_err());
        assert_eq!(queue.published().len(), 2);
    }

    #[tokio::test]
    async fn test_callbacks_drain_once() {
        let queue = InMemoryQueue::new();
        let handle = queue.push_callback("{}");
        let received = queue.receive().await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(queue.receive().await.unwrap().is_empty());
        queue.acknowledge(&handle).await.unwrap();
        assert_eq!(queue.acknowledged(), vec![handle]);
    }
}
