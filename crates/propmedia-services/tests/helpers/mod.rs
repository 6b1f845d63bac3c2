//! Test helpers: build a media service over in-memory ports.
//!
//! Run from workspace root: `cargo test -p propmedia-services`.

#![allow(dead_code)]

pub mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use propmedia_core::models::{ListingSnapshot, ListingStatus, PropertyType};
use propmedia_core::{FixedClock, MediaProcessingConfig};
use propmedia_db::MemoryLedger;
use propmedia_infra::{InMemoryQueue, RecordingWorkflow};
use propmedia_services::{MediaProcessingService, MediaStorageGateway};
use propmedia_storage::ObjectStoreStorage;

pub const OWNER_ID: i64 = 77;
pub const UPLOAD_TTL_SECS: u64 = 900;
pub const DOWNLOAD_TTL_SECS: u64 = 3600;

pub fn test_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// Test application: the service plus handles on every fake it talks to.
pub struct TestApp {
    pub service: MediaProcessingService,
    pub ledger: MemoryLedger,
    pub storage: MediaStorageGateway,
    pub queue: Arc<InMemoryQueue>,
    pub workflow: Arc<RecordingWorkflow>,
    pub clock: FixedClock,
}

impl TestApp {
    /// Seeds the active version of a listing owned by [`OWNER_ID`].
    pub async fn seed_listing(&self, identity_id: i64, status: ListingStatus) {
        self.seed_listing_with_type(identity_id, status, PropertyType::Other("APARTMENT".into()))
            .await;
    }

    pub async fn seed_listing_with_type(
        &self,
        identity_id: i64,
        status: ListingStatus,
        property_type: PropertyType,
    ) {
        self.ledger
            .insert_listing(ListingSnapshot {
                identity_id,
                version_id: identity_id * 100,
                owner_id: OWNER_ID,
                status,
                property_type,
            })
            .await;
    }

    pub async fn listing_status(&self, identity_id: i64) -> ListingStatus {
        self.ledger
            .listing(identity_id)
            .await
            .map(|l| l.status)
            .expect("listing seeded")
    }

    /// Puts bytes where a client would have PUT them.
    pub async fn put_object(&self, key: &str, data: &[u8]) {
        self.storage
            .upload_file(key, bytes::Bytes::copy_from_slice(data), "image/jpeg")
            .await
            .expect("upload object");
    }
}

pub fn setup_test_app() -> TestApp {
    setup_test_app_with(MediaProcessingConfig::default())
}

pub fn setup_test_app_with(config: MediaProcessingConfig) -> TestApp {
    let ledger = MemoryLedger::new();
    let storage = MediaStorageGateway::new(
        Arc::new(ObjectStoreStorage::memory()),
        Duration::from_secs(UPLOAD_TTL_SECS),
        Duration::from_secs(DOWNLOAD_TTL_SECS),
    );
    let queue = Arc::new(InMemoryQueue::new());
    let workflow = Arc::new(RecordingWorkflow::new());
    let clock = FixedClock::new(test_start());

    let service = MediaProcessingService::new(
        Arc::new(ledger.clone()),
        storage.clone(),
        queue.clone(),
        workflow.clone(),
        config,
    )
    .with_clock(Arc::new(clock.clone()))
    .with_callback_source(queue.clone());

    TestApp {
        service,
        ledger,
        storage,
        queue,
        workflow,
        clock,
    }
}
