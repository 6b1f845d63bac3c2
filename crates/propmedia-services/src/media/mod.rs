//! Media processing use cases.
//!
//! Every use case opens one ledger transaction, runs its reads and writes
//! through the guard and commits explicitly. Returning early drops the guard,
//! which rolls the transaction back.

mod approval;
mod batch;
mod callback;
mod dispatch;
mod downloads;
mod intake;
mod maintenance;
pub(crate) mod manifest;
pub mod types;

use std::sync::Arc;

use propmedia_core::models::{FinalizationAsset, FinalizationInput, ListingSnapshot, MediaAsset};
use propmedia_core::{AppError, AppResult, Clock, MediaProcessingConfig, SystemClock};
use propmedia_db::{ListingStore, MediaLedger, TransactionGuard};
use propmedia_infra::{CallbackSource, JobQueue, WorkflowStarter};
use propmedia_storage::MediaStorageGateway;

pub use maintenance::STUCK_JOB_SCAN_LIMIT;

/// Maps ledger failures onto `Infra` with a public message.
pub(crate) trait LedgerResultExt<T> {
    fn or_infra(self, message: &'static str) -> AppResult<T>;
}

impl<T> LedgerResultExt<T> for anyhow::Result<T> {
    fn or_infra(self, message: &'static str) -> AppResult<T> {
        self.map_err(|e| AppError::infra(message, e))
    }
}

#[derive(Clone)]
pub struct MediaProcessingService {
    ledger: Arc<dyn MediaLedger>,
    storage: MediaStorageGateway,
    queue: Arc<dyn JobQueue>,
    workflow: Arc<dyn WorkflowStarter>,
    /// Acknowledges callback messages once their effects are committed.
    callbacks: Option<Arc<dyn CallbackSource>>,
    clock: Arc<dyn Clock>,
    config: MediaProcessingConfig,
}

impl MediaProcessingService {
    pub fn new(
        ledger: Arc<dyn MediaLedger>,
        storage: MediaStorageGateway,
        queue: Arc<dyn JobQueue>,
        workflow: Arc<dyn WorkflowStarter>,
        config: MediaProcessingConfig,
    ) -> Self {
        Self {
            ledger,
            storage,
            queue,
            workflow,
            callbacks: None,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Replace the time source (tests pin it with a `FixedClock`).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_callback_source(mut self, callbacks: Arc<dyn CallbackSource>) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    pub fn config(&self) -> &MediaProcessingConfig {
        &self.config
    }

    pub fn storage(&self) -> &MediaStorageGateway {
        &self.storage
    }

    async fn begin(&self) -> AppResult<TransactionGuard> {
        self.ledger.begin().await.or_infra("failed to start transaction")
    }

    async fn begin_read_only(&self) -> AppResult<TransactionGuard> {
        self.ledger
            .begin_read_only()
            .await
            .or_infra("failed to start transaction")
    }

    async fn commit(&self, tx: TransactionGuard, message: &'static str) -> AppResult<()> {
        tx.commit().await.or_infra(message)
    }
}

fn ensure_listing_id(listing_identity_id: i64) -> AppResult<()> {
    if listing_identity_id <= 0 {
        return Err(AppError::validation("listingIdentityId must be greater than zero")
            .with_detail("listingIdentityId", "required"));
    }
    Ok(())
}

fn ensure_batch_id(batch_id: i64) -> AppResult<()> {
    if batch_id <= 0 {
        return Err(
            AppError::validation("batchId must be greater than zero").with_detail("batchId", "required")
        );
    }
    Ok(())
}

fn ensure_requested_by(requested_by: i64) -> AppResult<()> {
    if requested_by <= 0 {
        return Err(AppError::unauthorized("authenticated user is required"));
    }
    Ok(())
}

async fn load_listing(tx: &mut TransactionGuard, listing_identity_id: i64) -> AppResult<ListingSnapshot> {
    tx.get_active_listing(listing_identity_id)
        .await
        .or_infra("failed to load listing")?
        .ok_or_else(|| AppError::not_found("listing not found"))
}

/// Finalization input over processed assets; derived artifacts are excluded.
fn build_finalization_input(
    job_id: i64,
    listing_identity_id: i64,
    assets: &[MediaAsset],
) -> FinalizationInput {
    let assets = assets
        .iter()
        .filter(|asset| !asset.asset_type.is_derived())
        .filter_map(|asset| {
            asset.processed_key().map(|key| FinalizationAsset {
                key: key.to_string(),
                asset_type: asset.asset_type.as_str().to_string(),
            })
        })
        .collect();
    FinalizationInput {
        job_id,
        listing_id: listing_identity_id,
        assets,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use propmedia_core::models::{MediaAssetStatus, MediaAssetType};

    #[test]
    fn test_finalization_input_skips_derived_and_unprocessed() {
        let mut photo = MediaAsset::new(4, MediaAssetType::PhotoVertical, 1);
        photo.status = MediaAssetStatus::Processed;
        photo.processed_key = Some("4/processed/photo/vertical/large/a.jpg".into());
        let mut zip = MediaAsset::new(4, MediaAssetType::Zip, 1);
        zip.processed_key = Some("4/zip/complete_1_2.zip".into());
        let pending = MediaAsset::new(4, MediaAssetType::VideoVertical, 2);

        let input = build_finalization_input(9, 4, &[photo, zip, pending]);
        assert_eq!(input.execution_name(), "finalization-4-9");
        assert_eq!(input.assets.len(), 1);
        assert_eq!(input.assets[0].asset_type, "PHOTO_VERTICAL");
    }

    #[test]
    fn test_id_guards() {
        assert!(ensure_listing_id(0).is_err());
        assert!(ensure_listing_id(3).is_ok());
        assert!(ensure_batch_id(-1).is_err());
        assert_eq!(
            ensure_requested_by(0).unwrap_err().kind(),
            propmedia_core::ErrorKind::Auth
        );
    }
}
