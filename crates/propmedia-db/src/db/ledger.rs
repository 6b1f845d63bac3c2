//! Capability traits over the job ledger.
//!
//! Lookups return `Ok(None)` when the row is absent; callers decide whether that
//! is a `NotFound`. Every method runs inside the session's transaction.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use propmedia_core::models::{
    ListingSnapshot, ListingStatus, MediaAsset, MediaAssetStatus, MediaAssetType, MediaBatch,
    MediaProcessingJob,
};

use super::transaction::TransactionGuard;

/// Asset listing filter. Empty sets match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetFilter {
    pub asset_types: Vec<MediaAssetType>,
    pub statuses: Vec<MediaAssetStatus>,
    pub sequence: Option<i32>,
}

impl AssetFilter {
    pub fn with_types(mut self, types: impl IntoIterator<Item = MediaAssetType>) -> Self {
        self.asset_types.extend(types);
        self
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = MediaAssetStatus>) -> Self {
        self.statuses.extend(statuses);
        self
    }

    pub fn with_sequence(mut self, sequence: Option<i32>) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn matches(&self, asset: &MediaAsset) -> bool {
        (self.asset_types.is_empty() || self.asset_types.contains(&asset.asset_type))
            && (self.statuses.is_empty() || self.statuses.contains(&asset.status))
            && self.sequence.map_or(true, |s| s == asset.sequence)
    }

    pub(crate) fn type_names(&self) -> Option<Vec<String>> {
        if self.asset_types.is_empty() {
            None
        } else {
            Some(self.asset_types.iter().map(|t| t.as_str().to_string()).collect())
        }
    }

    pub(crate) fn status_names(&self) -> Option<Vec<String>> {
        if self.statuses.is_empty() {
            None
        } else {
            Some(self.statuses.iter().map(|s| s.as_str().to_string()).collect())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Pagination {
    /// One-based page number; values below one select the first page.
    pub fn page(page: i64, page_size: i64) -> Self {
        let limit = page_size.max(1);
        Self {
            limit,
            offset: (page.max(1) - 1) * limit,
        }
    }
}

#[async_trait]
pub trait AssetStore: Send {
    /// Insert or update keyed by `(listing, type, sequence)`; returns the stored row.
    async fn upsert_asset(&mut self, asset: &MediaAsset) -> Result<MediaAsset>;

    async fn get_asset(
        &mut self,
        listing_identity_id: i64,
        asset_type: MediaAssetType,
        sequence: i32,
    ) -> Result<Option<MediaAsset>>;

    /// Same as `get_asset` but takes the row lock.
    async fn get_asset_by_sequence(
        &mut self,
        listing_identity_id: i64,
        asset_type: MediaAssetType,
        sequence: i32,
    ) -> Result<Option<MediaAsset>>;

    async fn get_asset_by_id(&mut self, asset_id: i64) -> Result<Option<MediaAsset>>;

    async fn get_asset_by_raw_key(
        &mut self,
        listing_identity_id: i64,
        raw_key: &str,
    ) -> Result<Option<MediaAsset>>;

    /// Ordered by `(asset_type, sequence)`.
    async fn list_assets(
        &mut self,
        listing_identity_id: i64,
        filter: &AssetFilter,
        pagination: Option<Pagination>,
    ) -> Result<Vec<MediaAsset>>;

    async fn count_assets(&mut self, listing_identity_id: i64, filter: &AssetFilter)
        -> Result<i64>;

    async fn list_assets_by_batch(&mut self, batch_id: i64) -> Result<Vec<MediaAsset>>;

    /// Moves every asset of the listing in `from` to `to`; returns rows changed.
    async fn bulk_update_asset_status(
        &mut self,
        listing_identity_id: i64,
        from: MediaAssetStatus,
        to: MediaAssetStatus,
    ) -> Result<u64>;

    async fn delete_asset(
        &mut self,
        listing_identity_id: i64,
        asset_type: MediaAssetType,
        sequence: i32,
    ) -> Result<bool>;
}

#[async_trait]
pub trait JobStore: Send {
    async fn register_processing_job(&mut self, job: &MediaProcessingJob) -> Result<i64>;

    /// Loads the job and takes its row lock.
    async fn get_processing_job_by_id(&mut self, job_id: i64) -> Result<Option<MediaProcessingJob>>;

    async fn update_processing_job(&mut self, job: &MediaProcessingJob) -> Result<()>;

    async fn get_latest_finalization_job(
        &mut self,
        listing_identity_id: i64,
    ) -> Result<Option<MediaProcessingJob>>;

    /// RUNNING jobs started before `cutoff` with no completion, oldest first.
    async fn list_stuck_jobs(
        &mut self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<MediaProcessingJob>>;

    /// Deletes terminal jobs whose `COALESCE(completed_at, created_at)` precedes `cutoff`.
    async fn delete_old_jobs(&mut self, cutoff: DateTime<Utc>, limit: i64) -> Result<u64>;
}

#[async_trait]
pub trait BatchStore: Send {
    async fn create_batch(&mut self, batch: &MediaBatch) -> Result<i64>;

    /// Soft-deleted batches are not returned.
    async fn get_batch(&mut self, listing_identity_id: i64, batch_id: i64)
        -> Result<Option<MediaBatch>>;

    async fn update_batch_status(&mut self, batch: &MediaBatch) -> Result<()>;

    async fn has_open_batch(&mut self, listing_identity_id: i64) -> Result<bool>;

    async fn soft_delete_batch(
        &mut self,
        listing_identity_id: i64,
        batch_id: i64,
        deleted_at: DateTime<Utc>,
    ) -> Result<bool>;
}

/// Read and advance the active listing version in the catalog.
#[async_trait]
pub trait ListingStore: Send {
    async fn get_active_listing(
        &mut self,
        listing_identity_id: i64,
    ) -> Result<Option<ListingSnapshot>>;

    async fn update_listing_status(
        &mut self,
        listing_identity_id: i64,
        status: &ListingStatus,
    ) -> Result<()>;
}

/// One open transaction across every store.
#[async_trait]
pub trait LedgerSession: AssetStore + JobStore + BatchStore + ListingStore + Send {
    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// False once committed or rolled back.
    fn is_active(&self) -> bool;
}

#[async_trait]
pub trait MediaLedger: Send + Sync {
    async fn begin(&self) -> Result<TransactionGuard>;

    async fn begin_read_only(&self) -> Result<TransactionGuard>;
}
