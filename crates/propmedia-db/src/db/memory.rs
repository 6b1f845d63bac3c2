//! In-memory ledger
//!
//! A session holds the state lock for its whole lifetime and works on a staged
//! copy, so sessions are serialized and a dropped session leaves no trace.
//! Used by service tests and by the worker's local mode.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use propmedia_core::models::{
    BatchStatus, ListingSnapshot, ListingStatus, MediaAsset, MediaAssetStatus, MediaAssetType,
    MediaBatch, MediaProcessingJob, MediaProcessingJobStatus, MediaProcessingProvider,
};

use super::ledger::{
    AssetFilter, AssetStore, BatchStore, JobStore, LedgerSession, ListingStore, MediaLedger,
    Pagination,
};
use super::transaction::TransactionGuard;

#[derive(Debug, Clone, Default)]
struct LedgerState {
    listings: BTreeMap<i64, ListingSnapshot>,
    assets: BTreeMap<i64, MediaAsset>,
    jobs: BTreeMap<i64, MediaProcessingJob>,
    batches: BTreeMap<i64, MediaBatch>,
    next_asset_id: i64,
    next_job_id: i64,
    next_batch_id: i64,
}

impl LedgerState {
    fn next_id(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }

    fn find_asset(&self, listing: i64, asset_type: MediaAssetType, sequence: i32) -> Option<i64> {
        self.assets
            .values()
            .find(|a| {
                a.listing_identity_id == listing
                    && a.asset_type == asset_type
                    && a.sequence == sequence
            })
            .map(|a| a.id)
    }

    fn sorted(mut assets: Vec<&MediaAsset>) -> Vec<MediaAsset> {
        assets.sort_by(|a, b| {
            a.asset_type
                .as_str()
                .cmp(b.asset_type.as_str())
                .then(a.sequence.cmp(&b.sequence))
        });
        assets.into_iter().cloned().collect()
    }
}

#[derive(Clone, Default)]
pub struct MemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds or replaces the active version of a listing.
    pub async fn insert_listing(&self, listing: ListingSnapshot) {
        let mut state = self.state.lock().await;
        state.listings.insert(listing.identity_id, listing);
    }

    pub async fn listing(&self, listing_identity_id: i64) -> Option<ListingSnapshot> {
        self.state
            .lock()
            .await
            .listings
            .get(&listing_identity_id)
            .cloned()
    }

    pub async fn assets(&self) -> Vec<MediaAsset> {
        let state = self.state.lock().await;
        LedgerState::sorted(state.assets.values().collect())
    }

    pub async fn jobs(&self) -> Vec<MediaProcessingJob> {
        self.state.lock().await.jobs.values().cloned().collect()
    }

    pub async fn batches(&self) -> Vec<MediaBatch> {
        self.state.lock().await.batches.values().cloned().collect()
    }

    async fn open(&self) -> TransactionGuard {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        TransactionGuard::new(Box::new(MemorySession {
            guard: Some(guard),
            staged,
        }))
    }
}

#[async_trait]
impl MediaLedger for MemoryLedger {
    async fn begin(&self) -> Result<TransactionGuard> {
        Ok(self.open().await)
    }

    async fn begin_read_only(&self) -> Result<TransactionGuard> {
        Ok(self.open().await)
    }
}

struct MemorySession {
    guard: Option<OwnedMutexGuard<LedgerState>>,
    staged: LedgerState,
}

impl MemorySession {
    fn state(&mut self) -> Result<&mut LedgerState> {
        if self.guard.is_none() {
            bail!("Transaction was already committed or rolled back");
        }
        Ok(&mut self.staged)
    }
}

#[async_trait]
impl LedgerSession for MemorySession {
    async fn commit(&mut self) -> Result<()> {
        if let Some(mut guard) = self.guard.take() {
            *guard = std::mem::take(&mut self.staged);
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.guard.take();
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.guard.is_some()
    }
}

#[async_trait]
impl AssetStore for MemorySession {
    async fn upsert_asset(&mut self, asset: &MediaAsset) -> Result<MediaAsset> {
        let state = self.state()?;
        let id = match state.find_asset(asset.listing_identity_id, asset.asset_type, asset.sequence)
        {
            Some(id) => id,
            None => LedgerState::next_id(&mut state.next_asset_id),
        };
        let mut stored = asset.clone();
        stored.id = id;
        state.assets.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get_asset(
        &mut self,
        listing_identity_id: i64,
        asset_type: MediaAssetType,
        sequence: i32,
    ) -> Result<Option<MediaAsset>> {
        let state = self.state()?;
        Ok(state
            .find_asset(listing_identity_id, asset_type, sequence)
            .and_then(|id| state.assets.get(&id).cloned()))
    }

    async fn get_asset_by_sequence(
        &mut self,
        listing_identity_id: i64,
        asset_type: MediaAssetType,
        sequence: i32,
    ) -> Result<Option<MediaAsset>> {
        self.get_asset(listing_identity_id, asset_type, sequence).await
    }

    async fn get_asset_by_id(&mut self, asset_id: i64) -> Result<Option<MediaAsset>> {
        Ok(self.state()?.assets.get(&asset_id).cloned())
    }

    async fn get_asset_by_raw_key(
        &mut self,
        listing_identity_id: i64,
        raw_key: &str,
    ) -> Result<Option<MediaAsset>> {
        Ok(self
            .state()?
            .assets
            .values()
            .find(|a| a.listing_identity_id == listing_identity_id && a.raw_key() == Some(raw_key))
            .cloned())
    }

    async fn list_assets(
        &mut self,
        listing_identity_id: i64,
        filter: &AssetFilter,
        pagination: Option<Pagination>,
    ) -> Result<Vec<MediaAsset>> {
        let state = self.state()?;
        let matching = state
            .assets
            .values()
            .filter(|a| a.listing_identity_id == listing_identity_id && filter.matches(a))
            .collect();
        let sorted = LedgerState::sorted(matching);
        Ok(match pagination {
            Some(p) => sorted
                .into_iter()
                .skip(p.offset.max(0) as usize)
                .take(p.limit.max(0) as usize)
                .collect(),
            None => sorted,
        })
    }

    async fn count_assets(
        &mut self,
        listing_identity_id: i64,
        filter: &AssetFilter,
    ) -> Result<i64> {
        Ok(self
            .state()?
            .assets
            .values()
            .filter(|a| a.listing_identity_id == listing_identity_id && filter.matches(a))
            .count() as i64)
    }

    async fn list_assets_by_batch(&mut self, batch_id: i64) -> Result<Vec<MediaAsset>> {
        let state = self.state()?;
        let matching = state
            .assets
            .values()
            .filter(|a| a.batch_id == Some(batch_id))
            .collect();
        Ok(LedgerState::sorted(matching))
    }

    async fn bulk_update_asset_status(
        &mut self,
        listing_identity_id: i64,
        from: MediaAssetStatus,
        to: MediaAssetStatus,
    ) -> Result<u64> {
        let mut changed = 0;
        for asset in self.state()?.assets.values_mut() {
            if asset.listing_identity_id == listing_identity_id && asset.status == from {
                asset.status = to;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn delete_asset(
        &mut self,
        listing_identity_id: i64,
        asset_type: MediaAssetType,
        sequence: i32,
    ) -> Result<bool> {
        let state = self.state()?;
        Ok(match state.find_asset(listing_identity_id, asset_type, sequence) {
            Some(id) => state.assets.remove(&id).is_some(),
            None => false,
        })
    }
}

#[async_trait]
impl JobStore for MemorySession {
    async fn register_processing_job(&mut self, job: &MediaProcessingJob) -> Result<i64> {
        let state = self.state()?;
        let id = LedgerState::next_id(&mut state.next_job_id);
        let mut stored = job.clone();
        stored.id = id;
        state.jobs.insert(id, stored);
        Ok(id)
    }

    async fn get_processing_job_by_id(&mut self, job_id: i64) -> Result<Option<MediaProcessingJob>> {
        Ok(self.state()?.jobs.get(&job_id).cloned())
    }

    async fn update_processing_job(&mut self, job: &MediaProcessingJob) -> Result<()> {
        match self.state()?.jobs.get_mut(&job.id) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => bail!("Processing job {} does not exist", job.id),
        }
    }

    async fn get_latest_finalization_job(
        &mut self,
        listing_identity_id: i64,
    ) -> Result<Option<MediaProcessingJob>> {
        Ok(self
            .state()?
            .jobs
            .values()
            .filter(|j| {
                j.listing_identity_id == listing_identity_id
                    && j.provider == MediaProcessingProvider::StepFunctionsFinalization
            })
            .max_by_key(|j| (j.created_at, j.id))
            .cloned())
    }

    async fn list_stuck_jobs(
        &mut self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<MediaProcessingJob>> {
        let mut stuck: Vec<MediaProcessingJob> = self
            .state()?
            .jobs
            .values()
            .filter(|j| {
                j.status == MediaProcessingJobStatus::Running
                    && j.completed_at.is_none()
                    && j.started_at.map_or(false, |s| s < cutoff)
            })
            .cloned()
            .collect();
        stuck.sort_by_key(|j| (j.started_at, j.id));
        stuck.truncate(limit.max(0) as usize);
        Ok(stuck)
    }

    async fn delete_old_jobs(&mut self, cutoff: DateTime<Utc>, limit: i64) -> Result<u64> {
        let state = self.state()?;
        let doomed: Vec<i64> = state
            .jobs
            .values()
            .filter(|j| j.status.is_terminal() && j.completed_at.unwrap_or(j.created_at) < cutoff)
            .map(|j| j.id)
            .take(limit.max(0) as usize)
            .collect();
        for id in &doomed {
            state.jobs.remove(id);
        }
        Ok(doomed.len() as u64)
    }
}

#[async_trait]
impl BatchStore for MemorySession {
    async fn create_batch(&mut self, batch: &MediaBatch) -> Result<i64> {
        let state = self.state()?;
        let id = LedgerState::next_id(&mut state.next_batch_id);
        let mut stored = batch.clone();
        stored.id = id;
        state.batches.insert(id, stored);
        Ok(id)
    }

    async fn get_batch(
        &mut self,
        listing_identity_id: i64,
        batch_id: i64,
    ) -> Result<Option<MediaBatch>> {
        Ok(self
            .state()?
            .batches
            .get(&batch_id)
            .filter(|b| b.listing_identity_id == listing_identity_id && !b.is_deleted())
            .cloned())
    }

    async fn update_batch_status(&mut self, batch: &MediaBatch) -> Result<()> {
        if let Some(existing) = self.state()?.batches.get_mut(&batch.id) {
            existing.status = batch.status;
            existing.status_metadata = batch.status_metadata.clone();
        }
        Ok(())
    }

    async fn has_open_batch(&mut self, listing_identity_id: i64) -> Result<bool> {
        Ok(self.state()?.batches.values().any(|b| {
            b.listing_identity_id == listing_identity_id
                && !b.is_deleted()
                && BatchStatus::OPEN.contains(&b.status)
        }))
    }

    async fn soft_delete_batch(
        &mut self,
        listing_identity_id: i64,
        batch_id: i64,
        deleted_at: DateTime<Utc>,
    ) -> Result<bool> {
        match self.state()?.batches.get_mut(&batch_id) {
            Some(b) if b.listing_identity_id == listing_identity_id && !b.is_deleted() => {
                b.deleted_at = Some(deleted_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ListingStore for MemorySession {
    async fn get_active_listing(
        &mut self,
        listing_identity_id: i64,
    ) -> Result<Option<ListingSnapshot>> {
        Ok(self.state()?.listings.get(&listing_identity_id).cloned())
    }

    async fn update_listing_status(
        &mut self,
        listing_identity_id: i64,
        status: &ListingStatus,
    ) -> Result<()> {
        match self.state()?.listings.get_mut(&listing_identity_id) {
            Some(listing) => {
                listing.status = status.clone();
                Ok(())
            }
            None => bail!("Listing {} has no active version", listing_identity_id),
        }
    }
}
