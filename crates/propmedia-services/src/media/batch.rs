//! Legacy upload batches.
//!
//! A batch groups the assets of one upload round. Its lifecycle is
//! PENDING_UPLOAD → RECEIVED → PROCESSING → READY | FAILED, driven by the
//! client (create, complete, retry) and by processing callbacks.

use std::collections::HashMap;

use propmedia_core::models::{
    metadata_keys, BatchStatus, BatchStatusMetadata, JobAsset, ListingStatus, MediaAsset,
    MediaBatch, MediaProcessingJob, MediaProcessingJobMessage, MediaProcessingProvider,
};
use propmedia_core::{AppError, AppResult};
use propmedia_db::TransactionGuard;
use propmedia_storage::StorageError;

use super::manifest::validate_manifest;
use super::types::{
    BatchAssetStatus, CompleteUploadBatchInput, CompleteUploadBatchOutput, CreateUploadBatchInput,
    CreateUploadBatchOutput, GetBatchStatusOutput, RetryMediaBatchInput, RetryMediaBatchOutput,
};
use super::{
    ensure_batch_id, ensure_listing_id, ensure_requested_by, load_listing, LedgerResultExt,
    MediaProcessingService,
};

const MAX_BATCH_REFERENCE_LEN: usize = 120;
const ESTIMATED_PROCESSING_SECS: u64 = 300;

impl MediaProcessingService {
    /// Validates the manifest, opens a batch and signs one upload per file.
    /// A listing holds at most one open batch.
    #[tracing::instrument(skip(self, input), fields(listing_identity_id = input.listing_identity_id, files = input.files.len()))]
    pub async fn create_upload_batch(
        &self,
        input: CreateUploadBatchInput,
    ) -> AppResult<CreateUploadBatchOutput> {
        ensure_listing_id(input.listing_identity_id)?;
        let reference = input.batch_reference.trim();
        if reference.is_empty() {
            return Err(AppError::validation("batchReference is required")
                .with_detail("batchReference", "required"));
        }
        if reference.chars().count() > MAX_BATCH_REFERENCE_LEN {
            return Err(AppError::validation("batchReference is too long").with_detail(
                "batchReference",
                format!("max {} characters", MAX_BATCH_REFERENCE_LEN),
            ));
        }
        ensure_requested_by(input.requested_by)?;
        let manifest = validate_manifest(&self.config, &input.files, true)?;

        let mut tx = self.begin().await?;
        ensure_listing_awaits_photos(&mut tx, input.listing_identity_id, "listing is not awaiting media uploads")
            .await?;
        if tx
            .has_open_batch(input.listing_identity_id)
            .await
            .or_infra("failed to check open batches")?
        {
            return Err(AppError::conflict("listing already has an active media batch"));
        }

        let now = self.clock.now();
        let metadata = BatchStatusMetadata::new("batch_created", input.requested_by, now)
            .with_detail("files", manifest.files.len())
            .with_detail("bytes", manifest.total_bytes);
        let mut batch = MediaBatch::new(input.listing_identity_id, reference, metadata, now);
        batch.id = tx.create_batch(&batch).await.or_infra("failed to persist batch")?;

        let (files, ttl) = self
            .issue_upload_urls(
                &mut tx,
                input.listing_identity_id,
                input.requested_by,
                &manifest.files,
                true,
                Some(&batch),
            )
            .await?;

        self.commit(tx, "failed to commit batch creation").await?;

        tracing::info!(
            listing_identity_id = input.listing_identity_id,
            batch_id = batch.id,
            files = files.len(),
            bytes = manifest.total_bytes,
            "Upload batch created"
        );

        Ok(CreateUploadBatchOutput {
            listing_identity_id: input.listing_identity_id,
            batch_id: batch.id,
            upload_url_ttl_seconds: ttl,
            files,
        })
    }

    /// Confirms the uploads of a batch, verifies every object against its
    /// declared checksum and hands the batch to the pipeline.
    ///
    /// The job message is published after the commit.
    #[tracing::instrument(skip(self, input), fields(listing_identity_id = input.listing_identity_id, batch_id = input.batch_id))]
    pub async fn complete_upload_batch(
        &self,
        input: CompleteUploadBatchInput,
    ) -> AppResult<CompleteUploadBatchOutput> {
        ensure_listing_id(input.listing_identity_id)?;
        ensure_batch_id(input.batch_id)?;
        ensure_requested_by(input.requested_by)?;
        if input.files.is_empty() {
            return Err(AppError::validation("files are required").with_detail("files", "min=1"));
        }

        let mut tx = self.begin().await?;
        let mut batch = load_batch(&mut tx, input.listing_identity_id, input.batch_id).await?;
        if batch.status != BatchStatus::PendingUpload {
            return Err(AppError::conflict("batch is not pending upload")
                .with_detail("status", batch.status.as_str()));
        }
        ensure_listing_awaits_photos(&mut tx, input.listing_identity_id, "listing is not awaiting media uploads")
            .await?;

        let assets = tx
            .list_assets_by_batch(batch.id)
            .await
            .or_infra("failed to list assets")?;
        if assets.len() != input.files.len() {
            return Err(AppError::validation("file count mismatch")
                .with_detail("expected", assets.len())
                .with_detail("provided", input.files.len()));
        }

        let mut by_client: HashMap<String, MediaAsset> = assets
            .into_iter()
            .filter_map(|asset| {
                asset
                    .metadata_value(metadata_keys::CLIENT_ID)
                    .map(str::to_string)
                    .map(|client_id| (client_id, asset))
            })
            .collect();

        let mut job_assets = Vec::with_capacity(input.files.len());
        for (idx, file) in input.files.iter().enumerate() {
            let client_id = file.client_id.trim();
            if client_id.is_empty() {
                return Err(AppError::validation("clientId is required")
                    .with_detail(format!("files[{}].clientId", idx), "required"));
            }
            let Some(mut asset) = by_client.remove(client_id) else {
                return Err(AppError::validation("unknown clientId").with_detail("clientId", client_id));
            };

            let object_key = file.object_key.trim();
            if object_key.is_empty() {
                return Err(AppError::validation("objectKey is required").with_detail("clientId", client_id));
            }
            let expected = asset.raw_key().unwrap_or_default().to_string();
            if expected != object_key {
                return Err(AppError::validation("objectKey mismatch")
                    .with_detail("clientId", client_id)
                    .with_detail("expected", expected)
                    .with_detail("provided", object_key));
            }

            let info = match self
                .storage
                .validate_object_checksum(object_key, asset.checksum())
                .await
            {
                Ok(info) => info,
                Err(err @ (StorageError::ChecksumMismatch { .. } | StorageError::NotFound(_))) => {
                    tracing::warn!(client_id, object_key, error = %err, "Uploaded object rejected");
                    return Err(AppError::validation("checksum validation failed")
                        .with_detail("clientId", client_id)
                        .with_detail("error", err.to_string()));
                }
                Err(err) => return Err(err.into()),
            };

            let etag = file
                .etag
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .or(info.etag.as_deref())
                .unwrap_or_default()
                .to_string();
            let size = info.size_bytes.to_string();
            asset.merge_metadata([
                (metadata_keys::ETAG, etag.as_str()),
                (metadata_keys::SIZE_BYTES, size.as_str()),
            ]);
            asset.start_processing()?;
            tx.upsert_asset(&asset).await.or_infra("failed to update assets")?;

            let mut job_asset = JobAsset::new(object_key, asset.asset_type.as_str());
            job_asset.size = info.size_bytes;
            job_asset.etag = etag;
            job_assets.push(job_asset);
        }

        let now = self.clock.now();
        batch.transition(
            BatchStatus::Received,
            BatchStatusMetadata::new("uploads_confirmed", input.requested_by, now)
                .with_detail("files", job_assets.len()),
        )?;
        tx.update_batch_status(&batch)
            .await
            .or_infra("failed to update batch status")?;

        let job_id = register_batch_job(&mut tx, &batch, 0, now).await?;
        self.commit(tx, "failed to commit batch completion").await?;

        let message = MediaProcessingJobMessage {
            job_id,
            listing_identity_id: input.listing_identity_id,
            batch_id: Some(batch.id),
            assets: job_assets,
            retry: 0,
        };
        if let Err(err) = self.queue.enqueue_job(&message).await {
            tracing::error!(job_id, batch_id = batch.id, error = %err, "Failed to enqueue batch job");
            return Err(err.into());
        }

        tracing::info!(
            listing_identity_id = input.listing_identity_id,
            batch_id = batch.id,
            job_id,
            "Upload batch confirmed"
        );

        Ok(CompleteUploadBatchOutput {
            listing_identity_id: input.listing_identity_id,
            batch_id: batch.id,
            job_id,
            status: batch.status,
            estimated_duration_secs: ESTIMATED_PROCESSING_SECS,
        })
    }

    /// Re-runs a settled batch from its raw objects.
    #[tracing::instrument(skip(self, input), fields(listing_identity_id = input.listing_identity_id, batch_id = input.batch_id))]
    pub async fn retry_media_batch(
        &self,
        input: RetryMediaBatchInput,
    ) -> AppResult<RetryMediaBatchOutput> {
        ensure_listing_id(input.listing_identity_id)?;
        ensure_batch_id(input.batch_id)?;
        ensure_requested_by(input.requested_by)?;

        let mut tx = self.begin().await?;
        let mut batch = load_batch(&mut tx, input.listing_identity_id, input.batch_id).await?;
        if !batch.status.is_terminal() {
            return Err(AppError::conflict("batch is not in a terminal state")
                .with_detail("status", batch.status.as_str()));
        }

        let assets = tx
            .list_assets_by_batch(batch.id)
            .await
            .or_infra("failed to list assets")?;
        if assets.is_empty() {
            return Err(AppError::conflict("no assets found to retry"));
        }
        if assets.iter().any(|a| a.raw_key().is_none()) {
            return Err(AppError::conflict("raw objects missing for retry"));
        }

        let now = self.clock.now();
        let mut metadata = BatchStatusMetadata::new("retry_requested", input.requested_by, now)
            .with_detail("files", assets.len());
        if !input.reason.trim().is_empty() {
            metadata = metadata.with_reason(input.reason.trim());
        }
        batch.reopen_for_retry(metadata)?;
        tx.update_batch_status(&batch)
            .await
            .or_infra("failed to update batch status")?;

        let mut job_assets = Vec::with_capacity(assets.len());
        for mut asset in assets {
            asset.start_processing()?;
            tx.upsert_asset(&asset).await.or_infra("failed to update assets")?;
            let raw_key = asset.raw_key().unwrap_or_default();
            job_assets.push(JobAsset::new(raw_key, asset.asset_type.as_str()));
        }

        let job_id = register_batch_job(&mut tx, &batch, 1, now).await?;
        self.commit(tx, "failed to commit retry").await?;

        let message = MediaProcessingJobMessage {
            job_id,
            listing_identity_id: input.listing_identity_id,
            batch_id: Some(batch.id),
            assets: job_assets,
            retry: 1,
        };
        if let Err(err) = self.queue.enqueue_retry(&message).await {
            tracing::error!(job_id, batch_id = batch.id, error = %err, "Failed to enqueue retry job");
            return Err(err.into());
        }

        tracing::info!(
            listing_identity_id = input.listing_identity_id,
            batch_id = batch.id,
            job_id,
            reason = %input.reason,
            "Batch retry requested"
        );

        Ok(RetryMediaBatchOutput {
            listing_identity_id: input.listing_identity_id,
            batch_id: batch.id,
            job_id,
            status: batch.status,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_batch_status(
        &self,
        listing_identity_id: i64,
        batch_id: i64,
    ) -> AppResult<GetBatchStatusOutput> {
        ensure_listing_id(listing_identity_id)?;
        ensure_batch_id(batch_id)?;

        let mut tx = self.begin_read_only().await?;
        let batch = load_batch(&mut tx, listing_identity_id, batch_id).await?;
        let assets = tx
            .list_assets_by_batch(batch.id)
            .await
            .or_infra("failed to list assets")?;
        self.commit(tx, "failed to close read transaction").await?;

        Ok(GetBatchStatusOutput {
            listing_identity_id,
            batch_id: batch.id,
            status: batch.status,
            status_message: batch.status_metadata.display_message().to_string(),
            assets: assets.iter().map(batch_asset_status).collect(),
        })
    }

    /// Hides a batch from every query. Its assets are kept.
    #[tracing::instrument(skip(self))]
    pub async fn delete_upload_batch(&self, listing_identity_id: i64, batch_id: i64) -> AppResult<()> {
        ensure_listing_id(listing_identity_id)?;
        ensure_batch_id(batch_id)?;

        let mut tx = self.begin().await?;
        let deleted = tx
            .soft_delete_batch(listing_identity_id, batch_id, self.clock.now())
            .await
            .or_infra("failed to delete batch")?;
        if !deleted {
            return Err(AppError::not_found("batch not found"));
        }
        self.commit(tx, "failed to commit batch deletion").await?;
        Ok(())
    }
}

async fn load_batch(
    tx: &mut TransactionGuard,
    listing_identity_id: i64,
    batch_id: i64,
) -> AppResult<MediaBatch> {
    tx.get_batch(listing_identity_id, batch_id)
        .await
        .or_infra("failed to load batch")?
        .ok_or_else(|| AppError::not_found("batch not found"))
}

async fn ensure_listing_awaits_photos(
    tx: &mut TransactionGuard,
    listing_identity_id: i64,
    message: &'static str,
) -> AppResult<()> {
    let listing = load_listing(tx, listing_identity_id).await?;
    if listing.status != ListingStatus::PendingPhotoProcessing {
        return Err(AppError::conflict(message).with_detail("status", listing.status.as_str()));
    }
    Ok(())
}

async fn register_batch_job(
    tx: &mut TransactionGuard,
    batch: &MediaBatch,
    retry_count: i32,
    now: chrono::DateTime<chrono::Utc>,
) -> AppResult<i64> {
    let mut job = MediaProcessingJob::new(
        batch.listing_identity_id,
        MediaProcessingProvider::StepFunctions,
        now,
    );
    job.batch_id = Some(batch.id);
    job.retry_count = retry_count;
    tx.register_processing_job(&job)
        .await
        .or_infra("failed to register processing job")
}

fn batch_asset_status(asset: &MediaAsset) -> BatchAssetStatus {
    BatchAssetStatus {
        client_id: asset.metadata_value(metadata_keys::CLIENT_ID).map(str::to_string),
        title: asset.title.clone(),
        asset_type: asset.asset_type,
        sequence: asset.sequence,
        status: asset.status,
        raw_object_key: asset.raw_key.clone(),
        processed_key: asset.processed_key.clone(),
        thumbnail_key: asset.thumbnail_key().map(str::to_string),
        metadata: asset.metadata.clone(),
    }
}
