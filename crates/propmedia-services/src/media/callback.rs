//! Application of workflow callbacks to the job ledger.

use propmedia_core::models::{
    metadata_keys, BatchStatus, BatchStatusMetadata, MediaAsset, MediaAssetStatus,
    MediaProcessingJob, MediaProcessingJobPayload, MediaProcessingJobStatus,
    MediaProcessingProvider, ProcessingCallback, ProcessingResult, ResultOutcome,
};
use propmedia_core::{AppError, AppResult};
use propmedia_db::TransactionGuard;

use super::types::{AssetResultError, HandleProcessingCallbackInput, HandleProcessingCallbackOutput};
use super::{LedgerResultExt, MediaProcessingService};

const MISSING_PROCESSED_KEY: &str = "MISSING_PROCESSED_KEY";
const PROCESSING_FAILED: &str = "PROCESSING_FAILED";

impl MediaProcessingService {
    /// Applies a callback to its job and the assets it reports on, in one
    /// transaction, then acknowledges the queue message.
    ///
    /// Redelivery is safe: a job already terminal with the same status is left
    /// untouched and reported as a duplicate, as is a late non-terminal
    /// callback. A different terminal status is rejected with `Conflict`.
    #[tracing::instrument(
        skip(self, input),
        fields(job_id = input.callback.job_id, status = %input.callback.status)
    )]
    pub async fn handle_processing_callback(
        &self,
        input: HandleProcessingCallbackInput,
    ) -> AppResult<HandleProcessingCallbackOutput> {
        let HandleProcessingCallbackInput {
            callback,
            receipt_handle,
        } = input;
        if callback.job_id <= 0 {
            return Err(AppError::validation("jobId is required").with_detail("jobId", "required"));
        }

        let mut tx = self.begin().await?;
        let mut job = tx
            .get_processing_job_by_id(callback.job_id)
            .await
            .or_infra("failed to load processing job")?
            .ok_or_else(|| {
                AppError::not_found("processing job not found").with_detail("jobId", callback.job_id)
            })?;

        if callback.listing_identity_id > 0 && callback.listing_identity_id != job.listing_identity_id {
            tracing::warn!(
                job_id = job.id,
                job_listing = job.listing_identity_id,
                callback_listing = callback.listing_identity_id,
                "Callback listing does not match job"
            );
        }

        let status = callback.job_status();
        if job.is_terminal() {
            if status.is_terminal() && job.status != status {
                return Err(AppError::conflict("processing job already finalized")
                    .with_detail("jobId", job.id)
                    .with_detail("status", job.status.as_str())
                    .with_detail("callbackStatus", status.as_str()));
            }
            drop(tx);
            if status.is_terminal() {
                tracing::info!(job_id = job.id, status = %status, "Duplicate callback ignored");
            } else {
                tracing::info!(
                    job_id = job.id,
                    status = %job.status,
                    callback_status = %status,
                    "Stale callback for finalized job ignored"
                );
            }
            self.acknowledge(receipt_handle.as_deref()).await;
            return Ok(HandleProcessingCallbackOutput {
                job_id: job.id,
                listing_identity_id: job.listing_identity_id,
                status: job.status,
                assets_updated: 0,
                asset_errors: Vec::new(),
                duplicate: true,
            });
        }

        let now = self.clock.now();
        apply_job_transition(&mut job, &callback, status, now);
        tx.update_processing_job(&job)
            .await
            .or_infra("failed to update processing job")?;

        if status == MediaProcessingJobStatus::Failed && callback.results.is_empty() {
            let moved = tx
                .bulk_update_asset_status(
                    job.listing_identity_id,
                    MediaAssetStatus::Processing,
                    MediaAssetStatus::Failed,
                )
                .await
                .or_infra("failed to fail processing assets")?;
            tracing::warn!(
                job_id = job.id,
                listing_identity_id = job.listing_identity_id,
                assets = moved,
                "Job failed without results; processing assets marked failed"
            );
        }

        let mut assets_updated = 0;
        let mut asset_errors = Vec::new();
        for result in &callback.results {
            if self
                .apply_result(&mut tx, job.listing_identity_id, result, &mut asset_errors)
                .await?
            {
                assets_updated += 1;
            }
        }

        if status.is_terminal() {
            if let Some(batch_id) = job.batch_id {
                self.settle_batch(&mut tx, &job, batch_id, status, now).await?;
            }
        }

        self.commit(tx, "failed to commit processing callback").await?;
        self.acknowledge(receipt_handle.as_deref()).await;

        tracing::info!(
            job_id = job.id,
            listing_identity_id = job.listing_identity_id,
            status = %status,
            assets_updated,
            asset_errors = asset_errors.len(),
            "Processing callback applied"
        );

        Ok(HandleProcessingCallbackOutput {
            job_id: job.id,
            listing_identity_id: job.listing_identity_id,
            status,
            assets_updated,
            asset_errors,
            duplicate: false,
        })
    }

    /// Applies one result. Returns `false` when the asset could not be
    /// resolved and the result was skipped.
    async fn apply_result(
        &self,
        tx: &mut TransactionGuard,
        listing_identity_id: i64,
        result: &ProcessingResult,
        errors: &mut Vec<AssetResultError>,
    ) -> AppResult<bool> {
        let Some(mut asset) = resolve_asset(tx, listing_identity_id, result).await? else {
            tracing::warn!(
                asset_id = result.asset_id,
                raw_key = %result.raw_key,
                "Callback result does not match any asset; skipped"
            );
            return Ok(false);
        };

        if let Some(error) = apply_outcome(&mut asset, result) {
            errors.push(error);
        }

        tx.upsert_asset(&asset).await.or_infra("failed to update asset")?;
        Ok(true)
    }

    /// Moves the job's batch to its terminal status. Batches already terminal
    /// are left as they are.
    async fn settle_batch(
        &self,
        tx: &mut TransactionGuard,
        job: &MediaProcessingJob,
        batch_id: i64,
        status: MediaProcessingJobStatus,
        now: chrono::DateTime<chrono::Utc>,
    ) -> AppResult<()> {
        let Some(mut batch) = tx
            .get_batch(job.listing_identity_id, batch_id)
            .await
            .or_infra("failed to load batch")?
        else {
            tracing::warn!(job_id = job.id, batch_id, "Batch of job not found");
            return Ok(());
        };
        if batch.status.is_terminal() {
            return Ok(());
        }

        let (target, message) = match status {
            MediaProcessingJobStatus::Succeeded => (BatchStatus::Ready, "processing_completed"),
            _ => (BatchStatus::Failed, "processing_failed"),
        };
        let mut metadata = BatchStatusMetadata::new(message, 0, now).with_detail("jobId", job.id);
        if let Some(error) = job.last_error.as_deref().filter(|e| !e.is_empty()) {
            metadata = metadata.with_reason(error);
        }
        batch.transition(target, metadata)?;
        tx.update_batch_status(&batch)
            .await
            .or_infra("failed to update batch status")?;
        Ok(())
    }

    pub(super) async fn acknowledge(&self, receipt_handle: Option<&str>) {
        let (Some(source), Some(handle)) = (&self.callbacks, receipt_handle) else {
            return;
        };
        if let Err(err) = source.acknowledge(handle).await {
            tracing::error!(receipt_handle = %handle, error = %err, "Failed to acknowledge callback message");
        }
    }
}

/// Callback bookkeeping on the job row. Terminal statuses complete the job;
/// anything else only marks it running.
fn apply_job_transition(
    job: &mut MediaProcessingJob,
    callback: &ProcessingCallback,
    status: MediaProcessingJobStatus,
    now: chrono::DateTime<chrono::Utc>,
) {
    job.set_callback_body(&callback.raw_body);
    job.adopt_external_id(&callback.external_id);
    job.ensure_started_at(callback.started_at.unwrap_or(now));

    if !status.is_terminal() {
        job.status = MediaProcessingJobStatus::Running;
        return;
    }

    job.mark_completed(status, MediaProcessingJobPayload::default(), now);
    let keeps_archive = matches!(
        status,
        MediaProcessingJobStatus::Succeeded | MediaProcessingJobStatus::PartialSuccess
    ) && job.provider == MediaProcessingProvider::StepFunctionsFinalization;
    if keeps_archive {
        if let Some(result) = callback.results.iter().find(|r| r.has_zip_data()) {
            job.apply_finalization_payload(
                result.zip_bundles.clone(),
                result.assets_zipped,
                result.zip_size_bytes,
                result.unzipped_size_bytes,
            );
        }
    }
    job.append_error(&callback.error_fragments().join(" | "));
}

async fn resolve_asset(
    tx: &mut TransactionGuard,
    listing_identity_id: i64,
    result: &ProcessingResult,
) -> AppResult<Option<MediaAsset>> {
    if result.asset_id > 0 {
        let asset = tx
            .get_asset_by_id(result.asset_id)
            .await
            .or_infra("failed to load asset")?;
        if let Some(asset) = asset.filter(|a| a.listing_identity_id == listing_identity_id) {
            return Ok(Some(asset));
        }
    }
    let raw_key = result.raw_key.trim();
    if raw_key.is_empty() {
        return Ok(None);
    }
    tx.get_asset_by_raw_key(listing_identity_id, raw_key)
        .await
        .or_infra("failed to load asset")
}

/// Writes a result onto its asset. Returns the error recorded when the result
/// could not be applied as reported.
fn apply_outcome(asset: &mut MediaAsset, result: &ProcessingResult) -> Option<AssetResultError> {
    let thumbnail = result.thumbnail_key.trim();

    if result.outcome() == ResultOutcome::Processed {
        match asset.mark_processed(&result.processed_key) {
            Ok(()) => {
                asset.merge_metadata(&result.metadata);
                asset.merge_metadata([(metadata_keys::THUMBNAIL_KEY, thumbnail)]);
                asset.metadata.remove(metadata_keys::ERROR);
                asset.metadata.remove(metadata_keys::ERROR_CODE);
                return None;
            }
            Err(err) => {
                let code = if result.processed_key.trim().is_empty() {
                    MISSING_PROCESSED_KEY
                } else {
                    PROCESSING_FAILED
                };
                let message = err.message();
                asset.mark_failed();
                asset.merge_metadata(&result.metadata);
                asset.merge_metadata([
                    (metadata_keys::ERROR_CODE, code),
                    (metadata_keys::ERROR, message.as_str()),
                ]);
                return Some(AssetResultError {
                    asset_id: asset.id,
                    raw_key: asset.raw_key().unwrap_or_default().to_string(),
                    error_code: code.to_string(),
                    message,
                });
            }
        }
    }

    asset.mark_failed();
    asset.merge_metadata(&result.metadata);
    asset.merge_metadata([
        (metadata_keys::ERROR, result.error.trim()),
        (metadata_keys::ERROR_CODE, result.error_code.trim()),
        (metadata_keys::THUMBNAIL_KEY, thumbnail),
    ]);
    None
}
