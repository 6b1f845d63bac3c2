//! Dispatch of processing jobs and finalization workflows.

use std::collections::BTreeSet;

use propmedia_core::models::{
    metadata_keys, JobAsset, ListingStatus, MediaAsset, MediaAssetStatus, MediaProcessingJob,
    MediaAssetType, MediaProcessingJobMessage, MediaProcessingProvider,
};
use propmedia_core::{AppError, AppResult};
use propmedia_db::{AssetFilter, TransactionGuard};
use propmedia_storage::keys::processed_original_key;

use super::intake::ensure_project_flow_allowed;
use super::types::{CompleteMediaOutput, ProcessMediaOutput};
use super::{build_finalization_input, ensure_listing_id, load_listing, LedgerResultExt, MediaProcessingService};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

impl MediaProcessingService {
    /// Registers a processing job for every uploaded asset that is pending or
    /// failed, moves them to PROCESSING and publishes the job message.
    ///
    /// The message is published before the commit: if publishing fails the
    /// transaction is rolled back and no job row survives.
    #[tracing::instrument(skip(self))]
    pub async fn process_media(&self, listing_identity_id: i64) -> AppResult<ProcessMediaOutput> {
        ensure_listing_id(listing_identity_id)?;

        let mut tx = self.begin().await?;
        let listing = load_listing(&mut tx, listing_identity_id).await?;
        if !listing.status.accepts_media_uploads() {
            return Err(AppError::conflict("listing is not awaiting media processing")
                .with_detail("status", listing.status.as_str()));
        }

        let filter = AssetFilter::default()
            .with_statuses([MediaAssetStatus::PendingUpload, MediaAssetStatus::Failed]);
        let assets = tx
            .list_assets(listing_identity_id, &filter, None)
            .await
            .or_infra("failed to list assets")?;
        if assets.is_empty() {
            return Err(AppError::validation("no assets available for processing"));
        }

        let mut checked = BTreeSet::new();
        for raw_key in assets.iter().filter_map(MediaAsset::raw_key) {
            if !checked.insert(raw_key) {
                continue;
            }
            if let Err(err) = self.storage.head_object(raw_key).await {
                tracing::warn!(raw_key = %raw_key, error = %err, "Raw object is not readable");
                return Err(AppError::validation("raw media file not found or inaccessible")
                    .with_detail("rawKey", raw_key));
            }
        }

        let now = self.clock.now();
        let mut job = MediaProcessingJob::new(
            listing_identity_id,
            MediaProcessingProvider::StepFunctions,
            now,
        );
        job.id = tx
            .register_processing_job(&job)
            .await
            .or_infra("failed to register processing job")?;

        let mut job_assets = Vec::with_capacity(assets.len());
        for mut asset in assets {
            let Some(raw_key) = asset.raw_key().map(str::to_string) else {
                continue;
            };
            asset.start_processing()?;
            tx.upsert_asset(&asset).await.or_infra("failed to update asset")?;
            job_assets.push(job_asset(&asset, raw_key));
        }
        if job_assets.is_empty() {
            return Err(AppError::validation("no assets available for processing"));
        }

        let message = MediaProcessingJobMessage {
            job_id: job.id,
            listing_identity_id,
            batch_id: None,
            assets: job_assets,
            retry: 0,
        };
        self.queue.enqueue_job(&message).await?;

        self.commit(tx, "failed to commit media processing").await?;

        tracing::info!(
            listing_identity_id,
            job_id = job.id,
            assets = message.assets.len(),
            "Media processing job published"
        );

        Ok(ProcessMediaOutput {
            listing_identity_id,
            job_id: job.id,
            assets_count: message.assets.len(),
        })
    }

    /// Starts the finalization workflow once every photo/video asset has been
    /// processed, and hands the listing over to the owner for approval.
    #[tracing::instrument(skip(self))]
    pub async fn complete_media(&self, listing_identity_id: i64) -> AppResult<CompleteMediaOutput> {
        ensure_listing_id(listing_identity_id)?;

        let mut tx = self.begin().await?;
        let listing = load_listing(&mut tx, listing_identity_id).await?;
        if listing.status != ListingStatus::PendingPhotoProcessing {
            return Err(AppError::conflict("listing is not awaiting media processing")
                .with_detail("status", listing.status.as_str()));
        }

        let assets = tx
            .list_assets(listing_identity_id, &AssetFilter::default(), None)
            .await
            .or_infra("failed to list assets")?;
        ensure_all_processed(&assets)?;

        let next_status = ListingStatus::PendingOwnerApproval;
        let (job_id, execution_arn) = self
            .start_finalization(&mut tx, listing_identity_id, &assets)
            .await?;

        tx.update_listing_status(listing_identity_id, &next_status)
            .await
            .or_infra("failed to update listing status")?;

        self.commit(tx, "failed to commit media completion").await?;

        tracing::info!(
            listing_identity_id,
            job_id,
            execution_arn = %execution_arn,
            "Media finalization started"
        );

        Ok(CompleteMediaOutput {
            listing_identity_id,
            job_id,
            execution_arn,
            assets_count: assets.len(),
            listing_status: next_status,
        })
    }

    /// Promotes uploaded project documents and renders into the processed tree
    /// and starts finalization. Project media skips the processing pipeline.
    #[tracing::instrument(skip(self))]
    pub async fn complete_project_media(
        &self,
        listing_identity_id: i64,
    ) -> AppResult<CompleteMediaOutput> {
        if !self.config.allow_owner_project_upload {
            return Err(AppError::forbidden("project uploads are disabled"));
        }
        ensure_listing_id(listing_identity_id)?;

        let mut tx = self.begin().await?;
        let listing = load_listing(&mut tx, listing_identity_id).await?;
        ensure_project_flow_allowed(&listing.property_type, &listing.status)?;

        let filter = AssetFilter::default().with_types(
            MediaAssetType::ALL
                .into_iter()
                .filter(|t| t.is_project()),
        );
        let mut assets = tx
            .list_assets(listing_identity_id, &filter, None)
            .await
            .or_infra("failed to list project assets")?;
        if assets.is_empty() {
            return Err(AppError::conflict("no project assets found for this listing"));
        }

        for asset in assets.iter_mut() {
            if self.promote_project_asset(listing_identity_id, asset).await? {
                let stored = tx
                    .upsert_asset(asset)
                    .await
                    .or_infra("failed to update project asset")?;
                *asset = stored;
            }
        }

        let next_status = if self.config.require_admin_review {
            ListingStatus::PendingAdminReview
        } else {
            ListingStatus::Ready
        };
        let (job_id, execution_arn) = self
            .start_finalization(&mut tx, listing_identity_id, &assets)
            .await?;

        tx.update_listing_status(listing_identity_id, &next_status)
            .await
            .or_infra("failed to update listing status")?;

        self.commit(tx, "failed to commit project media completion").await?;

        tracing::info!(
            listing_identity_id,
            job_id,
            next_status = %next_status,
            "Project media finalization started"
        );

        Ok(CompleteMediaOutput {
            listing_identity_id,
            job_id,
            execution_arn,
            assets_count: assets.len(),
            listing_status: next_status,
        })
    }

    /// Copies an uploaded project asset's raw object into the processed tree
    /// and marks it PROCESSED. Returns `false` when it was already promoted.
    ///
    /// Project media never passes through the pipeline, so a PENDING_UPLOAD
    /// asset counts as uploaded once its raw object is readable.
    async fn promote_project_asset(
        &self,
        listing_identity_id: i64,
        asset: &mut MediaAsset,
    ) -> AppResult<bool> {
        let Some(raw_key) = asset.raw_key().map(str::to_string) else {
            return Err(project_conflict("project asset is missing raw key", asset));
        };

        match asset.status {
            MediaAssetStatus::Failed => {
                return Err(project_conflict(
                    "project asset processing failed; re-upload required",
                    asset,
                ))
            }
            MediaAssetStatus::Processing => {
                return Err(project_conflict("project asset is processing; please wait", asset))
            }
            MediaAssetStatus::Processed => {
                if asset.processed_key().is_none() {
                    return Err(project_conflict(
                        "processed project asset missing processed key",
                        asset,
                    ));
                }
                return Ok(false);
            }
            MediaAssetStatus::PendingUpload => {}
        }

        let head = match self.storage.head_object(&raw_key).await {
            Ok(head) => head,
            Err(err) => {
                tracing::debug!(raw_key = %raw_key, error = %err, "Project object not uploaded yet");
                return Err(project_conflict("project asset is still pending upload", asset));
            }
        };

        let content_type = head
            .content_type
            .as_deref()
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
            .or_else(|| asset.metadata_value(metadata_keys::CONTENT_TYPE))
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let processed_key = processed_original_key(listing_identity_id, asset);
        self.storage
            .copy_object(&raw_key, &processed_key, &content_type)
            .await?;

        asset.mark_processed(&processed_key)?;
        tracing::debug!(
            raw_key = %raw_key,
            processed_key = %processed_key,
            "Project asset promoted"
        );
        Ok(true)
    }

    async fn start_finalization(
        &self,
        tx: &mut TransactionGuard,
        listing_identity_id: i64,
        assets: &[MediaAsset],
    ) -> AppResult<(i64, String)> {
        let now = self.clock.now();
        let mut job = MediaProcessingJob::new(
            listing_identity_id,
            MediaProcessingProvider::StepFunctionsFinalization,
            now,
        );
        job.id = tx
            .register_processing_job(&job)
            .await
            .or_infra("failed to register finalization job")?;

        let input = build_finalization_input(job.id, listing_identity_id, assets);
        let execution_arn = self.workflow.start_media_finalization(&input).await?;

        job.mark_running(Some(&execution_arn), now);
        tx.update_processing_job(&job)
            .await
            .or_infra("failed to update finalization job")?;

        Ok((job.id, execution_arn))
    }
}

fn job_asset(asset: &MediaAsset, raw_key: String) -> JobAsset {
    let mut job_asset = JobAsset::new(raw_key, asset.asset_type.as_str());
    if let Some(size) = asset
        .metadata_value(metadata_keys::SIZE_BYTES)
        .and_then(|v| v.parse::<i64>().ok())
    {
        job_asset.size = size;
    }
    if let Some(etag) = asset.metadata_value(metadata_keys::ETAG) {
        job_asset.etag = etag.to_string();
    }
    job_asset
}

fn project_conflict(message: &str, asset: &MediaAsset) -> AppError {
    AppError::conflict(message.to_string())
        .with_detail("assetType", asset.asset_type.as_str())
        .with_detail("sequence", asset.sequence)
}

fn ensure_all_processed(assets: &[MediaAsset]) -> AppResult<()> {
    if assets.is_empty() {
        return Err(AppError::validation("no assets uploaded for listing"));
    }
    let pending: Vec<String> = assets
        .iter()
        .filter(|a| {
            matches!(
                a.status,
                MediaAssetStatus::PendingUpload | MediaAssetStatus::Processing
            )
        })
        .map(|a| format!("{}-{}", a.asset_type, a.sequence))
        .collect();
    if !pending.is_empty() {
        return Err(AppError::conflict("assets still processing").with_detail("assets", pending));
    }
    let failed: Vec<String> = assets
        .iter()
        .filter(|a| a.status == MediaAssetStatus::Failed)
        .map(|a| format!("{}-{}", a.asset_type, a.sequence))
        .collect();
    if !failed.is_empty() {
        return Err(AppError::conflict("assets failed processing").with_detail("assets", failed));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(status: MediaAssetStatus) -> MediaAsset {
        let mut asset = MediaAsset::new(1, MediaAssetType::PhotoVertical, 1);
        asset.status = status;
        asset
    }

    #[test]
    fn test_all_processed_gate() {
        assert_eq!(
            ensure_all_processed(&[]).unwrap_err().message(),
            "no assets uploaded for listing"
        );
        assert_eq!(
            ensure_all_processed(&[
                asset(MediaAssetStatus::Processed),
                asset(MediaAssetStatus::Processing)
            ])
            .unwrap_err()
            .message(),
            "assets still processing"
        );
        assert_eq!(
            ensure_all_processed(&[asset(MediaAssetStatus::Failed)])
                .unwrap_err()
                .message(),
            "assets failed processing"
        );
        assert!(ensure_all_processed(&[asset(MediaAssetStatus::Processed)]).is_ok());
    }

    #[test]
    fn test_job_asset_carries_size_and_etag() {
        let mut a = asset(MediaAssetStatus::PendingUpload);
        a.merge_metadata([(metadata_keys::SIZE_BYTES, "2048"), (metadata_keys::ETAG, "\"e1\"")]);
        let job_asset = job_asset(&a, "1/raw/photo/vertical/a.jpg".into());
        assert_eq!(job_asset.asset_type, "PHOTO_VERTICAL");
        assert_eq!(job_asset.size, 2048);
        assert_eq!(job_asset.etag, "\"e1\"");
    }
}
