//! Download URLs, media listing and deletion.

use propmedia_core::models::{MediaAsset, MediaAssetStatus, MediaProcessingJob};
use propmedia_core::{AppError, AppResult};
use propmedia_db::{AssetFilter, Pagination};
use propmedia_storage::{Resolution, SignedUrl};

use super::types::{
    DeleteMediaInput, DownloadEntry, DownloadUrl, GenerateDownloadUrlsInput,
    GenerateDownloadUrlsOutput, ListDownloadUrlsInput, ListDownloadUrlsOutput, ListMediaInput,
    ListMediaOutput, ZipBundleInfo,
};
use super::{ensure_listing_id, load_listing, LedgerResultExt, MediaProcessingService};

impl MediaProcessingService {
    /// Signs GET URLs for the requested `(assetType, sequence, resolution)`
    /// triples. Requests that cannot be served are skipped, never failed.
    #[tracing::instrument(skip(self, input), fields(listing_identity_id = input.listing_identity_id, requests = input.requests.len()))]
    pub async fn generate_download_urls(
        &self,
        input: GenerateDownloadUrlsInput,
    ) -> AppResult<GenerateDownloadUrlsOutput> {
        ensure_listing_id(input.listing_identity_id)?;
        if input.requests.is_empty() {
            return Err(AppError::validation("requests are required").with_detail("requests", "min=1"));
        }

        let mut tx = self.begin_read_only().await?;
        let mut found = Vec::with_capacity(input.requests.len());
        for request in &input.requests {
            let asset = tx
                .get_asset(input.listing_identity_id, request.asset_type, request.sequence)
                .await
                .or_infra("failed to load asset")?;
            found.push(asset);
        }
        self.commit(tx, "failed to close read transaction").await?;

        let mut urls = Vec::with_capacity(found.len());
        for (request, asset) in input.requests.iter().zip(found) {
            let Some(asset) = asset else {
                tracing::debug!(
                    asset_type = %request.asset_type,
                    sequence = request.sequence,
                    "Requested asset not found; skipped"
                );
                continue;
            };
            let Some(resolution) = Resolution::parse(&request.resolution) else {
                tracing::warn!(resolution = %request.resolution, "Unknown resolution; skipped");
                continue;
            };

            let signed = if resolution == Resolution::Original
                && asset.status != MediaAssetStatus::Processed
            {
                let Some(raw_key) = asset.raw_key() else {
                    continue;
                };
                self.storage.generate_download_url(raw_key).await
            } else if asset.status == MediaAssetStatus::Processed {
                self.storage
                    .generate_processed_download_url(input.listing_identity_id, &asset, resolution)
                    .await
            } else {
                continue;
            };

            match signed {
                Ok(signed) => urls.push(DownloadUrl {
                    asset_type: asset.asset_type,
                    sequence: asset.sequence,
                    resolution: resolution.as_str().to_string(),
                    url: signed.url,
                    object_key: signed.object_key,
                    expires_in: signed.expires_in,
                }),
                Err(err) => tracing::error!(
                    asset_type = %asset.asset_type,
                    sequence = asset.sequence,
                    error = %err,
                    "Failed to sign download URL"
                ),
            }
        }

        Ok(GenerateDownloadUrlsOutput {
            listing_identity_id: input.listing_identity_id,
            urls,
        })
    }

    /// Every asset of the listing (optionally restricted to some types) with a
    /// download URL for the processed ones.
    #[tracing::instrument(skip(self, input), fields(listing_identity_id = input.listing_identity_id))]
    pub async fn list_download_urls(
        &self,
        input: ListDownloadUrlsInput,
    ) -> AppResult<ListDownloadUrlsOutput> {
        ensure_listing_id(input.listing_identity_id)?;
        let resolution = match input.resolution.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            None => Resolution::Large,
            Some(raw) => Resolution::parse(raw).ok_or_else(|| {
                AppError::validation("invalid resolution").with_detail("resolution", raw)
            })?,
        };

        let mut tx = self.begin_read_only().await?;
        load_listing(&mut tx, input.listing_identity_id).await?;
        let filter = AssetFilter::default().with_types(input.asset_types.iter().copied());
        let assets = tx
            .list_assets(input.listing_identity_id, &filter, None)
            .await
            .or_infra("failed to list assets")?;
        self.commit(tx, "failed to close read transaction").await?;

        let generated_at = self.clock.now();
        let ttl = self.storage.download_ttl();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .map(|delta| generated_at + delta);

        let mut downloads = Vec::with_capacity(assets.len());
        for asset in assets {
            let mut entry = DownloadEntry {
                asset_type: asset.asset_type,
                sequence: asset.sequence,
                status: asset.status,
                title: asset.title.clone(),
                url: None,
                preview_url: None,
                expires_at: None,
                metadata: asset.metadata.clone(),
            };

            if asset.status == MediaAssetStatus::Processed {
                entry.url = self
                    .sign_or_log(input.listing_identity_id, &asset, resolution)
                    .await
                    .map(|s| s.url);
                if asset.thumbnail_key().is_some() {
                    entry.preview_url = self
                        .sign_or_log(input.listing_identity_id, &asset, Resolution::Thumbnail)
                        .await
                        .map(|s| s.url);
                }
                if entry.url.is_some() {
                    entry.expires_at = expires_at;
                }
            }
            downloads.push(entry);
        }

        Ok(ListDownloadUrlsOutput {
            listing_identity_id: input.listing_identity_id,
            generated_at,
            ttl_seconds: ttl.as_secs(),
            downloads,
        })
    }

    async fn sign_or_log(
        &self,
        listing_identity_id: i64,
        asset: &MediaAsset,
        resolution: Resolution,
    ) -> Option<SignedUrl> {
        match self
            .storage
            .generate_processed_download_url(listing_identity_id, asset, resolution)
            .await
        {
            Ok(signed) => Some(signed),
            Err(err) => {
                tracing::error!(
                    asset_type = %asset.asset_type,
                    sequence = asset.sequence,
                    resolution = resolution.as_str(),
                    error = %err,
                    "Failed to sign download URL"
                );
                None
            }
        }
    }

    /// One page of the listing's assets plus the archive of the latest
    /// finalization, when one was produced.
    #[tracing::instrument(skip(self, input), fields(listing_identity_id = input.listing_identity_id))]
    pub async fn list_media(&self, input: ListMediaInput) -> AppResult<ListMediaOutput> {
        ensure_listing_id(input.listing_identity_id)?;
        let page = input.page.max(1);
        let page_size = if input.page_size <= 0 { 20 } else { input.page_size.min(100) };

        let filter = AssetFilter::default()
            .with_types(input.asset_type)
            .with_sequence(input.sequence);

        let mut tx = self.begin_read_only().await?;
        let assets = tx
            .list_assets(
                input.listing_identity_id,
                &filter,
                Some(Pagination::page(page, page_size)),
            )
            .await
            .or_infra("failed to list assets")?;
        let total_count = tx
            .count_assets(input.listing_identity_id, &filter)
            .await
            .or_infra("failed to count assets")?;
        let finalization = tx
            .get_latest_finalization_job(input.listing_identity_id)
            .await
            .or_infra("failed to load finalization job")?;
        self.commit(tx, "failed to close read transaction").await?;

        Ok(ListMediaOutput {
            assets,
            total_count,
            page,
            page_size,
            zip_bundle: finalization.as_ref().and_then(zip_bundle_info),
        })
    }

    /// Removes the asset row, then its objects. Object deletion is best-effort:
    /// failures are logged once the row is gone.
    #[tracing::instrument(skip(self, input), fields(listing_identity_id = input.listing_identity_id))]
    pub async fn delete_media(&self, input: DeleteMediaInput) -> AppResult<()> {
        ensure_listing_id(input.listing_identity_id)?;

        let mut tx = self.begin().await?;
        let asset = tx
            .get_asset_by_sequence(input.listing_identity_id, input.asset_type, input.sequence)
            .await
            .or_infra("failed to load asset")?
            .ok_or_else(|| AppError::not_found("asset not found"))?;
        tx.delete_asset(input.listing_identity_id, input.asset_type, input.sequence)
            .await
            .or_infra("failed to delete asset")?;
        self.commit(tx, "failed to commit media deletion").await?;

        let keys = [asset.raw_key(), asset.processed_key(), asset.thumbnail_key()];
        match self.storage.delete_keys(keys.into_iter().flatten()).await {
            Ok(count) => tracing::info!(
                asset_type = %asset.asset_type,
                sequence = asset.sequence,
                objects = count,
                "Media asset deleted"
            ),
            Err(err) => tracing::error!(
                asset_type = %asset.asset_type,
                sequence = asset.sequence,
                error = %err,
                "Media asset deleted but object cleanup failed"
            ),
        }
        Ok(())
    }
}

fn zip_bundle_info(job: &MediaProcessingJob) -> Option<ZipBundleInfo> {
    let payload = &job.payload;
    if payload.zip_bundles.is_empty() && payload.assets_zipped.is_none() {
        return None;
    }
    Some(ZipBundleInfo {
        bundle_key: payload.zip_bundles.first().cloned(),
        zip_bundles: payload.zip_bundles.clone(),
        assets_zipped: payload.assets_zipped,
        zip_size_bytes: payload.zip_size_bytes,
        unzipped_size_bytes: payload.unzipped_size_bytes,
        completed_at: job.completed_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use propmedia_core::models::MediaProcessingProvider;

    #[test]
    fn test_zip_bundle_requires_archive_data() {
        let mut job = MediaProcessingJob::new(
            1,
            MediaProcessingProvider::StepFunctionsFinalization,
            Utc::now(),
        );
        assert!(zip_bundle_info(&job).is_none());

        job.apply_finalization_payload(vec!["1/zip/complete_4_1700000000.zip".into()], Some(3), Some(10), None);
        let info = zip_bundle_info(&job).unwrap();
        assert_eq!(info.bundle_key.as_deref(), Some("1/zip/complete_4_1700000000.zip"));
        assert_eq!(info.assets_zipped, Some(3));
    }
}
