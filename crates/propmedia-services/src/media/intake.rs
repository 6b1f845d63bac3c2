//! Upload intake: manifest in, signed upload URLs out.

use propmedia_core::models::{ListingStatus, MediaAsset, MediaBatch, PropertyType};
use propmedia_core::{AppError, AppResult};
use propmedia_db::TransactionGuard;

use super::manifest::{validate_manifest, ValidatedFile};
use super::types::{RequestUploadUrlsInput, RequestUploadUrlsOutput, UploadInstruction};
use super::{ensure_listing_id, ensure_requested_by, load_listing, LedgerResultExt, MediaProcessingService};

const BATCH_REFERENCE: &str = "batch_reference";

impl MediaProcessingService {
    /// Validates a photo/video manifest and returns one signed PUT per file.
    ///
    /// Assets are keyed by `(listing, assetType, sequence)`: re-requesting a
    /// file reuses the existing row and its raw key, so retried uploads land on
    /// the same object.
    #[tracing::instrument(skip(self, input), fields(listing_identity_id = input.listing_identity_id, files = input.files.len()))]
    pub async fn request_upload_urls(
        &self,
        input: RequestUploadUrlsInput,
    ) -> AppResult<RequestUploadUrlsOutput> {
        ensure_requested_by(input.requested_by)?;
        ensure_listing_id(input.listing_identity_id)?;
        let manifest = validate_manifest(&self.config, &input.files, false)?;

        let mut tx = self.begin().await?;
        let listing = load_listing(&mut tx, input.listing_identity_id).await?;
        if !listing.status.accepts_media_uploads() {
            return Err(AppError::conflict("listing is not awaiting media uploads")
                .with_detail("status", listing.status.as_str()));
        }

        let (files, ttl) = self
            .issue_upload_urls(&mut tx, input.listing_identity_id, input.requested_by, &manifest.files, false, None)
            .await?;

        self.commit(tx, "failed to commit upload request").await?;

        tracing::info!(
            listing_identity_id = input.listing_identity_id,
            files = files.len(),
            total_bytes = manifest.total_bytes,
            "Upload URLs issued"
        );

        Ok(RequestUploadUrlsOutput {
            listing_identity_id: input.listing_identity_id,
            upload_url_ttl_seconds: ttl,
            files,
        })
    }

    /// Project documents and renders for off-plan listings awaiting plans.
    #[tracing::instrument(skip(self, input), fields(listing_identity_id = input.listing_identity_id, files = input.files.len()))]
    pub async fn request_project_upload_urls(
        &self,
        input: RequestUploadUrlsInput,
    ) -> AppResult<RequestUploadUrlsOutput> {
        if !self.config.allow_owner_project_upload {
            return Err(AppError::forbidden("project uploads are disabled"));
        }
        ensure_requested_by(input.requested_by)?;
        ensure_listing_id(input.listing_identity_id)?;
        let manifest = validate_manifest(&self.config, &input.files, false)?;

        if let Some((idx, file)) = manifest
            .files
            .iter()
            .enumerate()
            .find(|(_, f)| !f.asset_type.is_project())
        {
            return Err(AppError::validation("only project asset types are allowed")
                .with_detail(format!("files[{}].assetType", idx), file.asset_type.as_str()));
        }

        let mut tx = self.begin().await?;
        let listing = load_listing(&mut tx, input.listing_identity_id).await?;
        ensure_project_flow_allowed(&listing.property_type, &listing.status)?;

        let (files, ttl) = self
            .issue_upload_urls(&mut tx, input.listing_identity_id, input.requested_by, &manifest.files, true, None)
            .await?;

        self.commit(tx, "failed to commit upload request").await?;

        tracing::info!(
            listing_identity_id = input.listing_identity_id,
            files = files.len(),
            "Project upload URLs issued"
        );

        Ok(RequestUploadUrlsOutput {
            listing_identity_id: input.listing_identity_id,
            upload_url_ttl_seconds: ttl,
            files,
        })
    }

    /// Upserts one asset per file and signs its raw upload. Returns the
    /// instructions and the largest TTL.
    ///
    /// Assets of a batch or of the project flow always restart from
    /// PENDING_UPLOAD; plain re-requests only reset settled assets.
    pub(super) async fn issue_upload_urls(
        &self,
        tx: &mut TransactionGuard,
        listing_identity_id: i64,
        requested_by: i64,
        files: &[ValidatedFile],
        always_reset: bool,
        batch: Option<&MediaBatch>,
    ) -> AppResult<(Vec<UploadInstruction>, u64)> {
        let mut instructions = Vec::with_capacity(files.len());
        let mut ttl = 0u64;

        for file in files {
            let mut asset = tx
                .get_asset_by_sequence(listing_identity_id, file.asset_type, file.sequence)
                .await
                .or_infra("failed to check existing asset")?
                .unwrap_or_else(|| MediaAsset::new(listing_identity_id, file.asset_type, file.sequence));

            asset.title = file.title.clone();
            asset.metadata = file.asset_metadata(requested_by);
            if let Some(batch) = batch {
                asset.batch_id = Some(batch.id);
                asset.merge_metadata([(BATCH_REFERENCE, batch.reference.as_str())]);
            }

            let signed = self
                .storage
                .generate_raw_upload_url(
                    listing_identity_id,
                    &asset,
                    &file.content_type,
                    Some(file.checksum.as_str()),
                )
                .await?;

            asset.raw_key = Some(signed.object_key.clone());
            if always_reset {
                asset.restart_upload();
            } else {
                asset.reset_for_upload();
            }

            tx.upsert_asset(&asset).await.or_infra("failed to persist asset")?;

            ttl = ttl.max(signed.expires_in);
            instructions.push(UploadInstruction {
                client_id: file.client_id.clone(),
                asset_type: file.asset_type,
                sequence: file.sequence,
                upload_url: signed.url,
                method: signed.method,
                headers: signed.headers,
                object_key: signed.object_key,
                title: file.title.clone(),
            });
        }

        Ok((instructions, ttl))
    }
}

pub(super) fn ensure_project_flow_allowed(
    property_type: &PropertyType,
    status: &ListingStatus,
) -> AppResult<()> {
    if *property_type != PropertyType::OffPlanHouse {
        return Err(AppError::conflict("project media is only accepted for off-plan listings")
            .with_detail("propertyType", property_type.as_str()));
    }
    if *status != ListingStatus::PendingPlanLoading {
        return Err(AppError::conflict("listing is not awaiting project media")
            .with_detail("status", status.as_str()));
    }
    Ok(())
}
