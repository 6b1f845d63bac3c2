//! Validate step: HEAD every raw object and annotate the asset list.

use propmedia_core::models::StepPayload;
use propmedia_storage::Storage;

/// Augments each asset with `size` and `etag`, or with `error` when the object
/// cannot be read. One missing object never fails the step.
#[tracing::instrument(skip(storage, payload), fields(job_id = payload.job_id, listing_identity_id = payload.listing_identity_id, assets = payload.assets.len()))]
pub async fn validate_assets(storage: &dyn Storage, mut payload: StepPayload) -> StepPayload {
    let mut validated = Vec::with_capacity(payload.assets.len());

    for mut asset in payload.assets.iter().cloned() {
        asset.source_key = asset.key.clone();
        match storage.head(&asset.key).await {
            Ok(info) => {
                asset.size = info.size_bytes;
                asset.etag = info.etag.unwrap_or_default();
                asset.error.clear();
                tracing::debug!(key = %asset.key, size = asset.size, "Asset valid");
            }
            Err(e) => {
                tracing::error!(key = %asset.key, error = %e, "Asset validation failed");
                asset.error = e.to_string();
            }
        }
        validated.push(asset);
    }

    payload.has_videos = validated.iter().any(|a| a.is_video());
    let failed = validated.iter().filter(|a| !a.error.is_empty()).count();
    payload.valid_assets = validated;

    tracing::info!(
        total_assets = payload.valid_assets.len(),
        failed,
        has_videos = payload.has_videos,
        "Validation complete"
    );
    payload
}
