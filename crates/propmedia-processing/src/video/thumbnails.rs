//! Video thumbnail step: one JPEG frame per video asset.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use futures::TryStreamExt;
use propmedia_core::models::{BranchError, DerivativeOutput, JobAsset, StepPayload};
use propmedia_storage::keys::derivative_key;
use propmedia_storage::{Resolution, Storage};
use tokio::io::AsyncWriteExt;

use super::FrameExtractor;

pub const ERROR_CODE: &str = "VIDEO_THUMBNAIL_FAILED";
pub const ASSET_TYPE: &str = "VIDEO_THUMBNAIL";

pub struct VideoThumbnailWorker {
    storage: Arc<dyn Storage>,
    extractor: FrameExtractor,
}

impl VideoThumbnailWorker {
    pub fn new(storage: Arc<dyn Storage>, extractor: FrameExtractor) -> Self {
        Self { storage, extractor }
    }

    #[tracing::instrument(skip(self, payload), fields(job_id = payload.job_id, listing_identity_id = payload.listing_identity_id))]
    pub async fn run(&self, payload: &StepPayload) -> DerivativeOutput {
        let mut output = DerivativeOutput {
            status: "SUCCESS".to_string(),
            ..Default::default()
        };

        for asset in payload.working_assets().iter().filter(|a| a.is_video()) {
            if !asset.error.is_empty() {
                tracing::warn!(key = %asset.key, error = %asset.error, "Skipping asset with previous error");
                continue;
            }
            match self.process(asset).await {
                Ok(generated) => output.generated_assets.push(generated),
                Err(e) => {
                    tracing::error!(key = %asset.key, error = %format!("{:#}", e), "Video thumbnail generation failed");
                    output.errors.push(BranchError {
                        source_key: asset.key.clone(),
                        error_code: ERROR_CODE.to_string(),
                        error_message: format!("{:#}", e),
                    });
                }
            }
        }

        tracing::info!(
            generated = output.generated_assets.len(),
            errors = output.errors.len(),
            "Video thumbnails completed"
        );
        output
    }

    async fn process(&self, asset: &JobAsset) -> Result<JobAsset> {
        // Removed with the directory on every exit path.
        let workdir = tempfile::Builder::new()
            .prefix("video-thumb-")
            .tempdir()
            .context("Failed to create temp directory")?;
        let input = workdir.path().join("input.bin");
        let output = workdir.path().join("thumbnail.jpg");

        self.download_to(&asset.key, &input).await?;
        self.extractor.extract(&input, &output).await?;

        let key = derivative_key(&asset.key, Resolution::Thumbnail.as_str())?;
        let data = tokio::fs::read(&output)
            .await
            .context("Failed to read generated thumbnail")?;
        let size = data.len() as i64;
        self.storage
            .upload(&key, Bytes::from(data), "image/jpeg")
            .await
            .with_context(|| format!("Failed to upload {}", key))?;

        let source_key = if asset.source_key.is_empty() {
            asset.key.clone()
        } else {
            asset.source_key.clone()
        };
        Ok(JobAsset {
            key,
            asset_type: ASSET_TYPE.to_string(),
            source_key,
            size,
            ..Default::default()
        })
    }

    async fn download_to(&self, key: &str, path: &Path) -> Result<()> {
        let mut stream = self
            .storage
            .download_stream(key)
            .await
            .with_context(|| format!("Failed to download {}", key))?;
        let mut file = tokio::fs::File::create(path)
            .await
            .context("Failed to create temp input file")?;
        while let Some(chunk) = stream.try_next().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use propmedia_core::VideoThumbnailConfig;
    use propmedia_storage::ObjectStoreStorage;

    #[tokio::test]
    async fn test_failures_are_reported_per_asset() {
        let storage = Arc::new(ObjectStoreStorage::memory());
        let present = "4/raw/video/horizontal/horizontal-01-tour.mp4";
        storage
            .upload(present, Bytes::from_static(b"not really a video"), "video/mp4")
            .await
            .unwrap();

        let extractor = FrameExtractor::new(&VideoThumbnailConfig {
            ffmpeg_path: "/nonexistent/ffmpeg".to_string(),
            ..Default::default()
        });
        let worker = VideoThumbnailWorker::new(storage, extractor);

        let mut flagged = JobAsset::new("4/raw/video/vertical/v-02.mp4", "VIDEO_VERTICAL");
        flagged.error = "Object not found".to_string();
        let payload = StepPayload {
            job_id: 1,
            listing_identity_id: 4,
            valid_assets: vec![
                JobAsset::new(present, "VIDEO_HORIZONTAL"),
                JobAsset::new("4/raw/video/vertical/missing.mp4", "VIDEO_VERTICAL"),
                flagged,
                JobAsset::new("4/raw/photo/vertical/p.jpg", "PHOTO_VERTICAL"),
            ],
            ..Default::default()
        };

        let output = worker.run(&payload).await;
        assert!(output.generated_assets.is_empty());
        assert_eq!(output.errors.len(), 2);
        assert!(output.errors.iter().all(|e| e.error_code == ERROR_CODE));
        assert_eq!(output.errors[0].source_key, present);
        assert!(output.errors[1].error_message.contains("Failed to download"));
    }
}
