//! Image thumbnail step: one JPEG per derivative width for every photo.

use std::io::Cursor;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use propmedia_core::models::{BranchError, DerivativeOutput, JobAsset, StepPayload};
use propmedia_storage::keys::derivative_key;
use propmedia_storage::{Resolution, Storage};

use super::ImageOrientation;

pub const JPEG_QUALITY: u8 = 85;
pub const ERROR_CODE: &str = "IMAGE_THUMBNAIL_FAILED";

/// A rendered derivative ready for upload.
#[derive(Debug, Clone)]
pub struct RenderedDerivative {
    pub resolution: Resolution,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Decode `data` honouring its EXIF orientation and render every derivative
/// width, keeping the aspect ratio.
pub fn render_derivatives(data: &[u8]) -> Result<Vec<RenderedDerivative>> {
    let img = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .context("Failed to read image")?
        .decode()
        .context("Failed to decode image")?;
    let img = ImageOrientation::apply_exif_orientation(img, data);

    let mut rendered = Vec::with_capacity(Resolution::DERIVATIVES.len());
    for resolution in Resolution::DERIVATIVES {
        let Some(width) = resolution.width() else {
            continue;
        };
        let resized = resize_to_width(&img, width);
        let data = encode_jpeg(&resized, JPEG_QUALITY)
            .with_context(|| format!("Failed to encode {} derivative", resolution.as_str()))?;
        rendered.push(RenderedDerivative {
            resolution,
            width: resized.width(),
            height: resized.height(),
            data,
        });
    }
    Ok(rendered)
}

fn resize_to_width(img: &DynamicImage, width: u32) -> DynamicImage {
    let height = ((img.height() as u64 * width as u64) / img.width().max(1) as u64).max(1) as u32;
    img.resize_exact(width, height, FilterType::Lanczos3)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    // JPEG has no alpha channel.
    DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)?;
    Ok(buffer)
}

pub struct ImageThumbnailWorker {
    storage: Arc<dyn Storage>,
}

impl ImageThumbnailWorker {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Processes every photo without a validation error. A failing asset is
    /// reported in `errors` and skipped.
    #[tracing::instrument(skip(self, payload), fields(job_id = payload.job_id, listing_identity_id = payload.listing_identity_id))]
    pub async fn run(&self, payload: &StepPayload) -> DerivativeOutput {
        let mut output = DerivativeOutput {
            status: "thumbnails_generated".to_string(),
            ..Default::default()
        };

        for asset in payload.working_assets().iter().filter(|a| a.is_photo()) {
            if !asset.error.is_empty() {
                tracing::warn!(key = %asset.key, error = %asset.error, "Skipping asset with previous error");
                continue;
            }
            match self.process(asset).await {
                Ok(generated) => output.generated_assets.extend(generated),
                Err(e) => {
                    tracing::error!(key = %asset.key, error = %format!("{:#}", e), "Image thumbnail generation failed");
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
            "Image thumbnails finished"
        );
        output
    }

    async fn process(&self, asset: &JobAsset) -> Result<Vec<JobAsset>> {
        let data = self
            .storage
            .download(&asset.key)
            .await
            .with_context(|| format!("Failed to download {}", asset.key))?;

        let rendered = tokio::task::spawn_blocking(move || render_derivatives(&data))
            .await
            .context("Thumbnail task panicked")??;

        let mut generated = Vec::with_capacity(rendered.len());
        for derivative in rendered {
            let key = derivative_key(&asset.key, derivative.resolution.as_str())?;
            let size = derivative.data.len() as i64;
            self.storage
                .upload(&key, Bytes::from(derivative.data), "image/jpeg")
                .await
                .with_context(|| format!("Failed to upload {}", key))?;
            tracing::debug!(
                source_key = %asset.key,
                key = %key,
                width = derivative.width,
                height = derivative.height,
                "Derivative uploaded"
            );
            generated.push(JobAsset {
                key,
                asset_type: format!("THUMBNAIL_{}", derivative.resolution.as_str().to_uppercase()),
                source_key: asset.key.clone(),
                size,
                ..Default::default()
            });
        }
        Ok(generated)
    }
}
