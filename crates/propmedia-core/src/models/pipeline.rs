//! Messages exchanged with the job queue, the workflow and the pipeline steps.

use serde::{Deserialize, Serialize};

use super::callback::flexible_id;
use super::job::{MediaProcessingJobPayload, MediaProcessingJobStatus, MediaProcessingProvider};

fn is_zero(v: &i64) -> bool {
    *v == 0
}

/// One object flowing through the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobAsset {
    pub key: String,
    /// Asset type name (`PHOTO_VERTICAL`, `THUMBNAIL_SMALL`, ...).
    #[serde(rename = "type")]
    pub asset_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source_key: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub size: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub etag: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl JobAsset {
    pub fn new(key: impl Into<String>, asset_type: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            asset_type: asset_type.into(),
            ..Default::default()
        }
    }

    pub fn is_photo(&self) -> bool {
        self.asset_type.to_uppercase().starts_with("PHOTO")
    }

    pub fn is_video(&self) -> bool {
        self.asset_type.to_uppercase().starts_with("VIDEO")
    }
}

/// Body of a job published on the processing queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaProcessingJobMessage {
    pub job_id: i64,
    pub listing_identity_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<i64>,
    pub assets: Vec<JobAsset>,
    #[serde(default)]
    pub retry: u16,
}

/// Input of the finalization workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizationInput {
    pub job_id: i64,
    pub listing_id: i64,
    pub assets: Vec<FinalizationAsset>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizationAsset {
    pub key: String,
    #[serde(rename = "type")]
    pub asset_type: String,
}

impl FinalizationInput {
    /// Provider-level idempotency key for the execution.
    pub fn execution_name(&self) -> String {
        format!("finalization-{}-{}", self.listing_id, self.job_id)
    }
}

/// Event handed to the validate, thumbnail and video thumbnail steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StepPayload {
    #[serde(deserialize_with = "flexible_id")]
    pub job_id: i64,
    #[serde(deserialize_with = "flexible_id")]
    pub listing_identity_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<i64>,
    pub assets: Vec<JobAsset>,
    pub valid_assets: Vec<JobAsset>,
    pub has_videos: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub traceparent: String,
}

impl StepPayload {
    /// Assets to work on: the validated list when present, else the raw input.
    pub fn working_assets(&self) -> &[JobAsset] {
        if self.valid_assets.is_empty() {
            &self.assets
        } else {
            &self.valid_assets
        }
    }
}

/// Failure reported by a derivative branch for one source object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BranchError {
    pub source_key: String,
    pub error_code: String,
    pub error_message: String,
}

/// Output of a derivative branch (image thumbnails or video thumbnails).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DerivativeOutput {
    pub status: String,
    pub generated_assets: Vec<JobAsset>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<BranchError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelResult {
    pub body: DerivativeOutput,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsolidateInput {
    #[serde(deserialize_with = "flexible_id")]
    pub job_id: i64,
    #[serde(deserialize_with = "flexible_id")]
    pub listing_identity_id: i64,
    pub execution_arn: String,
    pub started_at: String,
    pub assets: Vec<JobAsset>,
    pub parallel_results: Vec<ParallelResult>,
    pub traceparent: String,
}

/// Consolidated result; decodes as a processing callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidateOutput {
    pub job_id: i64,
    pub listing_identity_id: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub execution_arn: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub started_at: String,
    pub provider: MediaProcessingProvider,
    pub status: MediaProcessingJobStatus,
    pub outputs: Vec<MediaProcessingJobPayload>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub traceparent: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ZipInput {
    #[serde(deserialize_with = "flexible_id")]
    pub job_id: i64,
    #[serde(deserialize_with = "flexible_id")]
    pub listing_identity_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<i64>,
    pub assets: Vec<JobAsset>,
    /// Thumbnail derivatives bundled under `thumbnails/`.
    pub thumbnails: Vec<JobAsset>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZipOutput {
    pub zip_key: String,
    pub assets_zipped: i64,
    pub zip_bundles: Vec<String>,
    pub zip_size_bytes: i64,
    pub unzipped_size_bytes: i64,
}
