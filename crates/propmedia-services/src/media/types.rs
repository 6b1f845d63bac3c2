//! Inputs and outputs of the media use cases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use propmedia_core::models::{
    BatchStatus, ListingStatus, MediaAsset, MediaAssetStatus, MediaAssetType,
    MediaProcessingJobStatus, ProcessingCallback,
};

/// One file of an upload manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadFileRequest {
    /// Caller-side identifier; required by the batch flow only.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub client_id: String,
    /// Asset type name, parsed case-insensitively during validation.
    pub asset_type: String,
    pub sequence: i32,
    pub filename: String,
    pub content_type: String,
    pub bytes: i64,
    pub checksum: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestUploadUrlsInput {
    pub listing_identity_id: i64,
    pub requested_by: i64,
    pub files: Vec<UploadFileRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadInstruction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub asset_type: MediaAssetType,
    pub sequence: i32,
    pub upload_url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub object_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestUploadUrlsOutput {
    pub listing_identity_id: i64,
    /// Largest TTL across the returned URLs.
    pub upload_url_ttl_seconds: u64,
    pub files: Vec<UploadInstruction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessMediaOutput {
    pub listing_identity_id: i64,
    pub job_id: i64,
    pub assets_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteMediaOutput {
    pub listing_identity_id: i64,
    pub job_id: i64,
    pub execution_arn: String,
    pub assets_count: usize,
    pub listing_status: ListingStatus,
}

/// A callback as received from the queue. The receipt handle is acknowledged
/// once the callback has been committed.
#[derive(Debug, Clone, PartialEq)]
pub struct HandleProcessingCallbackInput {
    pub callback: ProcessingCallback,
    pub receipt_handle: Option<String>,
}

/// A result that could not be applied as reported.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetResultError {
    pub asset_id: i64,
    pub raw_key: String,
    pub error_code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleProcessingCallbackOutput {
    pub job_id: i64,
    pub listing_identity_id: i64,
    pub status: MediaProcessingJobStatus,
    pub assets_updated: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub asset_errors: Vec<AssetResultError>,
    /// Set when the job was already terminal with the same status.
    pub duplicate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub asset_type: MediaAssetType,
    pub sequence: i32,
    /// `thumbnail`, `small`, `medium`, `large` or `original`.
    pub resolution: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateDownloadUrlsInput {
    pub listing_identity_id: i64,
    pub requests: Vec<DownloadRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadUrl {
    pub asset_type: MediaAssetType,
    pub sequence: i32,
    pub resolution: String,
    pub url: String,
    pub object_key: String,
    /// Seconds.
    pub expires_in: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateDownloadUrlsOutput {
    pub listing_identity_id: i64,
    pub urls: Vec<DownloadUrl>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListDownloadUrlsInput {
    pub listing_identity_id: i64,
    /// Empty means every asset type.
    pub asset_types: Vec<MediaAssetType>,
    /// Defaults to `large`.
    pub resolution: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadEntry {
    pub asset_type: MediaAssetType,
    pub sequence: i32,
    pub status: MediaAssetStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Only present for processed assets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDownloadUrlsOutput {
    pub listing_identity_id: i64,
    pub generated_at: DateTime<Utc>,
    pub ttl_seconds: u64,
    pub downloads: Vec<DownloadEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMediaInput {
    pub listing_identity_id: i64,
    #[serde(default)]
    pub asset_type: Option<MediaAssetType>,
    #[serde(default)]
    pub sequence: Option<i32>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

/// Archive produced by the latest finalization job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZipBundleInfo {
    pub bundle_key: Option<String>,
    pub zip_bundles: Vec<String>,
    pub assets_zipped: Option<i64>,
    pub zip_size_bytes: Option<i64>,
    pub unzipped_size_bytes: Option<i64>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMediaOutput {
    pub assets: Vec<MediaAsset>,
    pub total_count: i64,
    pub page: i64,
    pub page_size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_bundle: Option<ZipBundleInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMediaInput {
    pub listing_identity_id: i64,
    pub asset_type: MediaAssetType,
    pub sequence: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerApprovalInput {
    pub listing_identity_id: i64,
    pub requested_by: i64,
    pub approve: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerApprovalOutput {
    pub listing_identity_id: i64,
    pub new_status: ListingStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadBatchInput {
    pub listing_identity_id: i64,
    pub requested_by: i64,
    pub batch_reference: String,
    pub files: Vec<UploadFileRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadBatchOutput {
    pub listing_identity_id: i64,
    pub batch_id: i64,
    pub upload_url_ttl_seconds: u64,
    pub files: Vec<UploadInstruction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompletedUpload {
    pub client_id: String,
    pub object_key: String,
    pub bytes: Option<i64>,
    pub etag: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadBatchInput {
    pub listing_identity_id: i64,
    pub batch_id: i64,
    pub requested_by: i64,
    pub files: Vec<CompletedUpload>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadBatchOutput {
    pub listing_identity_id: i64,
    pub batch_id: i64,
    pub job_id: i64,
    pub status: BatchStatus,
    pub estimated_duration_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryMediaBatchInput {
    pub listing_identity_id: i64,
    pub batch_id: i64,
    pub requested_by: i64,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryMediaBatchOutput {
    pub listing_identity_id: i64,
    pub batch_id: i64,
    pub job_id: i64,
    pub status: BatchStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAssetStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub asset_type: MediaAssetType,
    pub sequence: i32,
    pub status: MediaAssetStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_object_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_key: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetBatchStatusOutput {
    pub listing_identity_id: i64,
    pub batch_id: i64,
    pub status: BatchStatus,
    pub status_message: String,
    pub assets: Vec<BatchAssetStatus>,
}
