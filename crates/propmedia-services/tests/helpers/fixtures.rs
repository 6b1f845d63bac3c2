//! Test fixtures: manifests, uploaded objects and callback payloads.

use propmedia_core::models::{MediaAsset, ProcessingCallback, ProcessingResult};
use propmedia_services::{RequestUploadUrlsInput, UploadFileRequest};
use propmedia_storage::checksum::sha256_base64;

use super::{TestApp, OWNER_ID};

/// Bytes standing in for an uploaded JPEG.
pub fn photo_bytes(tag: &str) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
    data.extend_from_slice(tag.as_bytes());
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

/// A manifest entry whose checksum matches [`photo_bytes`] of the same tag.
pub fn photo_file(asset_type: &str, sequence: i32, tag: &str) -> UploadFileRequest {
    let data = photo_bytes(tag);
    UploadFileRequest {
        asset_type: asset_type.to_string(),
        sequence,
        filename: format!("{}.jpg", tag),
        content_type: "image/jpeg".to_string(),
        bytes: data.len() as i64,
        checksum: sha256_base64(&data),
        ..Default::default()
    }
}

pub fn project_file(asset_type: &str, sequence: i32, tag: &str) -> UploadFileRequest {
    let data = photo_bytes(tag);
    UploadFileRequest {
        asset_type: asset_type.to_string(),
        sequence,
        filename: format!("{}.pdf", tag),
        content_type: "application/pdf".to_string(),
        bytes: data.len() as i64,
        checksum: sha256_base64(&data),
        ..Default::default()
    }
}

pub fn upload_request(listing_identity_id: i64, files: Vec<UploadFileRequest>) -> RequestUploadUrlsInput {
    RequestUploadUrlsInput {
        listing_identity_id,
        requested_by: OWNER_ID,
        files,
    }
}

/// Requests upload URLs for `tags` (one PHOTO_VERTICAL per tag, sequences
/// from 1) and uploads the matching bytes. Returns the persisted assets.
pub async fn upload_photos(app: &TestApp, listing_identity_id: i64, tags: &[&str]) -> Vec<MediaAsset> {
    let files = tags
        .iter()
        .enumerate()
        .map(|(i, tag)| photo_file("PHOTO_VERTICAL", i as i32 + 1, tag))
        .collect();
    let output = app
        .service
        .request_upload_urls(upload_request(listing_identity_id, files))
        .await
        .expect("request upload urls");
    for (instruction, tag) in output.files.iter().zip(tags) {
        app.put_object(&instruction.object_key, &photo_bytes(tag)).await;
    }
    app.ledger
        .assets()
        .await
        .into_iter()
        .filter(|a| a.listing_identity_id == listing_identity_id)
        .collect()
}

pub fn processed(asset: &MediaAsset, processed_key: &str) -> ProcessingResult {
    ProcessingResult {
        asset_id: asset.id,
        status: "PROCESSED".to_string(),
        processed_key: processed_key.to_string(),
        ..Default::default()
    }
}

pub fn failed(asset: &MediaAsset, error: &str, code: &str) -> ProcessingResult {
    ProcessingResult {
        raw_key: asset.raw_key.clone().unwrap_or_default(),
        status: "FAILED".to_string(),
        error: error.to_string(),
        error_code: code.to_string(),
        ..Default::default()
    }
}

pub fn callback(
    job_id: i64,
    listing_identity_id: i64,
    status: &str,
    results: Vec<ProcessingResult>,
) -> ProcessingCallback {
    ProcessingCallback {
        job_id,
        listing_identity_id,
        status: status.to_string(),
        results,
        ..Default::default()
    }
}
