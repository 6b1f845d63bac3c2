mod helpers;

use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use helpers::{png, run_json, runner};
use propmedia_infra::decode_message;
use propmedia_processing::PipelineStep;
use propmedia_storage::{ObjectStoreStorage, Storage};
use propmedia_worker::run_step;
use serde_json::json;

const PHOTO: &str = "21/raw/photo/vertical/2024-03-04/vertical-01-front.png";
const VIDEO: &str = "21/raw/video/horizontal/horizontal-01-tour.mp4";

#[tokio::test]
async fn test_steps_chain_into_a_decodable_callback() {
    let storage = Arc::new(ObjectStoreStorage::memory());
    storage
        .upload(PHOTO, Bytes::from(png(1600, 1200)), "image/png")
        .await
        .unwrap();
    let runner = runner(storage.clone());

    let validated = run_json(
        &runner,
        PipelineStep::Validate,
        &json!({
            "jobId": 5,
            "listingIdentityId": 21,
            "assets": [
                {"key": PHOTO, "type": "PHOTO_VERTICAL"},
                {"key": VIDEO, "type": "VIDEO_HORIZONTAL"}
            ]
        }),
    )
    .await;
    assert_eq!(validated["hasVideos"], true);
    assert!(validated["validAssets"][1]["error"].as_str().unwrap().contains("not found"));

    let thumbnails = run_json(&runner, PipelineStep::Thumbnails, &validated).await;
    assert_eq!(thumbnails["status"], "thumbnails_generated");
    assert_eq!(thumbnails["generatedAssets"].as_array().unwrap().len(), 4);

    // The video never validated, so the branch has nothing to do.
    let videos = run_json(&runner, PipelineStep::VideoThumbnails, &validated).await;
    assert_eq!(videos["status"], "SUCCESS");
    assert!(videos["generatedAssets"].as_array().unwrap().is_empty());

    let consolidated = run_json(
        &runner,
        PipelineStep::Consolidate,
        &json!({
            "jobId": 5,
            "listingIdentityId": 21,
            "executionArn": "arn:aws:states:exec-5",
            "assets": validated["validAssets"],
            "parallelResults": [{"body": thumbnails}, {"body": videos}]
        }),
    )
    .await;
    assert_eq!(consolidated["status"], "SUCCEEDED");
    assert_eq!(consolidated["provider"], "STEP_FUNCTIONS");

    let callback = decode_message(&consolidated.to_string()).unwrap();
    assert_eq!(callback.job_id, 5);
    assert_eq!(callback.external_id, "arn:aws:states:exec-5");
    assert_eq!(callback.results.len(), 2);
    assert_eq!(callback.results[0].raw_key, PHOTO);
    assert_eq!(
        callback.results[0].processed_key,
        "21/processed/photo/vertical/large/vertical-01-front.png"
    );
    assert_eq!(
        callback.results[0].thumbnail_key,
        "21/processed/photo/vertical/thumbnail/vertical-01-front.png"
    );
    assert_eq!(callback.results[1].error_code, "VALIDATION_ERROR");

    let large = storage.head(&callback.results[0].processed_key).await.unwrap();
    assert!(large.size_bytes > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_zip_step_names_archive_after_batch() {
    let storage = Arc::new(ObjectStoreStorage::memory());
    storage
        .upload(PHOTO, Bytes::from_static(b"photo"), "image/png")
        .await
        .unwrap();
    let runner = runner(storage.clone());

    let out = run_json(
        &runner,
        PipelineStep::Zip,
        &json!({
            "jobId": 5,
            "listingIdentityId": 21,
            "batchId": 3,
            "assets": [{"key": PHOTO, "type": "PHOTO_VERTICAL"}]
        }),
    )
    .await;

    let zip_key = out["zipKey"].as_str().unwrap();
    assert!(zip_key.starts_with("21/zip/complete_3_"));
    assert!(zip_key.ends_with(".zip"));
    assert_eq!(out["assetsZipped"], 1);
    assert_eq!(out["unzippedSizeBytes"], 5);
    assert_eq!(out["zipBundles"][0], zip_key);
    assert!(storage.head(zip_key).await.is_ok());
}

#[tokio::test]
async fn test_invalid_stdin_is_rejected() {
    let storage = Arc::new(ObjectStoreStorage::memory());
    let runner = runner(storage);
    let mut output = Vec::new();

    let err = run_step(
        &runner,
        PipelineStep::Validate,
        Cursor::new(b"{not json".to_vec()),
        &mut output,
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("not valid JSON"));
    assert!(output.is_empty());

    let err = run_step(&runner, PipelineStep::Zip, Cursor::new(Vec::new()), &mut output)
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("jobId is required"));
}
