//! Callback application tests.
//!
//! Run with: `cargo test -p propmedia-services --test media_callback_test`

mod helpers;

use chrono::Duration;
use helpers::fixtures::{callback, failed, processed, upload_photos};
use helpers::{setup_test_app, test_start, TestApp};
use propmedia_core::models::{
    metadata_keys, ListingStatus, MediaAsset, MediaAssetStatus, MediaProcessingJobStatus,
    ProcessingCallback, ProcessingResult,
};
use propmedia_core::ErrorKind;
use propmedia_services::{
    CallbackConsumer, HandleProcessingCallbackInput, ListMediaInput, PollSummary,
};

async fn dispatched(app: &TestApp, tags: &[&str]) -> (i64, Vec<MediaAsset>) {
    app.seed_listing(10, ListingStatus::PendingPhotoProcessing).await;
    let assets = upload_photos(app, 10, tags).await;
    let job = app.service.process_media(10).await.unwrap();
    (job.job_id, assets)
}

fn input(callback: ProcessingCallback, receipt: &str) -> HandleProcessingCallbackInput {
    HandleProcessingCallbackInput {
        callback,
        receipt_handle: Some(receipt.to_string()),
    }
}

async fn asset(app: &TestApp, id: i64) -> MediaAsset {
    app.ledger
        .assets()
        .await
        .into_iter()
        .find(|a| a.id == id)
        .unwrap()
}

#[tokio::test]
async fn test_mixed_results_are_applied_per_asset() {
    let app = setup_test_app();
    let (job_id, assets) = dispatched(&app, &["a", "b", "c"]).await;
    app.clock.advance(Duration::minutes(5));

    let mut ok = processed(&assets[0], "10/processed/photo/vertical/large/a.jpg");
    ok.thumbnail_key = "10/thumb/a.jpg".into();
    ok.metadata.insert("width".into(), "1920".into());
    let missing_key = ProcessingResult {
        asset_id: assets[2].id,
        status: "PROCESSED".into(),
        ..Default::default()
    };
    let cb = callback(
        job_id,
        10,
        "PARTIAL_SUCCESS",
        vec![ok, failed(&assets[1], "decode error", "DECODE"), missing_key],
    );

    let output = app
        .service
        .handle_processing_callback(input(cb, "r-1"))
        .await
        .unwrap();
    assert_eq!(output.status, MediaProcessingJobStatus::PartialSuccess);
    assert_eq!(output.assets_updated, 3);
    assert!(!output.duplicate);
    assert_eq!(output.asset_errors.len(), 1);
    assert_eq!(output.asset_errors[0].asset_id, assets[2].id);
    assert_eq!(output.asset_errors[0].error_code, "MISSING_PROCESSED_KEY");

    let a = asset(&app, assets[0].id).await;
    assert_eq!(a.status, MediaAssetStatus::Processed);
    assert_eq!(a.processed_key(), Some("10/processed/photo/vertical/large/a.jpg"));
    assert_eq!(a.thumbnail_key(), Some("10/thumb/a.jpg"));
    assert_eq!(a.metadata["width"], "1920");

    let b = asset(&app, assets[1].id).await;
    assert_eq!(b.status, MediaAssetStatus::Failed);
    assert_eq!(b.metadata[metadata_keys::ERROR], "decode error");
    assert_eq!(b.metadata[metadata_keys::ERROR_CODE], "DECODE");

    let c = asset(&app, assets[2].id).await;
    assert_eq!(c.status, MediaAssetStatus::Failed);
    assert_eq!(c.metadata[metadata_keys::ERROR_CODE], "MISSING_PROCESSED_KEY");

    let job = app.ledger.jobs().await.remove(0);
    assert_eq!(job.status, MediaProcessingJobStatus::PartialSuccess);
    assert_eq!(job.completed_at, Some(test_start() + Duration::minutes(5)));
    assert!(job.completed_at >= job.started_at);
    assert_eq!(app.queue.acknowledged(), vec!["r-1".to_string()]);
}

#[tokio::test]
async fn test_redelivered_callback_is_a_noop() {
    let app = setup_test_app();
    let (job_id, assets) = dispatched(&app, &["a"]).await;
    let cb = callback(
        job_id,
        10,
        "SUCCEEDED",
        vec![processed(&assets[0], "10/processed/photo/vertical/large/a.jpg")],
    );

    app.service
        .handle_processing_callback(input(cb.clone(), "r-1"))
        .await
        .unwrap();
    let job_before = app.ledger.jobs().await.remove(0);

    app.clock.advance(Duration::minutes(10));
    let again = app
        .service
        .handle_processing_callback(input(cb, "r-2"))
        .await
        .unwrap();
    assert!(again.duplicate);
    assert_eq!(again.assets_updated, 0);
    assert_eq!(app.ledger.jobs().await.remove(0), job_before);
    assert_eq!(app.queue.acknowledged(), vec!["r-1".to_string(), "r-2".to_string()]);

    let err = app
        .service
        .handle_processing_callback(input(callback(job_id, 10, "FAILED", vec![]), "r-3"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(err.message(), "processing job already finalized");
    assert_eq!(app.queue.acknowledged().len(), 2);
    assert_eq!(asset(&app, assets[0].id).await.status, MediaAssetStatus::Processed);
}

#[tokio::test]
async fn test_late_running_callback_is_acknowledged() {
    let app = setup_test_app();
    let (job_id, assets) = dispatched(&app, &["a"]).await;
    app.service
        .handle_processing_callback(input(
            callback(
                job_id,
                10,
                "SUCCEEDED",
                vec![processed(&assets[0], "10/processed/photo/vertical/large/a.jpg")],
            ),
            "r-1",
        ))
        .await
        .unwrap();
    let job_before = app.ledger.jobs().await.remove(0);

    let late = app
        .service
        .handle_processing_callback(input(callback(job_id, 10, "RUNNING", vec![]), "r-2"))
        .await
        .unwrap();
    assert!(late.duplicate);
    assert_eq!(late.status, MediaProcessingJobStatus::Succeeded);
    assert_eq!(late.assets_updated, 0);
    assert_eq!(app.ledger.jobs().await.remove(0), job_before);
    assert_eq!(app.queue.acknowledged(), vec!["r-1".to_string(), "r-2".to_string()]);
    assert_eq!(asset(&app, assets[0].id).await.status, MediaAssetStatus::Processed);
}

#[tokio::test]
async fn test_failed_job_without_results_fails_processing_assets() {
    let app = setup_test_app();
    let (job_id, assets) = dispatched(&app, &["a", "b"]).await;

    let mut cb = callback(job_id, 10, "FAILED", vec![]);
    cb.error_code = "TIMEOUT".into();
    cb.error = "lambda timed out".into();
    app.service
        .handle_processing_callback(input(cb, "r-1"))
        .await
        .unwrap();

    for a in &assets {
        assert_eq!(asset(&app, a.id).await.status, MediaAssetStatus::Failed);
    }
    let job = app.ledger.jobs().await.remove(0);
    assert_eq!(job.status, MediaProcessingJobStatus::Failed);
    assert_eq!(job.last_error.as_deref(), Some("code=TIMEOUT | lambda timed out"));

    // Failed assets are picked up again by the next dispatch.
    let retry = app.service.process_media(10).await.unwrap();
    assert_eq!(retry.assets_count, 2);
}

#[tokio::test]
async fn test_running_callback_keeps_job_open() {
    let app = setup_test_app();
    let (job_id, _) = dispatched(&app, &["a"]).await;

    let mut cb = callback(job_id, 10, "RUNNING", vec![]);
    cb.external_id = "arn:aws:states:eu-west-1:1:execution:pipeline:job".into();
    app.service
        .handle_processing_callback(input(cb, "r-1"))
        .await
        .unwrap();

    let job = app.ledger.jobs().await.remove(0);
    assert_eq!(job.status, MediaProcessingJobStatus::Running);
    assert_eq!(job.started_at, Some(test_start()));
    assert!(job.completed_at.is_none());
    assert_eq!(
        job.external_id.as_deref(),
        Some("arn:aws:states:eu-west-1:1:execution:pipeline:job")
    );
    assert_eq!(app.ledger.assets().await[0].status, MediaAssetStatus::Processing);
}

#[tokio::test]
async fn test_unknown_job_and_unresolved_results() {
    let app = setup_test_app();
    let (job_id, _) = dispatched(&app, &["a"]).await;

    let err = app
        .service
        .handle_processing_callback(input(callback(999, 10, "SUCCEEDED", vec![]), "r-1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(app.queue.acknowledged().is_empty());

    let stray = ProcessingResult {
        raw_key: "10/raw/photo/vertical/unknown.jpg".into(),
        status: "PROCESSED".into(),
        processed_key: "x".into(),
        ..Default::default()
    };
    let output = app
        .service
        .handle_processing_callback(input(callback(job_id, 10, "RUNNING", vec![stray]), "r-2"))
        .await
        .unwrap();
    assert_eq!(output.assets_updated, 0);
}

#[tokio::test]
async fn test_finalization_callback_records_archive() {
    let app = setup_test_app();
    let (job_id, assets) = dispatched(&app, &["a"]).await;
    app.service
        .handle_processing_callback(input(
            callback(
                job_id,
                10,
                "SUCCEEDED",
                vec![processed(&assets[0], "10/processed/photo/vertical/large/a.jpg")],
            ),
            "r-1",
        ))
        .await
        .unwrap();
    let finalization = app.service.complete_media(10).await.unwrap();

    let zip = ProcessingResult {
        zip_bundles: vec!["10/zip/complete_1_1717243200.zip".into()],
        assets_zipped: Some(1),
        zip_size_bytes: Some(2048),
        ..Default::default()
    };
    app.service
        .handle_processing_callback(input(
            callback(finalization.job_id, 10, "SUCCEEDED", vec![zip]),
            "r-2",
        ))
        .await
        .unwrap();

    let listed = app
        .service
        .list_media(ListMediaInput {
            listing_identity_id: 10,
            asset_type: None,
            sequence: None,
            page: 1,
            page_size: 20,
        })
        .await
        .unwrap();
    let bundle = listed.zip_bundle.unwrap();
    assert_eq!(bundle.bundle_key.as_deref(), Some("10/zip/complete_1_1717243200.zip"));
    assert_eq!(bundle.assets_zipped, Some(1));
    assert_eq!(bundle.zip_size_bytes, Some(2048));
}

#[tokio::test]
async fn test_consumer_acks_only_applied_messages() {
    let app = setup_test_app();
    let (job_id, assets) = dispatched(&app, &["a"]).await;

    let body = serde_json::json!({
        "jobId": job_id.to_string(),
        "listingIdentityId": 10,
        "status": "SUCCEEDED",
        "results": [{
            "assetId": assets[0].id.to_string(),
            "status": "PROCESSED",
            "processedKey": "10/processed/photo/vertical/large/a.jpg"
        }]
    })
    .to_string();
    let good = app.queue.push_callback(body);
    let bad = app.queue.push_callback("{not json");
    let orphan = app
        .queue
        .push_callback(r#"{"jobId":4242,"status":"SUCCEEDED"}"#);

    let consumer = CallbackConsumer::new(app.service.clone(), app.queue.clone());
    let summary = consumer.poll_once().await.unwrap();
    assert_eq!(
        summary,
        PollSummary {
            received: 3,
            applied: 1,
            failed: 2,
        }
    );

    let acked = app.queue.acknowledged();
    assert_eq!(acked, vec![good]);
    assert!(!acked.contains(&bad));
    assert!(!acked.contains(&orphan));

    let job = app.ledger.jobs().await.remove(0);
    assert_eq!(job.status, MediaProcessingJobStatus::Succeeded);
    assert!(job.callback_body.unwrap().contains("processedKey"));
    assert_eq!(
        app.ledger.assets().await[0].status,
        MediaAssetStatus::Processed
    );

    let idle = consumer.poll_once().await.unwrap();
    assert_eq!(idle, PollSummary::default());
}
