//! Upload batch tests.
//!
//! Run with: `cargo test -p propmedia-services --test batch_test`

mod helpers;

use helpers::fixtures::{callback, photo_bytes, photo_file, processed};
use helpers::{setup_test_app, TestApp, OWNER_ID};
use propmedia_core::models::{
    BatchStatus, ListingStatus, MediaAssetStatus, MediaProcessingJobStatus, ProcessingCallback,
};
use propmedia_core::ErrorKind;
use propmedia_infra::QueueKind;
use propmedia_services::{
    CompleteUploadBatchInput, CompletedUpload, CreateUploadBatchInput, CreateUploadBatchOutput,
    HandleProcessingCallbackInput, RetryMediaBatchInput, UploadFileRequest,
};

fn batch_file(client_id: &str, sequence: i32) -> UploadFileRequest {
    let mut file = photo_file("PHOTO_HORIZONTAL", sequence, client_id);
    file.client_id = client_id.to_string();
    file
}

async fn create_batch(app: &TestApp, clients: &[&str]) -> CreateUploadBatchOutput {
    app.service
        .create_upload_batch(CreateUploadBatchInput {
            listing_identity_id: 30,
            requested_by: OWNER_ID,
            batch_reference: "spring-shoot".to_string(),
            files: clients
                .iter()
                .enumerate()
                .map(|(i, c)| batch_file(c, i as i32 + 1))
                .collect(),
        })
        .await
        .unwrap()
}

/// Uploads every object of the batch and confirms it.
async fn upload_and_complete(app: &TestApp, created: &CreateUploadBatchOutput) -> i64 {
    let mut files = Vec::new();
    for instruction in &created.files {
        let client_id = instruction.client_id.clone().unwrap();
        app.put_object(&instruction.object_key, &photo_bytes(&client_id)).await;
        files.push(CompletedUpload {
            client_id,
            object_key: instruction.object_key.clone(),
            bytes: None,
            etag: Some("\"etag-1\"".to_string()),
        });
    }
    app.service
        .complete_upload_batch(CompleteUploadBatchInput {
            listing_identity_id: 30,
            batch_id: created.batch_id,
            requested_by: OWNER_ID,
            files,
        })
        .await
        .unwrap()
        .job_id
}

async fn settle(app: &TestApp, cb: ProcessingCallback) {
    app.service
        .handle_processing_callback(HandleProcessingCallbackInput {
            callback: cb,
            receipt_handle: None,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_batch_lifecycle_to_ready() {
    let app = setup_test_app();
    app.seed_listing(30, ListingStatus::PendingPhotoProcessing).await;

    let created = create_batch(&app, &["front", "garden"]).await;
    assert_eq!(created.files.len(), 2);
    assert_eq!(created.files[0].client_id.as_deref(), Some("front"));
    assert!(created.files[0].object_key.contains("front"));

    let status = app.service.get_batch_status(30, created.batch_id).await.unwrap();
    assert_eq!(status.status, BatchStatus::PendingUpload);
    assert_eq!(status.status_message, "batch_created");
    assert_eq!(status.assets.len(), 2);
    assert!(status
        .assets
        .iter()
        .all(|a| a.status == MediaAssetStatus::PendingUpload));

    let job_id = upload_and_complete(&app, &created).await;

    let published = app.queue.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].queue, QueueKind::Job);
    assert_eq!(published[0].message.batch_id, Some(created.batch_id));
    assert_eq!(published[0].message.job_id, job_id);
    assert!(published[0].message.assets.iter().all(|a| a.etag == "\"etag-1\""));

    let status = app.service.get_batch_status(30, created.batch_id).await.unwrap();
    assert_eq!(status.status, BatchStatus::Received);
    assert!(status
        .assets
        .iter()
        .all(|a| a.status == MediaAssetStatus::Processing));

    let assets = app.ledger.assets().await;
    let results = assets
        .iter()
        .map(|a| processed(a, &format!("30/processed/photo/horizontal/large/{}.jpg", a.sequence)))
        .collect();
    settle(&app, callback(job_id, 30, "SUCCEEDED", results)).await;

    let status = app.service.get_batch_status(30, created.batch_id).await.unwrap();
    assert_eq!(status.status, BatchStatus::Ready);
    assert_eq!(status.status_message, "processing_completed");
    assert!(status.assets.iter().all(|a| a.processed_key.is_some()));
}

#[tokio::test]
async fn test_one_open_batch_per_listing() {
    let app = setup_test_app();
    app.seed_listing(30, ListingStatus::PendingPhotoProcessing).await;
    let created = create_batch(&app, &["front"]).await;

    let err = app
        .service
        .create_upload_batch(CreateUploadBatchInput {
            listing_identity_id: 30,
            requested_by: OWNER_ID,
            batch_reference: "second".to_string(),
            files: vec![batch_file("back", 2)],
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(err.message(), "listing already has an active media batch");

    app.service.delete_upload_batch(30, created.batch_id).await.unwrap();
    let err = app
        .service
        .get_batch_status(30, created.batch_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(
        app.service
            .delete_upload_batch(30, created.batch_id)
            .await
            .unwrap_err()
            .kind(),
        ErrorKind::NotFound
    );

    create_batch(&app, &["back"]).await;
}

#[tokio::test]
async fn test_create_batch_validation() {
    let app = setup_test_app();
    app.seed_listing(30, ListingStatus::PendingPhotoProcessing).await;

    let err = app
        .service
        .create_upload_batch(CreateUploadBatchInput {
            listing_identity_id: 30,
            requested_by: OWNER_ID,
            batch_reference: "  ".to_string(),
            files: vec![batch_file("front", 1)],
        })
        .await
        .unwrap_err();
    assert_eq!(err.message(), "batchReference is required");

    let err = app
        .service
        .create_upload_batch(CreateUploadBatchInput {
            listing_identity_id: 30,
            requested_by: OWNER_ID,
            batch_reference: "r".repeat(121),
            files: vec![batch_file("front", 1)],
        })
        .await
        .unwrap_err();
    assert_eq!(err.message(), "batchReference is too long");

    let err = app
        .service
        .create_upload_batch(CreateUploadBatchInput {
            listing_identity_id: 30,
            requested_by: OWNER_ID,
            batch_reference: "ok".to_string(),
            files: vec![photo_file("PHOTO_HORIZONTAL", 1, "no-client")],
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.message(), "clientId is required");

    assert!(app.ledger.batches().await.is_empty());
    assert!(app.ledger.assets().await.is_empty());
}

#[tokio::test]
async fn test_complete_batch_rejects_bad_uploads() {
    let app = setup_test_app();
    app.seed_listing(30, ListingStatus::PendingPhotoProcessing).await;
    let created = create_batch(&app, &["front", "garden"]).await;
    let front = &created.files[0];
    let garden = &created.files[1];

    let complete = |files: Vec<CompletedUpload>| CompleteUploadBatchInput {
        listing_identity_id: 30,
        batch_id: created.batch_id,
        requested_by: OWNER_ID,
        files,
    };
    let upload = |client_id: &str, object_key: &str| CompletedUpload {
        client_id: client_id.to_string(),
        object_key: object_key.to_string(),
        ..Default::default()
    };

    let err = app
        .service
        .complete_upload_batch(complete(vec![upload("front", &front.object_key)]))
        .await
        .unwrap_err();
    assert_eq!(err.message(), "file count mismatch");

    let err = app
        .service
        .complete_upload_batch(complete(vec![
            upload("porch", &garden.object_key),
            upload("front", &front.object_key),
        ]))
        .await
        .unwrap_err();
    assert_eq!(err.message(), "unknown clientId");

    let err = app
        .service
        .complete_upload_batch(complete(vec![
            upload("front", &garden.object_key),
            upload("garden", &front.object_key),
        ]))
        .await
        .unwrap_err();
    assert_eq!(err.message(), "objectKey mismatch");

    // Nothing uploaded yet.
    let err = app
        .service
        .complete_upload_batch(complete(vec![
            upload("front", &front.object_key),
            upload("garden", &garden.object_key),
        ]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.message(), "checksum validation failed");

    app.put_object(&front.object_key, &photo_bytes("front")).await;
    app.put_object(&garden.object_key, b"tampered").await;
    let err = app
        .service
        .complete_upload_batch(complete(vec![
            upload("front", &front.object_key),
            upload("garden", &garden.object_key),
        ]))
        .await
        .unwrap_err();
    assert_eq!(err.message(), "checksum validation failed");

    assert!(app.queue.published().is_empty());
    assert!(app.ledger.jobs().await.is_empty());
    let status = app.service.get_batch_status(30, created.batch_id).await.unwrap();
    assert_eq!(status.status, BatchStatus::PendingUpload);
    assert!(status
        .assets
        .iter()
        .all(|a| a.status == MediaAssetStatus::PendingUpload));
}

#[tokio::test]
async fn test_failed_batch_can_be_retried() {
    let app = setup_test_app();
    app.seed_listing(30, ListingStatus::PendingPhotoProcessing).await;
    let created = create_batch(&app, &["front"]).await;
    let job_id = upload_and_complete(&app, &created).await;

    let err = app
        .service
        .retry_media_batch(RetryMediaBatchInput {
            listing_identity_id: 30,
            batch_id: created.batch_id,
            requested_by: OWNER_ID,
            reason: String::new(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let mut cb = callback(job_id, 30, "FAILED", vec![]);
    cb.error = "thumbnail step crashed".into();
    settle(&app, cb).await;

    let status = app.service.get_batch_status(30, created.batch_id).await.unwrap();
    assert_eq!(status.status, BatchStatus::Failed);
    assert_eq!(status.status_message, "thumbnail step crashed");
    assert_eq!(status.assets[0].status, MediaAssetStatus::Failed);

    let retried = app
        .service
        .retry_media_batch(RetryMediaBatchInput {
            listing_identity_id: 30,
            batch_id: created.batch_id,
            requested_by: OWNER_ID,
            reason: "photographer re-exported".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(retried.status, BatchStatus::Processing);
    assert_ne!(retried.job_id, job_id);

    let published = app.queue.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[1].queue, QueueKind::Retry);
    assert_eq!(published[1].message.retry, 1);
    assert_eq!(published[1].message.batch_id, Some(created.batch_id));

    let jobs = app.ledger.jobs().await;
    let retry_job = jobs.iter().find(|j| j.id == retried.job_id).unwrap();
    assert_eq!(retry_job.retry_count, 1);
    assert_eq!(retry_job.status, MediaProcessingJobStatus::Pending);

    let status = app.service.get_batch_status(30, created.batch_id).await.unwrap();
    assert_eq!(status.status_message, "photographer re-exported");
    assert_eq!(status.assets[0].status, MediaAssetStatus::Processing);
}
