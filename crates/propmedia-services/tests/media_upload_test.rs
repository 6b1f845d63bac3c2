//! Upload intake tests.
//!
//! Run with: `cargo test -p propmedia-services --test media_upload_test`

mod helpers;

use helpers::fixtures::{photo_file, project_file, upload_request};
use helpers::{setup_test_app, setup_test_app_with, UPLOAD_TTL_SECS};
use propmedia_core::models::{
    metadata_keys, ListingStatus, MediaAssetStatus, MediaAssetType, PropertyType,
};
use propmedia_core::{ErrorKind, MediaProcessingConfig};
use propmedia_db::{AssetStore, MediaLedger};
use propmedia_services::RequestUploadUrlsInput;

#[tokio::test]
async fn test_request_upload_urls_signs_each_file() {
    let app = setup_test_app();
    app.seed_listing(10, ListingStatus::PendingPhotoProcessing).await;

    let mut front = photo_file("photo_vertical", 1, "front");
    front.title = "Front view".into();
    let output = app
        .service
        .request_upload_urls(upload_request(
            10,
            vec![front.clone(), photo_file("VIDEO_HORIZONTAL", 1, "tour")],
        ))
        .await
        .unwrap();

    assert_eq!(output.listing_identity_id, 10);
    assert_eq!(output.upload_url_ttl_seconds, UPLOAD_TTL_SECS);
    assert_eq!(output.files.len(), 2);

    let first = &output.files[0];
    assert_eq!(first.asset_type, MediaAssetType::PhotoVertical);
    assert_eq!(first.method, "PUT");
    assert!(first.object_key.starts_with("10/raw/photo/vertical/"));
    assert!(first.object_key.ends_with("front.jpg"));
    assert_eq!(first.title.as_deref(), Some("Front view"));
    assert_eq!(
        first.headers.get("x-amz-checksum-sha256"),
        Some(&front.checksum)
    );
    assert!(output.files[1].object_key.starts_with("10/raw/video/horizontal/"));

    let assets = app.ledger.assets().await;
    assert_eq!(assets.len(), 2);
    let photo = assets
        .iter()
        .find(|a| a.asset_type == MediaAssetType::PhotoVertical)
        .unwrap();
    assert_eq!(photo.status, MediaAssetStatus::PendingUpload);
    assert_eq!(photo.raw_key(), Some(first.object_key.as_str()));
    assert_eq!(photo.checksum(), Some(front.checksum.as_str()));
    assert_eq!(photo.metadata[metadata_keys::REQUESTED_BY], "77");
    assert_eq!(photo.metadata[metadata_keys::CONTENT_TYPE], "image/jpeg");
}

#[tokio::test]
async fn test_rerequest_reuses_raw_key_and_resets_failed_asset() {
    let app = setup_test_app();
    app.seed_listing(10, ListingStatus::PendingPhotoProcessing).await;

    let first = app
        .service
        .request_upload_urls(upload_request(10, vec![photo_file("PHOTO_VERTICAL", 1, "front")]))
        .await
        .unwrap();

    let mut tx = app.ledger.begin().await.unwrap();
    let mut asset = tx
        .get_asset(10, MediaAssetType::PhotoVertical, 1)
        .await
        .unwrap()
        .unwrap();
    asset.mark_failed();
    tx.upsert_asset(&asset).await.unwrap();
    tx.commit().await.unwrap();

    let second = app
        .service
        .request_upload_urls(upload_request(10, vec![photo_file("PHOTO_VERTICAL", 1, "other")]))
        .await
        .unwrap();

    assert_eq!(second.files[0].object_key, first.files[0].object_key);
    let assets = app.ledger.assets().await;
    assert_eq!(assets.len(), 1);
    assert_eq!(assets[0].status, MediaAssetStatus::PendingUpload);
    assert_eq!(assets[0].metadata[metadata_keys::FILENAME], "other.jpg");
}

#[tokio::test]
async fn test_rerequest_of_processed_asset_drops_processed_key() {
    let app = setup_test_app();
    app.seed_listing(10, ListingStatus::PendingPhotoProcessing).await;
    app.service
        .request_upload_urls(upload_request(10, vec![photo_file("PHOTO_VERTICAL", 1, "front")]))
        .await
        .unwrap();

    let mut tx = app.ledger.begin().await.unwrap();
    let mut asset = tx
        .get_asset(10, MediaAssetType::PhotoVertical, 1)
        .await
        .unwrap()
        .unwrap();
    asset
        .mark_processed("10/processed/photo/vertical/large/vertical-01-front.jpg")
        .unwrap();
    tx.upsert_asset(&asset).await.unwrap();
    tx.commit().await.unwrap();

    app.service
        .request_upload_urls(upload_request(10, vec![photo_file("PHOTO_VERTICAL", 1, "front")]))
        .await
        .unwrap();

    let assets = app.ledger.assets().await;
    assert_eq!(assets[0].status, MediaAssetStatus::PendingUpload);
    assert_eq!(assets[0].processed_key(), None);
}

#[tokio::test]
async fn test_rejected_owner_listing_still_accepts_uploads() {
    let app = setup_test_app();
    app.seed_listing(11, ListingStatus::RejectedByOwner).await;

    let output = app
        .service
        .request_upload_urls(upload_request(11, vec![photo_file("PHOTO_HORIZONTAL", 1, "a")]))
        .await
        .unwrap();
    assert_eq!(output.files.len(), 1);
}

#[tokio::test]
async fn test_upload_rejections_leave_no_assets() {
    let app = setup_test_app();
    app.seed_listing(10, ListingStatus::Ready).await;

    let err = app
        .service
        .request_upload_urls(upload_request(10, vec![photo_file("PHOTO_VERTICAL", 1, "a")]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(err.message(), "listing is not awaiting media uploads");

    let err = app
        .service
        .request_upload_urls(upload_request(99, vec![photo_file("PHOTO_VERTICAL", 1, "a")]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = app
        .service
        .request_upload_urls(RequestUploadUrlsInput {
            listing_identity_id: 10,
            requested_by: 0,
            files: vec![photo_file("PHOTO_VERTICAL", 1, "a")],
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Auth);

    let mut bad = photo_file("PHOTO_VERTICAL", 1, "a");
    bad.content_type = "text/plain".into();
    let err = app
        .service
        .request_upload_urls(upload_request(10, vec![bad]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.message(), "unsupported content type");

    assert!(app.ledger.assets().await.is_empty());
}

#[tokio::test]
async fn test_project_uploads_are_gated() {
    let app = setup_test_app();
    app.seed_listing_with_type(20, ListingStatus::PendingPlanLoading, PropertyType::OffPlanHouse)
        .await;

    let err = app
        .service
        .request_project_upload_urls(upload_request(20, vec![project_file("PROJECT_DOC", 1, "plan")]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let app = setup_test_app_with(MediaProcessingConfig {
        allow_owner_project_upload: true,
        ..Default::default()
    });
    app.seed_listing_with_type(20, ListingStatus::PendingPlanLoading, PropertyType::OffPlanHouse)
        .await;
    app.seed_listing(21, ListingStatus::PendingPlanLoading).await;

    let err = app
        .service
        .request_project_upload_urls(upload_request(20, vec![photo_file("PHOTO_VERTICAL", 1, "a")]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.message(), "only project asset types are allowed");

    let err = app
        .service
        .request_project_upload_urls(upload_request(21, vec![project_file("PROJECT_DOC", 1, "plan")]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(err.message(), "project media is only accepted for off-plan listings");

    let output = app
        .service
        .request_project_upload_urls(upload_request(
            20,
            vec![
                project_file("PROJECT_DOC", 1, "plan"),
                project_file("PROJECT_RENDER", 1, "render"),
            ],
        ))
        .await
        .unwrap();
    assert_eq!(output.files.len(), 2);
    assert!(output.files[0].object_key.starts_with("20/raw/project/doc/"));
    assert!(app
        .ledger
        .assets()
        .await
        .iter()
        .all(|a| a.status == MediaAssetStatus::PendingUpload));
}
