//! Owner approval, download URLs, listing and deletion.
//!
//! Run with: `cargo test -p propmedia-services --test media_access_test`

mod helpers;

use helpers::fixtures::{callback, photo_file, processed, upload_photos, upload_request};
use helpers::{setup_test_app, setup_test_app_with, test_start, TestApp, DOWNLOAD_TTL_SECS, OWNER_ID};
use propmedia_core::models::{ListingStatus, MediaAsset, MediaAssetStatus, MediaAssetType};
use propmedia_core::{ErrorKind, MediaProcessingConfig};
use propmedia_services::{
    DeleteMediaInput, DownloadRequest, GenerateDownloadUrlsInput, HandleProcessingCallbackInput,
    ListDownloadUrlsInput, ListMediaInput, OwnerApprovalInput,
};

/// Uploads `tags` and processes every one except the last.
async fn partly_processed(app: &TestApp, tags: &[&str]) -> Vec<MediaAsset> {
    app.seed_listing(10, ListingStatus::PendingPhotoProcessing).await;
    let assets = upload_photos(app, 10, tags).await;
    let job = app.service.process_media(10).await.unwrap();
    let mut results = Vec::new();
    for asset in &assets[..assets.len() - 1] {
        let mut result = processed(
            asset,
            &format!("10/processed/photo/vertical/large/{}.jpg", asset.sequence),
        );
        if asset.sequence == 1 {
            result.thumbnail_key = "10/thumb/photo/vertical/thumbnail/1.jpg".into();
        }
        results.push(result);
    }
    app.service
        .handle_processing_callback(HandleProcessingCallbackInput {
            callback: callback(job.job_id, 10, "PARTIAL_SUCCESS", results),
            receipt_handle: None,
        })
        .await
        .unwrap();
    app.ledger.assets().await
}

fn approval(listing: i64, requested_by: i64, approve: bool) -> OwnerApprovalInput {
    OwnerApprovalInput {
        listing_identity_id: listing,
        requested_by,
        approve,
    }
}

#[tokio::test]
async fn test_owner_approval_transitions() {
    let app = setup_test_app();
    app.seed_listing(10, ListingStatus::PendingOwnerApproval).await;
    app.seed_listing(11, ListingStatus::PendingOwnerApproval).await;

    let output = app
        .service
        .handle_owner_media_approval(approval(10, OWNER_ID, true))
        .await
        .unwrap();
    assert_eq!(output.new_status, ListingStatus::Ready);
    assert_eq!(app.listing_status(10).await, ListingStatus::Ready);

    let output = app
        .service
        .handle_owner_media_approval(approval(11, OWNER_ID, false))
        .await
        .unwrap();
    assert_eq!(output.new_status, ListingStatus::RejectedByOwner);

    // Already decided.
    let err = app
        .service
        .handle_owner_media_approval(approval(10, OWNER_ID, true))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.message(), "listing is not awaiting owner approval");
}

#[tokio::test]
async fn test_owner_approval_with_admin_review() {
    let app = setup_test_app_with(MediaProcessingConfig {
        require_admin_review: true,
        ..Default::default()
    });
    app.seed_listing(10, ListingStatus::PendingOwnerApproval).await;

    let output = app
        .service
        .handle_owner_media_approval(approval(10, OWNER_ID, true))
        .await
        .unwrap();
    assert_eq!(output.new_status, ListingStatus::PendingAdminReview);
}

#[tokio::test]
async fn test_only_owner_can_decide() {
    let app = setup_test_app();
    app.seed_listing(10, ListingStatus::PendingOwnerApproval).await;

    let err = app
        .service
        .handle_owner_media_approval(approval(10, OWNER_ID + 1, true))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = app
        .service
        .handle_owner_media_approval(approval(10, 0, true))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Auth);

    let err = app
        .service
        .handle_owner_media_approval(approval(404, OWNER_ID, true))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(app.listing_status(10).await, ListingStatus::PendingOwnerApproval);
}

#[tokio::test]
async fn test_generate_download_urls_skips_unservable_requests() {
    let app = setup_test_app();
    partly_processed(&app, &["a", "b"]).await;

    let request = |sequence: i32, resolution: &str| DownloadRequest {
        asset_type: MediaAssetType::PhotoVertical,
        sequence,
        resolution: resolution.to_string(),
    };
    let output = app
        .service
        .generate_download_urls(GenerateDownloadUrlsInput {
            listing_identity_id: 10,
            requests: vec![
                request(1, "large"),
                request(1, "gigantic"),
                request(2, "large"),
                request(2, "ORIGINAL"),
                request(9, "large"),
            ],
        })
        .await
        .unwrap();

    assert_eq!(output.urls.len(), 2);
    let large = &output.urls[0];
    assert_eq!(large.sequence, 1);
    assert_eq!(large.resolution, "large");
    assert!(large.object_key.starts_with("10/processed/photo/vertical/large/"));
    assert_eq!(large.expires_in, DOWNLOAD_TTL_SECS);

    // Unprocessed asset: the original falls back to the raw upload.
    let original = &output.urls[1];
    assert_eq!(original.sequence, 2);
    assert_eq!(original.resolution, "original");
    assert!(original.object_key.starts_with("10/raw/photo/vertical/"));

    let err = app
        .service
        .generate_download_urls(GenerateDownloadUrlsInput {
            listing_identity_id: 10,
            requests: vec![],
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_list_download_urls() {
    let app = setup_test_app();
    partly_processed(&app, &["a", "b", "c"]).await;

    let output = app
        .service
        .list_download_urls(ListDownloadUrlsInput {
            listing_identity_id: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(output.ttl_seconds, DOWNLOAD_TTL_SECS);
    assert_eq!(output.generated_at, test_start());
    assert_eq!(output.downloads.len(), 3);

    let first = &output.downloads[0];
    assert_eq!(first.status, MediaAssetStatus::Processed);
    assert!(first.url.as_deref().unwrap().contains("/large/"));
    assert!(first.preview_url.as_deref().unwrap().contains("/thumbnail/"));
    assert_eq!(
        first.expires_at,
        Some(test_start() + chrono::Duration::seconds(DOWNLOAD_TTL_SECS as i64))
    );

    let second = &output.downloads[1];
    assert!(second.url.is_some());
    assert!(second.preview_url.is_none());

    let pending = &output.downloads[2];
    assert_eq!(pending.status, MediaAssetStatus::Processing);
    assert!(pending.url.is_none());
    assert!(pending.expires_at.is_none());

    let small = app
        .service
        .list_download_urls(ListDownloadUrlsInput {
            listing_identity_id: 10,
            asset_types: vec![MediaAssetType::PhotoVertical],
            resolution: Some("small".to_string()),
        })
        .await
        .unwrap();
    assert!(small.downloads[0].url.as_deref().unwrap().contains("/small/"));

    let none = app
        .service
        .list_download_urls(ListDownloadUrlsInput {
            listing_identity_id: 10,
            asset_types: vec![MediaAssetType::VideoHorizontal],
            resolution: None,
        })
        .await
        .unwrap();
    assert!(none.downloads.is_empty());

    let err = app
        .service
        .list_download_urls(ListDownloadUrlsInput {
            listing_identity_id: 10,
            resolution: Some("huge".to_string()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.message(), "invalid resolution");
}

#[tokio::test]
async fn test_list_media_pages_and_filters() {
    let app = setup_test_app();
    app.seed_listing(10, ListingStatus::PendingPhotoProcessing).await;
    upload_photos(&app, 10, &["a", "b", "c", "d", "e"]).await;
    app.service
        .request_upload_urls(upload_request(10, vec![photo_file("PHOTO_HORIZONTAL", 1, "wide")]))
        .await
        .unwrap();

    let list = |page: i64, page_size: i64, asset_type: Option<MediaAssetType>| ListMediaInput {
        listing_identity_id: 10,
        asset_type,
        sequence: None,
        page,
        page_size,
    };

    let first = app.service.list_media(list(1, 4, None)).await.unwrap();
    assert_eq!(first.total_count, 6);
    assert_eq!(first.assets.len(), 4);
    assert!(first.zip_bundle.is_none());

    let last = app.service.list_media(list(2, 4, None)).await.unwrap();
    assert_eq!(last.assets.len(), 2);

    let vertical = app
        .service
        .list_media(list(0, 0, Some(MediaAssetType::PhotoVertical)))
        .await
        .unwrap();
    assert_eq!(vertical.page, 1);
    assert_eq!(vertical.page_size, 20);
    assert_eq!(vertical.total_count, 5);

    let capped = app.service.list_media(list(1, 1000, None)).await.unwrap();
    assert_eq!(capped.page_size, 100);

    let single = app
        .service
        .list_media(ListMediaInput {
            sequence: Some(3),
            ..list(1, 20, Some(MediaAssetType::PhotoVertical))
        })
        .await
        .unwrap();
    assert_eq!(single.total_count, 1);
    assert_eq!(single.assets[0].sequence, 3);
}

#[tokio::test]
async fn test_delete_media_removes_row_and_objects() {
    let app = setup_test_app();
    let assets = partly_processed(&app, &["a", "b"]).await;
    let raw_key = assets[0].raw_key().unwrap().to_string();

    app.service
        .delete_media(DeleteMediaInput {
            listing_identity_id: 10,
            asset_type: MediaAssetType::PhotoVertical,
            sequence: 1,
        })
        .await
        .unwrap();

    let remaining = app.ledger.assets().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].sequence, 2);
    assert!(app.storage.download_file(&raw_key).await.is_err());
    assert!(app
        .storage
        .download_file(assets[1].raw_key().unwrap())
        .await
        .is_ok());

    let err = app
        .service
        .delete_media(DeleteMediaInput {
            listing_identity_id: 10,
            asset_type: MediaAssetType::PhotoVertical,
            sequence: 1,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.message(), "asset not found");
}
