use anyhow::{Context, Result};
use async_trait::async_trait;

use propmedia_core::models::{MediaAsset, MediaAssetStatus, MediaAssetType};

use super::PgLedgerSession;
use crate::db::ledger::{AssetFilter, AssetStore, Pagination};

const ASSET_COLUMNS: &str = "id, listing_identity_id, batch_id, asset_type, sequence, status, \
     s3_key_raw, s3_key_processed, title, metadata";

#[async_trait]
impl AssetStore for PgLedgerSession {
    #[tracing::instrument(skip(self, asset), fields(listing_identity_id = asset.listing_identity_id, asset_type = %asset.asset_type, sequence = asset.sequence))]
    async fn upsert_asset(&mut self, asset: &MediaAsset) -> Result<MediaAsset> {
        let sql = format!(
            r#"
            INSERT INTO media_assets (
                listing_identity_id, batch_id, asset_type, sequence, status,
                s3_key_raw, s3_key_processed, title, metadata, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW())
            ON CONFLICT (listing_identity_id, asset_type, sequence) DO UPDATE SET
                batch_id = EXCLUDED.batch_id,
                status = EXCLUDED.status,
                s3_key_raw = EXCLUDED.s3_key_raw,
                s3_key_processed = EXCLUDED.s3_key_processed,
                title = EXCLUDED.title,
                metadata = EXCLUDED.metadata,
                updated_at = NOW()
            RETURNING {}
            "#,
            ASSET_COLUMNS
        );
        let stored = sqlx::query_as::<_, MediaAsset>(&sql)
            .bind(asset.listing_identity_id)
            .bind(asset.batch_id)
            .bind(asset.asset_type.as_str())
            .bind(asset.sequence)
            .bind(asset.status.as_str())
            .bind(asset.raw_key())
            .bind(asset.processed_key())
            .bind(asset.title.as_deref())
            .bind(asset.metadata_json())
            .fetch_one(self.conn()?)
            .await
            .context("Failed to upsert media asset")?;

        Ok(stored)
    }

    async fn get_asset(
        &mut self,
        listing_identity_id: i64,
        asset_type: MediaAssetType,
        sequence: i32,
    ) -> Result<Option<MediaAsset>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM media_assets
            WHERE listing_identity_id = $1 AND asset_type = $2 AND sequence = $3
            "#,
            ASSET_COLUMNS
        );
        let asset = sqlx::query_as::<_, MediaAsset>(&sql)
            .bind(listing_identity_id)
            .bind(asset_type.as_str())
            .bind(sequence)
            .fetch_optional(self.conn()?)
            .await
            .context("Failed to load media asset")?;

        Ok(asset)
    }

    async fn get_asset_by_sequence(
        &mut self,
        listing_identity_id: i64,
        asset_type: MediaAssetType,
        sequence: i32,
    ) -> Result<Option<MediaAsset>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM media_assets
            WHERE listing_identity_id = $1 AND asset_type = $2 AND sequence = $3
            FOR UPDATE
            "#,
            ASSET_COLUMNS
        );
        let asset = sqlx::query_as::<_, MediaAsset>(&sql)
            .bind(listing_identity_id)
            .bind(asset_type.as_str())
            .bind(sequence)
            .fetch_optional(self.conn()?)
            .await
            .context("Failed to lock media asset")?;

        Ok(asset)
    }

    async fn get_asset_by_id(&mut self, asset_id: i64) -> Result<Option<MediaAsset>> {
        let sql = format!("SELECT {} FROM media_assets WHERE id = $1", ASSET_COLUMNS);
        let asset = sqlx::query_as::<_, MediaAsset>(&sql)
            .bind(asset_id)
            .fetch_optional(self.conn()?)
            .await
            .context("Failed to load media asset by id")?;

        Ok(asset)
    }

    async fn get_asset_by_raw_key(
        &mut self,
        listing_identity_id: i64,
        raw_key: &str,
    ) -> Result<Option<MediaAsset>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM media_assets
            WHERE listing_identity_id = $1 AND s3_key_raw = $2
            ORDER BY id
            LIMIT 1
            "#,
            ASSET_COLUMNS
        );
        let asset = sqlx::query_as::<_, MediaAsset>(&sql)
            .bind(listing_identity_id)
            .bind(raw_key)
            .fetch_optional(self.conn()?)
            .await
            .context("Failed to load media asset by raw key")?;

        Ok(asset)
    }

    #[tracing::instrument(skip(self, filter))]
    async fn list_assets(
        &mut self,
        listing_identity_id: i64,
        filter: &AssetFilter,
        pagination: Option<Pagination>,
    ) -> Result<Vec<MediaAsset>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM media_assets
            WHERE listing_identity_id = $1
              AND ($2::text[] IS NULL OR asset_type = ANY($2))
              AND ($3::text[] IS NULL OR status = ANY($3))
              AND ($4::int IS NULL OR sequence = $4)
            ORDER BY asset_type ASC, sequence ASC
            LIMIT $5 OFFSET $6
            "#,
            ASSET_COLUMNS
        );
        let assets = sqlx::query_as::<_, MediaAsset>(&sql)
            .bind(listing_identity_id)
            .bind(filter.type_names())
            .bind(filter.status_names())
            .bind(filter.sequence)
            .bind(pagination.map(|p| p.limit))
            .bind(pagination.map(|p| p.offset))
            .fetch_all(self.conn()?)
            .await
            .context("Failed to list media assets")?;

        Ok(assets)
    }

    async fn count_assets(
        &mut self,
        listing_identity_id: i64,
        filter: &AssetFilter,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM media_assets
            WHERE listing_identity_id = $1
              AND ($2::text[] IS NULL OR asset_type = ANY($2))
              AND ($3::text[] IS NULL OR status = ANY($3))
              AND ($4::int IS NULL OR sequence = $4)
            "#,
        )
        .bind(listing_identity_id)
        .bind(filter.type_names())
        .bind(filter.status_names())
        .bind(filter.sequence)
        .fetch_one(self.conn()?)
        .await
        .context("Failed to count media assets")?;

        Ok(count)
    }

    async fn list_assets_by_batch(&mut self, batch_id: i64) -> Result<Vec<MediaAsset>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM media_assets
            WHERE batch_id = $1
            ORDER BY asset_type ASC, sequence ASC
            "#,
            ASSET_COLUMNS
        );
        let assets = sqlx::query_as::<_, MediaAsset>(&sql)
            .bind(batch_id)
            .fetch_all(self.conn()?)
            .await
            .context("Failed to list batch assets")?;

        Ok(assets)
    }

    #[tracing::instrument(skip(self))]
    async fn bulk_update_asset_status(
        &mut self,
        listing_identity_id: i64,
        from: MediaAssetStatus,
        to: MediaAssetStatus,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE media_assets
            SET status = $3, updated_at = NOW()
            WHERE listing_identity_id = $1 AND status = $2
            "#,
        )
        .bind(listing_identity_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(self.conn()?)
        .await
        .context("Failed to update media asset statuses")?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_asset(
        &mut self,
        listing_identity_id: i64,
        asset_type: MediaAssetType,
        sequence: i32,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM media_assets
            WHERE listing_identity_id = $1 AND asset_type = $2 AND sequence = $3
            "#,
        )
        .bind(listing_identity_id)
        .bind(asset_type.as_str())
        .bind(sequence)
        .execute(self.conn()?)
        .await
        .context("Failed to delete media asset")?;

        Ok(result.rows_affected() > 0)
    }
}
