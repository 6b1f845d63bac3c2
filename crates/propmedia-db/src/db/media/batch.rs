use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use propmedia_core::models::{BatchStatus, MediaBatch};

use super::PgLedgerSession;
use crate::db::ledger::BatchStore;

const BATCH_COLUMNS: &str =
    "id, listing_identity_id, reference, status, status_metadata, created_at, deleted_at";

fn metadata_json(batch: &MediaBatch) -> Result<String> {
    serde_json::to_string(&batch.status_metadata).context("Failed to encode batch status metadata")
}

#[async_trait]
impl BatchStore for PgLedgerSession {
    #[tracing::instrument(skip(self, batch), fields(listing_identity_id = batch.listing_identity_id))]
    async fn create_batch(&mut self, batch: &MediaBatch) -> Result<i64> {
        let metadata = metadata_json(batch)?;
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO media_batches (
                listing_identity_id, reference, status, status_metadata, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING id
            "#,
        )
        .bind(batch.listing_identity_id)
        .bind(&batch.reference)
        .bind(batch.status.as_str())
        .bind(metadata)
        .bind(batch.created_at)
        .fetch_one(self.conn()?)
        .await
        .context("Failed to create media batch")?;

        Ok(id)
    }

    async fn get_batch(
        &mut self,
        listing_identity_id: i64,
        batch_id: i64,
    ) -> Result<Option<MediaBatch>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM media_batches
            WHERE id = $1 AND listing_identity_id = $2 AND deleted_at IS NULL
            FOR UPDATE
            "#,
            BATCH_COLUMNS
        );
        let batch = sqlx::query_as::<_, MediaBatch>(&sql)
            .bind(batch_id)
            .bind(listing_identity_id)
            .fetch_optional(self.conn()?)
            .await
            .context("Failed to load media batch")?;

        Ok(batch)
    }

    #[tracing::instrument(skip(self, batch), fields(batch_id = batch.id, status = %batch.status))]
    async fn update_batch_status(&mut self, batch: &MediaBatch) -> Result<()> {
        let metadata = metadata_json(batch)?;
        sqlx::query(
            r#"
            UPDATE media_batches
            SET status = $2, status_metadata = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(batch.id)
        .bind(batch.status.as_str())
        .bind(metadata)
        .execute(self.conn()?)
        .await
        .context("Failed to update media batch status")?;

        Ok(())
    }

    async fn has_open_batch(&mut self, listing_identity_id: i64) -> Result<bool> {
        let open: Vec<String> = BatchStatus::OPEN
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM media_batches
                WHERE listing_identity_id = $1
                  AND status = ANY($2)
                  AND deleted_at IS NULL
            )
            "#,
        )
        .bind(listing_identity_id)
        .bind(open)
        .fetch_one(self.conn()?)
        .await
        .context("Failed to check for open media batches")?;

        Ok(exists)
    }

    async fn soft_delete_batch(
        &mut self,
        listing_identity_id: i64,
        batch_id: i64,
        deleted_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE media_batches
            SET deleted_at = $3, updated_at = NOW()
            WHERE id = $1 AND listing_identity_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(batch_id)
        .bind(listing_identity_id)
        .bind(deleted_at)
        .execute(self.conn()?)
        .await
        .context("Failed to delete media batch")?;

        Ok(result.rows_affected() > 0)
    }
}
