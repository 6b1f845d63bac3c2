use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use propmedia_core::models::{MediaProcessingJob, MediaProcessingProvider};

use super::{terminal_job_statuses, PgLedgerSession};
use crate::db::ledger::JobStore;

const JOB_COLUMNS: &str = "id, listing_identity_id, batch_id, status, provider, external_id, \
     payload, retry_count, started_at, completed_at, last_error, callback_body, created_at";

#[async_trait]
impl JobStore for PgLedgerSession {
    #[tracing::instrument(skip(self, job), fields(listing_identity_id = job.listing_identity_id, provider = %job.provider))]
    async fn register_processing_job(&mut self, job: &MediaProcessingJob) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO media_processing_jobs (
                listing_identity_id, batch_id, status, provider, external_id, payload,
                retry_count, started_at, completed_at, last_error, callback_body,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW())
            RETURNING id
            "#,
        )
        .bind(job.listing_identity_id)
        .bind(job.batch_id)
        .bind(job.status.as_str())
        .bind(job.provider.as_str())
        .bind(job.external_id.as_deref())
        .bind(job.payload_json())
        .bind(job.retry_count)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.last_error.as_deref())
        .bind(job.callback_body.as_deref())
        .bind(job.created_at)
        .fetch_one(self.conn()?)
        .await
        .context("Failed to register processing job")?;

        Ok(id)
    }

    async fn get_processing_job_by_id(&mut self, job_id: i64) -> Result<Option<MediaProcessingJob>> {
        let sql = format!(
            "SELECT {} FROM media_processing_jobs WHERE id = $1 FOR UPDATE",
            JOB_COLUMNS
        );
        let job = sqlx::query_as::<_, MediaProcessingJob>(&sql)
            .bind(job_id)
            .fetch_optional(self.conn()?)
            .await
            .context("Failed to load processing job")?;

        Ok(job)
    }

    #[tracing::instrument(skip(self, job), fields(job_id = job.id, status = %job.status))]
    async fn update_processing_job(&mut self, job: &MediaProcessingJob) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE media_processing_jobs
            SET batch_id = $2,
                status = $3,
                external_id = $4,
                payload = $5,
                retry_count = $6,
                started_at = $7,
                completed_at = $8,
                last_error = $9,
                callback_body = $10,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(job.batch_id)
        .bind(job.status.as_str())
        .bind(job.external_id.as_deref())
        .bind(job.payload_json())
        .bind(job.retry_count)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.last_error.as_deref())
        .bind(job.callback_body.as_deref())
        .execute(self.conn()?)
        .await
        .context("Failed to update processing job")?;

        if result.rows_affected() == 0 {
            anyhow::bail!("Processing job {} does not exist", job.id);
        }
        Ok(())
    }

    async fn get_latest_finalization_job(
        &mut self,
        listing_identity_id: i64,
    ) -> Result<Option<MediaProcessingJob>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM media_processing_jobs
            WHERE listing_identity_id = $1 AND provider = $2
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
            JOB_COLUMNS
        );
        let job = sqlx::query_as::<_, MediaProcessingJob>(&sql)
            .bind(listing_identity_id)
            .bind(MediaProcessingProvider::StepFunctionsFinalization.as_str())
            .fetch_optional(self.conn()?)
            .await
            .context("Failed to load latest finalization job")?;

        Ok(job)
    }

    #[tracing::instrument(skip(self))]
    async fn list_stuck_jobs(
        &mut self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<MediaProcessingJob>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM media_processing_jobs
            WHERE status = 'RUNNING'
              AND started_at IS NOT NULL
              AND started_at < $1
              AND completed_at IS NULL
            ORDER BY started_at ASC, id ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            "#,
            JOB_COLUMNS
        );
        let jobs = sqlx::query_as::<_, MediaProcessingJob>(&sql)
            .bind(cutoff)
            .bind(limit)
            .fetch_all(self.conn()?)
            .await
            .context("Failed to list stuck processing jobs")?;

        Ok(jobs)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_old_jobs(&mut self, cutoff: DateTime<Utc>, limit: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM media_processing_jobs
            WHERE id IN (
                SELECT id
                FROM media_processing_jobs
                WHERE status = ANY($1)
                  AND COALESCE(completed_at, created_at) < $2
                ORDER BY id
                LIMIT $3
            )
            "#,
        )
        .bind(terminal_job_statuses())
        .bind(cutoff)
        .bind(limit)
        .execute(self.conn()?)
        .await
        .context("Failed to delete old processing jobs")?;

        Ok(result.rows_affected())
    }
}
