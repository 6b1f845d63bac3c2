//! Stuck-job reconciliation and ledger retention.

use std::time::Duration;

use chrono::{DateTime, Utc};
use propmedia_core::config::clamp_retention_limit;
use propmedia_core::models::{MediaAssetStatus, MediaProcessingJobPayload, MediaProcessingJobStatus};
use propmedia_core::{AppError, AppResult};

use super::{LedgerResultExt, MediaProcessingService};

/// Upper bound on jobs rescued per reconciler pass.
pub const STUCK_JOB_SCAN_LIMIT: i64 = 200;

impl MediaProcessingService {
    /// Fails RUNNING jobs that have not called back within `timeout` and
    /// releases their listings' PROCESSING assets. Returns the number of jobs
    /// failed. A zero timeout disables the pass.
    #[tracing::instrument(skip(self), fields(timeout = %format_duration(timeout)))]
    pub async fn reconcile_stuck_jobs(&self, timeout: Duration) -> AppResult<usize> {
        if timeout.is_zero() {
            return Ok(0);
        }
        let timeout_delta = chrono::Duration::from_std(timeout)
            .map_err(|e| AppError::infra("invalid reconciler timeout", e))?;

        let now = self.clock.now();
        let cutoff = now - timeout_delta;

        let mut tx = self.begin().await?;
        let jobs = tx
            .list_stuck_jobs(cutoff, STUCK_JOB_SCAN_LIMIT)
            .await
            .or_infra("failed to list stuck jobs")?;
        if jobs.is_empty() {
            return Ok(0);
        }

        let reason = format!(
            "reconciler marked failed after {} without callback",
            format_duration(timeout)
        );
        for mut job in jobs.iter().cloned() {
            job.mark_completed(
                MediaProcessingJobStatus::Failed,
                MediaProcessingJobPayload::default(),
                now,
            );
            job.append_error(&reason);
            tx.update_processing_job(&job)
                .await
                .or_infra("failed to update stuck job")?;

            let released = tx
                .bulk_update_asset_status(
                    job.listing_identity_id,
                    MediaAssetStatus::Processing,
                    MediaAssetStatus::Failed,
                )
                .await
                .or_infra("failed to fail processing assets")?;
            tracing::debug!(
                job_id = job.id,
                listing_identity_id = job.listing_identity_id,
                assets = released,
                "Stuck job failed"
            );
        }

        self.commit(tx, "failed to commit reconciliation").await?;

        tracing::warn!(
            jobs = jobs.len(),
            cutoff = %cutoff,
            "Reconciler failed stuck media processing jobs"
        );
        Ok(jobs.len())
    }

    /// Deletes terminal jobs that completed before `cutoff`. `limit` is
    /// clamped to the supported range. Returns the number of rows removed.
    #[tracing::instrument(skip(self))]
    pub async fn clean_old_jobs(&self, cutoff: DateTime<Utc>, limit: i64) -> AppResult<u64> {
        let limit = clamp_retention_limit(limit);

        let mut tx = self.begin().await?;
        let deleted = tx
            .delete_old_jobs(cutoff, limit)
            .await
            .or_infra("failed to delete old jobs")?;
        self.commit(tx, "failed to commit job retention").await?;

        tracing::info!(
            counter.media_jobs_deleted = deleted,
            cutoff = %cutoff,
            limit,
            "Old media processing jobs deleted"
        );
        Ok(deleted)
    }

    /// Deletes terminal jobs older than `retention_days`.
    pub async fn apply_retention(&self, retention_days: i64, limit: i64) -> AppResult<u64> {
        if retention_days <= 0 {
            return Ok(0);
        }
        let cutoff = self.clock.now() - chrono::Duration::days(retention_days);
        self.clean_old_jobs(cutoff, limit).await
    }
}

/// Renders a duration as `1h0m0s`, `2m30s`, `45s` or `1.5s`.
pub(crate) fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let nanos = duration.subsec_nanos();
    if total == 0 && nanos == 0 {
        return "0s".to_string();
    }

    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    let mut secs = seconds.to_string();
    if nanos > 0 {
        let fraction = format!("{:09}", nanos);
        secs.push('.');
        secs.push_str(fraction.trim_end_matches('0'));
    }

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}
