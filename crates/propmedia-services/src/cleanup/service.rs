use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use propmedia_core::MediaProcessingConfig;

use crate::media::MediaProcessingService;

/// Background loops for the stuck-job reconciler and job retention.
#[derive(Clone)]
pub struct MaintenanceService {
    media: MediaProcessingService,
    stuck_job_timeout: Duration,
    reconcile_interval: Duration,
    retention_days: i64,
    retention_limit: i64,
    retention_interval: Duration,
}

impl MaintenanceService {
    pub fn new(media: MediaProcessingService, config: &MediaProcessingConfig) -> Self {
        Self {
            media,
            stuck_job_timeout: config.stuck_job_timeout,
            reconcile_interval: config.reconcile_interval,
            retention_days: config.retention_days,
            retention_limit: config.retention_limit,
            retention_interval: config.retention_interval,
        }
    }

    /// Start both loops; they stop once `shutdown` is cancelled. A zero
    /// interval disables its loop; retention is also disabled when
    /// `retention_days` is not positive.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let reconcile = !self.reconcile_interval.is_zero() && !self.stuck_job_timeout.is_zero();
            let retention = !self.retention_interval.is_zero() && self.retention_days > 0;
            if !reconcile && !retention {
                tracing::info!("Media maintenance disabled");
                return;
            }

            let mut reconcile_tick = interval(non_zero(self.reconcile_interval));
            reconcile_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut retention_tick = interval(non_zero(self.retention_interval));
            retention_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("Media maintenance stopped");
                        break;
                    }
                    _ = reconcile_tick.tick(), if reconcile => self.run_reconciler().await,
                    _ = retention_tick.tick(), if retention => self.run_retention().await,
                }
            }
        })
    }

    #[tracing::instrument(skip(self), fields(maintenance.operation = "reconcile"))]
    pub async fn run_reconciler(&self) {
        match self.media.reconcile_stuck_jobs(self.stuck_job_timeout).await {
            Ok(0) => tracing::debug!("No stuck media processing jobs"),
            Ok(count) => tracing::info!(count, "Reconciler pass completed"),
            Err(e) => tracing::error!(error = %e, "Reconciler pass failed"),
        }
    }

    #[tracing::instrument(skip(self), fields(maintenance.operation = "retention"))]
    pub async fn run_retention(&self) {
        match self
            .media
            .apply_retention(self.retention_days, self.retention_limit)
            .await
        {
            Ok(deleted) => tracing::info!(deleted, "Retention pass completed"),
            Err(e) => tracing::error!(error = %e, "Retention pass failed"),
        }
    }
}

// `interval` panics on a zero period; disabled loops still need a valid timer.
fn non_zero(period: Duration) -> Duration {
    if period.is_zero() {
        Duration::from_secs(3600)
    } else {
        period
    }
}
