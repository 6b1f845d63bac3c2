//! Long-running service role.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use propmedia_core::Config;
use propmedia_db::{setup_database, PgMediaLedger};
use propmedia_infra::{CallbackSource, JobQueue, SfnWorkflowGateway, SqsQueueGateway};
use propmedia_services::{CallbackConsumer, MaintenanceService, MediaProcessingService};
use propmedia_storage::{create_storage, MediaStorageGateway};

/// Wired collaborators of the `serve` role.
pub struct Runtime {
    consumer: CallbackConsumer,
    maintenance: Arc<MaintenanceService>,
}

impl Runtime {
    pub fn new(service: MediaProcessingService, callbacks: Arc<dyn CallbackSource>) -> Self {
        let maintenance = Arc::new(MaintenanceService::new(service.clone(), service.config()));
        Self {
            consumer: CallbackConsumer::new(service, callbacks),
            maintenance,
        }
    }

    /// Connects Postgres (running migrations), the object store, the queues and
    /// the finalization workflow.
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = setup_database(&config.database).await?;
        let ledger = Arc::new(PgMediaLedger::new(pool));

        let storage = create_storage(&config.storage)
            .await
            .context("Failed to initialize storage")?;
        let gateway = MediaStorageGateway::from_config(storage, &config.storage);

        let queues = Arc::new(SqsQueueGateway::from_config(&config.queue).await);
        let jobs: Arc<dyn JobQueue> = queues.clone();
        let callbacks: Arc<dyn CallbackSource> = queues;
        let workflow = Arc::new(SfnWorkflowGateway::from_config(&config.workflow).await);

        tracing::info!(
            storage_backend = ?config.storage.backend,
            "Media processing runtime connected"
        );

        let service =
            MediaProcessingService::new(ledger, gateway, jobs, workflow, config.media.clone());
        Ok(Self::new(service, callbacks))
    }

    /// Runs the consumer and the maintenance loops until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let maintenance = self.maintenance.clone().start(shutdown.clone());
        self.consumer.run(shutdown).await;
        maintenance.await.context("Maintenance task panicked")?;
        tracing::info!("Media processing runtime stopped");
        Ok(())
    }
}
