use anyhow::{Context, Result};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::path::Path;
use std::time::Duration;

use propmedia_core::DatabaseConfig;

/// Connect the pool and apply pending migrations.
pub async fn setup_database(config: &DatabaseConfig) -> Result<PgPool> {
    tracing::info!(
        max_connections = config.max_connections,
        timeout_seconds = config.timeout_seconds,
        "Connecting to database"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.timeout_seconds))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Running database migrations");
    let migrations = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
    Migrator::new(migrations)
        .await
        .context("Failed to load migrations")?
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    Ok(pool)
}
