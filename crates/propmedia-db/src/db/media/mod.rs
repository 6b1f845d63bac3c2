//! Postgres ledger
//!
//! `PgMediaLedger` hands out `PgLedgerSession`s, each wrapping one sqlx
//! transaction. The store traits are implemented per entity in the sibling
//! modules against that shared transaction.

mod asset;
mod batch;
mod job;
mod listing;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};

use super::ledger::{LedgerSession, MediaLedger};
use super::transaction::TransactionGuard;

#[derive(Clone)]
pub struct PgMediaLedger {
    pool: PgPool,
}

impl PgMediaLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl MediaLedger for PgMediaLedger {
    async fn begin(&self) -> Result<TransactionGuard> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin database transaction")?;
        Ok(TransactionGuard::new(Box::new(PgLedgerSession { tx: Some(tx) })))
    }

    async fn begin_read_only(&self) -> Result<TransactionGuard> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin database transaction")?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .context("Failed to mark transaction read-only")?;
        Ok(TransactionGuard::new(Box::new(PgLedgerSession { tx: Some(tx) })))
    }
}

/// One sqlx transaction. Dropping an unfinished session rolls it back.
pub struct PgLedgerSession {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgLedgerSession {
    fn conn(&mut self) -> Result<&mut PgConnection> {
        self.tx
            .as_deref_mut()
            .context("Transaction was already committed or rolled back")
    }
}

#[async_trait]
impl LedgerSession for PgLedgerSession {
    async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit()
                .await
                .context("Failed to commit database transaction")?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback()
                .await
                .context("Failed to rollback database transaction")?;
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.tx.is_some()
    }
}

/// Terminal job statuses bound as a `text[]` parameter.
pub(crate) fn terminal_job_statuses() -> Vec<String> {
    propmedia_core::models::MediaProcessingJobStatus::TERMINAL
        .iter()
        .map(|s| s.as_str().to_string())
        .collect()
}
