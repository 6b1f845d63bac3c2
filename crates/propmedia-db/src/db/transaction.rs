//! Transaction guard over a ledger session
//!
//! Services open one guard per use case, run every read and write through it and
//! finish with an explicit `commit`. A guard that is dropped without commit
//! discards its changes.

use anyhow::Result;
use std::ops::{Deref, DerefMut};

use super::ledger::LedgerSession;

/// Owns an open ledger session until it is committed or rolled back.
///
/// # Example
///
/// ```ignore
/// let mut tx = ledger.begin().await?;
/// let job = tx.get_processing_job_by_id(job_id).await?;
/// tx.update_processing_job(&job).await?;
/// tx.commit().await?;
/// ```
pub struct TransactionGuard {
    session: Box<dyn LedgerSession>,
    committed: bool,
}

impl TransactionGuard {
    pub fn new(session: Box<dyn LedgerSession>) -> Self {
        Self {
            session,
            committed: false,
        }
    }

    /// Commit the transaction. The guard is consumed.
    pub async fn commit(mut self) -> Result<()> {
        self.session.commit().await?;
        self.committed = true;
        Ok(())
    }

    /// Roll back the transaction. The guard is consumed.
    pub async fn rollback(mut self) -> Result<()> {
        self.session.rollback().await
    }
}

impl Deref for TransactionGuard {
    type Target = dyn LedgerSession;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl DerefMut for TransactionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session.as_mut()
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        if !self.committed && self.session.is_active() {
            tracing::debug!("Transaction dropped without commit - rolling back");
        }
    }
}
