use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    PendingUpload,
    Received,
    Processing,
    Ready,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::PendingUpload => "PENDING_UPLOAD",
            BatchStatus::Received => "RECEIVED",
            BatchStatus::Processing => "PROCESSING",
            BatchStatus::Ready => "READY",
            BatchStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Ready | BatchStatus::Failed)
    }

    /// Open batches block the creation of another batch for the same listing.
    pub const OPEN: [BatchStatus; 3] = [
        BatchStatus::PendingUpload,
        BatchStatus::Received,
        BatchStatus::Processing,
    ];

    fn rank(&self) -> u8 {
        match self {
            BatchStatus::PendingUpload => 0,
            BatchStatus::Received => 1,
            BatchStatus::Processing => 2,
            BatchStatus::Ready | BatchStatus::Failed => 3,
        }
    }
}

impl Display for BatchStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING_UPLOAD" => Ok(BatchStatus::PendingUpload),
            "RECEIVED" => Ok(BatchStatus::Received),
            "PROCESSING" => Ok(BatchStatus::Processing),
            "READY" => Ok(BatchStatus::Ready),
            "FAILED" => Ok(BatchStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid batch status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchStatusMetadata {
    pub message: String,
    pub reason: String,
    pub details: BTreeMap<String, String>,
    pub updated_by: i64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl BatchStatusMetadata {
    pub fn new(message: impl Into<String>, updated_by: i64, updated_at: DateTime<Utc>) -> Self {
        Self {
            message: message.into(),
            reason: String::new(),
            details: BTreeMap::new(),
            updated_by,
            updated_at: Some(updated_at),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.details.insert(key.into(), value.to_string());
        self
    }

    /// Reason when present, else the message.
    pub fn display_message(&self) -> &str {
        if self.reason.trim().is_empty() {
            &self.message
        } else {
            &self.reason
        }
    }
}

/// Upload batch aggregating the assets of one legacy upload round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaBatch {
    pub id: i64,
    pub listing_identity_id: i64,
    pub reference: String,
    pub status: BatchStatus,
    pub status_metadata: BatchStatusMetadata,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl MediaBatch {
    pub fn new(
        listing_identity_id: i64,
        reference: impl Into<String>,
        metadata: BatchStatusMetadata,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            listing_identity_id,
            reference: reference.into(),
            status: BatchStatus::PendingUpload,
            status_metadata: metadata,
            created_at,
            deleted_at: None,
        }
    }

    /// Forward-only transition. Terminal batches reject every write.
    pub fn transition(&mut self, to: BatchStatus, metadata: BatchStatusMetadata) -> AppResult<()> {
        if self.status.is_terminal() {
            return Err(AppError::conflict("batch is already in a terminal state")
                .with_detail("batchId", self.id)
                .with_detail("status", self.status.as_str()));
        }
        if to.rank() < self.status.rank() {
            return Err(AppError::conflict("batch status cannot move backwards")
                .with_detail("batchId", self.id)
                .with_detail("from", self.status.as_str())
                .with_detail("to", to.as_str()));
        }
        self.status = to;
        self.status_metadata = metadata;
        Ok(())
    }

    /// READY/FAILED -> PROCESSING for an explicit retry.
    pub fn reopen_for_retry(&mut self, metadata: BatchStatusMetadata) -> AppResult<()> {
        if !self.status.is_terminal() {
            return Err(AppError::conflict("batch is not in a terminal state")
                .with_detail("batchId", self.id)
                .with_detail("status", self.status.as_str()));
        }
        self.status = BatchStatus::Processing;
        self.status_metadata = metadata;
        Ok(())
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for MediaBatch {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        let metadata: Option<String> = row.try_get("status_metadata")?;
        Ok(MediaBatch {
            id: row.try_get("id")?,
            listing_identity_id: row.try_get("listing_identity_id")?,
            reference: row.try_get("reference")?,
            status: row.try_get::<String, _>("status")?.parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse batch status: {}", e).into())
            })?,
            status_metadata: metadata
                .as_deref()
                .and_then(|m| serde_json::from_str(m).ok())
                .unwrap_or_default(),
            created_at: row.try_get("created_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> MediaBatch {
        let now = Utc::now();
        MediaBatch::new(9, "ref-1", BatchStatusMetadata::new("batch_created", 3, now), now)
    }

    #[test]
    fn test_forward_transitions() {
        let mut b = batch();
        let meta = BatchStatusMetadata::new("uploads_received", 3, Utc::now());
        b.transition(BatchStatus::Received, meta.clone()).unwrap();
        b.transition(BatchStatus::Processing, meta.clone()).unwrap();
        b.transition(BatchStatus::Ready, meta).unwrap();
        assert_eq!(b.status, BatchStatus::Ready);
    }

    #[test]
    fn test_terminal_batch_rejects_writes() {
        let mut b = batch();
        b.status = BatchStatus::Failed;
        let err = b
            .transition(BatchStatus::Ready, BatchStatusMetadata::default())
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Conflict);
        assert_eq!(b.status, BatchStatus::Failed);
    }

    #[test]
    fn test_backward_transition_rejected() {
        let mut b = batch();
        b.status = BatchStatus::Processing;
        assert!(b
            .transition(BatchStatus::Received, BatchStatusMetadata::default())
            .is_err());
    }

    #[test]
    fn test_reopen_for_retry_requires_terminal() {
        let mut b = batch();
        assert!(b.reopen_for_retry(BatchStatusMetadata::default()).is_err());
        b.status = BatchStatus::Failed;
        b.reopen_for_retry(BatchStatusMetadata::new("retry_requested", 1, Utc::now()).with_reason("flaky"))
            .unwrap();
        assert_eq!(b.status, BatchStatus::Processing);
        assert_eq!(b.status_metadata.display_message(), "flaky");
    }
}
