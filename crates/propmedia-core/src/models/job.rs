use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// External system driving a processing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaProcessingProvider {
    #[serde(rename = "STEP_FUNCTIONS")]
    StepFunctions,
    #[serde(rename = "STEP_FUNCTIONS_FINALIZATION")]
    StepFunctionsFinalization,
    #[serde(rename = "MEDIACONVERT")]
    MediaConvert,
}

impl MediaProcessingProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaProcessingProvider::StepFunctions => "STEP_FUNCTIONS",
            MediaProcessingProvider::StepFunctionsFinalization => "STEP_FUNCTIONS_FINALIZATION",
            MediaProcessingProvider::MediaConvert => "MEDIACONVERT",
        }
    }
}

impl Display for MediaProcessingProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MediaProcessingProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "STEP_FUNCTIONS" => Ok(MediaProcessingProvider::StepFunctions),
            "STEP_FUNCTIONS_FINALIZATION" => Ok(MediaProcessingProvider::StepFunctionsFinalization),
            "MEDIACONVERT" => Ok(MediaProcessingProvider::MediaConvert),
            _ => Err(anyhow::anyhow!("Invalid processing provider: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaProcessingJobStatus {
    Pending,
    Running,
    Succeeded,
    /// Reported by the workflow when some assets failed; terminal.
    PartialSuccess,
    Failed,
}

impl MediaProcessingJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaProcessingJobStatus::Pending => "PENDING",
            MediaProcessingJobStatus::Running => "RUNNING",
            MediaProcessingJobStatus::Succeeded => "SUCCEEDED",
            MediaProcessingJobStatus::PartialSuccess => "PARTIAL_SUCCESS",
            MediaProcessingJobStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MediaProcessingJobStatus::Succeeded
                | MediaProcessingJobStatus::PartialSuccess
                | MediaProcessingJobStatus::Failed
        )
    }

    /// FAILED-class outcomes, as counted by retention and batch status.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            MediaProcessingJobStatus::Failed | MediaProcessingJobStatus::PartialSuccess
        )
    }

    /// Terminal statuses removed by retention.
    pub const TERMINAL: [MediaProcessingJobStatus; 3] = [
        MediaProcessingJobStatus::Succeeded,
        MediaProcessingJobStatus::PartialSuccess,
        MediaProcessingJobStatus::Failed,
    ];

    /// Map a workflow-reported status onto the job lifecycle. Unknown values
    /// leave the job running.
    pub fn from_callback_status(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "SUCCEEDED" => MediaProcessingJobStatus::Succeeded,
            "PARTIAL_SUCCESS" => MediaProcessingJobStatus::PartialSuccess,
            "FAILED" | "PROCESSING_FAILED" | "VALIDATION_FAILED" | "TIMED_OUT" => {
                MediaProcessingJobStatus::Failed
            }
            _ => MediaProcessingJobStatus::Running,
        }
    }
}

impl Display for MediaProcessingJobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MediaProcessingJobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(MediaProcessingJobStatus::Pending),
            "RUNNING" => Ok(MediaProcessingJobStatus::Running),
            "SUCCEEDED" => Ok(MediaProcessingJobStatus::Succeeded),
            "PARTIAL_SUCCESS" => Ok(MediaProcessingJobStatus::PartialSuccess),
            "FAILED" => Ok(MediaProcessingJobStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid processing job status: {}", s)),
        }
    }
}

/// Result summary stored on the job row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaProcessingJobPayload {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub raw_key: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub processed_key: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub thumbnail_key: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error_code: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error_message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub zip_bundles: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets_zipped: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_size_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unzipped_size_bytes: Option<i64>,
}

impl MediaProcessingJobPayload {
    pub fn is_empty(&self) -> bool {
        *self == MediaProcessingJobPayload::default()
    }
}

/// One invocation of the asynchronous pipeline for a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaProcessingJob {
    /// Zero until registered.
    pub id: i64,
    pub listing_identity_id: i64,
    pub batch_id: Option<i64>,
    pub status: MediaProcessingJobStatus,
    pub provider: MediaProcessingProvider,
    pub external_id: Option<String>,
    pub payload: MediaProcessingJobPayload,
    pub retry_count: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub callback_body: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MediaProcessingJob {
    pub fn new(
        listing_identity_id: i64,
        provider: MediaProcessingProvider,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            listing_identity_id,
            batch_id: None,
            status: MediaProcessingJobStatus::Pending,
            provider,
            external_id: None,
            payload: MediaProcessingJobPayload::default(),
            retry_count: 0,
            started_at: None,
            completed_at: None,
            last_error: None,
            callback_body: None,
            created_at,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn mark_running(&mut self, external_id: Option<&str>, started_at: DateTime<Utc>) {
        self.status = MediaProcessingJobStatus::Running;
        if let Some(external_id) = external_id.map(str::trim).filter(|id| !id.is_empty()) {
            self.external_id = Some(external_id.to_string());
        }
        self.started_at = Some(started_at);
    }

    /// Terminal transition. `completed_at` never precedes `started_at`.
    pub fn mark_completed(
        &mut self,
        status: MediaProcessingJobStatus,
        payload: MediaProcessingJobPayload,
        completed_at: DateTime<Utc>,
    ) {
        self.status = status;
        self.payload = payload;
        let completed_at = match self.started_at {
            Some(started_at) if started_at > completed_at => started_at,
            _ => completed_at,
        };
        self.completed_at = Some(completed_at);
    }

    pub fn append_error(&mut self, message: &str) {
        let message = message.trim();
        if message.is_empty() {
            return;
        }
        self.last_error = Some(match self.last_error.take().filter(|e| !e.is_empty()) {
            Some(existing) => format!("{} | {}", existing, message),
            None => message.to_string(),
        });
    }

    pub fn set_callback_body(&mut self, body: &str) {
        if !body.is_empty() {
            self.callback_body = Some(body.to_string());
        }
    }

    pub fn adopt_external_id(&mut self, external_id: &str) {
        let external_id = external_id.trim();
        if external_id.is_empty() {
            return;
        }
        if self.external_id.as_deref().map_or(true, str::is_empty) {
            self.external_id = Some(external_id.to_string());
        }
    }

    pub fn ensure_started_at(&mut self, started_at: DateTime<Utc>) {
        if self.started_at.is_none() {
            self.started_at = Some(started_at);
        }
    }

    pub fn apply_finalization_payload(
        &mut self,
        zip_bundles: Vec<String>,
        assets_zipped: Option<i64>,
        zip_size_bytes: Option<i64>,
        unzipped_size_bytes: Option<i64>,
    ) {
        self.payload.zip_bundles = zip_bundles;
        self.payload.assets_zipped = assets_zipped;
        self.payload.zip_size_bytes = zip_size_bytes;
        self.payload.unzipped_size_bytes = unzipped_size_bytes;
    }

    /// Payload as persisted, `None` when empty.
    pub fn payload_json(&self) -> Option<String> {
        if self.payload.is_empty() {
            None
        } else {
            serde_json::to_string(&self.payload).ok()
        }
    }
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for MediaProcessingJob {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        let payload: Option<String> = row.try_get("payload")?;
        Ok(MediaProcessingJob {
            id: row.try_get("id")?,
            listing_identity_id: row.try_get("listing_identity_id")?,
            batch_id: row.try_get("batch_id")?,
            status: row.try_get::<String, _>("status")?.parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse job status: {}", e).into())
            })?,
            provider: row.try_get::<String, _>("provider")?.parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse provider: {}", e).into())
            })?,
            external_id: row.try_get("external_id")?,
            payload: payload
                .as_deref()
                .filter(|p| !p.trim().is_empty())
                .and_then(|p| serde_json::from_str(p).ok())
                .unwrap_or_default(),
            retry_count: row.try_get("retry_count")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            last_error: row.try_get("last_error")?,
            callback_body: row.try_get("callback_body")?,
            created_at: row.try_get("created_at")?,
        })
    }
}
