//! Callback envelope reported by the processing workflow.
//!
//! Identifiers arrive either as JSON numbers or as numeric strings depending on
//! which workflow step produced the message; `flexible_id` is the single parser
//! used for every id field on ingress.

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{AppError, AppResult};

use super::job::MediaProcessingJobStatus;

/// Accepts `123`, `"123"`, `" 123 "`, `null` or a missing field (zero).
pub fn flexible_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    struct IdVisitor;

    impl<'de> Visitor<'de> for IdVisitor {
        type Value = i64;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a non-negative integer or numeric string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
            i64::try_from(v).map_err(|_| E::custom("identifier out of range"))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
            if v < 0 {
                return Err(E::custom("identifier must not be negative"));
            }
            Ok(v)
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<i64, E> {
            if v.fract() != 0.0 || v < 0.0 || v > i64::MAX as f64 {
                return Err(E::custom("identifier must be a whole number"));
            }
            Ok(v as i64)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
            let trimmed = v.trim();
            if trimmed.is_empty() {
                return Ok(0);
            }
            trimmed
                .parse::<i64>()
                .ok()
                .filter(|id| *id >= 0)
                .ok_or_else(|| E::custom(format!("invalid numeric identifier: {}", v)))
        }

        fn visit_unit<E: de::Error>(self) -> Result<i64, E> {
            Ok(0)
        }

        fn visit_none<E: de::Error>(self) -> Result<i64, E> {
            Ok(0)
        }

        fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<i64, D::Error> {
            d.deserialize_any(IdVisitor)
        }
    }

    deserializer.deserialize_any(IdVisitor)
}

/// Accepts a string, any JSON value (stringified) or null.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

/// RFC 3339 timestamp; anything unparseable is treated as absent.
fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.and_then(|raw| {
        DateTime::parse_from_rfc3339(raw.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }))
}

/// String map tolerating non-string values.
fn lenient_string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<BTreeMap<String, serde_json::Value>>::deserialize(deserializer)?;
    Ok(value
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(k, v)| match v {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some((k, s)),
            other => Some((k, other.to_string())),
        })
        .collect())
}

/// Per-asset outcome reported by the workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessingResult {
    #[serde(deserialize_with = "flexible_id", skip_serializing_if = "is_zero")]
    pub asset_id: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub raw_key: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub processed_key: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub thumbnail_key: String,
    #[serde(deserialize_with = "lenient_string_map", skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(deserialize_with = "lenient_string_map", skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, String>,
    #[serde(
        alias = "errorMessage",
        deserialize_with = "lenient_string",
        skip_serializing_if = "String::is_empty"
    )]
    pub error: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error_code: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub zip_bundles: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets_zipped: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_size_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unzipped_size_bytes: Option<i64>,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

/// Outcome of a single result once an empty status has been inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultOutcome {
    Processed,
    Failed,
}

impl ProcessingResult {
    /// `PROCESSED` or `FAILED`. An empty status is inferred from the payload:
    /// an error means failure, a processed key means success.
    pub fn outcome(&self) -> ResultOutcome {
        match self.status.trim().to_uppercase().as_str() {
            "PROCESSED" | "SUCCEEDED" => ResultOutcome::Processed,
            "" if self.error.trim().is_empty() && !self.processed_key.trim().is_empty() => {
                ResultOutcome::Processed
            }
            _ => ResultOutcome::Failed,
        }
    }

    pub fn has_zip_data(&self) -> bool {
        !self.zip_bundles.is_empty()
            || self.assets_zipped.is_some()
            || self.zip_size_bytes.is_some()
    }
}

/// Callback envelope published by the workflow on the callback queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessingCallback {
    #[serde(deserialize_with = "flexible_id")]
    pub job_id: i64,
    #[serde(deserialize_with = "flexible_id")]
    pub listing_identity_id: i64,
    #[serde(alias = "executionArn", skip_serializing_if = "String::is_empty")]
    pub external_id: String,
    #[serde(deserialize_with = "lenient_datetime", skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub status: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub provider: String,
    #[serde(alias = "outputs")]
    pub results: Vec<ProcessingResult>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub failure_reason: String,
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error_code: String,
    #[serde(
        alias = "meta",
        deserialize_with = "lenient_string_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub error_metadata: BTreeMap<String, String>,
    /// Original message body, kept for the job's audit column.
    #[serde(skip)]
    pub raw_body: String,
}

impl ProcessingCallback {
    /// Decode a raw queue message body.
    pub fn decode(raw: &str) -> AppResult<Self> {
        if raw.trim().is_empty() {
            return Err(AppError::validation("callback body is empty"));
        }
        let mut callback: ProcessingCallback = serde_json::from_str(raw).map_err(|e| {
            AppError::validation("invalid callback payload").with_detail("error", e.to_string())
        })?;
        if callback.job_id == 0 {
            return Err(AppError::validation("jobId is required").with_detail("jobId", "required"));
        }
        callback.raw_body = raw.to_string();
        Ok(callback)
    }

    pub fn job_status(&self) -> MediaProcessingJobStatus {
        MediaProcessingJobStatus::from_callback_status(&self.status)
    }

    /// Fragments recorded on the job's `lastError`, in order.
    pub fn error_fragments(&self) -> Vec<String> {
        let mut fragments = Vec::with_capacity(4);
        if !self.error_code.trim().is_empty() {
            fragments.push(format!("code={}", self.error_code.trim()));
        }
        if !self.error.trim().is_empty() {
            fragments.push(self.error.trim().to_string());
        }
        if !self.failure_reason.trim().is_empty() {
            fragments.push(self.failure_reason.trim().to_string());
        }
        if !self.error_metadata.is_empty() {
            if let Ok(meta) = serde_json::to_string(&self.error_metadata) {
                fragments.push(format!("meta={}", meta));
            }
        }
        fragments
    }
}
