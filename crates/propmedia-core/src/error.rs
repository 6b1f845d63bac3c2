//! Error types module
//!
//! Every service operation surfaces an `AppError`. The variant is the error kind
//! callers branch on (validation, not found, conflict, forbidden, auth, infra);
//! the payload carries a public message plus structured details such as the
//! manifest field that failed validation.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx` feature.

use serde_json::{Map, Value};
use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Structured details attached to validation and conflict errors.
pub type Details = Map<String, Value>;

pub type AppResult<T> = Result<T, AppError>;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for state conflicts and denied operations
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Coarse error classification surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Forbidden,
    Auth,
    Infra,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP status code a transport layer should use
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "VALIDATION_ERROR")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried as-is)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden from clients
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation failed: {message}")]
    Validation { message: String, details: Details },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {message}")]
    Conflict { message: String, details: Details },

    #[error("Forbidden: {message}")]
    Forbidden {
        message: String,
        reason: Option<String>,
    },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Infrastructure error: {message}")]
    Infra {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            details: Details::new(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict {
            message: message.into(),
            details: Details::new(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden {
            message: message.into(),
            reason: None,
        }
    }

    pub fn forbidden_with_reason(message: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Forbidden {
            message: message.into(),
            reason: Some(reason.into()),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        AppError::Unauthorized(message.into())
    }

    /// Infrastructure failure wrapping the underlying cause.
    pub fn infra(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        AppError::Infra {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn infra_msg(message: impl Into<String>) -> Self {
        AppError::Infra {
            message: message.into(),
            source: None,
        }
    }

    /// Attach a structured detail. Only validation and conflict errors carry details;
    /// other variants are returned unchanged.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        match &mut self {
            AppError::Validation { details, .. } | AppError::Conflict { details, .. } => {
                details.insert(key.into(), value.into());
            }
            _ => {}
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation { .. } => ErrorKind::Validation,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Conflict { .. } => ErrorKind::Conflict,
            AppError::Forbidden { .. } => ErrorKind::Forbidden,
            AppError::Unauthorized(_) => ErrorKind::Auth,
            AppError::Infra { .. } => ErrorKind::Infra,
            #[cfg(feature = "sqlx")]
            AppError::Database(_) => ErrorKind::Infra,
        }
    }

    /// Structured details, empty for variants that carry none.
    pub fn details(&self) -> Details {
        match self {
            AppError::Validation { details, .. } | AppError::Conflict { details, .. } => {
                details.clone()
            }
            AppError::Forbidden {
                reason: Some(reason),
                ..
            } => {
                let mut details = Details::new();
                details.insert("reason".to_string(), Value::String(reason.clone()));
                details
            }
            _ => Details::new(),
        }
    }

    /// Public message without the kind prefix used by `Display`.
    pub fn message(&self) -> String {
        match self {
            AppError::Validation { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::Infra { message, .. } => message.clone(),
            AppError::NotFound(message) | AppError::Unauthorized(message) => message.clone(),
            #[cfg(feature = "sqlx")]
            AppError::Database(_) => "database operation failed".to_string(),
        }
    }
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Infra {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::infra(format!("IO error: {}", err), err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::validation(format!("JSON parsing error: {}", err))
    }
}

/// Static metadata for each kind: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err.kind() {
        ErrorKind::Validation => (
            400,
            "VALIDATION_ERROR",
            false,
            Some("Fix the request and retry"),
            false,
            LogLevel::Debug,
        ),
        ErrorKind::NotFound => (404, "NOT_FOUND", false, None, false, LogLevel::Debug),
        ErrorKind::Conflict => (
            409,
            "CONFLICT",
            false,
            Some("Refresh the resource state before retrying"),
            false,
            LogLevel::Warn,
        ),
        ErrorKind::Forbidden => (403, "FORBIDDEN", false, None, false, LogLevel::Warn),
        ErrorKind::Auth => (
            401,
            "UNAUTHORIZED",
            false,
            Some("Authenticate and retry"),
            false,
            LogLevel::Debug,
        ),
        ErrorKind::Infra => (
            500,
            "INFRASTRUCTURE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn client_message(&self) -> String {
        if self.is_sensitive() {
            "An internal error occurred".to_string()
        } else {
            self.message()
        }
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }
}
