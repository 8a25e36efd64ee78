use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

/// A single failing form/payload field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by the data-access layer and everything built on top of it.
#[derive(Error, Debug, Clone)]
pub enum DataError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transient backend failure: {0}")]
    Transient(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Validation failed on {} field(s)", .0.len())]
    Validation(Vec<FieldError>),

    #[error("Referential integrity violation: {0}")]
    Referential(String),

    #[error("Image conversion failed: {0}")]
    Conversion(String),

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Mail delivery failed: {0}")]
    Mail(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl DataError {
    /// Network and timeout failures are worth another attempt; everything the
    /// user has to fix (or that the backend rejected on purpose) is not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DataError::Timeout(_) | DataError::Transient(_) | DataError::Storage(_)
        )
    }

    /// Stable machine-readable code surfaced to API callers.
    pub fn code(&self) -> &'static str {
        match self {
            DataError::Timeout(_) => "TIMEOUT",
            DataError::Transient(_) => "NETWORK",
            DataError::Database(_) => "DATABASE",
            DataError::NotFound(_) => "NOT_FOUND",
            DataError::Validation(_) => "VALIDATION",
            DataError::Referential(_) => "REFERENTIAL",
            DataError::Conversion(_) => "CONVERSION_FAILED",
            DataError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            DataError::PayloadTooLarge(_) => "FILE_TOO_LARGE",
            DataError::RateLimited { .. } => "RATE_LIMITED",
            DataError::Storage(_) => "STORAGE",
            DataError::Mail(_) => "MAIL",
            DataError::Unauthorized(_) => "UNAUTHORIZED",
            DataError::Cancelled => "CANCELLED",
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        DataError::Validation(vec![FieldError::new(field, message)])
    }
}

impl From<sea_orm::DbErr> for DataError {
    fn from(err: sea_orm::DbErr) -> Self {
        use sea_orm::{DbErr, SqlErr};

        if let Some(sql_err) = err.sql_err() {
            match sql_err {
                SqlErr::ForeignKeyConstraintViolation(msg) => {
                    return DataError::Referential(msg);
                }
                SqlErr::UniqueConstraintViolation(msg) => {
                    return DataError::validation("id", format!("already exists: {}", msg));
                }
                _ => {}
            }
        }

        match err {
            DbErr::ConnectionAcquire(e) => DataError::Transient(e.to_string()),
            DbErr::Conn(e) => DataError::Transient(e.to_string()),
            DbErr::RecordNotFound(msg) => DataError::NotFound(msg),
            DbErr::RecordNotUpdated => DataError::NotFound("Record not updated".to_string()),
            other => {
                let msg = other.to_string();
                // SQLite reports FK failures as plain execution errors.
                if msg.contains("FOREIGN KEY constraint failed") {
                    DataError::Referential(msg)
                } else {
                    DataError::Database(msg)
                }
            }
        }
    }
}
