//! Error types for BlogMirror
//!
//! All errors in the application are converted to `AppError`.
//! `AppError::status_code` maps each variant to the HTTP status a web
//! front end should answer with.

use http::StatusCode;
use thiserror::Error;

/// Application-wide error type
///
/// Every failure is scoped to one request or one sync job; nothing in here
/// carries state that could leak into another blog's job.
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// No stored credentials for the account (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Interval gate is still closed (429)
    #[error("Next update request is available in {retry_after_seconds} seconds")]
    Throttled { retry_after_seconds: u64 },

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Upstream API answered with an error or an unreadable payload (502)
    #[error("Upstream API error: {0}")]
    Upstream(String),

    /// HTTP client error (502)
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Fetched account does not satisfy the primary blog policy (502)
    #[error("Inconsistent account info: {0}")]
    InconsistentAccount(String),

    /// Sync queue no longer accepts requests (503)
    #[error("Sync queue is closed")]
    QueueClosed,

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Throttled { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Upstream(_) | AppError::HttpClient(_) | AppError::InconsistentAccount(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short machine-readable label, used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound => "not_found",
            AppError::Unauthorized => "unauthorized",
            AppError::Throttled { .. } => "throttled",
            AppError::Validation(_) => "validation",
            AppError::Upstream(_) => "upstream",
            AppError::HttpClient(_) => "http_client",
            AppError::Database(_) => "database",
            AppError::InconsistentAccount(_) => "inconsistent_account",
            AppError::QueueClosed => "queue_closed",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
