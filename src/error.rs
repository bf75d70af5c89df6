//! Domain error types for the credential server.
//!
//! Uses thiserror for ergonomic error handling with automatic Display implementations.

/// Application-level errors.
///
/// Every variant is recoverable by the caller; none is fatal to the
/// lifecycle manager itself.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Resource not found
    #[error("{0} not found")]
    NotFound(String),

    /// Illegal state transition (e.g. renewing a revoked token)
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Token issue referenced an unknown service
    #[error("Unknown service: {0}")]
    InvalidService(String),

    /// Token issue referenced an unknown user
    #[error("Unknown user: {0}")]
    InvalidUser(String),

    /// OTP verification failed: code does not match
    #[error("Invalid verification code")]
    InvalidCode,

    /// OTP verification failed: code has expired
    #[error("Verification code has expired")]
    Expired,

    /// Optimistic concurrency check failed; the caller should retry
    #[error("Concurrent modification of {0}")]
    ConcurrentModification(String),

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

// Conversion implementations for common error types

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidInput(format!("Invalid UUID: {}", err))
    }
}
