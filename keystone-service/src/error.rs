//! Error Types for the Keystone service
//!
//! This module maps the core error taxonomy onto stable, client-facing
//! codes:
//! - `ErrorCode` enum for categorizing errors
//! - `ServiceError` struct for structured error payloads
//!
//! Every code carries a retry hint so callers can tell a conflict or a
//! rate limit from a wrong answer.

use keystone_core::{
    CacheError, ChallengeError, ConfigError, KeystoneError, StoreError, ValidationError,
};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Client-facing error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Records
    // ========================================================================
    /// Requested record does not exist
    EntityNotFound,

    /// Record was modified since the caller read it
    VersionConflict,

    /// Record with the same id already exists
    EntityAlreadyExists,

    // ========================================================================
    // Challenges
    // ========================================================================
    /// A code was sent too recently
    RateLimited,

    /// No active challenge for this subject and purpose
    ChallengeNotFound,

    /// Too many wrong answers
    ChallengeBlocked,

    /// Wrong answer, attempts remain
    ChallengeIncorrect,

    /// Challenge state is damaged
    ChallengeInconsistent,

    // ========================================================================
    // Input
    // ========================================================================
    /// Request validation failed
    ValidationFailed,

    /// Configuration is invalid
    InvalidConfiguration,

    // ========================================================================
    // Infrastructure
    // ========================================================================
    /// Database operation failed
    DatabaseError,

    /// Database or cache is unreachable
    ServiceUnavailable,

    /// Operation timed out
    Timeout,

    /// Internal error
    InternalError,
}

impl ErrorCode {
    /// HTTP status a transport layer should use for this code.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::EntityNotFound | ErrorCode::ChallengeNotFound => 404,
            ErrorCode::VersionConflict | ErrorCode::EntityAlreadyExists => 409,
            ErrorCode::RateLimited | ErrorCode::ChallengeBlocked => 429,
            ErrorCode::ChallengeIncorrect | ErrorCode::ValidationFailed => 400,
            ErrorCode::ServiceUnavailable => 503,
            ErrorCode::Timeout => 504,
            ErrorCode::ChallengeInconsistent
            | ErrorCode::InvalidConfiguration
            | ErrorCode::DatabaseError
            | ErrorCode::InternalError => 500,
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::EntityNotFound => "Record not found",
            ErrorCode::VersionConflict => "Record was modified by another request",
            ErrorCode::EntityAlreadyExists => "Record already exists",
            ErrorCode::RateLimited => "A code was sent recently, try again later",
            ErrorCode::ChallengeNotFound => "No active verification code",
            ErrorCode::ChallengeBlocked => "Too many failed attempts",
            ErrorCode::ChallengeIncorrect => "Verification code incorrect",
            ErrorCode::ChallengeInconsistent => "Verification state is inconsistent",
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidConfiguration => "Invalid configuration",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
            ErrorCode::Timeout => "Operation timed out",
            ErrorCode::InternalError => "Internal error",
        }
    }

    /// Whether repeating the same request can succeed without the caller
    /// changing anything.
    ///
    /// A version conflict needs a fresh read first, and a rate limit or
    /// block needs time to pass, so neither counts.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::ChallengeIncorrect
                | ErrorCode::ServiceUnavailable
                | ErrorCode::Timeout
                | ErrorCode::DatabaseError
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// SERVICE ERROR STRUCT
// ============================================================================

/// Structured error returned across the service boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ServiceError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create an error carrying the code's default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn retryable(&self) -> bool {
        self.code.retryable()
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message)
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ServiceError {}

// ============================================================================
// CONVERSIONS FROM CORE ERRORS
// ============================================================================

impl From<KeystoneError> for ServiceError {
    fn from(err: KeystoneError) -> Self {
        match err {
            KeystoneError::NotFound { kind, id } => {
                ServiceError::new(ErrorCode::EntityNotFound, format!("{} {} not found", kind, id))
                    .with_details(serde_json::json!({ "kind": kind, "id": id }))
            }
            KeystoneError::VersionConflict { kind, id, expected } => ServiceError::new(
                ErrorCode::VersionConflict,
                format!("{} {} was modified by another request", kind, id),
            )
            .with_details(serde_json::json!({
                "kind": kind,
                "id": id,
                "expected_version": expected,
            })),
            KeystoneError::Store(e) => e.into(),
            KeystoneError::Challenge(e) => e.into(),
            KeystoneError::Validation(e) => e.into(),
            KeystoneError::Config(e) => e.into(),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::Duplicate { .. } => {
                ServiceError::new(ErrorCode::EntityAlreadyExists, err.to_string())
            }
            StoreError::InvalidPatch { .. } => {
                ServiceError::new(ErrorCode::ValidationFailed, err.to_string())
            }
            StoreError::Timeout { .. } => ServiceError::new(ErrorCode::Timeout, err.to_string()),
            StoreError::Unavailable { .. } => {
                ServiceError::new(ErrorCode::ServiceUnavailable, err.to_string())
            }
            StoreError::CorruptRow { .. } | StoreError::LockPoisoned => {
                tracing::error!(error = %err, "Durable store fault");
                ServiceError::from_code(ErrorCode::InternalError)
            }
            StoreError::Backend { .. } => {
                // Keep driver details out of client messages.
                tracing::error!(error = %err, "Database error");
                ServiceError::from_code(ErrorCode::DatabaseError)
            }
        }
    }
}

impl From<ChallengeError> for ServiceError {
    fn from(err: ChallengeError) -> Self {
        match err {
            ChallengeError::RateLimited => ServiceError::from_code(ErrorCode::RateLimited),
            ChallengeError::NotFound => ServiceError::from_code(ErrorCode::ChallengeNotFound),
            ChallengeError::Blocked => ServiceError::from_code(ErrorCode::ChallengeBlocked),
            ChallengeError::Incorrect => ServiceError::from_code(ErrorCode::ChallengeIncorrect),
            ChallengeError::Inconsistent { ref key } => {
                tracing::error!(key = %key, "Challenge record without expiry");
                ServiceError::from_code(ErrorCode::ChallengeInconsistent)
            }
            ChallengeError::UnexpectedResult { ref script, code } => {
                tracing::error!(script = %script, code, "Unexpected challenge script result");
                ServiceError::from_code(ErrorCode::InternalError)
            }
            ChallengeError::InvalidInput { field, reason } => ServiceError::new(
                ErrorCode::ValidationFailed,
                format!("Invalid {}: {}", field, reason),
            ),
            ChallengeError::Cache(e) => e.into(),
        }
    }
}

impl From<CacheError> for ServiceError {
    fn from(err: CacheError) -> Self {
        tracing::warn!(error = %err, "Cache error surfaced to caller");
        match err {
            CacheError::Timeout { .. } => ServiceError::from_code(ErrorCode::Timeout),
            _ => ServiceError::from_code(ErrorCode::ServiceUnavailable),
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::new(ErrorCode::ValidationFailed, err.to_string())
    }
}

impl From<ConfigError> for ServiceError {
    fn from(err: ConfigError) -> Self {
        ServiceError::invalid_configuration(err.to_string())
    }
}

/// Convert from deadpool_postgres::PoolError to ServiceError.
impl From<deadpool_postgres::PoolError> for ServiceError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        tracing::error!("Connection pool error: {:?}", err);

        match err {
            deadpool_postgres::PoolError::Timeout(_) => {
                ServiceError::new(ErrorCode::ServiceUnavailable, "Database connection pool exhausted")
            }
            deadpool_postgres::PoolError::Closed => {
                ServiceError::new(ErrorCode::ServiceUnavailable, "Database connection pool is closed")
            }
            _ => ServiceError::database_error("Failed to acquire database connection"),
        }
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;
