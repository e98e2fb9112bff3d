//! Error types for Keystone operations

use crate::{EntityKind, RecordId};
use std::time::Duration;
use thiserror::Error;

/// Cache store errors.
///
/// Every variant is transient from the repository's point of view: the read
/// and write paths log these and carry on against the durable store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache operation {operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("Cache serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Cache backend error: {reason}")]
    Backend { reason: String },
}

/// Durable store errors. Always propagated to the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Duplicate {kind} with id {id}")]
    Duplicate { kind: EntityKind, id: RecordId },

    #[error("Invalid patch for {kind}: {reason}")]
    InvalidPatch { kind: EntityKind, reason: String },

    #[error("Corrupt {kind} row {id}: {reason}")]
    CorruptRow {
        kind: EntityKind,
        id: RecordId,
        reason: String,
    },

    #[error("Store operation {operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Store backend error: {reason}")]
    Backend { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Challenge (captcha) outcomes that are not a success.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChallengeError {
    #[error("Challenge already issued, retry after the send window")]
    RateLimited,

    #[error("No active challenge")]
    NotFound,

    #[error("Challenge blocked after too many failed attempts")]
    Blocked,

    #[error("Challenge code incorrect")]
    Incorrect,

    #[error("Challenge record {key} exists without expiry")]
    Inconsistent { key: String },

    #[error("Invalid challenge {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Script {script} returned unexpected code {code}")]
    UnexpectedResult { script: String, code: i64 },

    #[error("Challenge cache error: {0}")]
    Cache(#[from] CacheError),
}

impl ChallengeError {
    /// Whether repeating the same call can succeed.
    ///
    /// `Incorrect` invites another attempt; `RateLimited` and `Blocked` do
    /// not until time passes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChallengeError::Incorrect | ChallengeError::Cache(_))
    }
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Incompatible options: {option_a} and {option_b}")]
    IncompatibleOptions { option_a: String, option_b: String },
}

/// Master error type for all Keystone errors.
#[derive(Debug, Clone, Error)]
pub enum KeystoneError {
    #[error("{kind} with id {id} not found")]
    NotFound { kind: EntityKind, id: RecordId },

    #[error("{kind} with id {id} was modified concurrently (expected version {expected})")]
    VersionConflict {
        kind: EntityKind,
        id: RecordId,
        expected: i64,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Challenge error: {0}")]
    Challenge(#[from] ChallengeError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Keystone operations.
pub type KeystoneResult<T> = Result<T, KeystoneError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_and_conflict_display_differ() {
        let not_found = KeystoneError::NotFound {
            kind: EntityKind::User,
            id: RecordId::new("X"),
        };
        let conflict = KeystoneError::VersionConflict {
            kind: EntityKind::User,
            id: RecordId::new("X"),
            expected: 1,
        };
        let a = not_found.to_string();
        let b = conflict.to_string();
        assert!(a.contains("not found"));
        assert!(b.contains("modified concurrently"));
        assert!(b.contains("expected version 1"));
    }

    #[test]
    fn test_cache_error_display_timeout() {
        let err = CacheError::Timeout {
            operation: "get".to_string(),
            after: Duration::from_secs(3),
        };
        let msg = err.to_string();
        assert!(msg.contains("get"));
        assert!(msg.contains("3s"));
    }

    #[test]
    fn test_store_error_display_duplicate() {
        let err = StoreError::Duplicate {
            kind: EntityKind::Role,
            id: RecordId::new("r1"),
        };
        let msg = err.to_string();
        assert!(msg.contains("role"));
        assert!(msg.contains("r1"));
    }

    #[test]
    fn test_challenge_retryability() {
        assert!(ChallengeError::Incorrect.is_retryable());
        assert!(!ChallengeError::RateLimited.is_retryable());
        assert!(!ChallengeError::Blocked.is_retryable());
        assert!(!ChallengeError::NotFound.is_retryable());
    }

    #[test]
    fn test_keystone_error_from_variants() {
        let store = KeystoneError::from(StoreError::LockPoisoned);
        assert!(matches!(store, KeystoneError::Store(_)));

        let challenge = KeystoneError::from(ChallengeError::Blocked);
        assert!(matches!(challenge, KeystoneError::Challenge(_)));

        let validation = KeystoneError::from(ValidationError::RequiredFieldMissing {
            field: "username".to_string(),
        });
        assert!(matches!(validation, KeystoneError::Validation(_)));

        let config = KeystoneError::from(ConfigError::MissingRequired {
            field: "db_host".to_string(),
        });
        assert!(matches!(config, KeystoneError::Config(_)));
    }

    #[test]
    fn test_challenge_error_from_cache_error() {
        let err = ChallengeError::from(CacheError::Unavailable {
            reason: "down".to_string(),
        });
        assert!(matches!(err, ChallengeError::Cache(_)));
        assert!(err.to_string().contains("down"));
    }
}
