//! One-time challenge codes with rate limiting and attempt limiting.
//!
//! A challenge record lives at `<domain>:captcha:<subject>:<purpose>` with a
//! TTL equal to the verify window. The first `send_window` of that lifetime
//! doubles as the resend rate limit.
//!
//! Issue and verify are each one [`AtomicScript`], so concurrent callers can
//! neither issue twice inside the send window nor spend the same attempt
//! twice.
//!
//! | Script | Code | Meaning |
//! |--------|------|---------|
//! | issue  | 0 | issued |
//! | issue  | 1 | rate limited |
//! | issue  | 2 | key exists without expiry |
//! | verify | 0 | verified, record deleted |
//! | verify | 1 | no record |
//! | verify | 2 | attempts exhausted |
//! | verify | 3 | code mismatch, one attempt spent |
//! | verify | 4 | stored record unreadable |

use std::sync::Arc;
use std::time::Duration;

use keystone_core::{CacheError, ChallengeError};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::cache::{AtomicScript, CacheStore, KeyNamespace, ScriptSlot};

/// Default resend window.
pub const DEFAULT_SEND_WINDOW: Duration = Duration::from_secs(60);

/// Default lifetime of an issued code.
pub const DEFAULT_VERIFY_WINDOW: Duration = Duration::from_secs(300);

/// Default number of verify attempts per issued code.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default length of generated codes.
pub const DEFAULT_CODE_LENGTH: usize = 6;

const ISSUED: i64 = 0;
const RATE_LIMITED: i64 = 1;
const INCONSISTENT: i64 = 2;

const VERIFIED: i64 = 0;
const NOT_FOUND: i64 = 1;
const BLOCKED: i64 = 2;
const INCORRECT: i64 = 3;
const CORRUPT: i64 = 4;

/// Challenge verifier configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeConfig {
    /// Minimum time between two issues for the same subject and purpose.
    pub send_window: Duration,
    /// Lifetime of an issued code.
    pub verify_window: Duration,
    /// Verify attempts allowed per issued code.
    pub max_attempts: u32,
    /// Digits in generated codes.
    pub code_length: usize,
    /// Timeout for each cache call.
    pub cache_timeout: Duration,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            send_window: DEFAULT_SEND_WINDOW,
            verify_window: DEFAULT_VERIFY_WINDOW,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            code_length: DEFAULT_CODE_LENGTH,
            cache_timeout: crate::repository::DEFAULT_CACHE_TIMEOUT,
        }
    }
}

/// Stored form of a challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ChallengeRecord {
    code: String,
    attempts: u32,
}

// ============================================================================
// SCRIPTS
// ============================================================================

struct IssueScript {
    record: ChallengeRecord,
    send_window: Duration,
    verify_window: Duration,
}

impl AtomicScript for IssueScript {
    fn name(&self) -> &'static str {
        "challenge_issue"
    }

    fn run(&self, slot: &mut ScriptSlot) -> i64 {
        if slot.exists() {
            let Some(remaining) = slot.ttl() else {
                return INCONSISTENT;
            };
            // Elapsed = verify_window - remaining; limited while elapsed < send_window.
            if remaining > self.verify_window.saturating_sub(self.send_window) {
                return RATE_LIMITED;
            }
        }
        match serde_json::to_vec(&self.record) {
            Ok(bytes) => {
                slot.set(bytes, Some(self.verify_window));
                ISSUED
            }
            Err(_) => INCONSISTENT,
        }
    }
}

struct VerifyScript<'a> {
    input: &'a str,
}

impl AtomicScript for VerifyScript<'_> {
    fn name(&self) -> &'static str {
        "challenge_verify"
    }

    fn run(&self, slot: &mut ScriptSlot) -> i64 {
        let Some(bytes) = slot.value() else {
            return NOT_FOUND;
        };
        let Ok(mut record) = serde_json::from_slice::<ChallengeRecord>(bytes) else {
            return CORRUPT;
        };
        if record.attempts == 0 {
            return BLOCKED;
        }
        if record.code != self.input {
            record.attempts -= 1;
            return match serde_json::to_vec(&record) {
                Ok(bytes) => {
                    slot.set_keep_ttl(bytes);
                    INCORRECT
                }
                Err(_) => CORRUPT,
            };
        }
        slot.delete();
        VERIFIED
    }
}

// ============================================================================
// VERIFIER
// ============================================================================

/// Issues and verifies one-time codes.
pub struct ChallengeVerifier<C: ?Sized> {
    cache: Arc<C>,
    keys: KeyNamespace,
    config: ChallengeConfig,
}

impl<C: CacheStore + ?Sized> ChallengeVerifier<C> {
    pub fn new(cache: Arc<C>, keys: KeyNamespace, config: ChallengeConfig) -> Self {
        Self {
            cache,
            keys,
            config,
        }
    }

    pub fn config(&self) -> &ChallengeConfig {
        &self.config
    }

    /// Cache key of the challenge for a subject and purpose.
    pub fn key(&self, subject: &str, purpose: &str) -> Result<String, ChallengeError> {
        validate_segment("subject", subject)?;
        validate_segment("purpose", purpose)?;
        Ok(self.keys.captcha(subject, purpose))
    }

    /// Store `code` for the subject and purpose.
    ///
    /// # Errors
    ///
    /// - [`ChallengeError::RateLimited`] while a previous code is inside its
    ///   send window
    /// - [`ChallengeError::Inconsistent`] if the key exists without expiry
    pub async fn issue(&self, subject: &str, purpose: &str, code: &str) -> Result<(), ChallengeError> {
        let key = self.key(subject, purpose)?;
        if code.is_empty() {
            return Err(ChallengeError::InvalidInput {
                field: "code".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        let script = IssueScript {
            record: ChallengeRecord {
                code: code.to_string(),
                attempts: self.config.max_attempts,
            },
            send_window: self.config.send_window,
            verify_window: self.config.verify_window,
        };

        match self.run(&key, &script).await? {
            ISSUED => {
                tracing::debug!(key = %key, "Challenge issued");
                Ok(())
            }
            RATE_LIMITED => {
                tracing::debug!(key = %key, "Challenge issue rate limited");
                Err(ChallengeError::RateLimited)
            }
            INCONSISTENT => {
                tracing::warn!(key = %key, "Challenge key exists without expiry");
                Err(ChallengeError::Inconsistent { key })
            }
            other => Err(ChallengeError::UnexpectedResult {
                script: script.name().to_string(),
                code: other,
            }),
        }
    }

    /// Generate a numeric code, issue it and return it.
    pub async fn issue_generated(&self, subject: &str, purpose: &str) -> Result<String, ChallengeError> {
        let code = generate_code(self.config.code_length);
        self.issue(subject, purpose, &code).await?;
        Ok(code)
    }

    /// Check `input` against the stored code.
    ///
    /// A match consumes the challenge. A mismatch spends one attempt; once
    /// none remain every call returns [`ChallengeError::Blocked`] until the
    /// record expires.
    pub async fn verify(&self, subject: &str, purpose: &str, input: &str) -> Result<(), ChallengeError> {
        let key = self.key(subject, purpose)?;
        let script = VerifyScript { input };

        match self.run(&key, &script).await? {
            VERIFIED => {
                tracing::debug!(key = %key, "Challenge verified");
                Ok(())
            }
            NOT_FOUND => Err(ChallengeError::NotFound),
            BLOCKED => {
                tracing::debug!(key = %key, "Challenge blocked");
                Err(ChallengeError::Blocked)
            }
            INCORRECT => Err(ChallengeError::Incorrect),
            CORRUPT => {
                tracing::warn!(key = %key, "Challenge record unreadable");
                Err(ChallengeError::Inconsistent { key })
            }
            other => Err(ChallengeError::UnexpectedResult {
                script: script.name().to_string(),
                code: other,
            }),
        }
    }

    async fn run(&self, key: &str, script: &dyn AtomicScript) -> Result<i64, ChallengeError> {
        let timeout = self.config.cache_timeout;
        match tokio::time::timeout(timeout, self.cache.run_script(key, script)).await {
            Ok(result) => result.map_err(|e| {
                tracing::warn!(error = %e, key = %key, script = script.name(), "Challenge script failed");
                ChallengeError::Cache(e)
            }),
            Err(_) => Err(ChallengeError::Cache(CacheError::Timeout {
                operation: script.name().to_string(),
                after: timeout,
            })),
        }
    }
}

fn validate_segment(field: &str, value: &str) -> Result<(), ChallengeError> {
    if value.is_empty() {
        return Err(ChallengeError::InvalidInput {
            field: field.to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    if value.contains(':') {
        return Err(ChallengeError::InvalidInput {
            field: field.to_string(),
            reason: "must not contain ':'".to_string(),
        });
    }
    Ok(())
}

/// Random decimal code of the given length.
pub fn generate_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}
