//! Service Configuration Module
//!
//! Everything the process needs is read from `KEYSTONE_*` environment
//! variables with defaults suitable for development. Numeric values that
//! fail to parse fall back to their default; enumerated values (cache
//! backend, log format) must be spelled correctly. [`ServiceConfig::validate`]
//! rejects combinations the storage layer cannot honor.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use keystone_core::ConfigError;
use keystone_storage::{AuditConfig, ChallengeConfig, RepositoryConfig};

use crate::constants::*;
use crate::db::DbConfig;

// ============================================================================
// ENUMERATED SETTINGS
// ============================================================================

/// Cache backend selected by `KEYSTONE_CACHE_BACKEND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheBackend {
    #[default]
    Memory,
    Lmdb,
}

impl FromStr for CacheBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(CacheBackend::Memory),
            "lmdb" => Ok(CacheBackend::Lmdb),
            other => Err(ConfigError::InvalidValue {
                field: "KEYSTONE_CACHE_BACKEND".to_string(),
                value: other.to_string(),
                reason: "expected memory or lmdb".to_string(),
            }),
        }
    }
}

/// Log output format selected by `KEYSTONE_LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(ConfigError::InvalidValue {
                field: "KEYSTONE_LOG_FORMAT".to_string(),
                value: other.to_string(),
                reason: "expected json or pretty".to_string(),
            }),
        }
    }
}

// ============================================================================
// CACHE SETTINGS
// ============================================================================

/// Cache backend and key-namespace settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    /// Leading segment of every entity and challenge key.
    pub domain: String,
    /// LMDB directory (ignored by the memory backend).
    pub path: PathBuf,
    /// LMDB map size in megabytes (ignored by the memory backend).
    pub max_size_mb: usize,
    /// Interval between expired-entry sweeps.
    pub sweep_interval: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            domain: DEFAULT_CACHE_DOMAIN.to_string(),
            path: PathBuf::from(DEFAULT_CACHE_PATH),
            max_size_mb: DEFAULT_CACHE_MAX_SIZE_MB,
            sweep_interval: Duration::from_secs(DEFAULT_CACHE_SWEEP_INTERVAL_SECS),
        }
    }
}

// ============================================================================
// SERVICE CONFIGURATION
// ============================================================================

/// Complete process configuration.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub db: DbConfig,
    pub cache: CacheSettings,
    pub repository: RepositoryConfig,
    pub challenge: ChallengeConfig,
    pub audit: AuditConfig,
    pub log_format: LogFormat,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_enum<T: FromStr<Err = ConfigError> + Default>(key: &str) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse(),
        Err(_) => Ok(T::default()),
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables and validate it.
    ///
    /// # Environment Variables
    /// - `KEYSTONE_DB_*`: see [`DbConfig::from_env`]
    /// - `KEYSTONE_CACHE_BACKEND`: `memory` or `lmdb` (default: memory)
    /// - `KEYSTONE_CACHE_DOMAIN`: key prefix (default: keystone)
    /// - `KEYSTONE_CACHE_PATH`: LMDB directory (default: ./data/cache)
    /// - `KEYSTONE_CACHE_MAX_SIZE_MB`: LMDB map size (default: 256)
    /// - `KEYSTONE_CACHE_SWEEP_INTERVAL_SECS`: expired-entry sweep (default: 60)
    /// - `KEYSTONE_CACHE_ENTRY_TTL_SECS`: positive entry TTL (default: 900)
    /// - `KEYSTONE_CACHE_NEGATIVE_TTL_SECS`: sentinel TTL (default: 60)
    /// - `KEYSTONE_CACHE_TIMEOUT_MS`: per cache call (default: 3000)
    /// - `KEYSTONE_STORE_TIMEOUT_MS`: per store call (default: 10000)
    /// - `KEYSTONE_CAPTCHA_SEND_WINDOW_SECS` (default: 60)
    /// - `KEYSTONE_CAPTCHA_VERIFY_WINDOW_SECS` (default: 300)
    /// - `KEYSTONE_CAPTCHA_MAX_ATTEMPTS` (default: 3)
    /// - `KEYSTONE_CAPTCHA_CODE_LENGTH` (default: 6)
    /// - `KEYSTONE_AUDIT_QUEUE_CAPACITY` (default: 1024)
    /// - `KEYSTONE_AUDIT_WRITE_TIMEOUT_MS` (default: 3000)
    /// - `KEYSTONE_LOG_FORMAT`: `json` or `pretty` (default: json)
    pub fn from_env() -> Result<Self, ConfigError> {
        let cache_timeout = Duration::from_millis(env_or(
            "KEYSTONE_CACHE_TIMEOUT_MS",
            DEFAULT_CACHE_TIMEOUT_MS,
        ));

        let cache = CacheSettings {
            backend: env_enum("KEYSTONE_CACHE_BACKEND")?,
            domain: std::env::var("KEYSTONE_CACHE_DOMAIN")
                .unwrap_or_else(|_| DEFAULT_CACHE_DOMAIN.to_string()),
            path: std::env::var("KEYSTONE_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CACHE_PATH)),
            max_size_mb: env_or("KEYSTONE_CACHE_MAX_SIZE_MB", DEFAULT_CACHE_MAX_SIZE_MB),
            sweep_interval: Duration::from_secs(env_or(
                "KEYSTONE_CACHE_SWEEP_INTERVAL_SECS",
                DEFAULT_CACHE_SWEEP_INTERVAL_SECS,
            )),
        };

        let repository = RepositoryConfig::new()
            .with_entry_ttl(Duration::from_secs(env_or(
                "KEYSTONE_CACHE_ENTRY_TTL_SECS",
                DEFAULT_CACHE_ENTRY_TTL_SECS,
            )))
            .with_negative_ttl(Duration::from_secs(env_or(
                "KEYSTONE_CACHE_NEGATIVE_TTL_SECS",
                DEFAULT_CACHE_NEGATIVE_TTL_SECS,
            )))
            .with_cache_timeout(cache_timeout)
            .with_store_timeout(Duration::from_millis(env_or(
                "KEYSTONE_STORE_TIMEOUT_MS",
                DEFAULT_STORE_TIMEOUT_MS,
            )));

        let challenge = ChallengeConfig {
            send_window: Duration::from_secs(env_or(
                "KEYSTONE_CAPTCHA_SEND_WINDOW_SECS",
                DEFAULT_CAPTCHA_SEND_WINDOW_SECS,
            )),
            verify_window: Duration::from_secs(env_or(
                "KEYSTONE_CAPTCHA_VERIFY_WINDOW_SECS",
                DEFAULT_CAPTCHA_VERIFY_WINDOW_SECS,
            )),
            max_attempts: env_or("KEYSTONE_CAPTCHA_MAX_ATTEMPTS", DEFAULT_CAPTCHA_MAX_ATTEMPTS),
            code_length: env_or("KEYSTONE_CAPTCHA_CODE_LENGTH", DEFAULT_CAPTCHA_CODE_LENGTH),
            cache_timeout,
        };

        let audit = AuditConfig {
            capacity: env_or("KEYSTONE_AUDIT_QUEUE_CAPACITY", DEFAULT_AUDIT_QUEUE_CAPACITY),
            write_timeout: Duration::from_millis(env_or(
                "KEYSTONE_AUDIT_WRITE_TIMEOUT_MS",
                DEFAULT_AUDIT_WRITE_TIMEOUT_MS,
            )),
        };

        let config = Self {
            db: DbConfig::from_env(),
            cache,
            repository,
            challenge,
            audit,
            log_format: env_enum("KEYSTONE_LOG_FORMAT")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the storage layer cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let repo = &self.repository;
        let challenge = &self.challenge;

        if self.cache.domain.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "KEYSTONE_CACHE_DOMAIN".to_string(),
            });
        }
        if self.cache.domain.contains(':') {
            return Err(invalid(
                "KEYSTONE_CACHE_DOMAIN",
                &self.cache.domain,
                "must not contain ':'",
            ));
        }
        if self.cache.backend == CacheBackend::Lmdb && self.cache.max_size_mb == 0 {
            return Err(invalid("KEYSTONE_CACHE_MAX_SIZE_MB", "0", "must be at least 1"));
        }
        if self.cache.sweep_interval.is_zero() {
            return Err(invalid("KEYSTONE_CACHE_SWEEP_INTERVAL_SECS", "0", "must be positive"));
        }

        if repo.entry_ttl.is_zero() {
            return Err(invalid("KEYSTONE_CACHE_ENTRY_TTL_SECS", "0", "must be positive"));
        }
        if repo.negative_ttl.is_zero() {
            return Err(invalid("KEYSTONE_CACHE_NEGATIVE_TTL_SECS", "0", "must be positive"));
        }
        if repo.negative_ttl > repo.entry_ttl {
            return Err(ConfigError::IncompatibleOptions {
                option_a: format!("KEYSTONE_CACHE_NEGATIVE_TTL_SECS={}", repo.negative_ttl.as_secs()),
                option_b: format!("KEYSTONE_CACHE_ENTRY_TTL_SECS={}", repo.entry_ttl.as_secs()),
            });
        }
        if repo.cache_timeout.is_zero() {
            return Err(invalid("KEYSTONE_CACHE_TIMEOUT_MS", "0", "must be positive"));
        }
        if repo.store_timeout.is_zero() {
            return Err(invalid("KEYSTONE_STORE_TIMEOUT_MS", "0", "must be positive"));
        }

        if challenge.max_attempts == 0 {
            return Err(invalid("KEYSTONE_CAPTCHA_MAX_ATTEMPTS", "0", "must be at least 1"));
        }
        if challenge.send_window > challenge.verify_window {
            return Err(ConfigError::IncompatibleOptions {
                option_a: format!(
                    "KEYSTONE_CAPTCHA_SEND_WINDOW_SECS={}",
                    challenge.send_window.as_secs()
                ),
                option_b: format!(
                    "KEYSTONE_CAPTCHA_VERIFY_WINDOW_SECS={}",
                    challenge.verify_window.as_secs()
                ),
            });
        }
        if !(MIN_CAPTCHA_CODE_LENGTH..=MAX_CAPTCHA_CODE_LENGTH).contains(&challenge.code_length) {
            return Err(invalid(
                "KEYSTONE_CAPTCHA_CODE_LENGTH",
                &challenge.code_length.to_string(),
                &format!(
                    "must be between {} and {}",
                    MIN_CAPTCHA_CODE_LENGTH, MAX_CAPTCHA_CODE_LENGTH
                ),
            ));
        }

        if self.audit.capacity == 0 {
            return Err(invalid("KEYSTONE_AUDIT_QUEUE_CAPACITY", "0", "must be at least 1"));
        }
        if self.audit.write_timeout.is_zero() {
            return Err(invalid("KEYSTONE_AUDIT_WRITE_TIMEOUT_MS", "0", "must be positive"));
        }

        if self.db.max_size == 0 {
            return Err(invalid("KEYSTONE_DB_POOL_SIZE", "0", "must be at least 1"));
        }

        Ok(())
    }

    /// Timeout used by the deny-list guard: the same bound as any other
    /// cache call.
    pub fn deny_list_timeout(&self) -> Duration {
        self.repository.cache_timeout
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
