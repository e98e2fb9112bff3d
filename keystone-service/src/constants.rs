//! Constants for the Keystone service
//!
//! Defaults for every environment variable read by [`crate::config`].
//! Cache and challenge defaults live next to the types they configure in
//! `keystone-storage`; the values here are the service-level ones.

// ============================================================================
// DATABASE
// ============================================================================

/// Default PostgreSQL host
pub const DEFAULT_DB_HOST: &str = "localhost";

/// Default PostgreSQL port
pub const DEFAULT_DB_PORT: u16 = 5432;

/// Default database name
pub const DEFAULT_DB_NAME: &str = "keystone";

/// Default database user
pub const DEFAULT_DB_USER: &str = "postgres";

/// Default connection pool size
pub const DEFAULT_DB_POOL_SIZE: usize = 16;

/// Default pool wait timeout in seconds
pub const DEFAULT_DB_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// CACHE
// ============================================================================

/// Default key-namespace domain
pub const DEFAULT_CACHE_DOMAIN: &str = "keystone";

/// Default LMDB directory
pub const DEFAULT_CACHE_PATH: &str = "./data/cache";

/// Default LMDB map size in megabytes
pub const DEFAULT_CACHE_MAX_SIZE_MB: usize = 256;

/// Default positive entry TTL (15 minutes)
pub const DEFAULT_CACHE_ENTRY_TTL_SECS: u64 = 900;

/// Default negative sentinel TTL (1 minute)
pub const DEFAULT_CACHE_NEGATIVE_TTL_SECS: u64 = 60;

/// Default timeout for one cache call
pub const DEFAULT_CACHE_TIMEOUT_MS: u64 = 3000;

/// Default timeout for one durable store call
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 10_000;

/// Default interval between expired-entry sweeps
pub const DEFAULT_CACHE_SWEEP_INTERVAL_SECS: u64 = 60;

// ============================================================================
// CAPTCHA
// ============================================================================

/// Default send window in seconds
pub const DEFAULT_CAPTCHA_SEND_WINDOW_SECS: u64 = 60;

/// Default verify window in seconds
pub const DEFAULT_CAPTCHA_VERIFY_WINDOW_SECS: u64 = 300;

/// Default verify attempts per issued code
pub const DEFAULT_CAPTCHA_MAX_ATTEMPTS: u32 = 3;

/// Default generated code length
pub const DEFAULT_CAPTCHA_CODE_LENGTH: usize = 6;

/// Shortest accepted code length
pub const MIN_CAPTCHA_CODE_LENGTH: usize = 4;

/// Longest accepted code length
pub const MAX_CAPTCHA_CODE_LENGTH: usize = 10;

// ============================================================================
// AUDIT
// ============================================================================

/// Default audit queue capacity
pub const DEFAULT_AUDIT_QUEUE_CAPACITY: usize = 1024;

/// Default timeout for one audit write
pub const DEFAULT_AUDIT_WRITE_TIMEOUT_MS: u64 = 3000;

/// Audit log table
pub const AUDIT_TABLE: &str = "sys_audit_log";
