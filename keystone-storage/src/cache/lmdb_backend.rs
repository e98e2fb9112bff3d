//! LMDB-backed cache implementation.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a persistent,
//! memory-mapped key-value store that survives process restarts and can be
//! shared by several processes on one host.
//!
//! # Value Layout
//!
//! `[expires_at: i64 little-endian unix millis, 0 = no expiry][payload]`
//!
//! Expiry is checked on read; expired entries are treated as absent and
//! removed by the next write touching them or by [`LmdbCacheStore::purge_expired`].
//!
//! # Atomicity
//!
//! LMDB allows a single write transaction at a time. Scripts read the key,
//! run, and write back inside one write transaction, so no other writer can
//! interleave.
//!
//! Waiting for the write lock blocks the calling thread. `set` and `delete`
//! therefore run on the blocking pool. Scripts borrow their caller's state
//! and run in place; they are short and only used by low-volume callers
//! (challenge codes).

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RoTxn};
use keystone_core::CacheError;

use super::traits::{AtomicScript, CacheResult, CacheStore, KeyTtl, ScriptSlot, SlotWrite, TtlUpdate};

const HEADER_LEN: usize = 8;
const BYTES_PER_MB: usize = 1024 * 1024;
const NO_EXPIRY: i64 = 0;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored bytes do not follow the value layout.
    #[error("Corrupt entry: {0}")]
    Corrupt(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for CacheError {
    fn from(e: LmdbCacheError) -> Self {
        match e {
            LmdbCacheError::EnvOpen(reason) | LmdbCacheError::DbOpen(reason) => {
                CacheError::Unavailable { reason }
            }
            other => CacheError::Backend {
                reason: other.to_string(),
            },
        }
    }
}

/// Read statistics for the LMDB store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LmdbCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expired_reads: u64,
}

/// Decoded stored entry.
struct StoredEntry<'a> {
    expires_at_ms: i64,
    payload: &'a [u8],
}

impl<'a> StoredEntry<'a> {
    fn decode(bytes: &'a [u8]) -> Result<Self, LmdbCacheError> {
        if bytes.len() < HEADER_LEN {
            return Err(LmdbCacheError::Corrupt(format!(
                "entry of {} bytes is shorter than the header",
                bytes.len()
            )));
        }
        let header: [u8; HEADER_LEN] = bytes[..HEADER_LEN]
            .try_into()
            .map_err(|_| LmdbCacheError::Corrupt("invalid expiry header".into()))?;
        Ok(Self {
            expires_at_ms: i64::from_le_bytes(header),
            payload: &bytes[HEADER_LEN..],
        })
    }

    fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms != NO_EXPIRY && self.expires_at_ms <= now_ms
    }

    fn remaining(&self, now_ms: i64) -> Option<Duration> {
        if self.expires_at_ms == NO_EXPIRY {
            return None;
        }
        let left = self.expires_at_ms.saturating_sub(now_ms).max(0);
        Some(Duration::from_millis(left as u64))
    }
}

fn encode_entry(expires_at_ms: i64, payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&expires_at_ms.to_le_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

fn deadline_ms(now_ms: i64, ttl: Duration) -> i64 {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    // A deadline of 0 would read back as "no expiry".
    now_ms.saturating_add(ttl_ms).max(1)
}

/// LMDB-backed cache store.
///
/// # Example
///
/// ```ignore
/// use keystone_storage::cache::{CacheStore, LmdbCacheStore};
///
/// let store = LmdbCacheStore::new("/var/lib/keystone/cache", 256)?;
/// store.set("admin:user:info:X", b"...", Some(Duration::from_secs(900))).await?;
/// ```
pub struct LmdbCacheStore {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
    hits: AtomicU64,
    misses: AtomicU64,
    expired_reads: AtomicU64,
}

impl LmdbCacheStore {
    /// Open (or create) an LMDB cache.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if the map size overflows, the directory cannot be
    /// created, or the LMDB environment or database cannot be opened.
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        let map_size = max_size_mb.checked_mul(BYTES_PER_MB).ok_or_else(|| {
            LmdbCacheError::EnvOpen(format!("map size of {} MB overflows usize", max_size_mb))
        })?;
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(Self {
            env,
            db,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired_reads: AtomicU64::new(0),
        })
    }

    /// Snapshot of read statistics.
    pub fn stats(&self) -> LmdbCacheStats {
        LmdbCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired_reads: self.expired_reads.load(Ordering::Relaxed),
        }
    }

    /// Delete every expired entry in one write transaction.
    pub fn purge_expired(&self) -> Result<u64, LmdbCacheError> {
        let now_ms = Utc::now().timestamp_millis();
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let mut expired = Vec::new();
        {
            let iter = self
                .db
                .iter(&wtxn)
                .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
            for result in iter {
                let (key, bytes) = result.map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
                match StoredEntry::decode(bytes) {
                    Ok(entry) if !entry.is_expired(now_ms) => {}
                    _ => expired.push(key.to_vec()),
                }
            }
        }

        let mut deleted = 0u64;
        for key in &expired {
            if self
                .db
                .delete(&mut wtxn, key.as_slice())
                .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?
            {
                deleted += 1;
            }
        }

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        Ok(deleted)
    }

    /// Read a live entry, returning its payload and remaining TTL.
    fn read_live(
        &self,
        txn: &RoTxn,
        key: &str,
        now_ms: i64,
    ) -> Result<Option<(Vec<u8>, Option<Duration>)>, LmdbCacheError> {
        let bytes = self
            .db
            .get(txn, key.as_bytes())
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let Some(bytes) = bytes else {
            return Ok(None);
        };
        let entry = StoredEntry::decode(bytes)?;
        if entry.is_expired(now_ms) {
            self.expired_reads.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }
        Ok(Some((entry.payload.to_vec(), entry.remaining(now_ms))))
    }

    /// Run a write on the blocking pool with its own handles to the env.
    async fn blocking_write<T, F>(&self, write: F) -> CacheResult<T>
    where
        F: FnOnce(&Env, Database<Bytes, Bytes>) -> Result<T, LmdbCacheError> + Send + 'static,
        T: Send + 'static,
    {
        let env = self.env.clone();
        let db = self.db;
        tokio::task::spawn_blocking(move || write(&env, db))
            .await
            .map_err(|e| CacheError::Backend {
                reason: format!("LMDB write task failed: {}", e),
            })?
            .map_err(CacheError::from)
    }
}

/// Put or delete one key in its own write transaction. Returns whether a
/// live entry was present before the write.
fn write_entry(
    env: &Env,
    db: Database<Bytes, Bytes>,
    key: &str,
    bytes: Option<Vec<u8>>,
) -> Result<bool, LmdbCacheError> {
    let now_ms = Utc::now().timestamp_millis();
    let mut wtxn = env
        .write_txn()
        .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

    let was_live = db
        .get(&wtxn, key.as_bytes())
        .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?
        .and_then(|bytes| StoredEntry::decode(bytes).ok())
        .is_some_and(|entry| !entry.is_expired(now_ms));

    match bytes {
        Some(bytes) => db
            .put(&mut wtxn, key.as_bytes(), bytes.as_slice())
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?,
        None => {
            db.delete(&mut wtxn, key.as_bytes())
                .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        }
    }

    wtxn.commit()
        .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
    Ok(was_live)
}

#[async_trait]
impl CacheStore for LmdbCacheStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now_ms = Utc::now().timestamp_millis();
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let found = self.read_live(&rtxn, key, now_ms)?;
        match &found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        Ok(found.map(|(payload, _)| payload))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        let bytes = match ttl {
            Some(ttl) if ttl.is_zero() => None,
            ttl => {
                let now_ms = Utc::now().timestamp_millis();
                let expires_at_ms = ttl.map_or(NO_EXPIRY, |ttl| deadline_ms(now_ms, ttl));
                Some(encode_entry(expires_at_ms, value))
            }
        };
        let key = key.to_string();
        self.blocking_write(move |env, db| write_entry(env, db, &key, bytes))
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let key = key.to_string();
        self.blocking_write(move |env, db| write_entry(env, db, &key, None))
            .await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let now_ms = Utc::now().timestamp_millis();
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        Ok(self.read_live(&rtxn, key, now_ms)?.is_some())
    }

    async fn ttl(&self, key: &str) -> CacheResult<KeyTtl> {
        let now_ms = Utc::now().timestamp_millis();
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        Ok(match self.read_live(&rtxn, key, now_ms)? {
            None => KeyTtl::Missing,
            Some((_, None)) => KeyTtl::Persistent,
            Some((_, Some(remaining))) => KeyTtl::Expires(remaining),
        })
    }

    async fn run_script(&self, key: &str, script: &dyn AtomicScript) -> CacheResult<i64> {
        let now_ms = Utc::now().timestamp_millis();
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let raw = self
            .db
            .get(&wtxn, key.as_bytes())
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?
            .map(|bytes| bytes.to_vec());

        // Corrupt entries are handed to the script as absent and overwritten.
        let current = raw
            .as_deref()
            .and_then(|bytes| StoredEntry::decode(bytes).ok())
            .filter(|entry| !entry.is_expired(now_ms))
            .map(|entry| (entry.payload.to_vec(), entry.expires_at_ms, entry.remaining(now_ms)));

        let mut slot = match &current {
            Some((payload, _, remaining)) => ScriptSlot::loaded(payload.clone(), *remaining),
            None => ScriptSlot::empty(),
        };
        let code = script.run(&mut slot);

        match slot.into_write() {
            Some(SlotWrite::Set { value, ttl }) => {
                let expires_at_ms = match ttl {
                    TtlUpdate::Keep => current.as_ref().map_or(NO_EXPIRY, |(_, at, _)| *at),
                    TtlUpdate::Expire(ttl) => deadline_ms(now_ms, ttl),
                    TtlUpdate::Persist => NO_EXPIRY,
                };
                self.db
                    .put(&mut wtxn, key.as_bytes(), encode_entry(expires_at_ms, &value).as_slice())
                    .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
            }
            Some(SlotWrite::Delete) => {
                self.db
                    .delete(&mut wtxn, key.as_bytes())
                    .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
            }
            None if raw.is_some() && current.is_none() => {
                self.db
                    .delete(&mut wtxn, key.as_bytes())
                    .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
            }
            None => {}
        }

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        tracing::trace!(script = script.name(), key, code, "cache script executed");
        Ok(code)
    }
}
