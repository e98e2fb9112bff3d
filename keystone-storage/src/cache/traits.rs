//! Cache store traits and the atomic script slot.
//!
//! This module defines the contract every cache backend implements and the
//! [`AtomicScript`] abstraction used for multi-step check-and-mutate
//! operations that must not interleave with other callers.

use std::time::Duration;

use async_trait::async_trait;
use keystone_core::CacheError;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist (or has expired).
    Missing,
    /// The key exists and never expires.
    Persistent,
    /// The key exists and expires after the given duration.
    Expires(Duration),
}

/// Key-value cache with per-key TTL and atomic script execution.
///
/// Implementations must be safe to share across tasks. Expired keys must be
/// indistinguishable from absent keys on every method.
///
/// # Atomicity
///
/// [`run_script`](CacheStore::run_script) must run the script while holding
/// exclusive access to the key: no other `set`, `delete` or script on the
/// same key may observe or change it between the script's read and the
/// write-back of its result.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get the value stored at `key`.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store `value` at `key`, replacing any previous value.
    ///
    /// `ttl = None` stores the key without expiry. A zero TTL removes the key.
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()>;

    /// Delete `key`. Returns whether a live key was removed.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Check whether `key` exists.
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Remaining lifetime of `key`.
    async fn ttl(&self, key: &str) -> CacheResult<KeyTtl>;

    /// Run `script` atomically against `key`, returning its result code.
    async fn run_script(&self, key: &str, script: &dyn AtomicScript) -> CacheResult<i64>;
}

#[async_trait]
impl<T: CacheStore + ?Sized> CacheStore for std::sync::Arc<T> {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        (**self).delete(key).await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        (**self).exists(key).await
    }

    async fn ttl(&self, key: &str) -> CacheResult<KeyTtl> {
        (**self).ttl(key).await
    }

    async fn run_script(&self, key: &str, script: &dyn AtomicScript) -> CacheResult<i64> {
        (**self).run_script(key, script).await
    }
}

/// A multi-step operation executed by the cache as one indivisible unit.
///
/// The backend loads the current state of the key into a [`ScriptSlot`],
/// calls [`run`](AtomicScript::run), and persists whatever the script wrote
/// to the slot before releasing the key.
pub trait AtomicScript: Send + Sync {
    /// Stable script identifier, used in logs and errors.
    fn name(&self) -> &'static str;

    /// Execute against the slot and return an integer result code.
    fn run(&self, slot: &mut ScriptSlot) -> i64;
}

/// TTL handling for a script write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlUpdate {
    /// Keep whatever expiry the key already had.
    Keep,
    /// Expire after the given duration.
    Expire(Duration),
    /// Remove any expiry.
    Persist,
}

/// Pending write produced by a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotWrite {
    Set { value: Vec<u8>, ttl: TtlUpdate },
    Delete,
}

/// View of a single key handed to an [`AtomicScript`].
#[derive(Debug, Clone, Default)]
pub struct ScriptSlot {
    value: Option<Vec<u8>>,
    ttl: Option<Duration>,
    write: Option<SlotWrite>,
}

impl ScriptSlot {
    /// Slot for a key that does not exist.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Slot for an existing key with its remaining TTL (`None` = no expiry).
    pub fn loaded(value: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self {
            value: Some(value),
            ttl,
            write: None,
        }
    }

    pub fn exists(&self) -> bool {
        self.value.is_some()
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    /// Remaining TTL of the key; `None` when absent or without expiry.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Replace the value and expiry (`None` = no expiry).
    pub fn set(&mut self, value: Vec<u8>, ttl: Option<Duration>) {
        let update = match ttl {
            Some(ttl) => TtlUpdate::Expire(ttl),
            None => TtlUpdate::Persist,
        };
        self.ttl = ttl;
        self.value = Some(value.clone());
        self.write = Some(SlotWrite::Set {
            value,
            ttl: update,
        });
    }

    /// Replace the value, keeping the current expiry.
    pub fn set_keep_ttl(&mut self, value: Vec<u8>) {
        self.value = Some(value.clone());
        self.write = Some(SlotWrite::Set {
            value,
            ttl: TtlUpdate::Keep,
        });
    }

    /// Remove the key.
    pub fn delete(&mut self) {
        self.value = None;
        self.ttl = None;
        self.write = Some(SlotWrite::Delete);
    }

    /// The write the backend must persist, if any.
    pub fn into_write(self) -> Option<SlotWrite> {
        self.write
    }
}
