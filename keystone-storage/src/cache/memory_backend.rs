//! In-process cache backend.
//!
//! Entries live in a [`DashMap`]; expiry deadlines use the tokio clock so
//! tests can drive TTLs with a paused runtime. Expired entries behave as
//! absent on every operation and are removed lazily, or in bulk through
//! [`MemoryCacheStore::purge_expired`].
//!
//! Scripts run inside the map's entry API, which holds the shard lock for
//! the key until the script's write has been applied.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use super::traits::{AtomicScript, CacheResult, CacheStore, KeyTtl, ScriptSlot, SlotWrite, TtlUpdate};

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }

    fn remaining(&self, now: Instant) -> Option<Duration> {
        self.expires_at
            .map(|deadline| deadline.saturating_duration_since(now))
    }
}

/// Cache store backed by a concurrent hash map.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, MemoryEntry>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn live(&self, key: &str) -> Option<MemoryEntry> {
        let now = Instant::now();
        let entry = self.entries.get(key)?.clone();
        if entry.is_expired(now) {
            self.entries.remove_if(key, |_, e| e.is_expired(now));
            return None;
        }
        Some(entry)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.live(key).map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        if ttl == Some(Duration::ZERO) {
            self.entries.remove(key);
            return Ok(());
        }
        let entry = MemoryEntry {
            value: value.to_vec(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired(now)))
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self.live(key).is_some())
    }

    async fn ttl(&self, key: &str) -> CacheResult<KeyTtl> {
        let now = Instant::now();
        Ok(match self.live(key) {
            None => KeyTtl::Missing,
            Some(entry) => match entry.remaining(now) {
                None => KeyTtl::Persistent,
                Some(remaining) => KeyTtl::Expires(remaining),
            },
        })
    }

    async fn run_script(&self, key: &str, script: &dyn AtomicScript) -> CacheResult<i64> {
        let now = Instant::now();

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get().clone();
                let mut slot = if current.is_expired(now) {
                    ScriptSlot::empty()
                } else {
                    ScriptSlot::loaded(current.value.clone(), current.remaining(now))
                };
                let code = script.run(&mut slot);

                match slot.into_write() {
                    Some(SlotWrite::Set { value, ttl }) => {
                        let expires_at = match ttl {
                            TtlUpdate::Keep if current.is_expired(now) => None,
                            TtlUpdate::Keep => current.expires_at,
                            TtlUpdate::Expire(ttl) => Some(now + ttl),
                            TtlUpdate::Persist => None,
                        };
                        occupied.insert(MemoryEntry { value, expires_at });
                    }
                    Some(SlotWrite::Delete) => {
                        occupied.remove();
                    }
                    None if current.is_expired(now) => {
                        occupied.remove();
                    }
                    None => {}
                }
                Ok(code)
            }
            Entry::Vacant(vacant) => {
                let mut slot = ScriptSlot::empty();
                let code = script.run(&mut slot);

                if let Some(SlotWrite::Set { value, ttl }) = slot.into_write() {
                    let expires_at = match ttl {
                        TtlUpdate::Expire(ttl) => Some(now + ttl),
                        TtlUpdate::Keep | TtlUpdate::Persist => None,
                    };
                    vacant.insert(MemoryEntry { value, expires_at });
                }
                Ok(code)
            }
        }
    }
}
