//! Cache layer: backends, key namespace and entry encoding.
//!
//! The cache is a key-value store with per-key TTL and atomic scripts. It is
//! never authoritative for entity data; the durable store is. The cache is
//! authoritative only for state that lives nowhere else (challenge records
//! and deny-list entries).
//!
//! # Backends
//!
//! - [`MemoryCacheStore`]: in-process, `DashMap`-backed.
//! - [`LmdbCacheStore`]: memory-mapped LMDB file, survives restarts and can be
//!   shared between processes on one host.
//!
//! # Example
//!
//! ```ignore
//! let cache = MemoryCacheStore::new();
//! let keys = KeyNamespace::new("admin");
//! cache.set(&keys.entity_info(EntityKind::User, &id), &bytes, Some(ttl)).await?;
//! ```

pub mod entry;
pub mod keys;
pub mod lmdb_backend;
pub mod memory_backend;
pub mod traits;

pub use entry::{CachedValue, NOT_FOUND_SENTINEL};
pub use keys::{deny_list_key, KeyNamespace, DENY_LIST_PREFIX};
pub use lmdb_backend::{LmdbCacheError, LmdbCacheStats, LmdbCacheStore};
pub use memory_backend::MemoryCacheStore;
pub use traits::{AtomicScript, CacheResult, CacheStore, KeyTtl, ScriptSlot, SlotWrite, TtlUpdate};
