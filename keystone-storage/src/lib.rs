//! Keystone Storage - Cache-Aside Persistence
//!
//! Storage layer for Keystone records:
//!
//! - [`cache`]: cache store trait, key namespace, in-memory and LMDB backends
//! - [`store`]: durable store trait and in-memory mock
//! - [`repository`]: versioned repository with cache-aside reads and
//!   optimistic writes
//! - [`challenge`]: one-time challenge codes issued and verified by atomic
//!   cache scripts
//! - [`deny_list`]: token revocation list
//! - [`audit`]: bounded, non-blocking audit queue
//!
//! The PostgreSQL store lives in keystone-service.

pub mod audit;
pub mod cache;
pub mod challenge;
pub mod deny_list;
pub mod flight;
pub mod repository;
pub mod store;

pub use audit::{
    audit_channel, AuditConfig, AuditHandle, AuditMetrics, AuditMetricsSnapshot, AuditOutcome,
    AuditRecord, AuditSink, AuditWorker,
};
pub use cache::{
    AtomicScript, CacheResult, CacheStore, CachedValue, KeyNamespace, KeyTtl, LmdbCacheError,
    LmdbCacheStore, MemoryCacheStore, ScriptSlot, NOT_FOUND_SENTINEL,
};
pub use challenge::{generate_code, ChallengeConfig, ChallengeVerifier};
pub use deny_list::DenyListGuard;
pub use flight::{FlightGroup, FlightGuard};
pub use repository::{
    RepositoryConfig, RepositoryStats, RepositoryStatsSnapshot, UpdateOutcome, VersionedRepository,
};
pub use store::{DurableStore, MockDurableStore, StoreResult};
