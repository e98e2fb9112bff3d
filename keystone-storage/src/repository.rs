//! Versioned repository: cache-aside reads and optimistic writes.
//!
//! One [`VersionedRepository`] serves one entity kind. It owns the cache
//! lifecycle of that kind's entries:
//!
//! - **Read**: cache first; on a miss, one caller per id loads from the
//!   durable store and populates either the record or a short-lived
//!   `not_found` sentinel. Cache failures are logged and fall through.
//! - **Write**: a single conditional update on `(id, version)`, then the
//!   cache key is deleted. The durable write always happens first, and a
//!   cache failure never turns a successful write into an error.
//!
//! The repository holds no lock for correctness. Conflicts are detected by
//! the durable store's version check alone.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use keystone_core::{
    AuditAction, CacheError, EntityKind, FieldPatch, KeystoneError, KeystoneResult, Payload,
    Record, RecordId, StoreError,
};

use crate::audit::{AuditHandle, AuditOutcome, AuditRecord};
use crate::cache::{CacheStore, CachedValue, KeyNamespace};
use crate::flight::FlightGroup;
use crate::store::{DurableStore, StoreResult};

/// Default lifetime of a positive cache entry.
pub const DEFAULT_ENTRY_TTL: Duration = Duration::from_secs(15 * 60);

/// Default lifetime of a `not_found` sentinel.
pub const DEFAULT_NEGATIVE_TTL: Duration = Duration::from_secs(60);

/// Default bound on a single cache call.
pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_secs(3);

/// Default bound on a single durable store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for a versioned repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// TTL of positive cache entries.
    pub entry_ttl: Duration,
    /// TTL of negative sentinels. Bounds how long a newly created id can stay
    /// invisible to readers that looked it up before it existed.
    pub negative_ttl: Duration,
    /// Timeout for each cache call.
    pub cache_timeout: Duration,
    /// Timeout for each durable store call.
    pub store_timeout: Duration,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            entry_ttl: DEFAULT_ENTRY_TTL,
            negative_ttl: DEFAULT_NEGATIVE_TTL,
            cache_timeout: DEFAULT_CACHE_TIMEOUT,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

impl RepositoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the positive entry TTL.
    pub fn with_entry_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }

    /// Set the negative sentinel TTL.
    pub fn with_negative_ttl(mut self, ttl: Duration) -> Self {
        self.negative_ttl = ttl;
        self
    }

    /// Set the cache call timeout.
    pub fn with_cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = timeout;
        self
    }

    /// Set the durable store call timeout.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }
}

// ============================================================================
// OUTCOMES AND STATS
// ============================================================================

/// Result of a conditional update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The update applied; carries the new version.
    Updated(i64),
    /// No record with this id.
    NotFound,
    /// The record exists at a different version.
    Conflict,
}

/// Counters for cache effectiveness.
#[derive(Debug, Default)]
pub struct RepositoryStats {
    pub hits: AtomicU64,
    pub negative_hits: AtomicU64,
    pub misses: AtomicU64,
    pub store_lookups: AtomicU64,
    pub cache_failures: AtomicU64,
}

impl RepositoryStats {
    pub fn snapshot(&self) -> RepositoryStatsSnapshot {
        RepositoryStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            negative_hits: self.negative_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            store_lookups: self.store_lookups.load(Ordering::Relaxed),
            cache_failures: self.cache_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`RepositoryStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryStatsSnapshot {
    pub hits: u64,
    pub negative_hits: u64,
    pub misses: u64,
    pub store_lookups: u64,
    pub cache_failures: u64,
}

impl RepositoryStatsSnapshot {
    /// Share of reads answered by the cache (positive or negative).
    pub fn hit_rate(&self) -> f64 {
        let answered = self.hits + self.negative_hits;
        let total = answered + self.misses;
        if total == 0 {
            0.0
        } else {
            answered as f64 / total as f64
        }
    }
}

// ============================================================================
// REPOSITORY
// ============================================================================

/// Cache-aside repository for one payload type.
///
/// # Type Parameters
///
/// * `P` - payload type; fixes the entity kind
/// * `D` - durable store
/// * `C` - cache store, shared with other repositories through an `Arc`
pub struct VersionedRepository<P, D, C: ?Sized> {
    store: D,
    cache: Arc<C>,
    keys: KeyNamespace,
    config: RepositoryConfig,
    flights: FlightGroup,
    stats: Arc<RepositoryStats>,
    audit: Option<AuditHandle>,
    _payload: PhantomData<fn() -> P>,
}

impl<P, D, C> VersionedRepository<P, D, C>
where
    P: Payload,
    D: DurableStore<P>,
    C: CacheStore + ?Sized + 'static,
{
    /// Create a repository.
    pub fn new(store: D, cache: Arc<C>, keys: KeyNamespace, config: RepositoryConfig) -> Self {
        Self {
            store,
            cache,
            keys,
            config,
            flights: FlightGroup::new(),
            stats: Arc::new(RepositoryStats::default()),
            audit: None,
            _payload: PhantomData,
        }
    }

    /// Record create, update and delete outcomes on the given audit queue.
    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Entity kind served by this repository.
    pub fn kind(&self) -> EntityKind {
        P::kind()
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn store(&self) -> &D {
        &self.store
    }

    /// Cache key for an id.
    pub fn cache_key(&self, id: &RecordId) -> String {
        self.keys.entity_info(P::kind(), id)
    }

    pub fn stats(&self) -> RepositoryStatsSnapshot {
        self.stats.snapshot()
    }

    // ------------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------------

    /// Read a record by id. `Ok(None)` when it does not exist.
    pub async fn find(&self, id: &RecordId) -> KeystoneResult<Option<Record<P>>> {
        let key = self.cache_key(id);

        if let Some(cached) = self.lookup_cache(&key).await {
            return Ok(cached);
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        let _flight = self.flights.acquire(&key).await;

        // The caller that held the flight before us has populated the key.
        if let Some(cached) = self.lookup_cache(&key).await {
            return Ok(cached);
        }

        self.stats.store_lookups.fetch_add(1, Ordering::Relaxed);
        let found = self
            .store_call("find_by_id", self.store.find_by_id(id))
            .await?;

        match &found {
            Some(record) => {
                self.populate(&key, &CachedValue::Present(record.clone()), self.config.entry_ttl)
                    .await
            }
            None => {
                self.populate(&key, &CachedValue::<Record<P>>::Absent, self.config.negative_ttl)
                    .await
            }
        }

        Ok(found)
    }

    /// Read a record by id, mapping absence to [`KeystoneError::NotFound`].
    pub async fn get(&self, id: &RecordId) -> KeystoneResult<Record<P>> {
        self.find(id).await?.ok_or_else(|| KeystoneError::NotFound {
            kind: P::kind(),
            id: id.clone(),
        })
    }

    /// `Some(Some(record))` on a positive hit, `Some(None)` on a sentinel,
    /// `None` when the cache cannot answer.
    async fn lookup_cache(&self, key: &str) -> Option<Option<Record<P>>> {
        let bytes = match self.cache_call("get", self.cache.get(key)).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                self.stats.cache_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, key = %key, "Cache read failed, falling back to store");
                return None;
            }
        };

        match CachedValue::<Record<P>>::decode(&bytes) {
            Ok(CachedValue::Present(record)) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(Some(record))
            }
            Ok(CachedValue::Absent) => {
                self.stats.negative_hits.fetch_add(1, Ordering::Relaxed);
                Some(None)
            }
            Err(e) => {
                self.stats.cache_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, key = %key, "Undecodable cache entry, falling back to store");
                None
            }
        }
    }

    async fn populate(&self, key: &str, value: &CachedValue<Record<P>>, ttl: Duration) {
        let bytes = match value.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                self.stats.cache_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, key = %key, "Failed to encode cache entry");
                return;
            }
        };
        if let Err(e) = self
            .cache_call("set", self.cache.set(key, &bytes, Some(ttl)))
            .await
        {
            self.stats.cache_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                error = %e,
                key = %key,
                negative = value.is_absent(),
                "Failed to populate cache"
            );
        }
    }

    // ------------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------------

    /// Create a record with a fresh id and version 1.
    ///
    /// No cache operation: a generated id cannot have been read before.
    pub async fn create(&self, payload: P, creator: &str) -> KeystoneResult<Record<P>> {
        let record = Record::create(payload, creator);
        self.store_new(&record).await?;
        Ok(record)
    }

    /// Insert a record whose id was chosen by the caller.
    ///
    /// The id may have been looked up before it existed, so any `not_found`
    /// sentinel for it is evicted after the insert.
    pub async fn insert(&self, record: Record<P>) -> KeystoneResult<Record<P>> {
        self.store_new(&record).await?;
        self.invalidate(&record.id).await;
        Ok(record)
    }

    async fn store_new(&self, record: &Record<P>) -> KeystoneResult<()> {
        let result = self.store_call("insert", self.store.insert(record)).await;
        let outcome = match &result {
            Ok(()) => AuditOutcome::Success,
            Err(_) => AuditOutcome::Failed,
        };
        self.audit(&record.creator, &record.id, AuditAction::Create, outcome);
        Ok(result?)
    }

    /// Apply `patch` if the stored version equals `expected_version`.
    ///
    /// On success the cache key is deleted (not repopulated); the next read
    /// loads the new version. A failed delete is logged and does not change
    /// the outcome.
    pub async fn conditional_update(
        &self,
        id: &RecordId,
        expected_version: i64,
        patch: &FieldPatch,
        modifier: &str,
    ) -> KeystoneResult<UpdateOutcome> {
        let at = Utc::now();
        let rows = self
            .store_call(
                "conditional_update",
                self.store
                    .conditional_update(id, expected_version, patch, modifier, at),
            )
            .await;

        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => {
                self.audit(modifier, id, AuditAction::Update, AuditOutcome::Failed);
                return Err(e.into());
            }
        };

        if rows >= 1 {
            self.invalidate(id).await;
            self.audit(modifier, id, AuditAction::Update, AuditOutcome::Success);
            return Ok(UpdateOutcome::Updated(expected_version + 1));
        }

        // Zero rows: tell a missing record from a stale version.
        let exists = match self.store_call("exists", self.store.exists(id)).await {
            Ok(exists) => exists,
            Err(e) => {
                self.audit(modifier, id, AuditAction::Update, AuditOutcome::Failed);
                return Err(e.into());
            }
        };

        let outcome = if exists {
            tracing::debug!(
                kind = %P::kind(),
                id = %id,
                expected_version,
                "Version conflict"
            );
            self.audit(modifier, id, AuditAction::Update, AuditOutcome::Conflict);
            UpdateOutcome::Conflict
        } else {
            self.audit(modifier, id, AuditAction::Update, AuditOutcome::NotFound);
            UpdateOutcome::NotFound
        };
        Ok(outcome)
    }

    /// Like [`conditional_update`](Self::conditional_update), with
    /// `NotFound` and `Conflict` mapped onto the error taxonomy.
    /// Returns the new version.
    pub async fn update(
        &self,
        id: &RecordId,
        expected_version: i64,
        patch: &FieldPatch,
        modifier: &str,
    ) -> KeystoneResult<i64> {
        match self
            .conditional_update(id, expected_version, patch, modifier)
            .await?
        {
            UpdateOutcome::Updated(version) => Ok(version),
            UpdateOutcome::NotFound => Err(KeystoneError::NotFound {
                kind: P::kind(),
                id: id.clone(),
            }),
            UpdateOutcome::Conflict => Err(KeystoneError::VersionConflict {
                kind: P::kind(),
                id: id.clone(),
                expected: expected_version,
            }),
        }
    }

    /// Delete a record, then evict its cache key.
    pub async fn delete(&self, id: &RecordId, actor: &str) -> KeystoneResult<()> {
        let rows = match self.store_call("delete", self.store.delete(id)).await {
            Ok(rows) => rows,
            Err(e) => {
                self.audit(actor, id, AuditAction::Delete, AuditOutcome::Failed);
                return Err(e.into());
            }
        };

        if rows == 0 {
            self.audit(actor, id, AuditAction::Delete, AuditOutcome::NotFound);
            return Err(KeystoneError::NotFound {
                kind: P::kind(),
                id: id.clone(),
            });
        }

        self.invalidate(id).await;
        self.audit(actor, id, AuditAction::Delete, AuditOutcome::Success);
        Ok(())
    }

    /// Evict the cache key for `id`. Returns whether the eviction succeeded.
    ///
    /// Runs on its own task so that dropping the caller's future after the
    /// durable write cannot skip the eviction. Failures are logged and never
    /// returned as errors.
    ///
    /// The eviction holds the key's flight guard, so a loader that read the
    /// row before the write finishes populating first and its entry is the
    /// one removed. Loaders that start afterwards read the committed row.
    pub async fn invalidate(&self, id: &RecordId) -> bool {
        let key = self.cache_key(id);
        let cache = Arc::clone(&self.cache);
        let stats = Arc::clone(&self.stats);
        let flights = self.flights.clone();
        let timeout = self.config.cache_timeout;

        let task = tokio::spawn(async move {
            let _flight = flights.acquire(&key).await;
            let result = match tokio::time::timeout(timeout, cache.delete(&key)).await {
                Ok(result) => result,
                Err(_) => Err(CacheError::Timeout {
                    operation: "delete".to_string(),
                    after: timeout,
                }),
            };
            match result {
                Ok(_) => true,
                Err(e) => {
                    stats.cache_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        error = %e,
                        key = %key,
                        "Cache invalidation failed, entry expires on its TTL"
                    );
                    false
                }
            }
        });

        match task.await {
            Ok(evicted) => evicted,
            Err(e) => {
                tracing::warn!(error = %e, kind = %P::kind(), id = %id, "Cache invalidation task failed");
                false
            }
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    async fn cache_call<T, F>(&self, operation: &'static str, fut: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        match tokio::time::timeout(self.config.cache_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout {
                operation: operation.to_string(),
                after: self.config.cache_timeout,
            }),
        }
    }

    async fn store_call<T, F>(&self, operation: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.config.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                operation: operation.to_string(),
                after: self.config.store_timeout,
            }),
        }
    }

    fn audit(&self, actor: &str, id: &RecordId, action: AuditAction, outcome: AuditOutcome) {
        if let Some(audit) = &self.audit {
            audit.record(AuditRecord::new(actor, P::kind(), id, action, outcome));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{audit_channel, AuditConfig};
    use crate::cache::{MemoryCacheStore, NOT_FOUND_SENTINEL};
    use crate::store::MockDurableStore;
    use keystone_core::{DataScope, Role};

    type TestRepo = VersionedRepository<Role, Arc<MockDurableStore<Role>>, MemoryCacheStore>;

    fn make_repo() -> (TestRepo, Arc<MockDurableStore<Role>>, Arc<MemoryCacheStore>) {
        let store = Arc::new(MockDurableStore::new());
        let cache = Arc::new(MemoryCacheStore::new());
        let repo = VersionedRepository::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            KeyNamespace::new("admin"),
            RepositoryConfig::default(),
        );
        (repo, store, cache)
    }

    fn make_role(name: &str) -> Role {
        Role {
            name: name.to_string(),
            code: name.to_lowercase(),
            data_scope: DataScope::All,
        }
    }

    #[tokio::test]
    async fn test_read_populates_cache() {
        let (repo, _store, cache) = make_repo();
        let record = repo.create(make_role("Ops"), "admin").await.unwrap();
        let key = repo.cache_key(&record.id);
        assert!(!cache.exists(&key).await.unwrap());

        let first = repo.get(&record.id).await.unwrap();
        assert_eq!(first, record);
        assert!(cache.exists(&key).await.unwrap());

        let second = repo.get(&record.id).await.unwrap();
        assert_eq!(second, record);

        let stats = repo.stats();
        assert_eq!(stats.store_lookups, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[tokio::test]
    async fn test_missing_id_caches_sentinel() {
        let (repo, _store, cache) = make_repo();
        let id = RecordId::new("ghost");

        assert_eq!(repo.find(&id).await.unwrap(), None);
        let key = repo.cache_key(&id);
        assert_eq!(cache.get(&key).await.unwrap().as_deref(), Some(NOT_FOUND_SENTINEL));

        let err = repo.get(&id).await.unwrap_err();
        assert!(matches!(err, KeystoneError::NotFound { kind: EntityKind::Role, .. }));
        assert_eq!(repo.stats().store_lookups, 1);
        assert_eq!(repo.stats().negative_hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sentinel_ttl_is_short() {
        let (repo, _store, cache) = make_repo();
        let id = RecordId::new("ghost");
        repo.find(&id).await.unwrap();

        assert_eq!(
            cache.ttl(&repo.cache_key(&id)).await.unwrap(),
            crate::cache::KeyTtl::Expires(DEFAULT_NEGATIVE_TTL)
        );
    }

    #[tokio::test]
    async fn test_update_invalidates_instead_of_repopulating() {
        let (repo, _store, cache) = make_repo();
        let record = repo.create(make_role("Ops"), "admin").await.unwrap();
        repo.get(&record.id).await.unwrap();

        let patch = FieldPatch::new().set("name", "Operations");
        let version = repo.update(&record.id, 1, &patch, "editor").await.unwrap();
        assert_eq!(version, 2);
        assert!(!cache.exists(&repo.cache_key(&record.id)).await.unwrap());

        let reread = repo.get(&record.id).await.unwrap();
        assert_eq!(reread.version, 2);
        assert_eq!(reread.payload.name, "Operations");
        assert_eq!(reread.modifier, "editor");
    }

    #[tokio::test]
    async fn test_update_distinguishes_conflict_from_not_found() {
        let (repo, _store, _cache) = make_repo();
        let record = repo.create(make_role("Ops"), "admin").await.unwrap();
        let patch = FieldPatch::new().sort(3);

        let outcome = repo
            .conditional_update(&record.id, 5, &patch, "editor")
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Conflict);

        let outcome = repo
            .conditional_update(&RecordId::new("nope"), 1, &patch, "editor")
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::NotFound);

        let err = repo.update(&record.id, 5, &patch, "editor").await.unwrap_err();
        assert!(matches!(err, KeystoneError::VersionConflict { expected: 5, .. }));
    }

    #[tokio::test]
    async fn test_invalid_patch_propagates_store_error() {
        let (repo, _store, _cache) = make_repo();
        let record = repo.create(make_role("Ops"), "admin").await.unwrap();
        let patch = FieldPatch::new().set("unknown", 1);

        let err = repo.update(&record.id, 1, &patch, "editor").await.unwrap_err();
        assert!(matches!(err, KeystoneError::Store(StoreError::InvalidPatch { .. })));
    }

    #[tokio::test]
    async fn test_delete_removes_record_and_cache_entry() {
        let (repo, store, cache) = make_repo();
        let record = repo.create(make_role("Ops"), "admin").await.unwrap();
        repo.get(&record.id).await.unwrap();

        repo.delete(&record.id, "admin").await.unwrap();
        assert!(store.is_empty());
        assert!(!cache.exists(&repo.cache_key(&record.id)).await.unwrap());
        assert_eq!(repo.find(&record.id).await.unwrap(), None);

        let err = repo.delete(&record.id, "admin").await.unwrap_err();
        assert!(matches!(err, KeystoneError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_insert_evicts_stale_sentinel() {
        let (repo, _store, _cache) = make_repo();
        let record = Record::create(make_role("Ops"), "admin");
        assert_eq!(repo.find(&record.id).await.unwrap(), None);

        repo.insert(record.clone()).await.unwrap();
        assert_eq!(repo.find(&record.id).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_undecodable_entry_falls_back_to_store() {
        let (repo, _store, cache) = make_repo();
        let record = repo.create(make_role("Ops"), "admin").await.unwrap();
        let key = repo.cache_key(&record.id);
        cache.set(&key, b"\xff\xfe", None).await.unwrap();

        assert_eq!(repo.get(&record.id).await.unwrap(), record);
        assert!(repo.stats().cache_failures >= 1);
        // Repopulated with a decodable entry.
        assert_eq!(repo.get(&record.id).await.unwrap(), record);
        assert_eq!(repo.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_mutations_are_audited() {
        let (handle, _worker) = audit_channel(AuditConfig::default());
        let (repo, _store, _cache) = make_repo();
        let repo = repo.with_audit(handle.clone());

        let record = repo.create(make_role("Ops"), "admin").await.unwrap();
        repo.update(&record.id, 1, &FieldPatch::new().sort(1), "admin")
            .await
            .unwrap();
        let _ = repo.update(&record.id, 1, &FieldPatch::new().sort(2), "admin").await;
        repo.delete(&record.id, "admin").await.unwrap();

        assert_eq!(handle.metrics().enqueued, 4);
    }

    #[test]
    fn test_config_builder() {
        let config = RepositoryConfig::new()
            .with_entry_ttl(Duration::from_secs(10))
            .with_negative_ttl(Duration::from_secs(2))
            .with_cache_timeout(Duration::from_millis(5))
            .with_store_timeout(Duration::from_millis(50));
        assert_eq!(config.entry_ttl, Duration::from_secs(10));
        assert_eq!(config.negative_ttl, Duration::from_secs(2));
        assert_eq!(config.cache_timeout, Duration::from_millis(5));
        assert_eq!(config.store_timeout, Duration::from_millis(50));
    }
}
