//! Shared service state.
//!
//! Builds one [`VersionedRepository`] per entity kind over a single shared
//! cache, plus the challenge verifier, the deny-list guard and the audit
//! queue handle.

use std::sync::Arc;
use std::time::Instant;

use deadpool_postgres::Pool;
use keystone_core::{Bucket, Dept, DictItem, EntityKind, Menu, Payload, Role, UserProfile};
use keystone_storage::{
    audit_channel, AuditHandle, AuditWorker, CacheStore, ChallengeVerifier, DenyListGuard,
    DurableStore, KeyNamespace, LmdbCacheError, LmdbCacheStore, MemoryCacheStore,
    MockDurableStore, RepositoryStatsSnapshot, VersionedRepository,
};

use crate::config::{CacheBackend, CacheSettings, ServiceConfig};
use crate::error::{ServiceError, ServiceResult};
use crate::pg_store::PgDurableStore;

/// Repository type used by the service for payload `P`.
pub type ServiceRepository<P> =
    VersionedRepository<P, Arc<dyn DurableStore<P>>, dyn CacheStore>;

// ============================================================================
// CACHE BACKEND
// ============================================================================

/// The configured cache backend.
///
/// Repositories see it as `dyn CacheStore`; the sweeper needs the concrete
/// type to purge expired entries.
#[derive(Clone)]
pub enum CacheBackendHandle {
    Memory(Arc<MemoryCacheStore>),
    Lmdb(Arc<LmdbCacheStore>),
}

impl CacheBackendHandle {
    /// Open the backend described by `settings`.
    pub fn open(settings: &CacheSettings) -> ServiceResult<Self> {
        match settings.backend {
            CacheBackend::Memory => Ok(Self::Memory(Arc::new(MemoryCacheStore::new()))),
            CacheBackend::Lmdb => {
                let store = LmdbCacheStore::new(&settings.path, settings.max_size_mb).map_err(
                    |e| ServiceError::internal_error(format!("Failed to open LMDB cache: {}", e)),
                )?;
                tracing::info!(
                    path = %settings.path.display(),
                    max_size_mb = settings.max_size_mb,
                    "LMDB cache opened"
                );
                Ok(Self::Lmdb(Arc::new(store)))
            }
        }
    }

    pub fn backend(&self) -> CacheBackend {
        match self {
            Self::Memory(_) => CacheBackend::Memory,
            Self::Lmdb(_) => CacheBackend::Lmdb,
        }
    }

    /// The backend as a shareable trait object.
    pub fn store(&self) -> Arc<dyn CacheStore> {
        match self {
            Self::Memory(store) => Arc::clone(store) as Arc<dyn CacheStore>,
            Self::Lmdb(store) => Arc::clone(store) as Arc<dyn CacheStore>,
        }
    }

    /// Remove expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<u64, LmdbCacheError> {
        match self {
            Self::Memory(store) => Ok(store.purge_expired() as u64),
            Self::Lmdb(store) => store.purge_expired(),
        }
    }
}

// ============================================================================
// DURABLE STORES
// ============================================================================

/// One durable store per entity kind.
#[derive(Clone)]
pub struct StoreSet {
    pub users: Arc<dyn DurableStore<UserProfile>>,
    pub roles: Arc<dyn DurableStore<Role>>,
    pub menus: Arc<dyn DurableStore<Menu>>,
    pub depts: Arc<dyn DurableStore<Dept>>,
    pub dicts: Arc<dyn DurableStore<DictItem>>,
    pub buckets: Arc<dyn DurableStore<Bucket>>,
}

impl StoreSet {
    /// PostgreSQL tables sharing one pool.
    pub fn postgres(pool: &Pool) -> Self {
        Self {
            users: Arc::new(PgDurableStore::<UserProfile>::new(pool.clone())),
            roles: Arc::new(PgDurableStore::<Role>::new(pool.clone())),
            menus: Arc::new(PgDurableStore::<Menu>::new(pool.clone())),
            depts: Arc::new(PgDurableStore::<Dept>::new(pool.clone())),
            dicts: Arc::new(PgDurableStore::<DictItem>::new(pool.clone())),
            buckets: Arc::new(PgDurableStore::<Bucket>::new(pool.clone())),
        }
    }

    /// In-process maps, for development and tests.
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(MockDurableStore::<UserProfile>::new()),
            roles: Arc::new(MockDurableStore::<Role>::new()),
            menus: Arc::new(MockDurableStore::<Menu>::new()),
            depts: Arc::new(MockDurableStore::<Dept>::new()),
            dicts: Arc::new(MockDurableStore::<DictItem>::new()),
            buckets: Arc::new(MockDurableStore::<Bucket>::new()),
        }
    }
}

// ============================================================================
// SERVICE STATE
// ============================================================================

fn repository<P: Payload>(
    store: Arc<dyn DurableStore<P>>,
    cache: &Arc<dyn CacheStore>,
    keys: &KeyNamespace,
    config: &ServiceConfig,
    audit: &AuditHandle,
) -> ServiceRepository<P> {
    VersionedRepository::new(store, Arc::clone(cache), keys.clone(), config.repository.clone())
        .with_audit(audit.clone())
}

/// Service-wide state shared by every caller.
pub struct ServiceState {
    pub config: ServiceConfig,
    pub cache: CacheBackendHandle,
    pub users: ServiceRepository<UserProfile>,
    pub roles: ServiceRepository<Role>,
    pub menus: ServiceRepository<Menu>,
    pub depts: ServiceRepository<Dept>,
    pub dicts: ServiceRepository<DictItem>,
    pub buckets: ServiceRepository<Bucket>,
    pub challenges: ChallengeVerifier<dyn CacheStore>,
    pub deny_list: DenyListGuard<dyn CacheStore>,
    pub audit: AuditHandle,
    pub start_time: Instant,
}

impl ServiceState {
    /// Wire the state. The returned worker must be run (see
    /// [`crate::jobs::BackgroundJobs`]) or audit records only pile up until
    /// the queue is full.
    pub fn build(
        config: ServiceConfig,
        cache: CacheBackendHandle,
        stores: StoreSet,
    ) -> (Self, AuditWorker) {
        let shared = cache.store();
        let keys = KeyNamespace::new(config.cache.domain.clone());
        let (audit, worker) = audit_channel(config.audit.clone());

        let users = repository(stores.users, &shared, &keys, &config, &audit);
        let roles = repository(stores.roles, &shared, &keys, &config, &audit);
        let menus = repository(stores.menus, &shared, &keys, &config, &audit);
        let depts = repository(stores.depts, &shared, &keys, &config, &audit);
        let dicts = repository(stores.dicts, &shared, &keys, &config, &audit);
        let buckets = repository(stores.buckets, &shared, &keys, &config, &audit);

        let challenges =
            ChallengeVerifier::new(Arc::clone(&shared), keys.clone(), config.challenge.clone());
        let deny_list = DenyListGuard::new(Arc::clone(&shared), config.deny_list_timeout());

        tracing::info!(
            backend = ?cache.backend(),
            domain = %keys.domain(),
            entity_kinds = EntityKind::ALL.len(),
            "Service state built"
        );

        let state = Self {
            config,
            cache,
            users,
            roles,
            menus,
            depts,
            dicts,
            buckets,
            challenges,
            deny_list,
            audit,
            start_time: Instant::now(),
        };
        (state, worker)
    }

    /// Cache statistics of every repository, keyed by entity kind.
    pub fn repository_stats(&self) -> Vec<(EntityKind, RepositoryStatsSnapshot)> {
        vec![
            (self.users.kind(), self.users.stats()),
            (self.roles.kind(), self.roles.stats()),
            (self.menus.kind(), self.menus.stats()),
            (self.depts.kind(), self.depts.stats()),
            (self.dicts.kind(), self.dicts.stats()),
            (self.buckets.kind(), self.buckets.stats()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_core::{FieldPatch, KeystoneError};
    use keystone_test_utils::fixtures;
    use tempfile::TempDir;

    fn memory_state() -> (ServiceState, AuditWorker) {
        let config = ServiceConfig::default();
        let cache = CacheBackendHandle::open(&config.cache).unwrap();
        ServiceState::build(config, cache, StoreSet::in_memory())
    }

    #[tokio::test]
    async fn test_repositories_share_one_cache() {
        let (state, _worker) = memory_state();

        let user = state.users.create(fixtures::user_profile("alice"), "admin").await.unwrap();
        let role = state.roles.create(fixtures::role("ops"), "admin").await.unwrap();
        state.users.get(&user.id).await.unwrap();
        state.roles.get(&role.id).await.unwrap();

        let shared = state.cache.store();
        assert!(shared.exists(&state.users.cache_key(&user.id)).await.unwrap());
        assert!(shared.exists(&state.roles.cache_key(&role.id)).await.unwrap());
        assert!(state.users.cache_key(&user.id).starts_with("keystone:user:info:"));
    }

    #[tokio::test]
    async fn test_mutations_reach_the_audit_queue() {
        let (state, _worker) = memory_state();
        let dept = state.depts.create(fixtures::dept("R&D"), "admin").await.unwrap();
        state
            .depts
            .update(&dept.id, 1, &FieldPatch::new().sort(2), "admin")
            .await
            .unwrap();
        assert_eq!(state.audit.metrics().enqueued, 2);
        assert_eq!(state.audit.queued(), 2);
    }

    #[tokio::test]
    async fn test_stats_cover_every_kind() {
        let (state, _worker) = memory_state();
        let err = state.menus.get(&keystone_core::RecordId::new("missing")).await.unwrap_err();
        assert!(matches!(err, KeystoneError::NotFound { kind: EntityKind::Menu, .. }));

        let stats = state.repository_stats();
        assert_eq!(stats.len(), EntityKind::ALL.len());
        let (_, menus) = stats.iter().find(|(k, _)| *k == EntityKind::Menu).unwrap();
        assert_eq!(menus.store_lookups, 1);
    }

    #[tokio::test]
    async fn test_challenges_and_deny_list_use_the_shared_cache() {
        let (state, _worker) = memory_state();
        let code = state.challenges.issue_generated("u1", "login").await.unwrap();
        assert_eq!(code.len(), 6);
        assert!(state.cache.store().exists("keystone:captcha:u1:login").await.unwrap());

        state.deny_list.add("tok", std::time::Duration::from_secs(60)).await.unwrap();
        assert!(state.deny_list.is_denied("tok").await);
    }

    #[tokio::test]
    async fn test_lmdb_backend_opens_at_configured_path() {
        let dir = TempDir::new().unwrap();
        let settings = CacheSettings {
            backend: CacheBackend::Lmdb,
            path: dir.path().join("cache"),
            max_size_mb: 10,
            ..Default::default()
        };
        let handle = CacheBackendHandle::open(&settings).unwrap();
        assert_eq!(handle.backend(), CacheBackend::Lmdb);
        assert!(dir.path().join("cache").exists());
        assert_eq!(handle.purge_expired().unwrap(), 0);
    }
}
