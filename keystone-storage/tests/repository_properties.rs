//! Property-Based Tests for the Versioned Repository
//!
//! Covers cache coherence after writes, miss coalescing with negative
//! caching, optimistic conflict detection, and tolerance of cache failures.

use std::sync::Arc;
use std::time::Duration;

use keystone_core::{FieldPatch, KeystoneError, Record, RecordId, Role, UserProfile};
use keystone_storage::{
    audit_channel, AuditConfig, CacheStore, KeyNamespace, MemoryCacheStore, MockDurableStore,
    RepositoryConfig, UpdateOutcome, VersionedRepository,
};
use keystone_test_utils::assertions::{assert_not_found, assert_version_conflict};
use keystone_test_utils::generators::{arb_role, arb_role_patch};
use keystone_test_utils::{fixtures, CountingStore, FaultMode, FaultyCache};
use proptest::prelude::*;

// ============================================================================
// TEST HELPERS
// ============================================================================

type UserRepo = VersionedRepository<
    UserProfile,
    Arc<CountingStore<MockDurableStore<UserProfile>>>,
    FaultyCache<MemoryCacheStore>,
>;

struct Harness {
    repo: Arc<UserRepo>,
    store: Arc<CountingStore<MockDurableStore<UserProfile>>>,
    cache: Arc<FaultyCache<MemoryCacheStore>>,
}

fn harness_with(store: CountingStore<MockDurableStore<UserProfile>>, config: RepositoryConfig) -> Harness {
    let store = Arc::new(store);
    let cache = Arc::new(FaultyCache::new(MemoryCacheStore::new()));
    let repo = Arc::new(VersionedRepository::new(
        Arc::clone(&store),
        Arc::clone(&cache),
        KeyNamespace::new("admin"),
        config,
    ));
    Harness { repo, store, cache }
}

fn harness() -> Harness {
    harness_with(
        CountingStore::new(MockDurableStore::new()),
        RepositoryConfig::default()
            .with_cache_timeout(Duration::from_millis(100))
            .with_store_timeout(Duration::from_secs(2)),
    )
}

// ============================================================================
// SCENARIO
// ============================================================================

/// X at version 1; two concurrent writers both expect version 1. Exactly one
/// wins with version 2, the other conflicts, and a later read returns the
/// winner's value.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_one_wins() {
    let h = harness();
    let x = h
        .repo
        .create(fixtures::user_profile("x"), "admin")
        .await
        .unwrap();
    // Warm the cache so the stale entry would be visible if not invalidated.
    assert_eq!(h.repo.get(&x.id).await.unwrap().version, 1);

    let mut handles = Vec::new();
    for name in ["A", "B"] {
        let repo = Arc::clone(&h.repo);
        let id = x.id.clone();
        handles.push(tokio::spawn(async move {
            let patch = FieldPatch::new().set("nickname", name);
            (name, repo.update(&id, 1, &patch, name).await)
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        let (name, result) = handle.await.unwrap();
        match result {
            Ok(version) => {
                assert_eq!(version, 2);
                winners.push(name);
            }
            Err(e) => assert!(
                matches!(e, KeystoneError::VersionConflict { expected: 1, .. }),
                "unexpected error: {e}"
            ),
        }
    }
    assert_eq!(winners.len(), 1);

    let current = h.repo.get(&x.id).await.unwrap();
    assert_eq!(current.version, 2);
    assert_eq!(current.payload.nickname, winners[0]);
    assert_eq!(current.modifier, winners[0]);
}

// ============================================================================
// MISS COALESCING AND NEGATIVE CACHING
// ============================================================================

/// N concurrent reads for a missing id reach the durable store once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_misses_hit_store_once() {
    let h = harness_with(
        CountingStore::new(MockDurableStore::new()).with_lookup_delay(Duration::from_millis(20)),
        RepositoryConfig::default(),
    );
    let id = RecordId::new("missing");

    let mut handles = Vec::new();
    for _ in 0..32 {
        let repo = Arc::clone(&h.repo);
        let id = id.clone();
        handles.push(tokio::spawn(async move { repo.find(&id).await }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), None);
    }

    // Later reads inside the sentinel window are served from the cache.
    assert_not_found(&h.repo.get(&id).await, keystone_core::EntityKind::User);
    assert_eq!(h.store.finds(), 1);
}

/// Concurrent reads of an existing record also coalesce.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cold_reads_hit_store_once() {
    let h = harness_with(
        CountingStore::new(MockDurableStore::new()).with_lookup_delay(Duration::from_millis(20)),
        RepositoryConfig::default(),
    );
    let record = h
        .repo
        .create(fixtures::user_profile("hot"), "admin")
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let repo = Arc::clone(&h.repo);
        let id = record.id.clone();
        handles.push(tokio::spawn(async move { repo.get(&id).await }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), record);
    }
    assert_eq!(h.store.finds(), 1);
}

/// A reader that loaded the row before a write must not leave the old
/// version in the cache after the write has invalidated the key.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_loader_cannot_outlive_invalidation() {
    let h = harness_with(
        CountingStore::new(MockDurableStore::new()).with_return_delay(Duration::from_millis(100)),
        RepositoryConfig::default(),
    );
    let record = fixtures::user_record("old");
    h.store.inner().put_raw(record.clone()).unwrap();

    let reader = {
        let repo = Arc::clone(&h.repo);
        let id = record.id.clone();
        tokio::spawn(async move { repo.find(&id).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let patch = FieldPatch::new().set("nickname", "new");
    assert_eq!(h.repo.update(&record.id, 1, &patch, "editor").await.unwrap(), 2);

    // The reader may return the row it loaded before the write.
    let loaded = reader.await.unwrap().unwrap().unwrap();
    assert_eq!(loaded.version, 1);

    let current = h.repo.get(&record.id).await.unwrap();
    assert_eq!(current.version, 2);
    assert_eq!(current.payload.nickname, "new");
}

/// A record created by another process under an id that was looked up
/// earlier becomes visible once the sentinel expires.
#[tokio::test]
async fn test_sentinel_expires() {
    let h = harness_with(
        CountingStore::new(MockDurableStore::new()),
        RepositoryConfig::default().with_negative_ttl(Duration::from_millis(30)),
    );
    let record = fixtures::user_record("late");

    assert_eq!(h.repo.find(&record.id).await.unwrap(), None);
    h.store.inner().put_raw(record.clone()).unwrap();
    assert_eq!(h.repo.find(&record.id).await.unwrap(), None);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.repo.find(&record.id).await.unwrap(), Some(record));
}

// ============================================================================
// CACHE FAILURES
// ============================================================================

#[tokio::test]
async fn test_failing_cache_never_fails_reads_or_writes() {
    let h = harness();
    let record = h
        .repo
        .create(fixtures::user_profile("resilient"), "admin")
        .await
        .unwrap();

    h.cache.set_mode(FaultMode::Failing);

    assert_eq!(h.repo.get(&record.id).await.unwrap(), record);
    let patch = FieldPatch::new().set("nickname", "still works");
    assert_eq!(h.repo.update(&record.id, 1, &patch, "admin").await.unwrap(), 2);
    assert_eq!(h.repo.get(&record.id).await.unwrap().version, 2);
    h.repo.delete(&record.id, "admin").await.unwrap();

    assert!(h.repo.stats().cache_failures > 0);
    // With the cache down every read goes to the store.
    assert_eq!(h.store.finds(), 2);
}

#[tokio::test]
async fn test_hanging_cache_is_bounded_by_timeout() {
    let h = harness();
    let record = h
        .repo
        .create(fixtures::user_profile("slow"), "admin")
        .await
        .unwrap();

    h.cache.set_mode(FaultMode::Hanging);

    let read = tokio::time::timeout(Duration::from_secs(2), h.repo.get(&record.id)).await;
    assert_eq!(read.expect("read should not hang").unwrap(), record);

    let patch = FieldPatch::new().set("nickname", "eventually");
    let write = tokio::time::timeout(
        Duration::from_secs(2),
        h.repo.update(&record.id, 1, &patch, "admin"),
    )
    .await;
    assert_eq!(write.expect("write should not hang").unwrap(), 2);
}

#[tokio::test]
async fn test_cache_failure_on_invalidate_reports_success() {
    let h = harness();
    let record = h
        .repo
        .create(fixtures::user_profile("u"), "admin")
        .await
        .unwrap();

    h.cache.set_mode(FaultMode::Failing);
    assert!(!h.repo.invalidate(&record.id).await);

    h.cache.set_mode(FaultMode::Healthy);
    assert!(h.repo.invalidate(&record.id).await);
}

// ============================================================================
// CONFLICT DETECTION
// ============================================================================

#[tokio::test]
async fn test_update_missing_and_stale() {
    let h = harness();
    let record = h
        .repo
        .create(fixtures::user_profile("u"), "admin")
        .await
        .unwrap();
    let patch = FieldPatch::new().set("nickname", "n");

    assert_not_found(
        &h.repo.update(&RecordId::new("nope"), 1, &patch, "admin").await,
        keystone_core::EntityKind::User,
    );
    assert_eq!(h.repo.update(&record.id, 1, &patch, "admin").await.unwrap(), 2);
    assert_version_conflict(&h.repo.update(&record.id, 1, &patch, "admin").await);

    // One probe per zero-row update.
    assert_eq!(h.store.probes(), 2);
}

#[tokio::test]
async fn test_full_audit_queue_does_not_block_writes() {
    let (handle, _worker) = audit_channel(AuditConfig {
        capacity: 1,
        write_timeout: Duration::from_secs(1),
    });
    let store = Arc::new(MockDurableStore::<Role>::new());
    let cache = Arc::new(MemoryCacheStore::new());
    let repo = VersionedRepository::new(
        store,
        cache,
        KeyNamespace::new("admin"),
        RepositoryConfig::default(),
    )
    .with_audit(handle.clone());

    for i in 0..10 {
        repo.create(fixtures::role(&format!("role {i}")), "admin")
            .await
            .unwrap();
    }

    let metrics = handle.metrics();
    assert_eq!(handle.queued(), 1);
    assert_eq!(metrics.enqueued, 1);
    assert_eq!(metrics.dropped, 9);
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// After every successful update, a read returns the new version and
    /// never the value cached before the update.
    #[test]
    fn prop_reads_after_writes_are_fresh(
        role in arb_role(),
        patches in proptest::collection::vec(arb_role_patch(), 1..6),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = Arc::new(MockDurableStore::<Role>::new());
            let cache = Arc::new(MemoryCacheStore::new());
            let repo = VersionedRepository::new(
                Arc::clone(&store),
                Arc::clone(&cache),
                KeyNamespace::new("admin"),
                RepositoryConfig::default(),
            );

            let created = repo.create(role, "admin").await.unwrap();
            let mut expected_version = created.version;

            for patch in &patches {
                // Populate the cache with the current value first.
                let before = repo.get(&created.id).await.unwrap();
                prop_assert_eq!(before.version, expected_version);

                let outcome = repo
                    .conditional_update(&created.id, expected_version, patch, "editor")
                    .await
                    .unwrap();
                prop_assert_eq!(outcome, UpdateOutcome::Updated(expected_version + 1));
                expected_version += 1;

                let after = repo.get(&created.id).await.unwrap();
                let stored: Record<Role> = {
                    use keystone_storage::DurableStore;
                    store.find_by_id(&created.id).await.unwrap().unwrap()
                };
                prop_assert_eq!(after.version, expected_version);
                prop_assert_eq!(&after, &stored);
            }

            let key = repo.cache_key(&created.id);
            prop_assert!(cache.exists(&key).await.unwrap());
            Ok(())
        })?;
    }

    /// Two updates with the same expected version: exactly one applies.
    #[test]
    fn prop_same_version_updates_conflict(
        role in arb_role(),
        first in arb_role_patch(),
        second in arb_role_patch(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let repo = VersionedRepository::new(
                MockDurableStore::<Role>::new(),
                Arc::new(MemoryCacheStore::new()),
                KeyNamespace::new("admin"),
                RepositoryConfig::default(),
            );
            let created = repo.create(role, "admin").await.unwrap();

            let a = repo.conditional_update(&created.id, 1, &first, "a").await.unwrap();
            let b = repo.conditional_update(&created.id, 1, &second, "b").await.unwrap();

            prop_assert_eq!(a, UpdateOutcome::Updated(2));
            prop_assert_eq!(b, UpdateOutcome::Conflict);
            prop_assert_eq!(repo.get(&created.id).await.unwrap().modifier, "a");
            Ok(())
        })?;
    }
}
