//! Keystone Test Utilities
//!
//! Centralized test infrastructure for the Keystone workspace:
//! - Proptest generators for payloads and patches
//! - Fault-injecting store and cache wrappers
//! - Test fixtures for common scenarios
//! - Custom assertions for Keystone error variants

// Re-export mock stores from their source crate
pub use keystone_storage::{MemoryCacheStore, MockDurableStore};

// Re-export core types for convenience
pub use keystone_core::{
    AccessPolicy, Bucket, CacheError, ChallengeError, DataScope, Dept, DictItem, EntityKind,
    FieldPatch, KeystoneError, KeystoneResult, Menu, MenuType, Payload, Record, RecordId,
    RecordStatus, Role, StoreError, Timestamp, UserProfile,
};

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use keystone_storage::{AtomicScript, CacheResult, CacheStore, DurableStore, KeyTtl, StoreResult};

// ============================================================================
// COUNTING STORE
// ============================================================================

/// Durable store wrapper that counts calls and can slow down lookups.
///
/// Used to observe how many reads reach the durable store.
#[derive(Debug, Default)]
pub struct CountingStore<S> {
    inner: S,
    lookup_delay: Option<Duration>,
    return_delay: Option<Duration>,
    finds: AtomicU64,
    updates: AtomicU64,
    probes: AtomicU64,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            lookup_delay: None,
            return_delay: None,
            finds: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            probes: AtomicU64::new(0),
        }
    }

    /// Sleep this long inside every `find_by_id`, widening race windows.
    pub fn with_lookup_delay(mut self, delay: Duration) -> Self {
        self.lookup_delay = Some(delay);
        self
    }

    /// Sleep this long after `find_by_id` has read the row, so the caller
    /// holds a value that a concurrent write can make stale.
    pub fn with_return_delay(mut self, delay: Duration) -> Self {
        self.return_delay = Some(delay);
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of `find_by_id` calls.
    pub fn finds(&self) -> u64 {
        self.finds.load(Ordering::SeqCst)
    }

    /// Number of `conditional_update` calls.
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::SeqCst)
    }

    /// Number of `exists` calls.
    pub fn probes(&self) -> u64 {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<P: Payload, S: DurableStore<P>> DurableStore<P> for CountingStore<S> {
    async fn insert(&self, record: &Record<P>) -> StoreResult<()> {
        self.inner.insert(record).await
    }

    async fn find_by_id(&self, id: &RecordId) -> StoreResult<Option<Record<P>>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.lookup_delay {
            tokio::time::sleep(delay).await;
        }
        let found = self.inner.find_by_id(id).await;
        if let Some(delay) = self.return_delay {
            tokio::time::sleep(delay).await;
        }
        found
    }

    async fn conditional_update(
        &self,
        id: &RecordId,
        expected_version: i64,
        patch: &FieldPatch,
        modifier: &str,
        at: Timestamp,
    ) -> StoreResult<u64> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner
            .conditional_update(id, expected_version, patch, modifier, at)
            .await
    }

    async fn exists(&self, id: &RecordId) -> StoreResult<bool> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.inner.exists(id).await
    }

    async fn delete(&self, id: &RecordId) -> StoreResult<u64> {
        self.inner.delete(id).await
    }
}

// ============================================================================
// FAULTY CACHE
// ============================================================================

/// Behaviour of a [`FaultyCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultMode {
    /// Delegate to the inner cache.
    Healthy,
    /// Every call fails with `CacheError::Unavailable`.
    Failing,
    /// Every call waits far longer than any test timeout.
    Hanging,
}

impl FaultMode {
    fn to_u8(self) -> u8 {
        match self {
            FaultMode::Healthy => 0,
            FaultMode::Failing => 1,
            FaultMode::Hanging => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => FaultMode::Failing,
            2 => FaultMode::Hanging,
            _ => FaultMode::Healthy,
        }
    }
}

/// Cache wrapper whose failure mode can be switched at runtime.
#[derive(Debug, Default)]
pub struct FaultyCache<C> {
    inner: C,
    mode: AtomicU8,
    calls: AtomicU64,
}

impl<C: CacheStore> FaultyCache<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            mode: AtomicU8::new(FaultMode::Healthy.to_u8()),
            calls: AtomicU64::new(0),
        }
    }

    pub fn set_mode(&self, mode: FaultMode) {
        self.mode.store(mode.to_u8(), Ordering::SeqCst);
    }

    pub fn mode(&self) -> FaultMode {
        FaultMode::from_u8(self.mode.load(Ordering::SeqCst))
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Total calls received, in any mode.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    async fn gate(&self) -> CacheResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode() {
            FaultMode::Healthy => Ok(()),
            FaultMode::Failing => Err(CacheError::Unavailable {
                reason: "injected failure".to_string(),
            }),
            FaultMode::Hanging => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(CacheError::Unavailable {
                    reason: "injected hang".to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl<C: CacheStore> CacheStore for FaultyCache<C> {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.gate().await?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        self.gate().await?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.gate().await?;
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.gate().await?;
        self.inner.exists(key).await
    }

    async fn ttl(&self, key: &str) -> CacheResult<KeyTtl> {
        self.gate().await?;
        self.inner.ttl(key).await
    }

    async fn run_script(&self, key: &str, script: &dyn AtomicScript) -> CacheResult<i64> {
        self.gate().await?;
        self.inner.run_script(key, script).await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating Keystone payloads.

    use super::*;
    use proptest::prelude::*;

    /// Generate a record id in the generated (32 hex chars) form.
    pub fn arb_record_id() -> impl Strategy<Value = RecordId> {
        "[0-9a-f]{32}".prop_map(RecordId::new)
    }

    /// Generate a short display name.
    pub fn arb_name() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z0-9 ]{0,15}"
    }

    /// Generate a challenge subject or purpose segment (no ':').
    pub fn arb_segment() -> impl Strategy<Value = String> {
        "[a-z0-9_]{1,16}"
    }

    pub fn arb_record_status() -> impl Strategy<Value = RecordStatus> {
        prop_oneof![Just(RecordStatus::Enabled), Just(RecordStatus::Disabled)]
    }

    pub fn arb_data_scope() -> impl Strategy<Value = DataScope> {
        prop_oneof![
            Just(DataScope::All),
            Just(DataScope::Dept),
            Just(DataScope::DeptAndChildren),
            Just(DataScope::SelfOnly),
            Just(DataScope::Custom),
        ]
    }

    pub fn arb_user_profile() -> impl Strategy<Value = UserProfile> {
        (
            "[a-z][a-z0-9_]{2,15}",
            arb_name(),
            proptest::option::of("[a-z]{3,8}@example\\.com"),
            proptest::option::of("1[3-9][0-9]{9}"),
        )
            .prop_map(|(username, nickname, email, phone)| UserProfile {
                username,
                nickname,
                email,
                phone,
                dept_id: None,
            })
    }

    pub fn arb_role() -> impl Strategy<Value = Role> {
        (arb_name(), "[a-z_]{2,12}", arb_data_scope()).prop_map(|(name, code, data_scope)| Role {
            name,
            code,
            data_scope,
        })
    }

    pub fn arb_dict_item() -> impl Strategy<Value = DictItem> {
        ("[a-z_]{2,12}", arb_name(), "[0-9]{1,3}").prop_map(|(dict_type, label, value)| {
            DictItem {
                dict_type,
                label,
                value,
            }
        })
    }

    /// Generate a non-empty patch for a [`Role`].
    pub fn arb_role_patch() -> impl Strategy<Value = FieldPatch> {
        (
            proptest::option::of(arb_name()),
            proptest::option::of(arb_record_status()),
            proptest::option::of(-100i32..100),
        )
            .prop_filter("patch must change something", |(n, s, o)| {
                n.is_some() || s.is_some() || o.is_some()
            })
            .prop_map(|(name, status, sort)| {
                let mut patch = FieldPatch::new();
                if let Some(name) = name {
                    patch = patch.set("name", name);
                }
                if let Some(status) = status {
                    patch = patch.status(status);
                }
                if let Some(sort) = sort {
                    patch = patch.sort(sort);
                }
                patch
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;

    /// A user profile with the given username.
    pub fn user_profile(username: &str) -> UserProfile {
        UserProfile {
            username: username.to_string(),
            nickname: format!("{} (test)", username),
            email: Some(format!("{}@example.com", username)),
            phone: None,
            dept_id: None,
        }
    }

    /// A role with full data scope.
    pub fn role(name: &str) -> Role {
        Role {
            name: name.to_string(),
            code: name.to_lowercase().replace(' ', "_"),
            data_scope: DataScope::All,
        }
    }

    /// A top-level department.
    pub fn dept(name: &str) -> Dept {
        Dept {
            name: name.to_string(),
            parent_id: None,
            leader: None,
        }
    }

    /// A page menu entry.
    pub fn page_menu(title: &str, path: &str) -> Menu {
        Menu {
            title: title.to_string(),
            path: Some(path.to_string()),
            parent_id: None,
            menu_type: MenuType::Page,
            permission: None,
        }
    }

    /// A dictionary item.
    pub fn dict_item(dict_type: &str, label: &str, value: &str) -> DictItem {
        DictItem {
            dict_type: dict_type.to_string(),
            label: label.to_string(),
            value: value.to_string(),
        }
    }

    /// A private bucket.
    pub fn bucket(name: &str) -> Bucket {
        Bucket {
            name: name.to_string(),
            endpoint: "https://storage.example.com".to_string(),
            region: Some("eu-west-1".to_string()),
            access_policy: AccessPolicy::Private,
        }
    }

    /// A stored user record at version 1.
    pub fn user_record(username: &str) -> Record<UserProfile> {
        Record::create(user_profile(username), "fixture")
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for Keystone error variants.

    use super::*;

    /// Assert that a result is a NotFound error for the given kind.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &KeystoneResult<T>, kind: EntityKind) {
        match result {
            Err(KeystoneError::NotFound { kind: k, .. }) => {
                assert_eq!(*k, kind, "Wrong entity kind in NotFound error");
            }
            other => panic!("Expected NotFound error for {}, got: {:?}", kind, other),
        }
    }

    /// Assert that a result is a version conflict.
    #[track_caller]
    pub fn assert_version_conflict<T: std::fmt::Debug>(result: &KeystoneResult<T>) {
        match result {
            Err(KeystoneError::VersionConflict { .. }) => {}
            other => panic!("Expected VersionConflict error, got: {:?}", other),
        }
    }

    /// Assert that a challenge result is the expected error.
    #[track_caller]
    pub fn assert_challenge_error<T: std::fmt::Debug>(
        result: &Result<T, ChallengeError>,
        expected: &ChallengeError,
    ) {
        match result {
            Err(e) => assert_eq!(e, expected),
            Ok(v) => panic!("Expected {:?}, got Ok({:?})", expected, v),
        }
    }
}
