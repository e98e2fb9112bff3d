//! Durable store abstraction and the in-memory mock.
//!
//! The durable store is the source of truth for entity records. Every
//! mutation that depends on the current version goes through
//! [`DurableStore::conditional_update`], a single compare-and-set on the
//! version column; callers never read-modify-write.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use keystone_core::{FieldPatch, Payload, Record, RecordId, StoreError, Timestamp};

/// Result type for durable store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistent storage for records of one payload type.
///
/// # Implementation Requirements
///
/// - `conditional_update` must apply the patch and increment `version` by
///   exactly one in a single atomic step, and only when the stored version
///   equals `expected_version`. It returns the number of rows changed
///   (0 or 1).
/// - `insert` must reject an id that already exists with
///   [`StoreError::Duplicate`].
#[async_trait]
pub trait DurableStore<P: Payload>: Send + Sync {
    /// Insert a new record.
    async fn insert(&self, record: &Record<P>) -> StoreResult<()>;

    /// Load a record by id.
    async fn find_by_id(&self, id: &RecordId) -> StoreResult<Option<Record<P>>>;

    /// Compare-and-set update keyed on `(id, expected_version)`.
    async fn conditional_update(
        &self,
        id: &RecordId,
        expected_version: i64,
        patch: &FieldPatch,
        modifier: &str,
        at: Timestamp,
    ) -> StoreResult<u64>;

    /// Whether a record with this id exists, regardless of version.
    async fn exists(&self, id: &RecordId) -> StoreResult<bool>;

    /// Delete a record. Returns the number of rows removed.
    async fn delete(&self, id: &RecordId) -> StoreResult<u64>;
}

#[async_trait]
impl<P: Payload, T: DurableStore<P> + ?Sized> DurableStore<P> for Arc<T> {
    async fn insert(&self, record: &Record<P>) -> StoreResult<()> {
        (**self).insert(record).await
    }

    async fn find_by_id(&self, id: &RecordId) -> StoreResult<Option<Record<P>>> {
        (**self).find_by_id(id).await
    }

    async fn conditional_update(
        &self,
        id: &RecordId,
        expected_version: i64,
        patch: &FieldPatch,
        modifier: &str,
        at: Timestamp,
    ) -> StoreResult<u64> {
        (**self)
            .conditional_update(id, expected_version, patch, modifier, at)
            .await
    }

    async fn exists(&self, id: &RecordId) -> StoreResult<bool> {
        (**self).exists(id).await
    }

    async fn delete(&self, id: &RecordId) -> StoreResult<u64> {
        (**self).delete(id).await
    }
}

// ============================================================================
// MOCK DURABLE STORE
// ============================================================================

/// In-memory durable store for testing.
///
/// The conditional update runs under the write lock, which gives it the same
/// compare-and-set semantics as a single SQL `UPDATE ... WHERE version = ?`.
#[derive(Debug)]
pub struct MockDurableStore<P> {
    records: RwLock<HashMap<RecordId, Record<P>>>,
    _payload: PhantomData<fn() -> P>,
}

impl<P> Default for MockDurableStore<P> {
    fn default() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            _payload: PhantomData,
        }
    }
}

impl<P: Payload> MockDurableStore<P> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all stored records.
    pub fn clear(&self) -> StoreResult<()> {
        self.records
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .clear();
        Ok(())
    }

    /// Overwrite a record directly, bypassing version checks.
    ///
    /// Simulates a write made by another process sharing the table.
    pub fn put_raw(&self, record: Record<P>) -> StoreResult<()> {
        self.records
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .insert(record.id.clone(), record);
        Ok(())
    }
}

#[async_trait]
impl<P: Payload> DurableStore<P> for MockDurableStore<P> {
    async fn insert(&self, record: &Record<P>) -> StoreResult<()> {
        let mut records = self.records.write().map_err(|_| StoreError::LockPoisoned)?;
        if records.contains_key(&record.id) {
            return Err(StoreError::Duplicate {
                kind: P::kind(),
                id: record.id.clone(),
            });
        }
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &RecordId) -> StoreResult<Option<Record<P>>> {
        let records = self.records.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(records.get(id).cloned())
    }

    async fn conditional_update(
        &self,
        id: &RecordId,
        expected_version: i64,
        patch: &FieldPatch,
        modifier: &str,
        at: Timestamp,
    ) -> StoreResult<u64> {
        let mut records = self.records.write().map_err(|_| StoreError::LockPoisoned)?;
        let Some(record) = records.get_mut(id) else {
            return Ok(0);
        };
        if record.version != expected_version {
            return Ok(0);
        }
        patch
            .apply(record, modifier, at)
            .map_err(|e| StoreError::InvalidPatch {
                kind: P::kind(),
                reason: e.to_string(),
            })?;
        Ok(1)
    }

    async fn exists(&self, id: &RecordId) -> StoreResult<bool> {
        let records = self.records.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(records.contains_key(id))
    }

    async fn delete(&self, id: &RecordId) -> StoreResult<u64> {
        let mut records = self.records.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(u64::from(records.remove(id).is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use keystone_core::{DictItem, RecordStatus};

    fn make_test_dict() -> Record<DictItem> {
        Record::create(
            DictItem {
                dict_type: "gender".to_string(),
                label: "Male".to_string(),
                value: "1".to_string(),
            },
            "admin",
        )
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = MockDurableStore::new();
        let record = make_test_dict();

        store.insert(&record).await.unwrap();
        let found = store.find_by_id(&record.id).await.unwrap();

        assert_eq!(found, Some(record));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_insert_duplicate() {
        let store = MockDurableStore::new();
        let record = make_test_dict();

        store.insert(&record).await.unwrap();
        let result = store.insert(&record).await;

        assert!(matches!(result, Err(StoreError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn test_conditional_update_matches_version() {
        let store = MockDurableStore::new();
        let record = make_test_dict();
        store.insert(&record).await.unwrap();

        let patch = FieldPatch::new().set("label", "Man").status(RecordStatus::Disabled);
        let rows = store
            .conditional_update(&record.id, 1, &patch, "editor", Utc::now())
            .await
            .unwrap();
        assert_eq!(rows, 1);

        let stored = store.find_by_id(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.payload.label, "Man");
        assert_eq!(stored.status, RecordStatus::Disabled);
        assert_eq!(stored.modifier, "editor");
        assert_eq!(stored.creator, "admin");
    }

    #[tokio::test]
    async fn test_conditional_update_stale_version_changes_nothing() {
        let store = MockDurableStore::new();
        let record = make_test_dict();
        store.insert(&record).await.unwrap();

        let patch = FieldPatch::new().set("label", "Man");
        let rows = store
            .conditional_update(&record.id, 7, &patch, "editor", Utc::now())
            .await
            .unwrap();
        assert_eq!(rows, 0);
        assert_eq!(store.find_by_id(&record.id).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_conditional_update_missing_id() {
        let store = MockDurableStore::<DictItem>::new();
        let rows = store
            .conditional_update(&RecordId::new("nope"), 1, &FieldPatch::new(), "x", Utc::now())
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn test_conditional_update_rejects_unknown_field() {
        let store = MockDurableStore::new();
        let record = make_test_dict();
        store.insert(&record).await.unwrap();

        let patch = FieldPatch::new().set("colour", "red");
        let result = store
            .conditional_update(&record.id, 1, &patch, "editor", Utc::now())
            .await;
        assert!(matches!(result, Err(StoreError::InvalidPatch { .. })));
        assert_eq!(store.find_by_id(&record.id).await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_delete_and_exists() {
        let store = MockDurableStore::new();
        let record = make_test_dict();
        store.insert(&record).await.unwrap();

        assert!(store.exists(&record.id).await.unwrap());
        assert_eq!(store.delete(&record.id).await.unwrap(), 1);
        assert!(!store.exists(&record.id).await.unwrap());
        assert_eq!(store.delete(&record.id).await.unwrap(), 0);
    }
}
