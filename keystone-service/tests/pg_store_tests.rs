#![cfg(feature = "db-tests")]
//! PostgreSQL store tests against a live database.
//!
//! Run with `KEYSTONE_DB_*` pointing at a scratch database and
//! `--features db-tests`.

use std::sync::Arc;

use keystone_core::{FieldPatch, KeystoneError, RecordId, Role, StoreError};
use keystone_service::{DbConfig, PgDurableStore};
use keystone_storage::{
    DurableStore, KeyNamespace, MemoryCacheStore, RepositoryConfig, UpdateOutcome,
    VersionedRepository,
};
use keystone_test_utils::fixtures;

async fn role_store() -> PgDurableStore<Role> {
    let pool = DbConfig::from_env()
        .create_pool()
        .expect("Failed to create database pool");
    let conn = pool.get().await.expect("Failed to connect to database");
    conn.batch_execute(
        "CREATE TABLE IF NOT EXISTS sys_role (
            id text PRIMARY KEY,
            version bigint NOT NULL,
            creator text NOT NULL,
            modifier text NOT NULL,
            status smallint NOT NULL,
            sort integer NOT NULL,
            remark text NULL,
            created_at timestamptz NOT NULL,
            updated_at timestamptz NOT NULL,
            payload jsonb NOT NULL
        )",
    )
    .await
    .expect("Failed to create sys_role");
    PgDurableStore::new(pool)
}

#[tokio::test]
async fn test_insert_find_and_duplicate() {
    let store = role_store().await;
    let record = keystone_core::Record::create(fixtures::role("auditors"), "admin");

    store.insert(&record).await.unwrap();
    let loaded = store.find_by_id(&record.id).await.unwrap().unwrap();
    assert_eq!(loaded.payload, record.payload);
    assert_eq!(loaded.version, 1);

    let err = store.insert(&record).await.unwrap_err();
    assert!(matches!(err, StoreError::Duplicate { .. }));

    assert_eq!(store.delete(&record.id).await.unwrap(), 1);
    assert!(!store.exists(&record.id).await.unwrap());
}

#[tokio::test]
async fn test_conditional_update_is_guarded() {
    let store = role_store().await;
    let record = keystone_core::Record::create(fixtures::role("ops"), "admin");
    store.insert(&record).await.unwrap();

    let patch = FieldPatch::new().set("name", "Operations").sort(4);
    let now = chrono::Utc::now();
    assert_eq!(
        store.conditional_update(&record.id, 1, &patch, "editor", now).await.unwrap(),
        1
    );
    assert_eq!(
        store.conditional_update(&record.id, 1, &patch, "editor", now).await.unwrap(),
        0
    );

    let loaded = store.find_by_id(&record.id).await.unwrap().unwrap();
    assert_eq!(loaded.version, 2);
    assert_eq!(loaded.payload.name, "Operations");
    assert_eq!(loaded.payload.code, record.payload.code);
    assert_eq!(loaded.sort, 4);
    assert_eq!(loaded.modifier, "editor");

    store.delete(&record.id).await.unwrap();
}

#[tokio::test]
async fn test_unknown_patch_field_is_rolled_back() {
    let store = role_store().await;
    let record = keystone_core::Record::create(fixtures::role("qa"), "admin");
    store.insert(&record).await.unwrap();

    let patch = FieldPatch::new().set("colour", "red");
    let err = store
        .conditional_update(&record.id, 1, &patch, "editor", chrono::Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidPatch { .. }));

    let loaded = store.find_by_id(&record.id).await.unwrap().unwrap();
    assert_eq!(loaded.version, 1);

    store.delete(&record.id).await.unwrap();
}

#[tokio::test]
async fn test_repository_over_postgres() {
    let repo = VersionedRepository::new(
        role_store().await,
        Arc::new(MemoryCacheStore::new()),
        KeyNamespace::new("keystone-test"),
        RepositoryConfig::default(),
    );

    let created = repo.create(fixtures::role("finance"), "admin").await.unwrap();
    assert_eq!(repo.get(&created.id).await.unwrap().payload.name, "finance");

    let patch = FieldPatch::new().set("name", "Finance");
    assert!(matches!(
        repo.conditional_update(&created.id, 1, &patch, "editor").await.unwrap(),
        UpdateOutcome::Updated(2)
    ));
    assert_eq!(repo.get(&created.id).await.unwrap().payload.name, "Finance");

    repo.delete(&created.id, "admin").await.unwrap();
    assert!(matches!(
        repo.get(&created.id).await,
        Err(KeystoneError::NotFound { .. })
    ));
    assert!(repo.find(&RecordId::new("never-existed")).await.unwrap().is_none());
}
