//! PostgreSQL Durable Store
//!
//! One table per entity kind, named by `EntityKind::table_name`. Control
//! columns are real columns; the payload is a `jsonb` document. Creating the
//! tables is left to migrations outside this crate.

use std::marker::PhantomData;

use async_trait::async_trait;
use deadpool_postgres::Pool;
use keystone_core::{FieldPatch, Payload, Record, RecordId, RecordStatus, StoreError, Timestamp};
use keystone_storage::{DurableStore, StoreResult};
use serde_json::Value as JsonValue;
use tokio_postgres::error::SqlState;
use tokio_postgres::Row;

use crate::db::{driver_error, pool_error};

const COLUMNS: &str =
    "id, version, creator, modifier, status, sort, remark, created_at, updated_at, payload";

/// [`DurableStore`] backed by a PostgreSQL table.
pub struct PgDurableStore<P> {
    pool: Pool,
    table: &'static str,
    _payload: PhantomData<fn() -> P>,
}

impl<P> Clone for PgDurableStore<P> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            table: self.table,
            _payload: PhantomData,
        }
    }
}

impl<P: Payload> PgDurableStore<P> {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            table: P::kind().table_name(),
            _payload: PhantomData,
        }
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    async fn get_conn(&self) -> StoreResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_error)
    }

    fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            self.table, COLUMNS
        )
    }

    fn select_sql(&self) -> String {
        format!("SELECT {} FROM {} WHERE id = $1", COLUMNS, self.table)
    }

    /// The whole optimistic update is this one statement; `version = $2`
    /// is the guard.
    fn update_sql(&self) -> String {
        format!(
            "UPDATE {} SET version = version + 1, modifier = $3, updated_at = $4, \
             status = COALESCE($5, status), sort = COALESCE($6, sort), \
             remark = COALESCE($7, remark), payload = payload || $8::jsonb \
             WHERE id = $1 AND version = $2 RETURNING payload",
            self.table
        )
    }

    fn corrupt(id: &RecordId, reason: impl ToString) -> StoreError {
        StoreError::CorruptRow {
            kind: P::kind(),
            id: id.clone(),
            reason: reason.to_string(),
        }
    }

    fn decode_row(&self, id: &RecordId, row: &Row) -> StoreResult<Record<P>> {
        let status: i16 = row.try_get("status").map_err(|e| Self::corrupt(id, e))?;
        let payload: JsonValue = row.try_get("payload").map_err(|e| Self::corrupt(id, e))?;

        Ok(Record {
            id: RecordId::new(row.try_get::<_, String>("id").map_err(|e| Self::corrupt(id, e))?),
            version: row.try_get("version").map_err(|e| Self::corrupt(id, e))?,
            creator: row.try_get("creator").map_err(|e| Self::corrupt(id, e))?,
            modifier: row.try_get("modifier").map_err(|e| Self::corrupt(id, e))?,
            status: RecordStatus::from_i16(status).map_err(|e| Self::corrupt(id, e))?,
            sort: row.try_get("sort").map_err(|e| Self::corrupt(id, e))?,
            remark: row.try_get("remark").map_err(|e| Self::corrupt(id, e))?,
            created_at: row.try_get("created_at").map_err(|e| Self::corrupt(id, e))?,
            updated_at: row.try_get("updated_at").map_err(|e| Self::corrupt(id, e))?,
            payload: serde_json::from_value(payload).map_err(|e| Self::corrupt(id, e))?,
        })
    }
}

/// Check that a merged payload still decodes and kept every patched field.
///
/// Unknown fields survive the jsonb merge but vanish when decoded, which is
/// how they are detected.
fn validate_merged<P: Payload>(merged: JsonValue, patch: &FieldPatch) -> Result<(), String> {
    let decoded: P = serde_json::from_value(merged).map_err(|e| e.to_string())?;
    let reencoded = serde_json::to_value(&decoded).map_err(|e| e.to_string())?;
    for field in patch.payload.keys() {
        if reencoded.get(field).is_none() {
            return Err(format!("unknown {} field {}", P::kind(), field));
        }
    }
    Ok(())
}

#[async_trait]
impl<P: Payload> DurableStore<P> for PgDurableStore<P> {
    async fn insert(&self, record: &Record<P>) -> StoreResult<()> {
        let payload = serde_json::to_value(&record.payload).map_err(|e| StoreError::Backend {
            reason: format!("payload serialization failed: {}", e),
        })?;
        let conn = self.get_conn().await?;

        let result = conn
            .execute(
                self.insert_sql().as_str(),
                &[
                    &record.id.as_str(),
                    &record.version,
                    &record.creator,
                    &record.modifier,
                    &record.status.as_i16(),
                    &record.sort,
                    &record.remark,
                    &record.created_at,
                    &record.updated_at,
                    &payload,
                ],
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => Err(StoreError::Duplicate {
                kind: P::kind(),
                id: record.id.clone(),
            }),
            Err(e) => Err(driver_error(e)),
        }
    }

    async fn find_by_id(&self, id: &RecordId) -> StoreResult<Option<Record<P>>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(self.select_sql().as_str(), &[&id.as_str()])
            .await
            .map_err(driver_error)?;

        row.map(|row| self.decode_row(id, &row)).transpose()
    }

    async fn conditional_update(
        &self,
        id: &RecordId,
        expected_version: i64,
        patch: &FieldPatch,
        modifier: &str,
        at: Timestamp,
    ) -> StoreResult<u64> {
        let status = patch.status.map(|s| s.as_i16());
        let fields = JsonValue::Object(patch.payload.clone());

        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(driver_error)?;

        let row = tx
            .query_opt(
                self.update_sql().as_str(),
                &[
                    &id.as_str(),
                    &expected_version,
                    &modifier,
                    &at,
                    &status,
                    &patch.sort,
                    &patch.remark,
                    &fields,
                ],
            )
            .await
            .map_err(driver_error)?;

        let Some(row) = row else {
            // Nothing matched; dropping the transaction rolls it back.
            return Ok(0);
        };

        let merged: JsonValue = row.try_get(0).map_err(|e| Self::corrupt(id, e))?;
        if let Err(reason) = validate_merged::<P>(merged, patch) {
            tx.rollback().await.map_err(driver_error)?;
            return Err(StoreError::InvalidPatch {
                kind: P::kind(),
                reason,
            });
        }

        tx.commit().await.map_err(driver_error)?;
        Ok(1)
    }

    async fn exists(&self, id: &RecordId) -> StoreResult<bool> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)", self.table);
        let row = conn
            .query_one(sql.as_str(), &[&id.as_str()])
            .await
            .map_err(driver_error)?;
        row.try_get(0).map_err(|e| Self::corrupt(id, e))
    }

    async fn delete(&self, id: &RecordId) -> StoreResult<u64> {
        let conn = self.get_conn().await?;
        let sql = format!("DELETE FROM {} WHERE id = $1", self.table);
        conn.execute(sql.as_str(), &[&id.as_str()])
            .await
            .map_err(driver_error)
    }
}
