//! Audit sinks drained by the audit worker.

use async_trait::async_trait;
use deadpool_postgres::Pool;
use keystone_core::StoreError;
use keystone_storage::{AuditRecord, AuditSink};

use crate::constants::AUDIT_TABLE;
use crate::db::{driver_error, pool_error};

/// Writes audit records into `sys_audit_log`.
#[derive(Clone)]
pub struct PgAuditSink {
    pool: Pool,
}

impl PgAuditSink {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn write(&self, record: &AuditRecord) -> Result<(), StoreError> {
        let conn = self.pool.get().await.map_err(pool_error)?;
        let sql = format!(
            "INSERT INTO {} (at, actor, kind, entity_id, action, outcome) \
             VALUES ($1, $2, $3, $4, $5, $6)",
            AUDIT_TABLE
        );
        conn.execute(
            sql.as_str(),
            &[
                &record.at,
                &record.actor,
                &record.kind.as_str(),
                &record.entity_id.as_str(),
                &record.action.as_str(),
                &record.outcome.as_str(),
            ],
        )
        .await
        .map_err(driver_error)?;
        Ok(())
    }
}

/// Emits audit records as structured log events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn write(&self, record: &AuditRecord) -> Result<(), StoreError> {
        tracing::info!(
            target: "keystone::audit",
            at = %record.at,
            actor = %record.actor,
            kind = %record.kind,
            entity_id = %record.entity_id,
            action = record.action.as_str(),
            outcome = record.outcome.as_str(),
            "audit"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_core::{AuditAction, EntityKind, RecordId};
    use keystone_storage::AuditOutcome;

    #[tokio::test]
    async fn test_tracing_sink_never_fails() {
        let record = AuditRecord::new(
            "admin",
            EntityKind::Dept,
            &RecordId::new("d1"),
            AuditAction::Delete,
            AuditOutcome::NotFound,
        );
        assert!(TracingAuditSink.write(&record).await.is_ok());
    }

    #[tokio::test]
    async fn test_pg_sink_reports_unreachable_database() {
        let pool = crate::db::DbConfig {
            port: 1,
            timeout: std::time::Duration::from_millis(200),
            ..Default::default()
        }
        .create_pool()
        .unwrap();
        let record = AuditRecord::new(
            "admin",
            EntityKind::User,
            &RecordId::new("u1"),
            AuditAction::Create,
            AuditOutcome::Success,
        );
        let err = PgAuditSink::new(pool).write(&record).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));
    }
}
