//! Keystone service entry point.
//!
//! Loads configuration, opens the cache and the database pool, starts the
//! background jobs and waits for Ctrl-C.

use std::sync::Arc;

use keystone_service::{
    init_tracing, BackgroundJobs, CacheBackendHandle, PgAuditSink, ServiceConfig, ServiceError,
    ServiceResult, ServiceState, StoreSet,
};

#[tokio::main]
async fn main() -> ServiceResult<()> {
    let config = ServiceConfig::from_env()?;
    init_tracing(config.log_format)?;

    let pool = config.db.create_pool()?;
    let cache = CacheBackendHandle::open(&config.cache)?;
    let stores = StoreSet::postgres(&pool);

    let (state, worker) = ServiceState::build(config, cache, stores);
    let jobs = BackgroundJobs::start(&state, worker, Arc::new(PgAuditSink::new(pool.clone())));

    tracing::info!(
        db_host = %state.config.db.host,
        db_name = %state.config.db.dbname,
        "Keystone service started"
    );

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| ServiceError::internal_error(format!("Failed to wait for Ctrl-C: {}", e)))?;

    tracing::info!("Shutdown requested");
    let report = jobs.shutdown().await;
    pool.close();

    tracing::info!(
        uptime_secs = state.start_time.elapsed().as_secs(),
        audit = ?report.audit,
        sweeper = ?report.sweeper,
        "Keystone service stopped"
    );
    Ok(())
}
