//! Background Jobs for the Keystone service
//!
//! - `cache_sweeper`: purges expired cache entries
//! - the audit worker from `keystone-storage`, draining the audit queue
//!
//! Both share one `watch` shutdown signal:
//!
//! ```ignore
//! let (state, worker) = ServiceState::build(config, cache, stores);
//! let jobs = BackgroundJobs::start(&state, worker, Arc::new(TracingAuditSink));
//!
//! // On shutdown
//! let report = jobs.shutdown().await;
//! ```

pub mod cache_sweeper;

pub use cache_sweeper::{cache_sweeper_task, CacheSweeperMetrics, CacheSweeperSnapshot};

use std::sync::Arc;

use keystone_storage::{AuditMetricsSnapshot, AuditSink, AuditWorker};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::state::ServiceState;

/// Final metrics of every background job.
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    pub sweeper: Option<CacheSweeperSnapshot>,
    pub audit: Option<AuditMetricsSnapshot>,
}

/// Handles of the running background jobs.
pub struct BackgroundJobs {
    shutdown_tx: watch::Sender<bool>,
    sweeper: JoinHandle<Arc<CacheSweeperMetrics>>,
    audit: JoinHandle<AuditMetricsSnapshot>,
}

impl BackgroundJobs {
    /// Spawn the sweeper and the audit worker.
    pub fn start<S>(state: &ServiceState, worker: AuditWorker, sink: Arc<S>) -> Self
    where
        S: AuditSink + ?Sized + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let sweeper = tokio::spawn(cache_sweeper_task(
            state.cache.clone(),
            state.config.cache.sweep_interval,
            shutdown_rx.clone(),
        ));
        let audit = tokio::spawn(worker.run(sink, shutdown_rx));

        Self {
            shutdown_tx,
            sweeper,
            audit,
        }
    }

    /// Signal shutdown and wait for both jobs. The audit worker writes what
    /// is still queued before it returns.
    pub async fn shutdown(self) -> ShutdownReport {
        let _ = self.shutdown_tx.send(true);

        let sweeper = match self.sweeper.await {
            Ok(metrics) => Some(metrics.snapshot()),
            Err(e) => {
                tracing::error!(error = %e, "Cache sweeper task failed");
                None
            }
        };
        let audit = match self.audit.await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::error!(error = %e, "Audit worker task failed");
                None
            }
        };

        ShutdownReport { sweeper, audit }
    }
}
