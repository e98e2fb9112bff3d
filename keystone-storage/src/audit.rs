//! Audit queue.
//!
//! Mutations are recorded through an [`AuditHandle`], which pushes onto a
//! bounded channel without ever waiting: when the queue is full the record
//! is dropped and counted. An [`AuditWorker`] drains the queue into an
//! [`AuditSink`] on its own task, with a timeout on every write and its own
//! shutdown signal, so a slow sink never stalls a caller and a cancelled
//! caller never loses a record that was already queued.
//!
//! # Usage
//!
//! ```ignore
//! let (handle, worker) = audit_channel(AuditConfig::default());
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let task = tokio::spawn(worker.run(Arc::new(TracingAuditSink), shutdown_rx));
//!
//! handle.record(AuditRecord::new("admin", EntityKind::User, &id, AuditAction::Create, AuditOutcome::Success));
//!
//! let _ = shutdown_tx.send(true);
//! let snapshot = task.await?;
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use keystone_core::{ActorId, AuditAction, EntityKind, RecordId, StoreError, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

/// Default queue capacity.
pub const DEFAULT_AUDIT_QUEUE_CAPACITY: usize = 1024;

/// Default timeout for a single sink write.
pub const DEFAULT_AUDIT_WRITE_TIMEOUT: Duration = Duration::from_secs(3);

// ============================================================================
// RECORD
// ============================================================================

/// Result of the audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    NotFound,
    Conflict,
    Failed,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "success",
            AuditOutcome::NotFound => "not_found",
            AuditOutcome::Conflict => "conflict",
            AuditOutcome::Failed => "failed",
        }
    }
}

/// One audited mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub at: Timestamp,
    pub actor: ActorId,
    pub kind: EntityKind,
    pub entity_id: RecordId,
    pub action: AuditAction,
    pub outcome: AuditOutcome,
}

impl AuditRecord {
    /// Build a record stamped with the current time.
    pub fn new(
        actor: impl Into<ActorId>,
        kind: EntityKind,
        entity_id: &RecordId,
        action: AuditAction,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            at: Utc::now(),
            actor: actor.into(),
            kind,
            entity_id: entity_id.clone(),
            action,
            outcome,
        }
    }
}

/// Destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist one record.
    async fn write(&self, record: &AuditRecord) -> Result<(), StoreError>;
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the audit queue.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Maximum number of queued records (default: 1024)
    pub capacity: usize,

    /// Timeout applied to every sink write (default: 3 seconds)
    pub write_timeout: Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_AUDIT_QUEUE_CAPACITY,
            write_timeout: DEFAULT_AUDIT_WRITE_TIMEOUT,
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters shared by the handle and the worker.
#[derive(Debug, Default)]
pub struct AuditMetrics {
    /// Records accepted into the queue
    pub enqueued: AtomicU64,

    /// Records rejected because the queue was full or closed
    pub dropped: AtomicU64,

    /// Records the sink accepted
    pub written: AtomicU64,

    /// Records the sink rejected
    pub failed: AtomicU64,

    /// Records whose write exceeded the timeout
    pub timed_out: AtomicU64,
}

impl AuditMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> AuditMetricsSnapshot {
        AuditMetricsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of audit metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditMetricsSnapshot {
    pub enqueued: u64,
    pub dropped: u64,
    pub written: u64,
    pub failed: u64,
    pub timed_out: u64,
}

// ============================================================================
// QUEUE
// ============================================================================

/// Create a connected handle and worker.
///
/// A zero capacity is raised to one; the channel cannot be unbuffered.
pub fn audit_channel(config: AuditConfig) -> (AuditHandle, AuditWorker) {
    let (tx, rx) = mpsc::channel(config.capacity.max(1));
    let metrics = Arc::new(AuditMetrics::new());
    let handle = AuditHandle {
        tx,
        metrics: Arc::clone(&metrics),
    };
    let worker = AuditWorker {
        rx,
        metrics,
        write_timeout: config.write_timeout,
    };
    (handle, worker)
}

/// Producer side of the audit queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AuditHandle {
    tx: mpsc::Sender<AuditRecord>,
    metrics: Arc<AuditMetrics>,
}

impl AuditHandle {
    /// Queue a record without waiting. Returns `false` if it was dropped.
    pub fn record(&self, record: AuditRecord) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => {
                self.metrics.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(record)) => {
                self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    kind = %record.kind,
                    entity_id = %record.entity_id,
                    action = record.action.as_str(),
                    "Audit queue full, record dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(record)) => {
                self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    kind = %record.kind,
                    entity_id = %record.entity_id,
                    "Audit queue closed, record dropped"
                );
                false
            }
        }
    }

    /// Records currently waiting in the queue.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn metrics(&self) -> AuditMetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Consumer side of the audit queue.
#[derive(Debug)]
pub struct AuditWorker {
    rx: mpsc::Receiver<AuditRecord>,
    metrics: Arc<AuditMetrics>,
    write_timeout: Duration,
}

impl AuditWorker {
    /// Drain the queue into `sink` until shutdown is signalled or every
    /// handle is dropped.
    ///
    /// On shutdown the queue is closed to new records and whatever is
    /// already queued is still written.
    pub async fn run<S>(
        mut self,
        sink: Arc<S>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> AuditMetricsSnapshot
    where
        S: AuditSink + ?Sized,
    {
        tracing::info!(
            write_timeout_ms = self.write_timeout.as_millis() as u64,
            "Audit worker started"
        );

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        tracing::info!("Audit worker shutting down");
                        break;
                    }
                }

                next = self.rx.recv() => {
                    match next {
                        Some(record) => self.write_one(sink.as_ref(), record).await,
                        None => break,
                    }
                }
            }
        }

        self.rx.close();
        while let Some(record) = self.rx.recv().await {
            self.write_one(sink.as_ref(), record).await;
        }

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            written = snapshot.written,
            dropped = snapshot.dropped,
            failed = snapshot.failed,
            timed_out = snapshot.timed_out,
            "Audit worker completed"
        );
        snapshot
    }

    async fn write_one<S>(&self, sink: &S, record: AuditRecord)
    where
        S: AuditSink + ?Sized,
    {
        match tokio::time::timeout(self.write_timeout, sink.write(&record)).await {
            Ok(Ok(())) => {
                self.metrics.written.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                self.metrics.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    error = %e,
                    kind = %record.kind,
                    entity_id = %record.entity_id,
                    "Audit write failed"
                );
            }
            Err(_) => {
                self.metrics.timed_out.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    kind = %record.kind,
                    entity_id = %record.entity_id,
                    timeout_ms = self.write_timeout.as_millis() as u64,
                    "Audit write timed out"
                );
            }
        }
    }
}
