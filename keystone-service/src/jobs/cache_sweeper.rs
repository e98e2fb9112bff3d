//! Cache Sweeper Background Task
//!
//! Both cache backends drop expired entries lazily, on the next read of the
//! same key. Keys that are never read again (one-off ids, abandoned
//! challenges, revoked tokens past expiry) would otherwise stay resident.
//! This task removes them periodically.

use crate::state::CacheBackendHandle;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

// ============================================================================
// METRICS
// ============================================================================

/// Counters for the sweeper.
#[derive(Debug, Default)]
pub struct CacheSweeperMetrics {
    /// Sweep cycles completed
    pub sweeps: AtomicU64,

    /// Expired entries removed since startup
    pub entries_purged: AtomicU64,

    /// Sweeps that failed
    pub sweep_errors: AtomicU64,
}

impl CacheSweeperMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> CacheSweeperSnapshot {
        CacheSweeperSnapshot {
            sweeps: self.sweeps.load(Ordering::Relaxed),
            entries_purged: self.entries_purged.load(Ordering::Relaxed),
            sweep_errors: self.sweep_errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of sweeper metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSweeperSnapshot {
    pub sweeps: u64,
    pub entries_purged: u64,
    pub sweep_errors: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Periodically purge expired cache entries until shutdown is signalled.
///
/// The first sweep runs one full interval after start.
pub async fn cache_sweeper_task(
    cache: CacheBackendHandle,
    sweep_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<CacheSweeperMetrics> {
    let metrics = Arc::new(CacheSweeperMetrics::new());

    let mut ticker = interval(sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // `interval` fires immediately; skip that tick.
    ticker.tick().await;

    tracing::info!(
        backend = ?cache.backend(),
        interval_secs = sweep_interval.as_secs(),
        "Cache sweeper started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Cache sweeper shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                sweep_once(&cache, &metrics);
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        sweeps = snapshot.sweeps,
        entries_purged = snapshot.entries_purged,
        sweep_errors = snapshot.sweep_errors,
        "Cache sweeper completed"
    );

    metrics
}

/// Run one sweep.
fn sweep_once(cache: &CacheBackendHandle, metrics: &CacheSweeperMetrics) {
    metrics.sweeps.fetch_add(1, Ordering::Relaxed);

    match cache.purge_expired() {
        Ok(0) => {
            tracing::trace!("Cache sweep found no expired entries");
        }
        Ok(count) => {
            metrics.entries_purged.fetch_add(count, Ordering::Relaxed);
            tracing::debug!(count, "Purged expired cache entries");
        }
        Err(e) => {
            metrics.sweep_errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(error = %e, "Cache sweep failed");
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
