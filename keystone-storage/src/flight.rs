//! Per-key miss coalescing.
//!
//! When many callers miss the cache for the same key at once, only one of
//! them should load from the durable store. [`FlightGroup::acquire`] hands
//! out one guard per key at a time; followers wait for the leader's guard to
//! drop and then re-check the cache, which the leader has populated by then.
//!
//! The group holds no state for a key once its last guard is gone. Guards
//! own a handle to the slot map, so they can move into spawned tasks.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Slots = DashMap<String, Arc<Mutex<()>>>;

/// Map of per-key async mutexes. Clones share the same map.
#[derive(Debug, Default, Clone)]
pub struct FlightGroup {
    slots: Arc<Slots>,
}

impl FlightGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other guard for `key` is alive, then take one.
    pub async fn acquire(&self, key: &str) -> FlightGuard {
        let slot = self
            .slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = slot.lock_owned().await;
        FlightGuard {
            slots: Arc::clone(&self.slots),
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of keys with a live or awaited guard.
    pub fn in_flight(&self) -> usize {
        self.slots.len()
    }
}

/// Exclusive claim on one key of a [`FlightGroup`].
///
/// Dropping the guard wakes the next waiter, or removes the key from the
/// group when nobody is waiting.
#[derive(Debug)]
pub struct FlightGuard {
    slots: Arc<Slots>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        // Strong count 2 = the map's Arc plus the one inside our guard.
        // Waiters hold their own clone, so the slot stays while they wait.
        self.slots
            .remove_if(&self.key, |_, slot| Arc::strong_count(slot) <= 2);
        self.guard.take();
    }
}
