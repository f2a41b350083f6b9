//! Per-item mutual exclusion for scan decisions.
//!
//! Locks are keyed by `(session_id, tracking_id)`, so two operators scanning
//! different parcels of the same session never wait on each other. Entries
//! are created on demand and dropped again once nobody holds or waits on
//! them.

use dashmap::DashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use std::sync::Arc;
use tracing::trace;

type LockKey = (i64, String);

#[derive(Default)]
pub struct ItemLocks {
    locks: DashMap<LockKey, Arc<Mutex<()>>>,
}

/// Held critical section for one `(session_id, tracking_id)`.
pub struct ItemLockGuard<'a> {
    registry: &'a ItemLocks,
    key: LockKey,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl ItemLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutex_for(&self, key: &LockKey) -> Arc<Mutex<()>> {
        // The map shard is released at the end of this statement, before
        // anyone blocks on the item mutex.
        Arc::clone(&self.locks.entry(key.clone()).or_default())
    }

    /// Block until the critical section for this item is ours.
    pub fn lock(&self, session_id: i64, tracking_id: &str) -> ItemLockGuard<'_> {
        let key = (session_id, tracking_id.to_string());
        let guard = self.mutex_for(&key).lock_arc();
        trace!(session_id, tracking_id, "item lock acquired");
        ItemLockGuard {
            registry: self,
            key,
            guard: Some(guard),
        }
    }

    pub fn try_lock(&self, session_id: i64, tracking_id: &str) -> Option<ItemLockGuard<'_>> {
        let key = (session_id, tracking_id.to_string());
        let guard = self.mutex_for(&key).try_lock_arc();
        match guard {
            Some(guard) => Some(ItemLockGuard {
                registry: self,
                key,
                guard: Some(guard),
            }),
            None => {
                self.release_entry(&key);
                None
            }
        }
    }

    /// Lock several tracking ids of one session. Keys are taken in sorted
    /// order so two callers locking overlapping sets cannot deadlock.
    pub fn lock_many(&self, session_id: i64, tracking_ids: &[&str]) -> Vec<ItemLockGuard<'_>> {
        let mut ids: Vec<&str> = tracking_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        ids.into_iter()
            .map(|tracking_id| self.lock(session_id, tracking_id))
            .collect()
    }

    /// Run `f` inside the critical section for one item.
    pub fn with_item<R>(&self, session_id: i64, tracking_id: &str, f: impl FnOnce() -> R) -> R {
        let _guard = self.lock(session_id, tracking_id);
        f()
    }

    /// Number of items currently locked or waited on.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    fn release_entry(&self, key: &LockKey) {
        // Only the map itself still references the mutex: nobody holds or
        // waits on it. Clones are taken under the same shard lock, so this
        // check cannot race with a new waiter.
        self.locks
            .remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl Drop for ItemLockGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.registry.release_entry(&self.key);
    }
}
