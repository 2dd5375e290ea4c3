//! Per-key async locks
//!
//! Callers lock a set of keys at once. Sets are locked in sorted order, so two
//! callers with overlapping sets cannot deadlock, and callers with disjoint
//! sets never wait on each other.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockTable<K> = Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>;

/// Table of lazily created per-key mutexes
pub struct KeyedLocks<K> {
    table: LockTable<K>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            table: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K: Ord + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every key in `keys`, waiting for holders of any of them
    pub async fn lock_all(&self, keys: impl IntoIterator<Item = K>) -> KeyedGuard<K> {
        let mut keys: Vec<K> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mutexes: Vec<Arc<AsyncMutex<()>>> = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            keys.iter()
                .map(|k| table.entry(k.clone()).or_default().clone())
                .collect()
        };

        let mut guards = Vec::with_capacity(mutexes.len());
        for mutex in mutexes {
            guards.push(mutex.lock_owned().await);
        }

        KeyedGuard {
            guards,
            table: Arc::clone(&self.table),
        }
    }

    /// Number of keys with a live lock entry
    pub fn active_keys(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Holds a set of key locks; releases them and prunes idle entries on drop
pub struct KeyedGuard<K: Hash + Eq> {
    guards: Vec<OwnedMutexGuard<()>>,
    table: LockTable<K>,
}

impl<K: Hash + Eq> Drop for KeyedGuard<K> {
    fn drop(&mut self) {
        self.guards.clear();
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        table.retain(|_, mutex| Arc::strong_count(mutex) > 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_disjoint_sets_do_not_block() {
        let locks = KeyedLocks::new();
        let _a = locks.lock_all(["a", "b"]).await;

        let other = tokio::time::timeout(Duration::from_millis(100), locks.lock_all(["c"])).await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn test_overlapping_sets_serialize() {
        let locks = Arc::new(KeyedLocks::new());
        let guard = locks.lock_all(["a", "b"]).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.lock_all(["c", "b"]).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_entries_pruned_after_release() {
        let locks = KeyedLocks::new();
        {
            let _g = locks.lock_all(["a", "a", "b"]).await;
            assert_eq!(locks.active_keys(), 2);
        }
        assert_eq!(locks.active_keys(), 0);
    }
}
