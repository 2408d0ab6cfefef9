//! Per-key write serialization.
//!
//! A fixed array of async mutexes indexed by key hash. Two keys may share
//! a slot and then serialize against each other; the table never grows and
//! nothing is ever pruned.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use tokio::sync::{Mutex, MutexGuard};

/// Number of lock slots; must be a power of two
pub const LOCK_SLOTS: usize = 64;

/// Striped lock table for the write sequence of a key.
#[derive(Debug)]
pub struct KeyLockTable {
    slots: Box<[Mutex<()>]>,
}

impl Default for KeyLockTable {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyLockTable {
    pub fn new() -> Self {
        Self {
            slots: (0..LOCK_SLOTS).map(|_| Mutex::new(())).collect(),
        }
    }

    #[inline]
    fn slot_index(key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) & (LOCK_SLOTS - 1)
    }

    /// Wait for exclusive access to `key`. Held until the guard drops.
    pub async fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        self.slots[Self::slot_index(key)].lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_slot_index_stable() {
        let a = KeyLockTable::slot_index("loc-1");
        assert_eq!(a, KeyLockTable::slot_index("loc-1"));
        assert!(a < LOCK_SLOTS);
    }

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let table = Arc::new(KeyLockTable::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let table = Arc::clone(&table);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                tokio::spawn(async move {
                    let _guard = table.lock("hot").await;
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_other_slot_not_blocked() {
        let table = KeyLockTable::new();
        let first = "alpha";
        let other = (0..1000)
            .map(|i| format!("key-{}", i))
            .find(|k| KeyLockTable::slot_index(k) != KeyLockTable::slot_index(first))
            .unwrap();

        let _held = table.lock(first).await;
        let acquired = tokio::time::timeout(Duration::from_millis(100), table.lock(&other)).await;
        assert!(acquired.is_ok());
    }
}
