//! Per-key async locks
//!
//! Mutations of one question (or annotation) are serialized; different keys
//! proceed in parallel. Entries are dropped once nobody holds or awaits them.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

pub struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        let slot = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            // Only the map holds an idle slot
            locks.retain(|_, slot| Arc::strong_count(slot) > 1);
            Arc::clone(locks.entry(key).or_insert_with(|| Arc::new(AsyncMutex::new(()))))
        };
        slot.lock_owned().await
    }

    /// Keys with a live slot (held or awaited)
    #[cfg(test)]
    fn active(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.values().filter(|slot| Arc::strong_count(slot) > 1).count()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}
