//! Per-key async mutual exclusion.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Guard held while a key is locked.
pub type KeyGuard = OwnedMutexGuard<()>;

/// One async mutex per key, created on demand.
///
/// Unrelated keys never share a mutex, so holding one key never blocks
/// another.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Waits for the key's lock.
    pub async fn lock(&self, key: &str) -> KeyGuard {
        self.handle(key).lock_owned().await
    }

    /// Takes the key's lock if nobody holds it.
    pub fn try_lock(&self, key: &str) -> Option<KeyGuard> {
        self.handle(key).try_lock_owned().ok()
    }

    /// Drops the key's mutex if nobody holds or waits on it.
    pub fn forget(&self, key: &str) {
        let mut locks = self.locks.lock();
        // handles are only cloned under this lock, so a count of 1 means idle
        if locks.get(key).is_some_and(|m| Arc::strong_count(m) == 1) {
            locks.remove(key);
        }
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}
