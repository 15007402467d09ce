//! A lazily populated table of per-key reader/writer locks.
//!
//! Every key gets exactly one lock handle, created the first time the key is touched. Creation
//! is serialized by a single control lock; the control lock is only held while probing or
//! inserting into the table and is never held while a caller works on a key.
//!
//! Handles are never evicted. Deleting a key from a store built on this table leaves its
//! handle in place, so the table grows with the number of distinct keys ever touched.
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};

/// a shared handle to the lock guarding a single key
pub type LockHandle<V> = Arc<RwLock<V>>;

/// maps `i64` keys to their [`LockHandle`]. `V` is the data protected by each key's lock
#[derive(Debug)]
pub struct LockTable<V> {
    control: RwLock<HashMap<i64, LockHandle<V>>>,
}

impl<V: Default> LockTable<V> {
    /// creates an empty table
    pub fn new() -> Self {
        LockTable {
            control: RwLock::new(HashMap::new()),
        }
    }

    /// returns the lock handle for `key`, creating it if this is the first access to `key`.
    ///
    /// Two threads racing on the first access to the same key always receive the same handle.
    pub fn handle(&self, key: i64) -> LockHandle<V> {
        // recursive read so that lookups of existing keys are not queued behind a creator
        // waiting on a frozen table
        if let Some(handle) = self.control.read_recursive().get(&key) {
            return Arc::clone(handle);
        }
        // re-check under the write lock, another thread may have created it in between
        let mut table = self.control.write();
        Arc::clone(table.entry(key).or_insert_with(|| Arc::new(RwLock::new(V::default()))))
    }

    /// returns the lock handle for `key` only if one was created before
    pub fn existing(&self, key: i64) -> Option<LockHandle<V>> {
        self.control.read_recursive().get(&key).map(Arc::clone)
    }

    /// number of handles ever created
    pub fn len(&self) -> usize {
        self.control.read_recursive().len()
    }

    /// `true` if no key was ever touched
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// holds the control lock (shared) for as long as the returned guard lives.
    ///
    /// While the guard is held no new handle can be created, but handles that already exist
    /// can still be locked and used.
    pub fn freeze(&self) -> RwLockReadGuard<'_, HashMap<i64, LockHandle<V>>> {
        self.control.read()
    }
}

impl<V: Default> Default for LockTable<V> {
    fn default() -> Self {
        Self::new()
    }
}
