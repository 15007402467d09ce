use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::KvsEngine;
use crate::lock_table::LockTable;

/// A [`KvsEngine`] that stripes its locking by key.
///
/// Each key owns a slot in a [`LockTable`]. The slot's lock is the key's lock and the slot
/// holds the key's value (`None` once deleted), so a value is only ever read under a shared
/// hold and only ever written under an exclusive hold of its own key.
///
/// Slots are never reclaimed: a deleted key keeps its (empty) slot so that any thread that
/// already holds the handle keeps serializing against later writers of the same key.
#[derive(Clone, Debug, Default)]
pub struct StripedKvStore {
    slots: Arc<LockTable<Option<String>>>,
}

impl StripedKvStore {
    /// creates an empty store
    pub fn new() -> Self {
        StripedKvStore::default()
    }

    /// number of per-key locks created so far, including those of deleted keys
    pub fn lock_count(&self) -> usize {
        self.slots.len()
    }

    /// the table of per-key locks backing this store
    pub fn lock_table(&self) -> &LockTable<Option<String>> {
        &self.slots
    }
}

impl KvsEngine for StripedKvStore {
    fn get(&self, key: i64) -> Option<String> {
        // a key that was never touched has no slot, and nothing to read
        let slot = self.slots.existing(key)?;
        let value = slot.read();
        value.clone()
    }

    fn put(&self, key: i64, value: String) {
        let slot = self.slots.handle(key);
        *slot.write() = Some(value);
    }

    fn delete(&self, key: i64) {
        if let Some(slot) = self.slots.existing(key) {
            *slot.write() = None;
        }
    }

    fn snapshot(&self) -> BTreeMap<i64, String> {
        let table = self.slots.freeze();
        let snapshot: BTreeMap<i64, String> = table
            .iter()
            .filter_map(|(key, slot)| slot.read().clone().map(|value| (*key, value)))
            .collect();
        debug!(locks = table.len(), entries = snapshot.len(), "snapshot taken");
        snapshot
    }

    fn len(&self) -> usize {
        let table = self.slots.freeze();
        table.values().filter(|slot| slot.read().is_some()).count()
    }
}
