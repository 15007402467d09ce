use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;

use super::KvsEngine;

/// A [`KvsEngine`] backed by a single [`DashMap`].
///
/// Reads of a key take a shared hold of the shard that key hashes to, writes an exclusive one.
/// Two keys in the same shard may contend, which callers cannot observe beyond timing.
#[derive(Clone, Debug, Default)]
pub struct ShardedKvStore {
    map: Arc<DashMap<i64, String>>,
}

impl ShardedKvStore {
    /// creates an empty store
    pub fn new() -> Self {
        ShardedKvStore::default()
    }
}

impl KvsEngine for ShardedKvStore {
    fn get(&self, key: i64) -> Option<String> {
        self.map.get(&key).map(|entry| entry.value().clone())
    }

    fn put(&self, key: i64, value: String) {
        self.map.insert(key, value);
    }

    fn delete(&self, key: i64) {
        self.map.remove(&key);
    }

    fn snapshot(&self) -> BTreeMap<i64, String> {
        self.map
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}
