//! This module provides the concurrent key/value storage engine implementations.
//! Both engines map `i64` keys to `String` values and behave identically from a caller's view:
//!
//! - [`StripedKvStore`] keeps one reader/writer lock per key in a [`LockTable`], so operations
//! on different keys never contend.
//! - [`ShardedKvStore`] is a wrapper around a [`dashmap`] concurrent map, whose internal
//! sharding is invisible to callers.
//!
//! [`LockTable`]: ../lock_table/struct.LockTable.html
//! [`dashmap`]: https://docs.rs/dashmap/latest/dashmap/
use std::collections::BTreeMap;

use rand::Rng;

use crate::{KvsError, Result};

/// the characters used to generate seed values
pub const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// the largest `quantity` a single seed may ask for
pub const MAX_SEED_QUANTITY: i64 = 10_000_000;
/// the longest value a seed may generate
pub const MAX_SEED_VALUE_SIZE: usize = 1 << 20;
/// upper bound on the bytes of values a single seed may generate
pub const MAX_SEED_BYTES: u64 = 1 << 30;

/// Checks that a seed of `quantity` and `size` stays within the seed limits.
///
/// # Errors
/// returns [`KvsError::InvalidRequest`] naming the limit that was exceeded
pub fn check_seed(quantity: i64, size: usize) -> Result<()> {
    if quantity > MAX_SEED_QUANTITY {
        return Err(KvsError::InvalidRequest(format!(
            "seed quantity {} exceeds {}",
            quantity, MAX_SEED_QUANTITY
        )));
    }
    if size > MAX_SEED_VALUE_SIZE {
        return Err(KvsError::InvalidRequest(format!(
            "seed value size {} exceeds {}",
            size, MAX_SEED_VALUE_SIZE
        )));
    }
    let entries = quantity.saturating_sub(1).max(0) as u64;
    if entries * size as u64 > MAX_SEED_BYTES {
        return Err(KvsError::InvalidRequest(format!(
            "seed of {} values of {} bytes exceeds {} bytes",
            entries, size, MAX_SEED_BYTES
        )));
    }
    Ok(())
}

/// A trait for the basic functionality of a concurrent key/value storage engine.
///
/// Every operation on a single key is atomic with respect to every other operation on that key.
/// No ordering is implied between operations on different keys.
pub trait KvsEngine: Clone + Send + Sync + 'static {
    /// Gets the value associated with the given `key`
    ///
    /// Returns `None` if the given `key` does not exist.
    fn get(&self, key: i64) -> Option<String>;

    /// sets a `key` and `value`
    ///
    /// If the given `key` already exists the previous `value` will be overwritten.
    fn put(&self, key: i64, value: String);

    /// Removes the given `key` (and associated value) from the store.
    /// Removing a key that does not exist is not an error.
    fn delete(&self, key: i64);

    /// Copies every entry of the store into an ordered map.
    ///
    /// Each value in the copy is a value its key held at some instant during the call.
    fn snapshot(&self) -> BTreeMap<i64, String>;

    /// Number of entries currently in the store
    fn len(&self) -> usize;

    /// `true` if the store has no entries
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bulk generates entries with random values of `size` characters drawn from [`ALPHABET`].
    ///
    /// Keys run from `1` up to, but not including, `quantity`. Each insertion is an individual
    /// [`put`](KvsEngine::put); the batch as a whole is not atomic.
    fn seed(&self, quantity: i64, size: usize) {
        let mut rng = rand::thread_rng();
        for key in 1..quantity {
            self.put(key, random_value(&mut rng, size));
        }
    }
}

/// builds a string of `size` characters picked uniformly from [`ALPHABET`]
pub fn random_value<R: Rng>(rng: &mut R, size: usize) -> String {
    (0..size)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

mod sharded;
mod striped;

pub use self::sharded::ShardedKvStore;
pub use self::striped::StripedKvStore;
