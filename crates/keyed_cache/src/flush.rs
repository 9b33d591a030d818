// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::hash::Hash;

use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;

use crate::ValueFactory;

/// A secondary index from a coarse flush key (a vendor, a carrier, a market) to the cache keys
/// built under it.
///
/// A factory records keys here as it builds them, and a
/// [`CacheManager`][crate::CacheManager] uses the index to turn a domain flush request into
/// key-level invalidations. [`KeyedCache::flush`][crate::KeyedCache::flush] clears it through
/// [`ValueFactory::clear_auxiliary`].
///
/// Keys stay recorded after the cache evicts or invalidates them; only [`take`](Self::take) and
/// [`clear`](Self::clear) shrink the index on their own. A factory can drop keys as they go with
/// [`remove`](Self::remove) from [`ValueFactory::log_invalidation`], and
/// [`CacheManager::prune_flush_index`][crate::CacheManager::prune_flush_index] drops every key that
/// is no longer resident, which also covers evictions.
///
/// # Example
///
/// ```
/// use keyed_cache::FlushIndex;
///
/// let index = FlushIndex::new();
/// index.record("BA", ("BA", "LHR-JFK"));
/// index.record("BA", ("BA", "LHR-CDG"));
/// index.record("AF", ("AF", "CDG-JFK"));
///
/// assert_eq!(index.keys_for(&"BA").len(), 2);
/// assert_eq!(index.take(&"AF"), [("AF", "CDG-JFK")]);
/// assert_eq!(index.len(), 1);
/// ```
pub struct FlushIndex<FK, K> {
    entries: Mutex<HashMap<FK, HashSet<K>>>,
}

impl<FK, K> FlushIndex<FK, K>
where
    FK: Eq + Hash,
    K: Eq + Hash + Clone,
{
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Records that `key` was built under `flush_key`.
    pub fn record(&self, flush_key: FK, key: K) {
        self.entries.lock().entry(flush_key).or_default().insert(key);
    }

    /// The keys recorded under `flush_key`.
    #[must_use]
    pub fn keys_for(&self, flush_key: &FK) -> Vec<K> {
        self.entries
            .lock()
            .get(flush_key)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Removes `flush_key` from the index and returns the keys recorded under it.
    pub fn take(&self, flush_key: &FK) -> Vec<K> {
        self.entries
            .lock()
            .remove(flush_key)
            .map(|keys| keys.into_iter().collect())
            .unwrap_or_default()
    }

    /// Forgets that `key` was built under `flush_key`. Returns whether it was recorded.
    pub fn remove(&self, flush_key: &FK, key: &K) -> bool {
        let mut entries = self.entries.lock();
        let Some(keys) = entries.get_mut(flush_key) else {
            return false;
        };

        let removed = keys.remove(key);
        if keys.is_empty() {
            entries.remove(flush_key);
        }
        removed
    }

    /// Keeps only the keys for which `keep` returns `true` and returns how many were dropped.
    ///
    /// Flush keys left without any keys are removed.
    pub fn retain(&self, mut keep: impl FnMut(&K) -> bool) -> usize {
        let mut dropped = 0;
        self.entries.lock().retain(|_, keys| {
            let before = keys.len();
            keys.retain(|key| keep(key));
            dropped += before - keys.len();
            !keys.is_empty()
        });
        dropped
    }

    /// Number of flush keys with recorded entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Forgets everything.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl<FK, K> Default for FlushIndex<FK, K>
where
    FK: Eq + Hash,
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<FK, K> fmt::Debug for FlushIndex<FK, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlushIndex")
            .field("flush_keys", &self.entries.lock().len())
            .finish()
    }
}

/// A factory that maintains a [`FlushIndex`], enabling
/// [`CacheManager::flush_by`][crate::CacheManager::flush_by].
pub trait FlushKeyed: ValueFactory {
    /// The coarse key that domain flush requests are expressed in.
    type FlushKey: Eq + Hash;

    /// The factory's index from flush keys to cache keys.
    fn flush_index(&self) -> &FlushIndex<Self::FlushKey, Self::Key>;
}
