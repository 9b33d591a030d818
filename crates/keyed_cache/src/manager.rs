// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::Arc;

use crate::{CacheStats, Capacity, FlushKeyed, KeyedCache, ValueFactory};

/// Outcome of [`CacheManager::compare_resident`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResidentComparison {
    /// Resident values handed to the comparator.
    pub compared: usize,
    /// Values the comparator reported as different.
    pub mismatched: usize,
}

/// The control-plane view of one subsystem's cache.
///
/// Application start-up builds the [`KeyedCache`] and hands a manager to whatever administers it.
/// The manager forwards size, statistics and flush requests, and turns domain flush requests into
/// key-level invalidations.
pub struct CacheManager<F: ValueFactory> {
    cache: Arc<KeyedCache<F>>,
}

impl<F: ValueFactory> CacheManager<F> {
    /// Wraps a shared cache.
    #[must_use]
    pub const fn new(cache: Arc<KeyedCache<F>>) -> Self {
        Self { cache }
    }

    /// The managed cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<KeyedCache<F>> {
        &self.cache
    }

    /// See [`KeyedCache::name`].
    #[must_use]
    pub fn name(&self) -> &str {
        self.cache.name()
    }

    /// See [`KeyedCache::size`].
    #[must_use]
    pub fn size(&self) -> usize {
        self.cache.size()
    }

    /// See [`KeyedCache::capacity`].
    #[must_use]
    pub fn capacity(&self) -> Capacity {
        self.cache.capacity()
    }

    /// See [`KeyedCache::reserve`].
    pub fn reserve(&self, capacity: impl Into<Capacity>) {
        self.cache.reserve(capacity);
    }

    /// See [`KeyedCache::cache_stats`].
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.cache_stats()
    }

    /// See [`KeyedCache::access_count`].
    #[must_use]
    pub fn access_count(&self) -> u64 {
        self.cache.access_count()
    }

    /// See [`KeyedCache::read_count`].
    #[must_use]
    pub fn read_count(&self) -> u64 {
        self.cache.read_count()
    }

    /// See [`KeyedCache::invalidate`].
    pub fn invalidate(&self, key: &F::Key) -> usize {
        self.cache.invalidate(key)
    }

    /// Invalidates each of `keys` and returns how many values were removed.
    pub fn invalidate_keys<I>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = F::Key>,
    {
        keys.into_iter().map(|key| self.cache.invalidate(&key)).sum()
    }

    /// Invalidates every cached key for which `predicate` holds and returns how many values were
    /// removed.
    pub fn invalidate_matching(&self, mut predicate: impl FnMut(&F::Key) -> bool) -> usize {
        let removed = self.invalidate_keys(self.cache.keys().into_iter().filter(|key| predicate(key)));
        tracing::info!(cache.name = %self.cache.name(), cache.removed = removed, "cache.invalidated_matching");
        removed
    }

    /// Invalidates every key the factory recorded under `flush_key` and returns how many values
    /// were removed.
    pub fn flush_by(&self, flush_key: &F::FlushKey) -> usize
    where
        F: FlushKeyed,
    {
        let keys = self.cache.factory().flush_index().take(flush_key);
        let requested = keys.len();
        let removed = self.invalidate_keys(keys);

        tracing::info!(
            cache.name = %self.cache.name(),
            cache.requested = requested,
            cache.removed = removed,
            "cache.flushed_by_key"
        );
        removed
    }

    /// Drops every key from the factory's [`FlushIndex`](crate::FlushIndex) that has no value in
    /// the cache, and returns how many were dropped. Keys still being built are kept.
    pub fn prune_flush_index(&self) -> usize
    where
        F: FlushKeyed,
    {
        // Same lock order as `KeyedCache::flush`: cache first, then the index.
        let state = self.cache.state.lock();
        let pruned = self.cache.factory().flush_index().retain(|key| state.map.contains_key(key));
        let resident = state.list.len();
        drop(state);

        tracing::info!(
            cache.name = %self.cache.name(),
            cache.resident = resident,
            cache.pruned = pruned,
            "cache.flush_index_pruned"
        );
        pruned
    }

    /// See [`KeyedCache::flush`].
    pub fn flush(&self) {
        self.cache.flush();
        tracing::info!(cache.name = %self.cache.name(), "cache.flushed");
    }

    /// See [`KeyedCache::clear`].
    pub fn clear(&self) -> usize {
        self.cache.clear()
    }

    /// See [`KeyedCache::keys`].
    #[must_use]
    pub fn keys(&self) -> Vec<F::Key> {
        self.cache.keys()
    }

    /// Hands each resident value to `matches` and counts the values it rejects.
    ///
    /// Used to compare the in-memory cache with another copy, such as the local disk cache.
    /// Nothing is built: keys invalidated during the walk are skipped.
    pub fn compare_resident(&self, mut matches: impl FnMut(&F::Key, &F::Value) -> bool) -> ResidentComparison {
        let mut comparison = ResidentComparison::default();
        for key in self.cache.keys() {
            let Some(value) = self.cache.get_if_resident(&key) else {
                continue;
            };

            comparison.compared += 1;
            if !matches(&key, &*value) {
                comparison.mismatched += 1;
            }
        }

        tracing::info!(
            cache.name = %self.cache.name(),
            cache.compared = comparison.compared,
            cache.mismatched = comparison.mismatched,
            "cache.compared_resident"
        );
        comparison
    }
}

impl<F: ValueFactory> Clone for CacheManager<F> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<F: ValueFactory> fmt::Debug for CacheManager<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager").field("cache", &self.cache).finish()
    }
}
