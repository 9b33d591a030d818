// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use hashbrown::HashMap;
use keyed_cache_ldc::LdcQueue;
use parking_lot::{Condvar, Mutex};

use crate::recency::{NodeIndex, RecencyList};
use crate::{CacheOptions, CacheStats, Capacity, Error, Result, ValueFactory, ValueHandle};

const DEFAULT_NAME: &str = "keyed_cache";

/// What the map knows about a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Slot {
    /// Some thread is building the value; no value exists yet.
    Placeholder,
    /// The value lives at this position in the recency list.
    Ready(NodeIndex),
}

pub(crate) struct State<F: ValueFactory> {
    pub(crate) map: HashMap<F::Key, Slot>,
    pub(crate) list: RecencyList<ValueHandle<F>>,
    capacity: Capacity,
    stats: CacheStats,
    access_count: u64,
    read_count: u64,
}

/// A thread-safe, capacity-bounded keyed cache with deduplicated construction.
///
/// Values are built on demand by a [`ValueFactory`]. When several threads ask for the same missing
/// key at once, one of them builds the value while the others wait for it; the cache lock is never
/// held while a value is being built. Entries are kept in least-recently-used order, and each
/// insert that pushes the cache above its [`Capacity`] evicts exactly one entry from the tail.
///
/// Every publish, eviction, invalidation and clear is recorded on the optional
/// [`LdcQueue`] so that a local disk cache can mirror the in-memory state. Recording never blocks.
///
/// # Examples
///
/// ```
/// use std::convert::Infallible;
///
/// use keyed_cache::{Capacity, KeyedCache, ValueFactory};
///
/// #[derive(Debug)]
/// struct Lengths;
///
/// impl ValueFactory for Lengths {
///     type Key = String;
///     type Value = usize;
///     type Param = ();
///     type Error = Infallible;
///
///     fn create(&self, key: &String) -> Result<usize, Infallible> {
///         Ok(key.len())
///     }
/// }
///
/// let cache = KeyedCache::builder(Lengths).name("lengths").capacity(Capacity::Bounded(2)).build();
///
/// let value = cache.get(&"LON".to_string())?;
/// assert_eq!(*value, 3);
/// assert_eq!(cache.size(), 1);
/// # Ok::<(), keyed_cache::Error>(())
/// ```
pub struct KeyedCache<F: ValueFactory> {
    name: String,
    factory: Arc<F>,
    pub(crate) state: Mutex<State<F>>,
    // Signalled whenever any key's construction finishes, successfully or not.
    constructed: Condvar,
    ldc: Option<LdcQueue<F::Key>>,
}

impl<F: ValueFactory> KeyedCache<F> {
    /// Creates a builder for a cache whose values are made by `factory`.
    #[must_use]
    pub fn builder(factory: F) -> KeyedCacheBuilder<F> {
        KeyedCacheBuilder::new(Arc::new(factory))
    }

    /// Returns a live, validated value for `key`, building it if necessary.
    ///
    /// If the key is absent the factory's [`create`](ValueFactory::create) runs; if the cached
    /// value no longer validates, [`recreate`](ValueFactory::recreate) runs with the old value.
    /// Concurrent callers for the same key wait for that single construction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Construction`] if the factory fails. Nothing is cached, and threads that
    /// were waiting for the value retry the construction themselves.
    pub fn get(&self, key: &F::Key) -> Result<ValueHandle<F>> {
        self.fetch(key, None)
    }

    /// Like [`get`](Self::get), but hands `param` to [`create_with`](ValueFactory::create_with)
    /// or [`recreate_with`](ValueFactory::recreate_with) when a value has to be built.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Construction`] if the factory fails.
    pub fn get_with(&self, key: &F::Key, param: &F::Param) -> Result<ValueHandle<F>> {
        self.fetch(key, Some(param))
    }

    /// Returns the cached value for `key` without building, validating or promoting it.
    ///
    /// If the key is being built, waits for that construction to finish first.
    #[must_use]
    pub fn get_if_resident(&self, key: &F::Key) -> Option<ValueHandle<F>> {
        let mut state = self.state.lock();
        loop {
            match state.map.get(key).copied() {
                Some(Slot::Placeholder) => self.constructed.wait(&mut state),
                Some(Slot::Ready(idx)) => return state.list.get(idx).cloned(),
                None => return None,
            }
        }
    }

    /// Installs `value` as the most recently used entry for `key`, replacing any previous value,
    /// and records a put on the disk cache queue.
    ///
    /// If the key is being built, waits for that construction to finish first. A factory must not
    /// put the key it is currently building.
    pub fn put(&self, key: F::Key, value: F::Value) {
        self.store(key, value, true);
    }

    /// Installs `value` like [`put`](Self::put) without recording it on the disk cache queue.
    ///
    /// Used when loading values that came from the local disk cache in the first place.
    pub fn put_local(&self, key: F::Key, value: F::Value) {
        self.store(key, value, false);
    }

    /// Removes the value for `key`, waiting out any construction in progress.
    ///
    /// Returns 1 if a value was removed and 0 otherwise.
    pub fn invalidate(&self, key: &F::Key) -> usize {
        self.remove(key, false)
    }

    /// Like [`invalidate`](Self::invalidate), for invalidations that originate in the local disk
    /// cache subsystem.
    pub fn invalidate_from_ldc(&self, key: &F::Key) -> usize {
        self.remove(key, true)
    }

    /// A point-in-time copy of every key with a value, most recently used first.
    #[must_use]
    pub fn keys(&self) -> Vec<F::Key> {
        self.state.lock().list.iter().map(|handle| handle.key().clone()).collect()
    }

    /// Drops every value and returns how many there were.
    ///
    /// Invalidation hooks are not called. Constructions in progress are unaffected.
    pub fn clear(&self) -> usize {
        let released = {
            let mut state = self.state.lock();
            self.discard_all(&mut state)
        };

        let removed = released.len();
        tracing::debug!(cache.name = %self.name, cache.removed = removed, "cache.cleared");
        removed
    }

    /// Drops every value and resets the factory's auxiliary state in one critical section.
    ///
    /// The cache lock is taken before [`ValueFactory::clear_auxiliary`] runs, so a factory that
    /// guards its side state with its own lock must not call back into the cache while holding it.
    pub fn flush(&self) {
        let released = {
            let mut state = self.state.lock();
            let released = self.discard_all(&mut state);
            self.factory.clear_auxiliary();
            released
        };

        tracing::debug!(cache.name = %self.name, cache.removed = released.len(), "cache.flushed");
    }

    /// Changes the capacity. A smaller capacity does not evict right away; each later insert
    /// evicts one entry until the cache fits.
    pub fn reserve(&self, capacity: impl Into<Capacity>) {
        let capacity = capacity.into();
        self.state.lock().capacity = capacity;
        tracing::debug!(cache.name = %self.name, cache.capacity = %capacity, "cache.reserved");
    }

    /// Number of entries with a value.
    #[must_use]
    pub fn size(&self) -> usize {
        self.state.lock().list.len()
    }

    /// The current capacity.
    #[must_use]
    pub fn capacity(&self) -> Capacity {
        self.state.lock().capacity
    }

    /// Number of times the factory was asked to build a value.
    #[must_use]
    pub fn access_count(&self) -> u64 {
        self.state.lock().access_count
    }

    /// Number of [`get`](Self::get) and [`get_with`](Self::get_with) calls.
    #[must_use]
    pub fn read_count(&self) -> u64 {
        self.state.lock().read_count
    }

    /// A snapshot of the cache counters.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.state.lock().stats
    }

    /// The name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The factory that builds this cache's values.
    #[must_use]
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// The disk cache queue this cache records its mutations on, if any.
    #[must_use]
    pub const fn ldc(&self) -> Option<&LdcQueue<F::Key>> {
        self.ldc.as_ref()
    }

    fn fetch(&self, key: &F::Key, param: Option<&F::Param>) -> Result<ValueHandle<F>> {
        let mut guard = self.state.lock();
        guard.read_count += 1;

        let stale = loop {
            let state = &mut *guard;
            match state.map.get(key).copied() {
                Some(Slot::Placeholder) => self.constructed.wait(&mut guard),
                Some(Slot::Ready(idx)) => {
                    if let Some(handle) = state.list.get(idx).filter(|handle| self.factory.validate(key, handle)) {
                        let handle = handle.clone();
                        state.list.move_to_front(idx);
                        return Ok(handle);
                    }

                    // Keep the stale value alive as a template for the rebuild.
                    let stale = state.list.remove(idx);
                    state.stats.rows_removed += u64::from(stale.is_some());
                    state.map.insert(key.clone(), Slot::Placeholder);
                    break stale;
                }
                None => {
                    state.map.insert(key.clone(), Slot::Placeholder);
                    break None;
                }
            }
        };

        guard.access_count += 1;
        drop(guard);

        self.construct(key, param, stale)
    }

    /// Builds the value for `key`, which this thread has reserved with a placeholder.
    fn construct(&self, key: &F::Key, param: Option<&F::Param>, stale: Option<ValueHandle<F>>) -> Result<ValueHandle<F>> {
        let is_recreate = stale.is_some();
        self.factory.log_under_construction(key, stale.as_deref());
        tracing::debug!(cache.name = %self.name, cache.key = ?key, cache.recreate = is_recreate, "cache.constructing");

        let reservation = Reservation {
            cache: self,
            key,
            had_stale: is_recreate,
            armed: true,
        };

        let started = Instant::now();
        let built = match (stale.as_deref(), param) {
            (Some(old), Some(param)) => self.factory.recreate_with(key, param, old),
            (Some(old), None) => self.factory.recreate(key, old),
            (None, Some(param)) => self.factory.create_with(key, param),
            (None, None) => self.factory.create(key),
        };
        let elapsed = started.elapsed();

        let value = match built {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(
                    cache.name = %self.name,
                    cache.key = ?key,
                    error = &error as &dyn std::error::Error,
                    "cache.construction_failed"
                );
                drop(reservation);
                return Err(Error::Construction {
                    cache: self.name.clone(),
                    source: Box::new(error),
                });
            }
        };
        reservation.disarm();

        let handle = ValueHandle::new(key.clone(), value, Arc::clone(&self.factory));
        let released = {
            let mut state = self.state.lock();
            state.stats.cpu_time += elapsed;

            let displaced = self.install(&mut state, handle.clone());
            if let Some(ldc) = &self.ldc {
                ldc.queue_put(key.clone(), is_recreate);
            }
            let evicted = self.evict_one(&mut state);

            self.constructed.notify_all();
            [displaced, evicted]
        };

        tracing::debug!(cache.name = %self.name, cache.key = ?key, cache.duration = ?elapsed, "cache.constructed");

        // The old value is released only now that its replacement is installed.
        drop(released);
        drop(stale);
        Ok(handle)
    }

    /// Rolls back a placeholder after a failed or panicked construction.
    fn abandon(&self, key: &F::Key, had_stale: bool) {
        let mut state = self.state.lock();

        // Placeholders are only ever removed by the construction that inserted them.
        if state.map.get(key) == Some(&Slot::Placeholder) {
            state.map.remove(key);
            if let Some(ldc) = &self.ldc {
                ldc.queue_invalidate(key.clone(), had_stale, false);
            }
        }

        self.constructed.notify_all();
    }

    fn store(&self, key: F::Key, value: F::Value, update_ldc: bool) {
        let handle = ValueHandle::new(key, value, Arc::clone(&self.factory));

        let released = {
            let mut state = self.state.lock();
            while state.map.get(handle.key()) == Some(&Slot::Placeholder) {
                self.constructed.wait(&mut state);
            }
            let ldc_key = update_ldc.then(|| handle.key().clone());

            let displaced = self.install(&mut state, handle);
            if let (Some(ldc), Some(key)) = (&self.ldc, ldc_key) {
                ldc.queue_put(key, false);
            }
            let evicted = self.evict_one(&mut state);
            [displaced, evicted]
        };

        drop(released);
    }

    fn remove(&self, key: &F::Key, is_from_ldc: bool) -> usize {
        let mut state = self.state.lock();
        while state.map.get(key) == Some(&Slot::Placeholder) {
            self.constructed.wait(&mut state);
        }

        let removed = match state.map.remove(key) {
            Some(Slot::Ready(idx)) => state.list.remove(idx),
            _ => None,
        };

        let was_stale = removed.as_ref().is_some_and(|value| !self.factory.validate(key, value));
        if removed.is_some() {
            state.stats.deletes += 1;
            state.stats.rows_removed += 1;
        }
        if let Some(ldc) = &self.ldc {
            ldc.queue_invalidate(key.clone(), was_stale, is_from_ldc);
        }
        drop(state);

        self.factory.log_invalidation(key, removed.as_deref());
        tracing::debug!(
            cache.name = %self.name,
            cache.key = ?key,
            cache.removed = removed.is_some(),
            ldc.from_ldc = is_from_ldc,
            "cache.invalidated"
        );

        usize::from(removed.is_some())
    }

    /// Puts `handle` at the head of the recency list and returns the value it replaced.
    fn install(&self, state: &mut State<F>, handle: ValueHandle<F>) -> Option<ValueHandle<F>> {
        let key = handle.key().clone();
        let displaced = match state.map.get(&key) {
            Some(&Slot::Ready(idx)) => state.list.remove(idx),
            _ => None,
        };

        let idx = state.list.push_front(handle);
        state.map.insert(key, Slot::Ready(idx));

        state.stats.updates += 1;
        state.stats.rows_added += 1;
        state.stats.rows_removed += u64::from(displaced.is_some());
        displaced
    }

    /// Evicts the least recently used value if the cache is over capacity.
    fn evict_one(&self, state: &mut State<F>) -> Option<ValueHandle<F>> {
        if !state.capacity.is_exceeded_by(state.list.len()) {
            return None;
        }

        let victim = state.list.pop_back()?;
        state.map.remove(victim.key());
        state.stats.rows_removed += 1;

        let was_stale = !self.factory.validate(victim.key(), &victim);
        if let Some(ldc) = &self.ldc {
            ldc.queue_invalidate(victim.key().clone(), was_stale, false);
        }

        tracing::debug!(cache.name = %self.name, cache.key = ?victim.key(), cache.was_stale = was_stale, "cache.evicted");
        Some(victim)
    }

    /// Empties the map and list, keeping placeholders for constructions in progress.
    fn discard_all(&self, state: &mut State<F>) -> Vec<ValueHandle<F>> {
        let released = state.list.take_all();
        state.map.retain(|_, slot| *slot == Slot::Placeholder);

        state.stats.flushes += 1;
        state.stats.rows_removed += released.len() as u64;
        if let Some(ldc) = &self.ldc {
            ldc.queue_clear();
        }
        released
    }
}

impl<F> fmt::Debug for KeyedCache<F>
where
    F: ValueFactory,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("KeyedCache")
            .field("name", &self.name)
            .field("size", &state.list.len())
            .field("capacity", &state.capacity)
            .field("ldc", &self.ldc)
            .finish_non_exhaustive()
    }
}

/// Owns the placeholder for a key under construction. Dropping it while armed removes the
/// placeholder and wakes waiters, including when the factory panics.
struct Reservation<'a, F: ValueFactory> {
    cache: &'a KeyedCache<F>,
    key: &'a F::Key,
    had_stale: bool,
    armed: bool,
}

impl<F: ValueFactory> Reservation<'_, F> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<F: ValueFactory> Drop for Reservation<'_, F> {
    fn drop(&mut self) {
        if self.armed {
            self.cache.abandon(self.key, self.had_stale);
        }
    }
}

/// Builder for configuring a [`KeyedCache`].
///
/// # Examples
///
/// ```
/// use std::convert::Infallible;
///
/// use keyed_cache::{Capacity, KeyedCache, ValueFactory};
/// use keyed_cache_ldc::{LdcOptions, channel};
///
/// #[derive(Debug)]
/// struct Doubles;
///
/// impl ValueFactory for Doubles {
///     type Key = u32;
///     type Value = u64;
///     type Param = ();
///     type Error = Infallible;
///
///     fn create(&self, key: &u32) -> Result<u64, Infallible> {
///         Ok(u64::from(*key) * 2)
///     }
/// }
///
/// let (queue, _receiver) = channel("doubles", &LdcOptions::default());
/// let cache = KeyedCache::builder(Doubles)
///     .name("doubles")
///     .capacity(Capacity::Unlimited)
///     .ldc(queue)
///     .build();
///
/// assert_eq!(cache.capacity(), Capacity::Unlimited);
/// assert!(cache.ldc().is_some());
/// ```
pub struct KeyedCacheBuilder<F: ValueFactory> {
    factory: Arc<F>,
    name: String,
    capacity: Capacity,
    ldc: Option<LdcQueue<F::Key>>,
}

impl<F: ValueFactory> KeyedCacheBuilder<F> {
    /// Creates a builder around a factory that the caller may also keep a reference to.
    ///
    /// Defaults:
    /// - `name`: `"keyed_cache"`
    /// - `capacity`: [`Capacity::Unlimited`]
    /// - no disk cache queue
    #[must_use]
    pub fn new(factory: Arc<F>) -> Self {
        Self {
            factory,
            name: DEFAULT_NAME.to_string(),
            capacity: Capacity::Unlimited,
            ldc: None,
        }
    }

    /// Sets the name used in logs.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the maximum number of entries.
    #[must_use]
    pub fn capacity(mut self, capacity: impl Into<Capacity>) -> Self {
        self.capacity = capacity.into();
        self
    }

    /// Records mutations on `queue` for a local disk cache to mirror.
    #[must_use]
    pub fn ldc(mut self, queue: LdcQueue<F::Key>) -> Self {
        self.ldc = Some(queue);
        self
    }

    /// Applies every setting in `options`.
    #[must_use]
    pub fn options(mut self, options: &CacheOptions) -> Self {
        if let Some(name) = &options.name {
            self.name.clone_from(name);
        }
        self.capacity = options.capacity;
        self
    }

    /// Builds the cache.
    #[must_use]
    pub fn build(self) -> KeyedCache<F> {
        tracing::debug!(cache.name = %self.name, cache.capacity = %self.capacity, ldc.enabled = self.ldc.is_some(), "cache.created");

        KeyedCache {
            name: self.name,
            factory: self.factory,
            state: Mutex::new(State {
                map: HashMap::new(),
                list: RecencyList::new(),
                capacity: self.capacity,
                stats: CacheStats::default(),
                access_count: 0,
                read_count: 0,
            }),
            constructed: Condvar::new(),
            ldc: self.ldc,
        }
    }
}

impl<F: ValueFactory> fmt::Debug for KeyedCacheBuilder<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedCacheBuilder")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("ldc", &self.ldc)
            .finish_non_exhaustive()
    }
}
