// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Behavioral tests for the keyed cache.

use std::sync::atomic::{AtomicUsize, Ordering};

use hashbrown::HashSet;
use parking_lot::Mutex;
use rstest::rstest;

use crate::{Capacity, Error, KeyedCache, ValueFactory, ValueHandle};

#[derive(Debug, thiserror::Error)]
#[error("no fare row for key {0}")]
struct MissingRow(u32);

/// Builds `key * 10 + param`, rebuilds as `old + 1`, and counts everything it is asked to do.
#[derive(Debug, Default)]
struct StubFactory {
    created: AtomicUsize,
    recreated: AtomicUsize,
    destroyed: AtomicUsize,
    destroyed_during_recreate: AtomicUsize,
    stale: Mutex<HashSet<u32>>,
    failing: Mutex<HashSet<u32>>,
    under_construction: Mutex<Vec<(u32, Option<u64>)>>,
    invalidations: Mutex<Vec<(u32, Option<u64>)>>,
    auxiliary_clears: AtomicUsize,
}

impl StubFactory {
    fn mark_stale(&self, key: u32) {
        self.stale.lock().insert(key);
    }

    fn fail_on(&self, key: u32) {
        self.failing.lock().insert(key);
    }

    fn succeed_on(&self, key: u32) {
        self.failing.lock().remove(&key);
    }

    fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    fn recreated(&self) -> usize {
        self.recreated.load(Ordering::SeqCst)
    }

    fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl ValueFactory for StubFactory {
    type Key = u32;
    type Value = u64;
    type Param = u64;
    type Error = MissingRow;

    fn create(&self, key: &u32) -> Result<u64, MissingRow> {
        self.create_with(key, &0)
    }

    fn create_with(&self, key: &u32, param: &u64) -> Result<u64, MissingRow> {
        if self.failing.lock().contains(key) {
            return Err(MissingRow(*key));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(u64::from(*key) * 10 + param)
    }

    fn recreate_with(&self, key: &u32, param: &u64, old: &u64) -> Result<u64, MissingRow> {
        if self.failing.lock().contains(key) {
            return Err(MissingRow(*key));
        }
        self.destroyed_during_recreate.store(self.destroyed(), Ordering::SeqCst);
        self.recreated.fetch_add(1, Ordering::SeqCst);
        self.stale.lock().remove(key);
        Ok(old + 1 + param)
    }

    fn recreate(&self, key: &u32, old: &u64) -> Result<u64, MissingRow> {
        self.recreate_with(key, &0, old)
    }

    fn validate(&self, key: &u32, _value: &u64) -> bool {
        !self.stale.lock().contains(key)
    }

    fn destroy(&self, _key: &u32, _value: &u64) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    fn log_under_construction(&self, key: &u32, stale: Option<&u64>) {
        self.under_construction.lock().push((*key, stale.copied()));
    }

    fn log_invalidation(&self, key: &u32, removed: Option<&u64>) {
        self.invalidations.lock().push((*key, removed.copied()));
    }

    fn clear_auxiliary(&self) {
        self.auxiliary_clears.fetch_add(1, Ordering::SeqCst);
    }
}

fn cache(capacity: Capacity) -> KeyedCache<StubFactory> {
    KeyedCache::builder(StubFactory::default()).name("stub").capacity(capacity).build()
}

fn get(cache: &KeyedCache<StubFactory>, key: u32) -> ValueHandle<StubFactory> {
    cache.get(&key).expect("stub construction succeeds")
}

/// Checks that the map and the recency list describe the same set of values.
fn assert_consistent(cache: &KeyedCache<StubFactory>) {
    let state = cache.state.lock();
    let mut ready = 0;
    for (key, slot) in &state.map {
        if let crate::cache::Slot::Ready(idx) = slot {
            let handle = state.list.get(*idx).expect("ready slot points at a live node");
            assert_eq!(handle.key(), key);
            ready += 1;
        }
    }
    assert_eq!(ready, state.list.len());
}

#[test]
fn miss_creates_then_hit_reuses() {
    let cache = cache(Capacity::Unlimited);

    let first = get(&cache, 7);
    let second = get(&cache, 7);

    assert_eq!(*first, 70);
    assert!(ValueHandle::ptr_eq(&first, &second));
    assert_eq!(cache.factory().created(), 1);
    assert_eq!(cache.read_count(), 2);
    assert_eq!(cache.access_count(), 1);
    assert_consistent(&cache);
}

#[test]
fn get_with_threads_param_into_construction() {
    let cache = cache(Capacity::Unlimited);

    let value = cache.get_with(&3, &5).expect("stub construction succeeds");
    assert_eq!(*value, 35);

    // Identity is the key alone; a cached value is returned whatever the param.
    let again = cache.get_with(&3, &9).expect("stub construction succeeds");
    assert!(ValueHandle::ptr_eq(&value, &again));

    cache.factory().mark_stale(3);
    let rebuilt = cache.get_with(&3, &100).expect("stub rebuild succeeds");
    assert_eq!(*rebuilt, 35 + 1 + 100);
}

#[test]
fn concrete_eviction_scenario() {
    let cache = cache(Capacity::Bounded(3));
    for key in 1..=3 {
        assert_eq!(*get(&cache, key), u64::from(key) * 10);
    }

    let _ = get(&cache, 2);
    cache.put(4, 40);

    assert_eq!(cache.keys(), [4, 2, 3]);
    assert!(cache.get_if_resident(&1).is_none());
    assert_consistent(&cache);
}

#[test]
fn lru_order_respects_promotion() {
    let cache = cache(Capacity::Bounded(2));
    let _ = get(&cache, 1);
    let _ = get(&cache, 2);
    let _ = get(&cache, 1);
    let _ = get(&cache, 3);

    assert_eq!(cache.keys(), [3, 1]);
}

#[rstest]
#[case::zero(Capacity::Bounded(0))]
#[case::one(Capacity::Bounded(1))]
#[case::two(Capacity::Bounded(2))]
#[case::unlimited(Capacity::Unlimited)]
fn capacity_holds_after_every_operation(#[case] capacity: Capacity) {
    let cache = cache(capacity);
    let bound = capacity.get().unwrap_or(usize::MAX);

    for step in 0_u32..50 {
        let key = (step * 7) % 11;
        if step % 3 == 0 {
            cache.put(key, u64::from(step));
        } else {
            let _ = get(&cache, key);
        }
        assert!(cache.size() <= bound, "size {} exceeds {capacity} at step {step}", cache.size());
        assert_consistent(&cache);
    }
}

#[test]
fn zero_capacity_is_pass_through() {
    let cache = cache(Capacity::Bounded(0));

    let value = get(&cache, 4);
    assert_eq!(*value, 40);
    assert_eq!(cache.size(), 0);

    let _ = get(&cache, 4);
    assert_eq!(cache.factory().created(), 2);
}

#[test]
fn stale_value_is_recreated_not_created() {
    let cache = cache(Capacity::Unlimited);
    drop(get(&cache, 5));

    cache.factory().mark_stale(5);
    let rebuilt = get(&cache, 5);

    assert_eq!(*rebuilt, 51);
    assert_eq!(cache.factory().created(), 1);
    assert_eq!(cache.factory().recreated(), 1);
    assert_eq!(cache.size(), 1);

    // The old value was still alive during the rebuild and released once replaced.
    assert_eq!(cache.factory().destroyed_during_recreate.load(Ordering::SeqCst), 0);
    assert_eq!(cache.factory().destroyed(), 1);
    assert_eq!(*cache.factory().under_construction.lock(), [(5, None), (5, Some(50))]);
}

#[test]
fn stale_value_outlives_rebuild_while_held() {
    let cache = cache(Capacity::Unlimited);
    let old = get(&cache, 6);

    cache.factory().mark_stale(6);
    let new = get(&cache, 6);

    assert!(!ValueHandle::ptr_eq(&old, &new));
    assert_eq!(*old, 60);
    assert_eq!(ValueHandle::ref_count(&old), 1);
    assert_eq!(cache.factory().destroyed(), 0);

    drop(old);
    assert_eq!(cache.factory().destroyed(), 1);
}

#[test]
fn evicted_value_stays_usable_by_holder() {
    let cache = cache(Capacity::Bounded(1));
    let held = get(&cache, 1);
    let _ = get(&cache, 2);

    assert!(cache.get_if_resident(&1).is_none());
    assert_eq!(*held, 10);
    assert_eq!(cache.factory().destroyed(), 0);

    drop(held);
    assert_eq!(cache.factory().destroyed(), 1);
}

#[test]
fn put_replaces_and_releases_previous_value() {
    let cache = cache(Capacity::Unlimited);
    drop(get(&cache, 8));

    cache.put(8, 800);

    assert_eq!(cache.factory().destroyed(), 1);
    assert_eq!(cache.get_if_resident(&8).map(|v| *v), Some(800));
    assert_eq!(cache.size(), 1);
    assert_consistent(&cache);
}

#[test]
fn invalidate_round_trip() {
    let cache = cache(Capacity::Unlimited);
    cache.put(9, 90);

    assert_eq!(cache.invalidate(&9), 1);
    assert!(cache.get_if_resident(&9).is_none());
    assert_eq!(cache.invalidate(&9), 0);
    assert_eq!(*cache.factory().invalidations.lock(), [(9, Some(90)), (9, None)]);
    assert_eq!(cache.cache_stats().deletes, 1);
}

#[test]
fn failed_construction_leaves_no_poison() {
    let cache = cache(Capacity::Unlimited);
    let _ = get(&cache, 1);
    cache.factory().fail_on(2);

    let error = cache.get(&2).expect_err("construction fails");
    assert!(matches!(error, Error::Construction { ref cache, .. } if cache == "stub"));
    assert!(matches!(error.factory_error::<MissingRow>(), Some(MissingRow(2))));
    assert_eq!(cache.size(), 1);
    assert!(cache.get_if_resident(&2).is_none());

    cache.factory().succeed_on(2);
    assert_eq!(*get(&cache, 2), 20);
    assert_eq!(cache.size(), 2);
    assert_consistent(&cache);
}

#[test]
fn failed_rebuild_drops_stale_value() {
    let cache = cache(Capacity::Unlimited);
    drop(get(&cache, 3));
    cache.factory().mark_stale(3);
    cache.factory().fail_on(3);

    cache.get(&3).expect_err("rebuild fails");
    assert_eq!(cache.size(), 0);
    assert_eq!(cache.factory().destroyed(), 1);
}

#[test]
#[expect(clippy::panic, reason = "Simulates a factory that panics mid-construction")]
fn panicking_factory_rolls_back_placeholder() {
    #[derive(Debug, Default)]
    struct Explosive {
        armed: std::sync::atomic::AtomicBool,
    }

    impl ValueFactory for Explosive {
        type Key = u32;
        type Value = u32;
        type Param = ();
        type Error = std::convert::Infallible;

        fn create(&self, key: &u32) -> Result<u32, Self::Error> {
            if self.armed.swap(false, Ordering::SeqCst) {
                panic!("factory exploded");
            }
            Ok(*key)
        }
    }

    let cache = KeyedCache::builder(Explosive::default()).build();
    cache.factory().armed.store(true, Ordering::SeqCst);

    std::thread::scope(|s| s.spawn(|| cache.get(&1).map(|v| *v)).join())
        .expect_err("construction panics");
    assert!(cache.state.lock().map.is_empty());

    assert_eq!(cache.get(&1).map(|v| *v).expect("factory disarmed"), 1);
}

#[test]
fn get_if_resident_does_not_construct_or_promote() {
    let cache = cache(Capacity::Bounded(2));
    let _ = get(&cache, 1);
    let _ = get(&cache, 2);

    assert!(cache.get_if_resident(&3).is_none());
    assert_eq!(cache.get_if_resident(&1).map(|v| *v), Some(10));
    assert_eq!(cache.keys(), [2, 1]);
    assert_eq!(cache.factory().created(), 2);
    assert_eq!(cache.read_count(), 2);
}

#[test]
fn get_if_resident_ignores_staleness() {
    let cache = cache(Capacity::Unlimited);
    let _ = get(&cache, 1);
    cache.factory().mark_stale(1);

    assert_eq!(cache.get_if_resident(&1).map(|v| *v), Some(10));
    assert_eq!(cache.factory().recreated(), 0);
}

#[test]
fn clear_drops_everything_without_invalidation_hooks() {
    let cache = cache(Capacity::Unlimited);
    for key in 0..5 {
        let _ = get(&cache, key);
    }

    assert_eq!(cache.clear(), 5);
    assert!(cache.keys().is_empty());
    assert_eq!(cache.size(), 0);
    assert!(cache.factory().invalidations.lock().is_empty());
    assert_eq!(cache.factory().auxiliary_clears.load(Ordering::SeqCst), 0);
    assert_eq!(cache.factory().destroyed(), 5);
}

#[test]
fn flush_also_resets_auxiliary_state() {
    let cache = cache(Capacity::Unlimited);
    let _ = get(&cache, 1);

    cache.flush();

    assert!(cache.keys().is_empty());
    assert_eq!(cache.factory().auxiliary_clears.load(Ordering::SeqCst), 1);
    assert_eq!(cache.cache_stats().flushes, 1);
}

#[test]
fn reserve_shrinks_lazily() {
    let cache = cache(Capacity::Bounded(4));
    for key in 0..4 {
        let _ = get(&cache, key);
    }

    cache.reserve(Capacity::Bounded(2));
    assert_eq!(cache.size(), 4);
    assert_eq!(cache.capacity(), Capacity::Bounded(2));

    // One eviction per insert, never a batch.
    cache.put(10, 100);
    assert_eq!(cache.keys(), [10, 3, 2, 1]);

    cache.invalidate(&3);
    cache.invalidate(&2);
    cache.put(11, 110);
    assert_eq!(cache.keys(), [11, 10]);
}

#[test]
fn stats_track_rows_and_updates() {
    let cache = cache(Capacity::Bounded(1));
    let _ = get(&cache, 1);
    let _ = get(&cache, 2);
    cache.put(2, 99);
    cache.invalidate(&2);

    let stats = cache.cache_stats();
    assert_eq!(stats.updates, 3);
    assert_eq!(stats.rows_added, 3);
    // Eviction of 1, replacement of 2, invalidation of 2.
    assert_eq!(stats.rows_removed, 3);
    assert_eq!(stats.deletes, 1);
    assert_eq!(stats.flushes, 0);
}

#[test]
fn debug_output_is_informative() {
    let cache = cache(Capacity::Bounded(3));
    let _ = get(&cache, 1);

    let output = format!("{cache:?}");
    assert!(output.contains("stub"), "{output}");
    assert!(output.contains("size: 1"), "{output}");
}
