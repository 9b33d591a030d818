// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A generic, thread-safe, capacity-bounded keyed cache with deduplicated concurrent construction
//! and an optional local disk cache (LDC) mirror.
//!
//! Many subsystems need the same thing: a map from a domain key to an expensive-to-build value,
//! shared by every worker thread, bounded in size, and rebuilt when it goes stale. This crate
//! provides that primitive as [`KeyedCache`]. Each subsystem supplies a [`ValueFactory`] that knows
//! how to build its values; the cache decides when to build them.
//!
//! # Architecture
//!
//! A single lock guards a [`hashbrown`] map from key to slot and an arena-indexed recency list
//! holding the values, most recently used first. A slot is either a placeholder, meaning some
//! thread is building the value, or a position in the list.
//!
//! - **Lookups** promote a fresh value to the head of the list and return a [`ValueHandle`].
//! - **Misses** insert a placeholder, release the lock, build the value, then re-take the lock to
//!   publish it. Threads that find the placeholder wait on a cache-wide condition variable and
//!   re-check their key when any construction finishes. Puts and invalidations of that key wait
//!   the same way, so only the builder that inserted a placeholder ever removes it.
//! - **Stale values** (those [`ValueFactory::validate`] rejects) are rebuilt with
//!   [`ValueFactory::recreate`], which receives the old value. The old value stays alive until its
//!   replacement is installed.
//! - **Failures** roll the placeholder back and wake waiters, which then retry on their own. Panics
//!   inside the factory roll back the same way.
//! - **Eviction** removes exactly one least-recently-used value per insert that pushes the cache
//!   above its [`Capacity`].
//!
//! # Disk cache mirror
//!
//! A cache built with [`KeyedCacheBuilder::ldc`] records every publish, eviction, invalidation and
//! clear on a [`keyed_cache_ldc::LdcQueue`]. Recording happens inside the cache's critical section
//! but only enqueues; the disk write happens later, in a drain loop that owns the matching
//! [`keyed_cache_ldc::LdcReceiver`]. Disk failures never reach cache callers.
//!
//! # Example
//!
//! ```
//! use std::convert::Infallible;
//!
//! use keyed_cache::{Capacity, KeyedCache, ValueFactory};
//! use keyed_cache_ldc::{LdcAction, LdcOptions, channel};
//!
//! #[derive(Debug)]
//! struct Fares;
//!
//! impl ValueFactory for Fares {
//!     type Key = (&'static str, &'static str);
//!     type Value = u32;
//!     type Param = ();
//!     type Error = Infallible;
//!
//!     fn create(&self, key: &Self::Key) -> Result<u32, Infallible> {
//!         Ok(u32::try_from(key.0.len() * 100 + key.1.len()).unwrap_or(u32::MAX))
//!     }
//! }
//!
//! let (queue, receiver) = channel("fares", &LdcOptions::default());
//! let cache = KeyedCache::builder(Fares)
//!     .name("fares")
//!     .capacity(Capacity::Bounded(1_000))
//!     .ldc(queue)
//!     .build();
//!
//! let fare = cache.get(&("BA", "LHR-JFK"))?;
//! assert_eq!(*fare, 207);
//!
//! // The publish was recorded for the disk cache.
//! assert!(matches!(receiver.try_recv(), Some(LdcAction::Put { is_recovered: false, .. })));
//! # Ok::<(), keyed_cache::Error>(())
//! ```
//!
//! # Administration
//!
//! [`CacheManager`] is the control-plane facade over one shared cache: size, statistics, capacity
//! changes, full flushes, and domain-level flushes routed through a factory's [`FlushIndex`].

mod cache;
mod error;
mod factory;
mod flush;
mod handle;
mod manager;
mod options;
mod recency;
mod stats;

pub use cache::{KeyedCache, KeyedCacheBuilder};
pub use error::{BoxError, Error, Result};
pub use factory::ValueFactory;
pub use flush::{FlushIndex, FlushKeyed};
pub use handle::ValueHandle;
pub use manager::{CacheManager, ResidentComparison};
pub use options::{CacheOptions, Capacity};
pub use stats::CacheStats;

#[cfg(test)]
mod tests;
