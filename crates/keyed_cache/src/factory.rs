// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::hash::Hash;

/// Builds, rebuilds, validates and tears down the values held by a [`KeyedCache`][crate::KeyedCache].
///
/// The cache decides *when* construction happens; the factory decides *how*. A factory is shared
/// by every thread using the cache and by every outstanding [`ValueHandle`][crate::ValueHandle],
/// so its methods take `&self`.
///
/// Only [`create`](Self::create) is required. The other operations have defaults that suit
/// values which never go stale and need no teardown.
///
/// # Example
///
/// ```
/// use std::convert::Infallible;
///
/// use keyed_cache::ValueFactory;
///
/// /// Builds a greeting per airport code.
/// #[derive(Debug)]
/// struct Greetings;
///
/// impl ValueFactory for Greetings {
///     type Key = String;
///     type Value = String;
///     type Param = str;
///     type Error = Infallible;
///
///     fn create(&self, key: &String) -> Result<String, Infallible> {
///         Ok(format!("welcome to {key}"))
///     }
///
///     fn create_with(&self, key: &String, language: &str) -> Result<String, Infallible> {
///         Ok(format!("[{language}] welcome to {key}"))
///     }
/// }
/// ```
pub trait ValueFactory: Send + Sync {
    /// Identifies a cached value. Immutable once inserted.
    type Key: Eq + Hash + Clone + Debug + Send + Sync;

    /// The cached value. Values are immutable once published.
    type Value: Send + Sync;

    /// Extra, per-call context threaded through to construction by
    /// [`KeyedCache::get_with`][crate::KeyedCache::get_with]. It does not affect cache identity.
    type Param: ?Sized;

    /// The error reported when construction fails.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Builds the value for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be built. The error is handed to the caller of
    /// [`KeyedCache::get`][crate::KeyedCache::get]; nothing is cached.
    fn create(&self, key: &Self::Key) -> Result<Self::Value, Self::Error>;

    /// Builds the value for `key` using per-call context. Defaults to [`create`](Self::create).
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be built.
    fn create_with(&self, key: &Self::Key, param: &Self::Param) -> Result<Self::Value, Self::Error> {
        let _ = param;
        self.create(key)
    }

    /// Rebuilds a stale value. `old` may still be in use by other holders and must not be changed.
    ///
    /// Defaults to [`create`](Self::create).
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be rebuilt.
    fn recreate(&self, key: &Self::Key, old: &Self::Value) -> Result<Self::Value, Self::Error> {
        let _ = old;
        self.create(key)
    }

    /// Rebuilds a stale value using per-call context. Defaults to [`recreate`](Self::recreate).
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be rebuilt.
    fn recreate_with(&self, key: &Self::Key, param: &Self::Param, old: &Self::Value) -> Result<Self::Value, Self::Error> {
        let _ = param;
        self.recreate(key, old)
    }

    /// Reports whether a cached value is still correct. Must be fast and free of side effects;
    /// it runs while the cache lock is held.
    fn validate(&self, key: &Self::Key, value: &Self::Value) -> bool {
        let _ = (key, value);
        true
    }

    /// Called once when the last handle to a value is dropped, never while the cache lock is held.
    fn destroy(&self, key: &Self::Key, value: &Self::Value) {
        let _ = (key, value);
    }

    /// Called before a value is built or rebuilt. `stale` is the value being replaced, if any.
    fn log_under_construction(&self, key: &Self::Key, stale: Option<&Self::Value>) {
        let _ = (key, stale);
    }

    /// Called after an explicit invalidation. `removed` is the value that left the cache, if any.
    fn log_invalidation(&self, key: &Self::Key, removed: Option<&Self::Value>) {
        let _ = (key, removed);
    }

    /// Resets side state the factory keeps about cached keys, such as a
    /// [`FlushIndex`][crate::FlushIndex]. Called by [`KeyedCache::flush`][crate::KeyedCache::flush]
    /// while the cache lock is held.
    fn clear_auxiliary(&self) {}
}
