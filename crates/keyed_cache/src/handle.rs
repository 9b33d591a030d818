// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::ValueFactory;

/// A shared reference to a cached value.
///
/// The cache holds one handle per entry and every caller of [`get`][crate::KeyedCache::get]
/// receives another, so a value stays usable after it is evicted. When the last handle is dropped
/// the factory's [`destroy`][ValueFactory::destroy] hook runs.
pub struct ValueHandle<F: ValueFactory> {
    inner: Arc<Inner<F>>,
}

struct Inner<F: ValueFactory> {
    key: F::Key,
    value: F::Value,
    factory: Arc<F>,
}

impl<F: ValueFactory> Drop for Inner<F> {
    fn drop(&mut self) {
        self.factory.destroy(&self.key, &self.value);
    }
}

impl<F: ValueFactory> ValueHandle<F> {
    pub(crate) fn new(key: F::Key, value: F::Value, factory: Arc<F>) -> Self {
        Self {
            inner: Arc::new(Inner { key, value, factory }),
        }
    }

    /// The key this value was built for.
    #[must_use]
    pub fn key(&self) -> &F::Key {
        &self.inner.key
    }

    /// Whether two handles refer to the same value instance.
    #[must_use]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.inner, &other.inner)
    }

    /// Number of live handles to this value, including the cache's own.
    #[must_use]
    pub fn ref_count(this: &Self) -> usize {
        Arc::strong_count(&this.inner)
    }
}

impl<F: ValueFactory> Clone for ValueHandle<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ValueFactory> Deref for ValueHandle<F> {
    type Target = F::Value;

    fn deref(&self) -> &Self::Target {
        &self.inner.value
    }
}

impl<F: ValueFactory> AsRef<F::Value> for ValueHandle<F> {
    fn as_ref(&self) -> &F::Value {
        &self.inner.value
    }
}

impl<F> fmt::Debug for ValueHandle<F>
where
    F: ValueFactory,
    F::Value: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueHandle")
            .field("key", &self.inner.key)
            .field("value", &self.inner.value)
            .finish()
    }
}
