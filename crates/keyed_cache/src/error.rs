// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

/// A boxed error as produced by a [`ValueFactory`][crate::ValueFactory].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A specialized `Result` type for keyed cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An error originating in a keyed cache.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The factory failed to build or rebuild a value. Nothing was cached.
    #[error("cache '{cache}' failed to construct a value")]
    Construction {
        /// The name of the cache.
        cache: String,
        /// The error reported by the factory.
        #[source]
        source: BoxError,
    },
}

impl Error {
    /// Returns the factory's error if it is of type `E`.
    #[must_use]
    pub fn factory_error<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::Construction { source, .. } => source.downcast_ref::<E>(),
        }
    }
}
