// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

/// Maximum number of entries a cache holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Capacity {
    /// At most this many entries. Zero makes the cache a pass-through that keeps nothing.
    Bounded(usize),
    /// No limit.
    #[default]
    Unlimited,
}

impl Capacity {
    /// Whether `len` entries is more than this capacity allows.
    #[must_use]
    pub const fn is_exceeded_by(self, len: usize) -> bool {
        match self {
            Self::Bounded(max) => len > max,
            Self::Unlimited => false,
        }
    }

    /// The bound as a number, or `None` when unlimited.
    #[must_use]
    pub const fn get(self) -> Option<usize> {
        match self {
            Self::Bounded(max) => Some(max),
            Self::Unlimited => None,
        }
    }
}

impl From<usize> for Capacity {
    fn from(value: usize) -> Self {
        Self::Bounded(value)
    }
}

impl From<Option<usize>> for Capacity {
    fn from(value: Option<usize>) -> Self {
        value.map_or(Self::Unlimited, Self::Bounded)
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bounded(max) => write!(f, "{max}"),
            Self::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// Settings for a [`KeyedCache`][crate::KeyedCache], for use with
/// [`KeyedCacheBuilder::options`][crate::KeyedCacheBuilder::options].
///
/// With the `serde` feature enabled this can be read from configuration; missing fields take
/// their [`Default`] values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CacheOptions {
    /// Name used in logs.
    pub name: Option<String>,
    /// Maximum number of entries.
    pub capacity: Capacity,
}
