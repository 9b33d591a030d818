// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Actions recorded for the local disk cache.

/// A single cache mutation to be mirrored into the local disk cache.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LdcAction<K> {
    /// A value for `key` was published and should be written to disk.
    Put {
        /// The key whose value was published.
        key: K,
        /// The value replaced a stale one that was rebuilt.
        is_recovered: bool,
    },

    /// The value for `key` left the cache and should be removed from disk.
    Invalidate {
        /// The key that left the cache.
        key: K,
        /// The value that left the cache no longer validated.
        was_stale: bool,
        /// The invalidation was requested by the disk cache subsystem itself.
        is_from_ldc: bool,
    },

    /// The whole cache was cleared.
    Clear,
}

impl<K> LdcAction<K> {
    /// Returns the key this action applies to, or `None` for [`LdcAction::Clear`].
    #[must_use]
    pub const fn key(&self) -> Option<&K> {
        match self {
            Self::Put { key, .. } | Self::Invalidate { key, .. } => Some(key),
            Self::Clear => None,
        }
    }

    /// Returns the kind of this action.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::Put { .. } => ActionKind::Put,
            Self::Invalidate { .. } => ActionKind::Invalidate,
            Self::Clear => ActionKind::Clear,
        }
    }
}

/// The kind of an [`LdcAction`], without its payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// See [`LdcAction::Put`].
    Put,
    /// See [`LdcAction::Invalidate`].
    Invalidate,
    /// See [`LdcAction::Clear`].
    Clear,
}

impl ActionKind {
    /// Returns a stable lowercase name, used as a log field value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Put => "put",
            Self::Invalidate => "invalidate",
            Self::Clear => "clear",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
