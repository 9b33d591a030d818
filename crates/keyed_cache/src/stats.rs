// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// Monotonic counters describing what a cache has done since it was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CacheStats {
    /// Values published, by construction or by `put`.
    pub updates: u64,
    /// Calls to `clear` and `flush`.
    pub flushes: u64,
    /// Real values removed by explicit invalidation.
    pub deletes: u64,
    /// Entries added to the recency list.
    pub rows_added: u64,
    /// Entries removed from the recency list for any reason.
    pub rows_removed: u64,
    /// Time spent in successful factory construction.
    pub cpu_time: Duration,
}
