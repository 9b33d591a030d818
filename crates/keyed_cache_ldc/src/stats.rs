// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::ActionKind;

/// Counters kept by the producing side of a queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Actions accepted onto the queue.
    pub enqueued: u64,
    /// Actions lost because the queue was full.
    pub dropped: u64,
    /// Actions not recorded because the queue was disabled.
    pub skipped: u64,
    /// Pending actions discarded by [`LdcQueue::clear`][crate::LdcQueue::clear].
    pub cleared: u64,
    /// Actions not recorded because the [`LdcReceiver`][crate::LdcReceiver] was dropped.
    pub closed: u64,
}

/// Counters kept by the draining side of a queue.
///
/// `applied` and `failed` are totals; the per-kind fields break them down by [`ActionKind`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Actions the sink applied successfully.
    pub applied: u64,
    /// Actions the sink failed to apply.
    pub failed: u64,
    /// Outcomes of [`LdcAction::Put`][crate::LdcAction::Put] actions.
    pub puts: ActionOutcomes,
    /// Outcomes of [`LdcAction::Invalidate`][crate::LdcAction::Invalidate] actions.
    pub invalidates: ActionOutcomes,
    /// Outcomes of [`LdcAction::Clear`][crate::LdcAction::Clear] actions.
    pub clears: ActionOutcomes,
}

impl DrainStats {
    /// The outcomes recorded for one kind of action.
    #[must_use]
    pub const fn for_kind(&self, kind: ActionKind) -> ActionOutcomes {
        match kind {
            ActionKind::Put => self.puts,
            ActionKind::Invalidate => self.invalidates,
            ActionKind::Clear => self.clears,
        }
    }
}

/// Successes and failures for one kind of action.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActionOutcomes {
    /// Actions of this kind the sink applied.
    pub applied: u64,
    /// Actions of this kind the sink failed to apply.
    pub failed: u64,
}

#[derive(Debug, Default)]
pub(crate) struct QueueCounters {
    pub(crate) enqueued: AtomicU64,
    pub(crate) dropped: AtomicU64,
    pub(crate) skipped: AtomicU64,
    pub(crate) cleared: AtomicU64,
    pub(crate) closed: AtomicU64,
}

impl QueueCounters {
    pub(crate) fn snapshot(&self) -> QueueStats {
        QueueStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            cleared: self.cleared.load(Ordering::Relaxed),
            closed: self.closed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default)]
struct OutcomeCounters {
    applied: AtomicU64,
    failed: AtomicU64,
}

impl OutcomeCounters {
    fn snapshot(&self) -> ActionOutcomes {
        ActionOutcomes {
            applied: self.applied.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct DrainCounters {
    puts: OutcomeCounters,
    invalidates: OutcomeCounters,
    clears: OutcomeCounters,
}

impl DrainCounters {
    pub(crate) fn record(&self, kind: ActionKind, succeeded: bool) {
        let counters = match kind {
            ActionKind::Put => &self.puts,
            ActionKind::Invalidate => &self.invalidates,
            ActionKind::Clear => &self.clears,
        };
        bump(if succeeded { &counters.applied } else { &counters.failed });
    }

    pub(crate) fn snapshot(&self) -> DrainStats {
        let puts = self.puts.snapshot();
        let invalidates = self.invalidates.snapshot();
        let clears = self.clears.snapshot();
        DrainStats {
            applied: puts.applied + invalidates.applied + clears.applied,
            failed: puts.failed + invalidates.failed + clears.failed,
            puts,
            invalidates,
            clears,
        }
    }
}

/// Adds one to a relaxed counter.
pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_counters_total_every_kind() {
        let counters = DrainCounters::default();
        counters.record(ActionKind::Put, true);
        counters.record(ActionKind::Put, false);
        counters.record(ActionKind::Invalidate, true);
        counters.record(ActionKind::Clear, false);

        let stats = counters.snapshot();
        assert_eq!(stats.applied, 2);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.for_kind(ActionKind::Put), ActionOutcomes { applied: 1, failed: 1 });
        assert_eq!(stats.invalidates, ActionOutcomes { applied: 1, failed: 0 });
        assert_eq!(stats.clears, ActionOutcomes { applied: 0, failed: 1 });
    }
}
