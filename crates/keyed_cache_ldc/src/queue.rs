// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_channel::{Receiver, Sender, TryRecvError, TrySendError};

use crate::stats::{DrainCounters, QueueCounters, bump};
use crate::{ActionKind, LdcAction, LdcOptions, LdcReceiver, QueueStats};

/// How often [`LdcQueue::wait_until_drained`] re-checks the queue length.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// After the first lost action, a warning is logged once per this many further losses.
const DROP_WARNING_INTERVAL: u64 = 1024;

/// State shared between the producing and draining ends of one queue.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) name: Arc<str>,
    pub(crate) enabled: AtomicBool,
    pub(crate) log_activity: bool,
    pub(crate) disable_on_sink_failure: bool,
    // Cleared when the `LdcReceiver` is dropped.
    pub(crate) receiver_alive: AtomicBool,
    pub(crate) queue: QueueCounters,
    pub(crate) drain: DrainCounters,
}

/// Creates a local disk cache action queue.
///
/// The [`LdcQueue`] is handed to the cache that records mutations; it is cheap to clone. The
/// [`LdcReceiver`] is owned by whatever loop applies the actions to durable storage.
///
/// # Example
///
/// ```
/// use keyed_cache_ldc::{LdcOptions, channel};
///
/// let (queue, receiver) = channel::<u64>("quotes", &LdcOptions::unbounded());
/// queue.queue_clear();
///
/// assert!(receiver.try_recv().is_some());
/// assert!(receiver.try_recv().is_none());
/// ```
#[must_use]
pub fn channel<K>(name: impl Into<Arc<str>>, options: &LdcOptions) -> (LdcQueue<K>, LdcReceiver<K>) {
    let (sender, receiver) = match options.capacity {
        Some(capacity) => async_channel::bounded(capacity.max(1)),
        None => async_channel::unbounded(),
    };

    let shared = Arc::new(Shared {
        name: name.into(),
        enabled: AtomicBool::new(options.enabled),
        log_activity: options.log_activity,
        disable_on_sink_failure: options.disable_on_sink_failure,
        receiver_alive: AtomicBool::new(true),
        queue: QueueCounters::default(),
        drain: DrainCounters::default(),
    });

    let queue = LdcQueue {
        sender,
        pending: receiver.clone(),
        shared: Arc::clone(&shared),
    };

    (queue, LdcReceiver::new(receiver, shared))
}

/// The producing end of a local disk cache action queue.
///
/// Every enqueue operation is O(1), never blocks and never fails. Actions that cannot be accepted
/// are counted in [`QueueStats`] instead.
pub struct LdcQueue<K> {
    sender: Sender<LdcAction<K>>,
    // Lets the producer discard pending work without involving the drain loop.
    pending: Receiver<LdcAction<K>>,
    shared: Arc<Shared>,
}

impl<K> LdcQueue<K> {
    /// Records that a value for `key` was published.
    pub fn queue_put(&self, key: K, is_recovered: bool) {
        self.push(LdcAction::Put { key, is_recovered });
    }

    /// Records that the value for `key` left the cache.
    pub fn queue_invalidate(&self, key: K, was_stale: bool, is_from_ldc: bool) {
        self.push(LdcAction::Invalidate {
            key,
            was_stale,
            is_from_ldc,
        });
    }

    /// Records that the whole cache was cleared.
    pub fn queue_clear(&self) {
        self.push(LdcAction::Clear);
    }

    /// The name given to this queue when it was created.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Number of actions waiting to be drained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sender.len()
    }

    /// Whether no actions are waiting to be drained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }

    /// Maximum number of pending actions, or `None` if the queue is unbounded.
    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        self.sender.capacity()
    }

    /// Discards every pending action and returns how many were discarded.
    pub fn clear(&self) -> usize {
        let mut discarded: usize = 0;
        loop {
            match self.pending.try_recv() {
                Ok(_) => discarded += 1,
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }

        self.shared.queue.cleared.fetch_add(discarded as u64, Ordering::Relaxed);
        tracing::debug!(ldc.queue = &*self.shared.name, ldc.discarded = discarded, "ldc.cleared");
        discarded
    }

    /// Turns recording on or off. While off, enqueue calls are counted as skipped.
    pub fn set_enabled(&self, enabled: bool) {
        let was_enabled = self.shared.enabled.swap(enabled, Ordering::Relaxed);
        if was_enabled != enabled {
            tracing::info!(ldc.queue = &*self.shared.name, ldc.enabled = enabled, "ldc.enabled_changed");
        }
    }

    /// Whether actions are currently being recorded.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Relaxed)
    }

    /// Whether the [`LdcReceiver`] has been dropped. A closed queue records nothing.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        !self.shared.receiver_alive.load(Ordering::Acquire)
    }

    /// A snapshot of the producer-side counters.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        self.shared.queue.snapshot()
    }

    /// Blocks until the drain loop has emptied the queue, or until `timeout` elapses.
    ///
    /// Progress is logged each time the number of pending actions halves. Returns `true` if the
    /// queue was observed empty, and `false` on timeout or once the [`LdcReceiver`] is dropped.
    pub fn wait_until_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut pending = self.len();
        if pending == 0 {
            return true;
        }

        tracing::info!(ldc.queue = &*self.shared.name, ldc.pending = pending, "ldc.waiting_for_drain");
        let mut next_report = pending / 2;

        loop {
            let now = Instant::now();
            let mut sleep_for = DRAIN_POLL_INTERVAL;
            if let Some(deadline) = deadline {
                let Some(remaining) = deadline.checked_duration_since(now).filter(|d| !d.is_zero()) else {
                    tracing::warn!(ldc.queue = &*self.shared.name, ldc.pending = pending, "ldc.drain_wait_timed_out");
                    return false;
                };
                sleep_for = sleep_for.min(remaining);
            }

            std::thread::sleep(sleep_for);

            pending = self.len();
            if pending == 0 {
                tracing::info!(ldc.queue = &*self.shared.name, "ldc.drained");
                return true;
            }

            if self.is_closed() {
                tracing::warn!(ldc.queue = &*self.shared.name, ldc.pending = pending, "ldc.drain_wait_abandoned");
                return false;
            }

            if pending <= next_report {
                tracing::info!(ldc.queue = &*self.shared.name, ldc.pending = pending, "ldc.waiting_for_drain");
                next_report = pending / 2;
            }
        }
    }

    fn push(&self, action: LdcAction<K>) {
        let shared = &*self.shared;
        if !shared.enabled.load(Ordering::Relaxed) {
            bump(&shared.queue.skipped);
            return;
        }

        let kind = action.kind();
        if !shared.receiver_alive.load(Ordering::Acquire) {
            self.record_closed(kind);
            return;
        }

        match self.sender.try_send(action) {
            Ok(()) => {
                bump(&shared.queue.enqueued);
                if shared.log_activity {
                    tracing::trace!(
                        ldc.queue = &*shared.name,
                        ldc.action = kind.as_str(),
                        ldc.pending = self.sender.len(),
                        "ldc.push"
                    );
                }
            }
            Err(TrySendError::Closed(_)) => self.record_closed(kind),
            Err(TrySendError::Full(_)) => {
                let dropped = shared.queue.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped % DROP_WARNING_INTERVAL == 0 {
                    tracing::warn!(
                        ldc.queue = &*shared.name,
                        ldc.action = kind.as_str(),
                        ldc.dropped = dropped,
                        "ldc.queue_full"
                    );
                }
            }
        }
    }

    fn record_closed(&self, kind: ActionKind) {
        let closed = self.shared.queue.closed.fetch_add(1, Ordering::Relaxed) + 1;
        if closed == 1 || closed % DROP_WARNING_INTERVAL == 0 {
            tracing::warn!(
                ldc.queue = &*self.shared.name,
                ldc.action = kind.as_str(),
                ldc.closed = closed,
                "ldc.queue_closed"
            );
        }
    }
}

impl<K> Clone for LdcQueue<K> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            pending: self.pending.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K> fmt::Debug for LdcQueue<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdcQueue")
            .field("name", &self.shared.name)
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("enabled", &self.is_enabled())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_is_treated_as_one() {
        let options = LdcOptions {
            capacity: Some(0),
            ..LdcOptions::default()
        };
        let (queue, _receiver) = channel::<u8>("tiny", &options);

        assert_eq!(queue.capacity(), Some(1));
        queue.queue_put(1, false);
        queue.queue_put(2, false);

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.stats().dropped, 1);
    }

    #[test]
    fn disabled_queue_skips() {
        let (queue, receiver) = channel::<u8>("off", &LdcOptions::disabled());
        queue.queue_put(1, false);
        queue.queue_clear();

        assert!(queue.is_empty());
        assert_eq!(queue.stats().skipped, 2);
        assert!(receiver.try_recv().is_none());

        queue.set_enabled(true);
        queue.queue_put(1, false);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn debug_output_names_queue() {
        let (queue, _receiver) = channel::<u8>("named", &LdcOptions::default());
        let output = format!("{queue:?}");
        assert!(output.contains("named"), "{output}");
    }

    #[test]
    fn wait_returns_immediately_when_empty() {
        let (queue, _receiver) = channel::<u8>("idle", &LdcOptions::default());
        assert!(queue.wait_until_drained(Duration::ZERO));
    }

    #[test]
    fn wait_times_out_without_a_drainer() {
        let (queue, _receiver) = channel::<u8>("stuck", &LdcOptions::default());
        queue.queue_put(1, false);

        assert!(!queue.wait_until_drained(Duration::from_millis(20)));
    }
}
