// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use async_channel::{Receiver, RecvError};

use crate::queue::Shared;
use crate::{ActionKind, BoxError, DrainStats, Error, LdcAction, Result};

/// Applies local disk cache actions to durable storage.
///
/// Implemented for any `FnMut(&LdcAction<K>) -> Result<(), BoxError>` closure.
pub trait LdcSink<K> {
    /// Applies one action.
    ///
    /// # Errors
    ///
    /// Returns an error if the action could not be applied. The failure is counted and logged by
    /// the caller; the action is not retried.
    fn apply(&mut self, action: &LdcAction<K>) -> std::result::Result<(), BoxError>;
}

impl<K, F> LdcSink<K> for F
where
    F: FnMut(&LdcAction<K>) -> std::result::Result<(), BoxError>,
{
    fn apply(&mut self, action: &LdcAction<K>) -> std::result::Result<(), BoxError> {
        self(action)
    }
}

/// The draining end of a local disk cache action queue.
///
/// Actions come out in the order they were enqueued.
pub struct LdcReceiver<K> {
    receiver: Receiver<LdcAction<K>>,
    shared: Arc<Shared>,
}

impl<K> LdcReceiver<K> {
    pub(crate) const fn new(receiver: Receiver<LdcAction<K>>, shared: Arc<Shared>) -> Self {
        Self { receiver, shared }
    }

    /// Takes the next action if one is pending.
    #[must_use]
    pub fn try_recv(&self) -> Option<LdcAction<K>> {
        let action = self.receiver.try_recv().ok()?;
        self.log_pop(&action);
        Some(action)
    }

    /// Waits for the next action, blocking the current thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] once every [`LdcQueue`][crate::LdcQueue] is dropped and no
    /// actions remain.
    pub fn recv_blocking(&self) -> Result<LdcAction<K>> {
        let action = self.receiver.recv_blocking().map_err(|RecvError| Error::Closed)?;
        self.log_pop(&action);
        Ok(action)
    }

    /// Waits for the next action.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] once every [`LdcQueue`][crate::LdcQueue] is dropped and no
    /// actions remain.
    pub async fn recv(&self) -> Result<LdcAction<K>>
    where
        K: Send,
    {
        let action = self.receiver.recv().await.map_err(|RecvError| Error::Closed)?;
        self.log_pop(&action);
        Ok(action)
    }

    /// Applies pending actions to `sink` without waiting for more.
    ///
    /// At most `max_per_cycle` actions are taken; zero means no limit. Sink failures are counted
    /// in [`DrainStats`] and logged, and draining continues with the next action.
    ///
    /// Returns the number of actions taken from the queue.
    pub fn drain<S>(&self, sink: &mut S, max_per_cycle: usize) -> usize
    where
        S: LdcSink<K> + ?Sized,
    {
        let mut taken: usize = 0;
        while max_per_cycle == 0 || taken < max_per_cycle {
            let Some(action) = self.try_recv() else {
                break;
            };
            taken += 1;
            // Failures are already counted and logged.
            let _ = self.apply(sink, &action);
        }

        if taken > 0 {
            tracing::debug!(
                ldc.queue = &*self.shared.name,
                ldc.taken = taken,
                ldc.pending = self.receiver.len(),
                "ldc.drain_cycle"
            );
        }

        taken
    }

    /// Applies one action to `sink`, recording the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sink`] if the sink failed. The failure is also counted and logged, and
    /// with [`LdcOptions::disable_on_sink_failure`][crate::LdcOptions::disable_on_sink_failure] a
    /// failed put or clear turns the queue off.
    pub fn apply<S>(&self, sink: &mut S, action: &LdcAction<K>) -> Result<()>
    where
        S: LdcSink<K> + ?Sized,
    {
        let kind = action.kind();
        let Err(source) = sink.apply(action) else {
            self.shared.drain.record(kind, true);
            return Ok(());
        };

        self.shared.drain.record(kind, false);
        let error = Error::Sink { action: kind, source };
        tracing::warn!(
            ldc.queue = &*self.shared.name,
            error = &error as &dyn std::error::Error,
            "ldc.sink_failed"
        );

        let disables = self.shared.disable_on_sink_failure && kind != ActionKind::Invalidate;
        if disables && self.shared.enabled.swap(false, Ordering::Relaxed) {
            tracing::warn!(ldc.queue = &*self.shared.name, ldc.action = kind.as_str(), "ldc.disabled_after_failure");
        }

        Err(error)
    }

    /// Number of actions waiting to be drained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Whether no actions are waiting to be drained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Whether every producer has been dropped. Pending actions may still be received.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.receiver.sender_count() == 0
    }

    /// A snapshot of the drain-side counters.
    #[must_use]
    pub fn stats(&self) -> DrainStats {
        self.shared.drain.snapshot()
    }

    fn log_pop(&self, action: &LdcAction<K>) {
        if self.shared.log_activity {
            tracing::trace!(
                ldc.queue = &*self.shared.name,
                ldc.action = action.kind().as_str(),
                ldc.pending = self.receiver.len(),
                "ldc.pop"
            );
        }
    }
}

impl<K> Drop for LdcReceiver<K> {
    fn drop(&mut self) {
        self.shared.receiver_alive.store(false, Ordering::Release);
        tracing::debug!(ldc.queue = &*self.shared.name, ldc.pending = self.receiver.len(), "ldc.receiver_dropped");
    }
}

impl<K> fmt::Debug for LdcReceiver<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdcReceiver")
            .field("name", &self.shared.name)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
