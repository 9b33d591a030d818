// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(docsrs, feature(doc_cfg))]

//! Non-blocking action queue that mirrors keyed cache mutations into a local disk cache (LDC).
//!
//! An in-memory cache is the source of truth; the local disk cache is a best-effort,
//! eventually-consistent mirror used for warm restarts. This crate decouples the two: the cache
//! records every mutation as an [`LdcAction`] on an [`LdcQueue`] from inside its own critical
//! section, and an external drain loop later applies those actions to durable storage through an
//! [`LdcSink`].
//!
//! # Guarantees
//!
//! - Enqueueing is O(1) and never blocks. When a bounded queue is full the action is dropped and
//!   counted in [`QueueStats::dropped`]; the caller is never told.
//! - Actions for the same key are delivered in the order they were enqueued.
//! - Sink failures are counted per action kind in [`DrainStats`] and logged. They never roll back
//!   or otherwise reach the cache. With [`LdcOptions::disable_on_sink_failure`] a failed put or
//!   clear turns the queue off.
//! - Dropping the [`LdcReceiver`] closes the queue. Later actions are counted in
//!   [`QueueStats::closed`] rather than as drops.
//!
//! # Example
//!
//! ```
//! use keyed_cache_ldc::{ActionKind, LdcAction, LdcOptions, channel};
//!
//! let (queue, receiver) = channel::<&str>("fares", &LdcOptions::default());
//!
//! queue.queue_put("LON-NYC", false);
//! queue.queue_invalidate("PAR-ROM", false, false);
//! assert_eq!(queue.len(), 2);
//!
//! let mut seen = Vec::new();
//! let applied = receiver.drain(
//!     &mut |action: &LdcAction<&str>| -> Result<(), keyed_cache_ldc::BoxError> {
//!         seen.push(action.kind());
//!         Ok(())
//!     },
//!     0,
//! );
//!
//! assert_eq!(applied, 2);
//! assert_eq!(seen, [ActionKind::Put, ActionKind::Invalidate]);
//! assert!(queue.is_empty());
//! ```
//!
//! # Operational controls
//!
//! A queue can be switched off with [`LdcQueue::set_enabled`], after which enqueue calls are
//! counted as skipped. [`LdcQueue::clear`] discards pending work and
//! [`LdcQueue::wait_until_drained`] blocks start-up until the drain loop has caught up.

mod action;
mod error;
mod options;
mod queue;
mod receiver;
mod stats;

pub use action::{ActionKind, LdcAction};
pub use error::{BoxError, Error, Result};
pub use options::{DEFAULT_QUEUE_CAPACITY, LdcOptions};
pub use queue::{LdcQueue, channel};
pub use receiver::{LdcReceiver, LdcSink};
pub use stats::{ActionOutcomes, DrainStats, QueueStats};
