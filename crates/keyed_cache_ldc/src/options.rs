// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Default number of pending actions a queue holds before it starts dropping.
pub const DEFAULT_QUEUE_CAPACITY: usize = 65_536;

/// Settings for a local disk cache action queue.
///
/// With the `serde` feature enabled this can be read from configuration; missing fields take
/// their [`Default`] values.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LdcOptions {
    /// Maximum number of pending actions, or `None` for an unbounded queue.
    ///
    /// A capacity of zero is treated as one.
    pub capacity: Option<usize>,

    /// Whether actions are recorded at all. A disabled queue counts enqueue calls as skipped.
    pub enabled: bool,

    /// Emits a `trace` event for every action pushed and popped. Noisy; meant for development.
    pub log_activity: bool,

    /// Turns the queue off when the sink fails to apply a put or a clear.
    ///
    /// The queue stays off until [`LdcQueue::set_enabled`][crate::LdcQueue::set_enabled] turns it
    /// back on. Failed invalidations leave the queue enabled.
    pub disable_on_sink_failure: bool,
}

impl LdcOptions {
    /// Options for an enabled queue without a capacity bound.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            capacity: None,
            enabled: true,
            log_activity: false,
            disable_on_sink_failure: false,
        }
    }

    /// Options for a queue that records nothing until enabled.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            capacity: Some(DEFAULT_QUEUE_CAPACITY),
            enabled: false,
            log_activity: false,
            disable_on_sink_failure: false,
        }
    }
}

impl Default for LdcOptions {
    fn default() -> Self {
        Self {
            capacity: Some(DEFAULT_QUEUE_CAPACITY),
            enabled: true,
            log_activity: false,
            disable_on_sink_failure: false,
        }
    }
}
