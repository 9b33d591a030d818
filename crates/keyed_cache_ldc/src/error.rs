// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

use crate::ActionKind;

/// A boxed error as produced by an [`LdcSink`][crate::LdcSink].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A specialized `Result` type for local disk cache queue operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An error originating in the local disk cache queue.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Every [`LdcQueue`][crate::LdcQueue] handle was dropped and no actions remain.
    #[error("ldc action queue is closed")]
    Closed,

    /// The sink could not apply an action to durable storage.
    #[error("ldc sink failed to apply a {action} action")]
    Sink {
        /// The kind of action that failed.
        action: ActionKind,
        /// The error reported by the sink.
        #[source]
        source: BoxError,
    },
}
