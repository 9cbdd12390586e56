//! Errors raised by delivery clients.

use std::io;

use thiserror::Error;

/// Failures surfaced by [`super::Delivery`] implementations.
///
/// `post` only ever returns [`Self::BufferFull`], [`Self::Closed`] or
/// [`Self::Encode`]; the network variants are produced by the worker thread
/// and logged there.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Accepting the event would exceed the buffer limit.
    #[error("delivery buffer full: {pending} of {limit} bytes pending, event needs {needed}")]
    BufferFull {
        limit: usize,
        pending: usize,
        needed: usize,
    },

    /// The client no longer accepts events.
    #[error("delivery client is closed")]
    Closed,

    /// The event could not be encoded.
    #[error("failed to encode event: {message}")]
    Encode { message: String },

    /// Connecting to the collector failed.
    #[error("failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },

    /// Writing to the collector failed.
    #[error("failed to send event: {source}")]
    Write {
        #[source]
        source: io::Error,
    },

    /// The collector did not acknowledge the chunk.
    #[error("acknowledgement failed: {message}")]
    Ack { message: String },

    /// The worker thread could not be started.
    #[error("failed to spawn delivery worker: {source}")]
    Spawn {
        #[source]
        source: io::Error,
    },

    /// The worker thread panicked.
    #[error("delivery worker panicked")]
    WorkerPanicked,
}

impl DeliveryError {
    /// Creates an encoding error.
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Creates an acknowledgement error.
    pub fn ack(message: impl Into<String>) -> Self {
        Self::Ack {
            message: message.into(),
        }
    }
}
