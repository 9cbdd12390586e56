//! Error types for session start and stop.
//!
//! Every variant classifies into an [`ErrorKind`] so the plugin host can
//! report failures without inspecting their detail.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::delivery::DeliveryError;
use crate::metadata::MetadataError;
use crate::policy::PolicyError;

/// Coarse classification of session failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed options, address or container metadata.
    InvalidParameter,
    /// The stream is already being forwarded.
    AlreadyExists,
    /// A required identifier was empty.
    MissingField,
    /// Resource or bookkeeping failure inside the daemon.
    Internal,
}

/// Errors surfaced by the session registry.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A required identifier was empty.
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    /// A session for the stream is already registered.
    #[error("logger for {stream} already exists")]
    AlreadyExists { stream: String },

    /// Delivery options failed to resolve.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// Tag or extra attributes could not be derived.
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// The delivery client could not be created.
    #[error("failed to create delivery client: {0}")]
    Delivery(#[source] DeliveryError),

    /// The log stream could not be opened.
    #[error("failed to open log stream {path}: {source}")]
    OpenStream {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The forwarding thread could not be started.
    #[error("failed to spawn forwarder for {stream}: {source}")]
    Spawn {
        stream: String,
        #[source]
        source: io::Error,
    },

    /// Internal bookkeeping failure (e.g., lock poisoned).
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl SessionError {
    /// Creates a missing field error.
    pub fn missing_field(field: &'static str) -> Self {
        Self::MissingField { field }
    }

    /// Creates a duplicate session error.
    pub fn already_exists(stream: impl Into<String>) -> Self {
        Self::AlreadyExists {
            stream: stream.into(),
        }
    }

    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingField { .. } => ErrorKind::MissingField,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::Policy(_) | Self::Metadata(_) => ErrorKind::InvalidParameter,
            Self::Delivery(_)
            | Self::OpenStream { .. }
            | Self::Spawn { .. }
            | Self::Internal { .. } => ErrorKind::Internal,
        }
    }
}
