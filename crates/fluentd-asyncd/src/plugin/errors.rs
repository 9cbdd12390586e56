//! Error types for plugin protocol requests.
//!
//! Each variant maps to the HTTP status returned to the engine. Failures of
//! the logging operations themselves are not errors at this layer; they are
//! reported in the `Err` field of a successful response.

use std::io;

use thiserror::Error;

/// Errors surfaced while reading, parsing or routing a plugin request.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Reading the request or writing the response failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The request head could not be parsed.
    #[error("malformed HTTP request: {message}")]
    Malformed { message: String },

    /// The client closed the connection before sending a whole request.
    #[error("incomplete HTTP request: {message}")]
    Incomplete { message: String },

    /// The request exceeds the size bound.
    #[error("request too large: {size} bytes exceeds {max_size} byte limit")]
    TooLarge { size: usize, max_size: usize },

    /// The body length was not declared up front.
    #[error("chunked request bodies are not supported; send Content-Length")]
    LengthRequired,

    /// Only `POST` is served.
    #[error("method {method} not allowed")]
    MethodNotAllowed { method: String },

    /// No handler exists for the path.
    #[error("404 page not found: {path}")]
    UnknownEndpoint { path: String },

    /// The endpoint exists but is not supported by this driver.
    #[error("{endpoint} is not implemented")]
    NotImplemented { endpoint: String },

    /// The body is not valid JSON for the endpoint.
    #[error("invalid request body: {0}")]
    InvalidBody(#[source] serde_json::Error),

    /// Encoding the response failed.
    #[error("failed to serialize response: {0}")]
    SerializeResponse(#[source] serde_json::Error),
}

impl PluginError {
    /// Creates a malformed request error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates an incomplete request error.
    pub fn incomplete(message: impl Into<String>) -> Self {
        Self::Incomplete {
            message: message.into(),
        }
    }

    /// HTTP status code reported for this error.
    pub fn status(&self) -> u16 {
        match self {
            Self::Malformed { .. } | Self::Incomplete { .. } | Self::InvalidBody(_) => 400,
            Self::UnknownEndpoint { .. } => 404,
            Self::MethodNotAllowed { .. } => 405,
            Self::LengthRequired => 411,
            Self::TooLarge { .. } => 413,
            Self::NotImplemented { .. } => 501,
            Self::Io(_) | Self::SerializeResponse(_) => 500,
        }
    }
}
