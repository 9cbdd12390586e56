//! HTTP responses written back to the engine.

use std::io::{self, Write};

use serde::Serialize;

use super::errors::PluginError;

/// Media type of every JSON plugin response.
pub const PLUGIN_CONTENT_TYPE: &str = "application/vnd.docker.plugins.v1+json";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Status line, content type and body of one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Value of the `Content-Type` header.
    pub content_type: &'static str,
    /// Body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// `200 OK` with `payload` encoded as plugin JSON.
    pub fn json<T: Serialize>(payload: &T) -> Result<Self, PluginError> {
        let body = serde_json::to_vec(payload).map_err(PluginError::SerializeResponse)?;
        Ok(Self {
            status: 200,
            content_type: PLUGIN_CONTENT_TYPE,
            body,
        })
    }

    /// Plain-text response describing `error`.
    pub fn from_error(error: &PluginError) -> Self {
        Self {
            status: error.status(),
            content_type: TEXT_CONTENT_TYPE,
            body: format!("{error}\n").into_bytes(),
        }
    }

    /// Writes the response; the connection is closed afterwards.
    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        write!(
            writer,
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            self.status,
            reason_phrase(self.status),
            self.content_type,
            self.body.len()
        )?;
        writer.write_all(&self.body)?;
        writer.flush()
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        411 => "Length Required",
        413 => "Payload Too Large",
        501 => "Not Implemented",
        _ => "Internal Server Error",
    }
}
