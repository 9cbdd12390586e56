//! Bounded HTTP/1.1 request reader for the plugin protocol.
//!
//! The engine sends one `POST` with a JSON body per connection. The head is
//! parsed with `httparse` as bytes arrive; the body length must be declared
//! with `Content-Length`.

use std::io::{self, Read};

use super::errors::PluginError;

/// Upper bound on head plus body.
pub(crate) const MAX_REQUEST_BYTES: usize = 64 * 1024;
const MAX_HEADERS: usize = 32;

/// One parsed plugin request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginRequest {
    /// Request method, e.g. `POST`.
    pub method: String,
    /// Request path without any query string.
    pub path: String,
    /// Raw body bytes.
    pub body: Vec<u8>,
}

struct RequestHead {
    method: String,
    path: String,
    head_len: usize,
    content_length: usize,
}

impl PluginRequest {
    /// Reads one request from `reader`.
    ///
    /// Returns `Ok(None)` when the client disconnects without sending data.
    pub fn read_from(reader: &mut impl Read) -> Result<Option<Self>, PluginError> {
        let mut buffer = Vec::with_capacity(1024);
        let mut chunk = [0_u8; 4096];

        loop {
            let read = read_with_retry(reader, &mut chunk)?;
            if read == 0 {
                if buffer.is_empty() {
                    return Ok(None);
                }
                return Err(PluginError::incomplete("connection closed inside the request head"));
            }
            buffer.extend_from_slice(chunk.get(..read).unwrap_or_default());
            enforce_limit(buffer.len())?;

            if let Some(head) = parse_head(&buffer)? {
                return read_body(reader, &buffer, head).map(Some);
            }
        }
    }
}

fn parse_head(buffer: &[u8]) -> Result<Option<RequestHead>, PluginError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut request = httparse::Request::new(&mut headers);
    let status = request
        .parse(buffer)
        .map_err(|error| PluginError::malformed(error.to_string()))?;
    let httparse::Status::Complete(head_len) = status else {
        return Ok(None);
    };

    let mut content_length = 0;
    for header in request.headers.iter() {
        if header.name.eq_ignore_ascii_case("Transfer-Encoding") {
            if String::from_utf8_lossy(header.value)
                .to_ascii_lowercase()
                .contains("chunked")
            {
                return Err(PluginError::LengthRequired);
            }
        } else if header.name.eq_ignore_ascii_case("Content-Length") {
            content_length = std::str::from_utf8(header.value)
                .ok()
                .and_then(|value| value.trim().parse::<usize>().ok())
                .ok_or_else(|| PluginError::malformed("invalid Content-Length header"))?;
        }
    }

    let path = request.path.unwrap_or_default();
    Ok(Some(RequestHead {
        method: request.method.unwrap_or_default().to_owned(),
        path: path.split('?').next().unwrap_or_default().to_owned(),
        head_len,
        content_length,
    }))
}

fn read_body(
    reader: &mut impl Read,
    buffer: &[u8],
    head: RequestHead,
) -> Result<PluginRequest, PluginError> {
    enforce_limit(head.head_len.saturating_add(head.content_length))?;

    let mut body = buffer.get(head.head_len..).unwrap_or_default().to_vec();
    let mut chunk = [0_u8; 4096];
    while body.len() < head.content_length {
        let read = read_with_retry(reader, &mut chunk)?;
        if read == 0 {
            return Err(PluginError::incomplete(format!(
                "body ended after {} of {} bytes",
                body.len(),
                head.content_length
            )));
        }
        body.extend_from_slice(chunk.get(..read).unwrap_or_default());
    }
    body.truncate(head.content_length);

    Ok(PluginRequest {
        method: head.method,
        path: head.path,
        body,
    })
}

fn read_with_retry(reader: &mut impl Read, chunk: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(chunk) {
            Ok(read) => return Ok(read),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(error),
        }
    }
}

fn enforce_limit(size: usize) -> Result<(), PluginError> {
    if size > MAX_REQUEST_BYTES {
        return Err(PluginError::TooLarge {
            size,
            max_size: MAX_REQUEST_BYTES,
        });
    }
    Ok(())
}
