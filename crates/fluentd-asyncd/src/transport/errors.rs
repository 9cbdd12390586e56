//! Failures of the plugin socket listener.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while binding the plugin socket or running its accept loop.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Name resolution for a TCP endpoint failed or produced nothing.
    #[error("cannot resolve plugin endpoint {host}:{port}{}", describe(.source.as_ref()))]
    Resolve {
        host: String,
        port: u16,
        source: Option<io::Error>,
    },
    #[error("cannot listen on {addr}: {source}")]
    BindTcp {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("cannot listen on {}: {source}", .path.display())]
    BindUnix {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Another process still accepts connections on the socket path.
    #[error("plugin socket {} is owned by a running process", .path.display())]
    UnixInUse { path: PathBuf },
    /// Something other than a socket occupies the path; it is never removed.
    #[error("{} exists and is not a socket", .path.display())]
    UnixNotSocket { path: PathBuf },
    #[error("cannot probe existing plugin socket {}: {source}", .path.display())]
    UnixProbe {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot remove stale plugin socket {}: {source}", .path.display())]
    UnixCleanup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot switch the plugin socket to non-blocking mode: {source}")]
    NonBlocking {
        #[source]
        source: io::Error,
    },
    #[error("cannot start the accept thread: {source}")]
    Spawn {
        #[source]
        source: io::Error,
    },
    #[error("accept thread panicked")]
    ThreadPanic,
}

fn describe(source: Option<&io::Error>) -> String {
    source.map_or_else(
        || String::from(": no addresses found"),
        |error| format!(": {error}"),
    )
}
