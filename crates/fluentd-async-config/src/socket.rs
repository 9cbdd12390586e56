use std::fmt;
use std::fs::DirBuilder;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Permissions of a directory created for a Unix plugin socket.
const SOCKET_DIRECTORY_MODE: u32 = 0o700;

/// Endpoint on which the plugin host serves the logging-driver protocol.
///
/// Endpoints are written as URLs (`unix:///run/docker/plugins/x.sock` or
/// `tcp://127.0.0.1:9000`) in every configuration layer, so the serde
/// representation is the same string accepted by [`FromStr`].
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub enum SocketEndpoint {
    /// Unix domain socket endpoint.
    Unix { path: Utf8PathBuf },
    /// TCP socket endpoint.
    Tcp { host: String, port: u16 },
}

impl SocketEndpoint {
    /// Builds a Unix domain socket endpoint.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// Builds a TCP socket endpoint.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Returns the Unix socket path when the endpoint uses the Unix transport.
    #[must_use]
    pub fn unix_path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Unix { path } => Some(path.as_ref()),
            Self::Tcp { .. } => None,
        }
    }

    /// Creates the directory holding a Unix socket, owner-only, if it is
    /// missing. TCP endpoints need nothing.
    pub fn prepare_filesystem(&self) -> Result<(), SocketPreparationError> {
        let Some(path) = self.unix_path() else {
            return Ok(());
        };
        let parent = match path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => {
                return Err(SocketPreparationError::MissingParent {
                    path: path.to_path_buf(),
                });
            }
        };

        match DirBuilder::new()
            .recursive(true)
            .mode(SOCKET_DIRECTORY_MODE)
            .create(parent.as_std_path())
        {
            Err(source) if source.kind() != io::ErrorKind::AlreadyExists => {
                Err(SocketPreparationError::CreateDirectory {
                    path: parent.to_path_buf(),
                    source,
                })
            }
            _ => Ok(()),
        }
    }

    fn from_url(input: &str, url: &Url) -> Result<Self, SocketParseError> {
        match url.scheme() {
            "unix" if url.path().is_empty() => {
                Err(SocketParseError::MissingUnixPath(input.to_owned()))
            }
            "unix" => Ok(Self::unix(url.path())),
            "tcp" => {
                let host = url
                    .host_str()
                    .ok_or_else(|| SocketParseError::MissingHost(input.to_owned()))?;
                let port = url
                    .port()
                    .ok_or_else(|| SocketParseError::MissingPort(input.to_owned()))?;
                Ok(Self::tcp(host, port))
            }
            other => Err(SocketParseError::UnsupportedScheme(other.to_owned())),
        }
    }
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(formatter, "tcp://{host}:{port}"),
            Self::Unix { path } => write!(formatter, "unix://{path}"),
        }
    }
}

impl FromStr for SocketEndpoint {
    type Err = SocketParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::from_url(input, &Url::parse(input)?)
    }
}

impl TryFrom<String> for SocketEndpoint {
    type Error = SocketParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SocketEndpoint> for String {
    fn from(endpoint: SocketEndpoint) -> Self {
        endpoint.to_string()
    }
}

/// Errors raised while parsing a [`SocketEndpoint`] URL.
#[derive(Debug, Error)]
pub enum SocketParseError {
    /// Only `unix` and `tcp` are served.
    #[error("plugin socket scheme '{0}' is not supported; use unix:// or tcp://")]
    UnsupportedScheme(String),
    #[error("plugin socket '{0}' names no TCP host")]
    MissingHost(String),
    #[error("plugin socket '{0}' names no TCP port")]
    MissingPort(String),
    #[error("plugin socket '{0}' names no Unix socket path")]
    MissingUnixPath(String),
    /// The text is not a URL at all.
    #[error("plugin socket is not a URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Errors raised while creating the socket directory.
#[derive(Debug, Error)]
pub enum SocketPreparationError {
    /// A bare file name leaves no directory to create.
    #[error("plugin socket '{path}' has no parent directory")]
    MissingParent { path: Utf8PathBuf },
    #[error("cannot create plugin socket directory '{path}': {source}")]
    CreateDirectory {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn display_unix_socket() {
        let endpoint = SocketEndpoint::unix(Utf8PathBuf::from("/run/docker/plugins/fluentd.sock"));
        assert_eq!(
            endpoint.to_string(),
            "unix:///run/docker/plugins/fluentd.sock"
        );
    }

    #[test]
    fn parse_tcp_socket() {
        let endpoint: SocketEndpoint = "tcp://127.0.0.1:9000".parse().expect("parse tcp");
        assert!(matches!(endpoint, SocketEndpoint::Tcp { port: 9000, .. }));
    }

    #[rstest]
    #[case("udp://127.0.0.1:9000")]
    #[case("tcp://127.0.0.1")]
    #[case("unix://")]
    #[case("not a url")]
    fn rejects_unusable_endpoints(#[case] input: &str) {
        assert!(input.parse::<SocketEndpoint>().is_err(), "{input} parsed");
    }

    #[test]
    fn serde_uses_url_form() {
        let endpoint = SocketEndpoint::tcp("localhost", 7000);
        let encoded: String = endpoint.clone().into();
        assert_eq!(encoded, "tcp://localhost:7000");
        let decoded = SocketEndpoint::try_from(encoded).expect("round trip");
        assert_eq!(decoded, endpoint);
    }

    #[test]
    fn prepare_filesystem_creates_parent() {
        let dir = tempfile::tempdir().expect("temp dir");
        let socket = dir.path().join("plugins").join("fluentd-async.sock");
        let endpoint = SocketEndpoint::unix(socket.to_str().expect("utf8 path"));
        endpoint.prepare_filesystem().expect("prepare socket directory");
        assert!(dir.path().join("plugins").is_dir());
    }

    #[test]
    fn prepare_filesystem_rejects_bare_file_name() {
        let endpoint = SocketEndpoint::unix("fluentd-async.sock");
        let error = endpoint
            .prepare_filesystem()
            .expect_err("bare socket names have no parent");
        assert!(matches!(error, SocketPreparationError::MissingParent { .. }));
    }
}
