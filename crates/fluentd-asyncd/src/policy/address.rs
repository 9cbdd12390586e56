//! Collector address parsing.

use std::fmt;
use std::path::PathBuf;

use url::Url;

use super::errors::PolicyError;

/// Host used when no address is configured.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Forward-protocol port used when an address omits one.
pub const DEFAULT_PORT: u16 = 24224;

const TRANSPORT_PREFIXES: [&str; 5] = ["tcp://", "tcp+tls://", "udp://", "unix://", "unixgram://"];

/// Network target of a delivery client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Stream socket over TCP.
    Tcp { host: String, port: u16 },
    /// Datagram socket over UDP.
    Udp { host: String, port: u16 },
    /// Unix domain stream socket.
    Unix { path: PathBuf },
    /// Unix domain datagram socket.
    Unixgram { path: PathBuf },
}

impl Target {
    /// Scheme name as written in `fluentd-address`.
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Tcp { .. } => "tcp",
            Self::Udp { .. } => "udp",
            Self::Unix { .. } => "unix",
            Self::Unixgram { .. } => "unixgram",
        }
    }

    /// Datagram targets carry one event per packet and never acknowledge.
    #[must_use]
    pub fn is_datagram(&self) -> bool {
        matches!(self, Self::Udp { .. } | Self::Unixgram { .. })
    }
}

impl Default for Target {
    fn default() -> Self {
        Self::Tcp {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } | Self::Udp { host, port } if host.contains(':') => {
                write!(formatter, "{}://[{host}]:{port}", self.scheme())
            }
            Self::Tcp { host, port } | Self::Udp { host, port } => {
                write!(formatter, "{}://{host}:{port}", self.scheme())
            }
            Self::Unix { path } | Self::Unixgram { path } => {
                write!(formatter, "{}://{}", self.scheme(), path.display())
            }
        }
    }
}

/// Parses a `fluentd-address` value.
///
/// Accepts `tcp://`, `udp://`, `unix://` and `unixgram://` URLs as well as
/// bare `host[:port]` pairs, which default to TCP. A missing port becomes
/// [`DEFAULT_PORT`].
pub(crate) fn parse_address(address: &str) -> Result<Target, PolicyError> {
    if address.is_empty() {
        return Ok(Target::default());
    }

    if TRANSPORT_PREFIXES
        .iter()
        .any(|prefix| address.starts_with(prefix))
    {
        return parse_transport_url(address);
    }

    let (host, port) = split_host_port(address)
        .map_err(|reason| PolicyError::invalid_address(address, reason))?;
    Ok(Target::Tcp {
        host: non_empty_host(address, host)?,
        port: port.unwrap_or(DEFAULT_PORT),
    })
}

fn parse_transport_url(address: &str) -> Result<Target, PolicyError> {
    let url =
        Url::parse(address).map_err(|error| PolicyError::invalid_address(address, error.to_string()))?;

    match url.scheme() {
        "unix" | "unixgram" => {
            let path = url.path();
            if path.is_empty() {
                return Err(PolicyError::invalid_address(address, "missing socket path"));
            }
            let path = PathBuf::from(path);
            if url.scheme() == "unix" {
                Ok(Target::Unix { path })
            } else {
                Ok(Target::Unixgram { path })
            }
        }
        "tcp" | "udp" => {
            let raw_host = url.host_str().unwrap_or_default();
            let host = raw_host
                .strip_prefix('[')
                .and_then(|inner| inner.strip_suffix(']'))
                .unwrap_or(raw_host);
            let host = non_empty_host(address, host)?;
            let port = url.port().unwrap_or(DEFAULT_PORT);
            if url.scheme() == "tcp" {
                Ok(Target::Tcp { host, port })
            } else {
                Ok(Target::Udp { host, port })
            }
        }
        "tcp+tls" => Err(PolicyError::invalid_address(
            address,
            "tls transport is not supported",
        )),
        other => Err(PolicyError::invalid_address(
            address,
            format!("unsupported scheme '{other}'"),
        )),
    }
}

fn non_empty_host(address: &str, host: &str) -> Result<String, PolicyError> {
    if host.is_empty() {
        return Err(PolicyError::invalid_address(address, "missing host"));
    }
    Ok(host.to_owned())
}

/// Splits `host[:port]`, accepting `[v6]` and `[v6]:port` forms.
fn split_host_port(address: &str) -> Result<(&str, Option<u16>), String> {
    if let Some(rest) = address.strip_prefix('[') {
        let Some((host, after)) = rest.split_once(']') else {
            return Err(String::from("missing ']' in address"));
        };
        if after.is_empty() {
            return Ok((host, None));
        }
        let Some(port) = after.strip_prefix(':') else {
            return Err(String::from("unexpected text after ']'"));
        };
        return Ok((host, Some(parse_port(port)?)));
    }

    match address.split_once(':') {
        None => Ok((address, None)),
        Some((_, port)) if port.contains(':') => Err(String::from("too many colons in address")),
        Some((host, port)) => Ok((host, Some(parse_port(port)?))),
    }
}

fn parse_port(port: &str) -> Result<u16, String> {
    if port.is_empty() || !port.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(format!("invalid port '{port}'"));
    }
    port.parse::<u16>()
        .map_err(|_| format!("port '{port}' is out of range"))
}
