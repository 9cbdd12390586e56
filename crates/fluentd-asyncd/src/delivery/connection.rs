//! Sockets towards the collector.

use std::io::{self, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::os::unix::net::{UnixDatagram, UnixStream};
use std::time::Duration;

use crate::policy::Target;

use super::DeliveryError;
use super::forward::AckResponse;

/// Bound on connecting, writing and awaiting acknowledgements.
pub(crate) const IO_TIMEOUT: Duration = Duration::from_secs(3);

/// Open socket to a collector.
#[derive(Debug)]
pub(crate) enum Connection {
    Tcp(TcpStream),
    Udp(UdpSocket),
    Unix(UnixStream),
    Unixgram(UnixDatagram),
}

impl Connection {
    /// Connects to `target`.
    pub(crate) fn open(target: &Target) -> Result<Self, DeliveryError> {
        let connect_error = |source: io::Error| DeliveryError::Connect {
            target: target.to_string(),
            source,
        };

        match target {
            Target::Tcp { host, port } => {
                let stream = connect_tcp(host, *port).map_err(connect_error)?;
                stream
                    .set_write_timeout(Some(IO_TIMEOUT))
                    .and_then(|()| stream.set_read_timeout(Some(IO_TIMEOUT)))
                    .and_then(|()| stream.set_nodelay(true))
                    .map_err(connect_error)?;
                Ok(Self::Tcp(stream))
            }
            Target::Udp { host, port } => {
                let addr = resolve(host, *port).map_err(connect_error)?;
                let local: SocketAddr = if addr.is_ipv4() {
                    SocketAddr::from(([0, 0, 0, 0], 0))
                } else {
                    SocketAddr::from(([0_u16; 8], 0))
                };
                let socket = UdpSocket::bind(local)
                    .and_then(|socket| socket.connect(addr).map(|()| socket))
                    .map_err(connect_error)?;
                socket
                    .set_write_timeout(Some(IO_TIMEOUT))
                    .map_err(connect_error)?;
                Ok(Self::Udp(socket))
            }
            Target::Unix { path } => {
                let stream = UnixStream::connect(path).map_err(connect_error)?;
                stream
                    .set_write_timeout(Some(IO_TIMEOUT))
                    .and_then(|()| stream.set_read_timeout(Some(IO_TIMEOUT)))
                    .map_err(connect_error)?;
                Ok(Self::Unix(stream))
            }
            Target::Unixgram { path } => {
                let socket = UnixDatagram::unbound()
                    .and_then(|socket| socket.connect(path).map(|()| socket))
                    .map_err(connect_error)?;
                socket
                    .set_write_timeout(Some(IO_TIMEOUT))
                    .map_err(connect_error)?;
                Ok(Self::Unixgram(socket))
            }
        }
    }

    /// Writes one encoded event.
    pub(crate) fn send(&mut self, bytes: &[u8]) -> Result<(), DeliveryError> {
        let written = match self {
            Self::Tcp(stream) => stream.write_all(bytes).and_then(|()| stream.flush()),
            Self::Unix(stream) => stream.write_all(bytes).and_then(|()| stream.flush()),
            Self::Udp(socket) => socket.send(bytes).and_then(|sent| whole_datagram(sent, bytes)),
            Self::Unixgram(socket) => {
                socket.send(bytes).and_then(|sent| whole_datagram(sent, bytes))
            }
        };
        written.map_err(|source| DeliveryError::Write { source })
    }

    /// Waits for the collector to acknowledge `chunk`.
    pub(crate) fn await_ack(&mut self, chunk: &str) -> Result<(), DeliveryError> {
        let response: AckResponse = match self {
            Self::Tcp(stream) => rmp_serde::from_read(stream),
            Self::Unix(stream) => rmp_serde::from_read(stream),
            Self::Udp(_) | Self::Unixgram(_) => return Ok(()),
        }
        .map_err(|error| DeliveryError::ack(error.to_string()))?;

        if response.ack == chunk {
            Ok(())
        } else {
            Err(DeliveryError::ack(format!(
                "expected chunk {chunk}, collector acknowledged {}",
                response.ack
            )))
        }
    }
}

fn connect_tcp(host: &str, port: u16) -> io::Result<TcpStream> {
    let mut last_error = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, IO_TIMEOUT) {
            Ok(stream) => return Ok(stream),
            Err(error) => last_error = Some(error),
        }
    }
    Err(last_error.unwrap_or_else(|| no_addresses(host, port)))
}

fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| no_addresses(host, port))
}

fn no_addresses(host: &str, port: u16) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no addresses resolved for {host}:{port}"),
    )
}

fn whole_datagram(sent: usize, bytes: &[u8]) -> io::Result<()> {
    if sent == bytes.len() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("datagram truncated: sent {sent} of {} bytes", bytes.len()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn udp_connection_sends_whole_datagrams() {
        let receiver = UdpSocket::bind(("127.0.0.1", 0)).expect("bind receiver");
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .expect("read timeout");
        let port = receiver.local_addr().expect("receiver address").port();

        let mut connection = Connection::open(&Target::Udp {
            host: String::from("127.0.0.1"),
            port,
        })
        .expect("open udp connection");
        connection.send(b"datagram").expect("send datagram");
        connection.await_ack("ignored").expect("datagrams skip acks");

        let mut buf = [0_u8; 32];
        let (received, _) = receiver.recv_from(&mut buf).expect("receive datagram");
        assert_eq!(buf.get(..received), Some(b"datagram".as_slice()));
    }

    #[test]
    fn refused_tcp_connection_reports_target() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let port = listener.local_addr().expect("address").port();
        drop(listener);

        let error = Connection::open(&Target::Tcp {
            host: String::from("127.0.0.1"),
            port,
        })
        .expect_err("nothing listens on the port");
        match error {
            DeliveryError::Connect { target, .. } => {
                assert_eq!(target, format!("tcp://127.0.0.1:{port}"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_unix_socket_fails_to_connect() {
        let error = Connection::open(&Target::Unix {
            path: PathBuf::from("/nonexistent/fluentd.sock"),
        })
        .expect_err("socket does not exist");
        assert!(matches!(error, DeliveryError::Connect { .. }));
    }
}
