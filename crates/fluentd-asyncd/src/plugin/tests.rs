//! Tests for the plugin protocol handler over a real socket.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use rstest::{fixture, rstest};
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::session::Registry;
use crate::tests::support::RecordingDeliveryFactory;
use crate::transport::{ConnectionHandler, ConnectionStream};

use super::PluginConnectionHandler;

struct Harness {
    registry: Arc<Registry>,
    handler: Arc<PluginConnectionHandler>,
    dir: TempDir,
}

struct Reply {
    status: u16,
    head: String,
    body: String,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_str(&self.body).expect("JSON body")
    }
}

impl Harness {
    fn send(&self, raw: &[u8]) -> Reply {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let addr = listener.local_addr().expect("address");
        let handler = Arc::clone(&self.handler);
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            handler.handle(ConnectionStream::Tcp(stream));
        });

        let mut client = TcpStream::connect(addr).expect("connect");
        client.write_all(raw).expect("write request");
        let mut wire = String::new();
        client.read_to_string(&mut wire).expect("read response");
        server.join().expect("join server");

        let (head, body) = wire.split_once("\r\n\r\n").expect("response head");
        let status = head
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .expect("status code");
        Reply {
            status,
            head: head.to_owned(),
            body: body.to_owned(),
        }
    }

    fn post(&self, path: &str, body: &str) -> Reply {
        let raw = format!(
            "POST {path} HTTP/1.1\r\nHost: plugin\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        self.send(raw.as_bytes())
    }

    fn fifo(&self) -> String {
        let path = self.dir.path().join("container.fifo");
        mkfifo(&path, Mode::S_IRUSR | Mode::S_IWUSR).expect("create fifo");
        path.to_str().expect("utf-8 path").to_owned()
    }
}

#[fixture]
fn harness() -> Harness {
    let registry = Arc::new(Registry::new(Arc::new(RecordingDeliveryFactory::default())));
    Harness {
        handler: Arc::new(PluginConnectionHandler::new(Arc::clone(&registry))),
        registry,
        dir: TempDir::new().expect("temp dir"),
    }
}

#[rstest]
fn activation_advertises_logging_driver(harness: Harness) {
    let reply = harness.post("/Plugin.Activate", "");
    assert_eq!(reply.status, 200);
    assert!(
        reply
            .head
            .contains("Content-Type: application/vnd.docker.plugins.v1+json"),
        "{}",
        reply.head
    );
    assert_eq!(reply.json(), json!({"Implements": ["LoggingDriver"]}));
}

#[rstest]
fn capabilities_report_no_read_support(harness: Harness) {
    let reply = harness.post("/LogDriver.Capabilities", "{}");
    assert_eq!(reply.status, 200);
    assert_eq!(reply.json(), json!({"Cap": {"ReadLogs": false}}));
}

#[rstest]
#[case::read_logs("/LogDriver.ReadLogs", 501)]
#[case::unknown("/LogDriver.Rotate", 404)]
fn unsupported_paths_are_rejected(harness: Harness, #[case] path: &str, #[case] status: u16) {
    assert_eq!(harness.post(path, "{}").status, status);
}

#[rstest]
fn non_post_methods_are_rejected(harness: Harness) {
    let reply = harness.send(b"GET /Plugin.Activate HTTP/1.1\r\nHost: plugin\r\n\r\n");
    assert_eq!(reply.status, 405);
}

#[rstest]
fn malformed_bodies_are_bad_requests(harness: Harness) {
    let reply = harness.post("/LogDriver.StartLogging", "{not json");
    assert_eq!(reply.status, 400);
    assert!(reply.body.contains("invalid request body"), "{}", reply.body);
}

#[rstest]
fn start_failures_are_reported_in_err(harness: Harness) {
    let body = json!({"File": "/run/fifo", "Info": {"ContainerID": ""}}).to_string();
    let reply = harness.post("/LogDriver.StartLogging", &body);
    assert_eq!(reply.status, 200);
    let err = reply.json()["Err"].as_str().unwrap_or_default().to_owned();
    assert!(err.contains("ContainerID"), "unexpected Err: {err}");
}

#[rstest]
fn start_and_stop_drive_the_registry(harness: Harness) {
    let fifo = harness.fifo();
    let start = json!({
        "File": fifo,
        "Info": {"ContainerID": "0123456789abcdef", "ContainerName": "/web", "Config": null}
    })
    .to_string();

    let reply = harness.post("/LogDriver.StartLogging", &start);
    assert_eq!(reply.json(), json!({"Err": ""}));
    assert_eq!(harness.registry.active_streams(), vec![fifo.clone()]);

    let duplicate = harness.post("/LogDriver.StartLogging", &start);
    let err = duplicate.json()["Err"].as_str().unwrap_or_default().to_owned();
    assert!(err.contains("already exists"), "unexpected Err: {err}");

    let stop = json!({"File": fifo}).to_string();
    for _ in 0..2 {
        let reply = harness.post("/LogDriver.StopLogging", &stop);
        assert_eq!(reply.json(), json!({"Err": ""}));
    }
    assert!(harness.registry.active_streams().is_empty());
}
