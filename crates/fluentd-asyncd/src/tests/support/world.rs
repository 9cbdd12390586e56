//! Scenario world for the bootstrap and process suites.

use std::cell::RefCell;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use fluentd_async_config::SocketEndpoint;

use crate::bootstrap::{ConfigLoader, Daemon, bootstrap_with};
use crate::process::LaunchError;
use crate::process::launch::{LaunchPlan, run_daemon_with};

use super::config_loader::{FailingConfigLoader, TestConfigLoader};
use super::delivery::RecordingDeliveryFactory;
use super::reporter::{HealthEvent, RecordingHealthReporter};
use super::shutdown::ScriptedShutdown;

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Scenario state shared across BDD steps.
pub struct TestWorld {
    loader: Option<TestConfigLoader>,
    endpoint: SocketEndpoint,
    failing: bool,
    pub reporter: Arc<RecordingHealthReporter>,
    pub factory: Arc<RecordingDeliveryFactory>,
    daemon: Option<Daemon>,
    bootstrap_error: Option<String>,
    trigger: Option<Sender<i32>>,
    runner: Option<JoinHandle<Result<(), LaunchError>>>,
    launch_result: Option<Result<(), String>>,
}

impl TestWorld {
    /// Builds a world with a successful configuration loader.
    #[must_use]
    pub fn new() -> Self {
        let loader = TestConfigLoader::new();
        Self {
            endpoint: loader.endpoint(),
            loader: Some(loader),
            failing: false,
            reporter: Arc::new(RecordingHealthReporter::default()),
            factory: Arc::new(RecordingDeliveryFactory::default()),
            daemon: None,
            bootstrap_error: None,
            trigger: None,
            runner: None,
            launch_result: None,
        }
    }

    /// Makes every later configuration load fail.
    pub fn use_failing_loader(&mut self) {
        self.failing = true;
    }

    /// Runs the bootstrap sequence once.
    pub fn bootstrap(&mut self) {
        let loader: &dyn ConfigLoader = match (&self.loader, self.failing) {
            (Some(loader), false) => loader,
            _ => &FailingConfigLoader,
        };
        match bootstrap_with(loader, self.reporter.clone(), self.factory.clone()) {
            Ok(daemon) => self.daemon = Some(daemon),
            Err(error) => self.bootstrap_error = Some(error.to_string()),
        }
    }

    /// Bootstrap error message, if bootstrap failed.
    #[must_use]
    pub fn bootstrap_error(&self) -> Option<&str> {
        self.bootstrap_error.as_deref()
    }

    /// Daemon produced by a successful bootstrap.
    #[must_use]
    pub fn daemon(&self) -> Option<&Daemon> {
        self.daemon.as_ref()
    }

    /// Socket the configured daemon serves.
    #[must_use]
    pub fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Filesystem path of the plugin socket.
    #[must_use]
    pub fn socket_path(&self) -> PathBuf {
        self.endpoint
            .unix_path()
            .expect("test endpoint is a unix socket")
            .as_std_path()
            .to_path_buf()
    }

    /// Runs the whole daemon lifecycle on a background thread.
    pub fn launch(&mut self) -> Result<(), String> {
        let loader = self.loader.take().ok_or("daemon already launched")?;
        let (shutdown, trigger) = ScriptedShutdown::new();
        let plan = LaunchPlan {
            loader,
            reporter: self.reporter.clone(),
            factory: self.factory.clone(),
            shutdown,
        };
        let runner = thread::Builder::new()
            .name(String::from("daemon-under-test"))
            .spawn(move || run_daemon_with(plan))
            .map_err(|error| format!("failed to spawn daemon thread: {error}"))?;
        self.trigger = Some(trigger);
        self.runner = Some(runner);
        Ok(())
    }

    /// Waits until the reporter has seen the listener come up.
    pub fn wait_for_listener(&self) -> Result<(), String> {
        let expected = HealthEvent::ListenerReady(self.endpoint.clone());
        let deadline = Instant::now() + WAIT_TIMEOUT;
        while Instant::now() < deadline {
            if self.reporter.events().contains(&expected) {
                return Ok(());
            }
            thread::sleep(POLL_INTERVAL);
        }
        Err(format!("listener never reported ready: {:?}", self.reporter.events()))
    }

    /// Sends one empty `POST` to `path` over the plugin socket and returns
    /// the raw response.
    pub fn post(&self, path: &str) -> Result<String, String> {
        let mut stream = UnixStream::connect(self.socket_path())
            .map_err(|error| format!("connect failed: {error}"))?;
        let request = format!("POST {path} HTTP/1.1\r\nHost: plugin\r\nContent-Length: 0\r\n\r\n");
        stream
            .write_all(request.as_bytes())
            .map_err(|error| format!("write failed: {error}"))?;
        let mut response = String::new();
        stream
            .read_to_string(&mut response)
            .map_err(|error| format!("read failed: {error}"))?;
        Ok(response)
    }

    /// Delivers `signal` to the running daemon and waits for it to exit.
    pub fn signal_and_join(&mut self, signal: i32) -> Result<(), String> {
        let trigger = self.trigger.take().ok_or("daemon not launched")?;
        trigger
            .send(signal)
            .map_err(|_| String::from("daemon stopped waiting for signals"))?;
        let runner = self.runner.take().ok_or("daemon not launched")?;
        let result = runner
            .join()
            .map_err(|_| String::from("daemon thread panicked"))?;
        self.launch_result = Some(result.map_err(|error| error.to_string()));
        Ok(())
    }

    /// Outcome of a finished launch.
    #[must_use]
    pub fn launch_result(&self) -> Option<&Result<(), String>> {
        self.launch_result.as_ref()
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestWorld {
    fn drop(&mut self) {
        drop(self.trigger.take());
        if let Some(runner) = self.runner.take() {
            let _ = runner.join();
        }
    }
}

/// Default test world fixture.
#[must_use]
pub fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}
