//! Docker logging-driver plugin forwarding container logs to Fluentd.
//!
//! The daemon serves the plugin protocol on a Unix socket. Each
//! `StartLogging` request opens a session: the container's FIFO is decoded
//! frame by frame, every entry is enriched with container metadata and
//! posted to a per-session client speaking the Fluentd forward protocol.
//! `StopLogging`, or the end of the stream, tears the session down.
//!
//! Delivery is asynchronous. Posting only enqueues; a worker thread per
//! session connects, writes and retries with backoff according to the
//! options given with the container (`fluentd-address`,
//! `fluentd-retry-wait` and friends).

mod bootstrap;
pub mod delivery;
pub mod framing;
mod health;
pub mod metadata;
mod plugin;
pub mod policy;
mod process;
pub mod session;
pub mod stream;
mod telemetry;
mod transport;

pub use bootstrap::{BootstrapError, ConfigLoader, Daemon, SystemConfigLoader, bootstrap_with};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use plugin::{Endpoint, PluginError};
pub use process::{LaunchError, run_daemon};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
