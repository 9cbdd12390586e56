//! Wire types for the Docker logging-plugin protocol.
//!
//! The plugin host exchanges JSON documents with the Docker engine over HTTP.
//! Field names follow the engine's Go structures, so every type renames its
//! fields to the engine's `PascalCase` spelling. Collections the engine may
//! send as `null` deserialize to empty values.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Number of characters kept by the short container and image identifiers.
pub const SHORT_ID_LENGTH: usize = 12;

/// Body of `/LogDriver.StartLogging`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct StartLoggingRequest {
    /// Path of the FIFO carrying the container's framed log entries.
    #[serde(rename = "File", default)]
    pub file: String,
    /// Container metadata and per-container log options.
    #[serde(rename = "Info", default)]
    pub info: LoggerInfo,
}

/// Body of `/LogDriver.StopLogging`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct StopLoggingRequest {
    /// Path of the FIFO whose session should stop.
    #[serde(rename = "File", default)]
    pub file: String,
}

/// Container metadata supplied by the engine when logging starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggerInfo {
    /// Free-form log options (`--log-opt key=value`).
    #[serde(rename = "Config", default, deserialize_with = "null_as_default")]
    pub config: HashMap<String, String>,
    /// Full container identifier.
    #[serde(rename = "ContainerID", default)]
    pub container_id: String,
    /// Container name, usually with a leading `/`.
    #[serde(rename = "ContainerName", default)]
    pub container_name: String,
    /// Entrypoint executable.
    #[serde(rename = "ContainerEntrypoint", default)]
    pub container_entrypoint: String,
    /// Arguments passed to the entrypoint.
    #[serde(rename = "ContainerArgs", default, deserialize_with = "null_as_default")]
    pub container_args: Vec<String>,
    /// Image digest, including its algorithm prefix.
    #[serde(rename = "ContainerImageID", default)]
    pub container_image_id: String,
    /// Image reference the container was created from.
    #[serde(rename = "ContainerImageName", default)]
    pub container_image_name: String,
    /// Creation timestamp as sent by the engine.
    #[serde(rename = "ContainerCreated", default)]
    pub container_created: String,
    /// Environment in `KEY=value` form.
    #[serde(rename = "ContainerEnv", default, deserialize_with = "null_as_default")]
    pub container_env: Vec<String>,
    /// Container labels.
    #[serde(
        rename = "ContainerLabels",
        default,
        deserialize_with = "null_as_default"
    )]
    pub container_labels: HashMap<String, String>,
    /// Log path managed by the engine, if any.
    #[serde(rename = "LogPath", default)]
    pub log_path: String,
    /// Name of the daemon emitting the logs.
    #[serde(rename = "DaemonName", default)]
    pub daemon_name: String,
}

impl LoggerInfo {
    /// First twelve characters of the container identifier.
    #[must_use]
    pub fn id(&self) -> String {
        short(&self.container_id)
    }

    /// Full container identifier.
    #[must_use]
    pub fn full_id(&self) -> &str {
        &self.container_id
    }

    /// Container name without the leading `/`.
    #[must_use]
    pub fn name(&self) -> &str {
        self.container_name
            .strip_prefix('/')
            .unwrap_or(&self.container_name)
    }

    /// Image digest without its algorithm prefix.
    #[must_use]
    pub fn image_full_id(&self) -> &str {
        self.container_image_id
            .split_once(':')
            .map_or(self.container_image_id.as_str(), |(_, digest)| digest)
    }

    /// First twelve characters of [`Self::image_full_id`].
    #[must_use]
    pub fn image_id(&self) -> String {
        short(self.image_full_id())
    }

    /// Image reference the container was created from.
    #[must_use]
    pub fn image_name(&self) -> &str {
        &self.container_image_name
    }

    /// Entrypoint and arguments joined by spaces.
    #[must_use]
    pub fn command(&self) -> String {
        std::iter::once(self.container_entrypoint.as_str())
            .chain(self.container_args.iter().map(String::as_str))
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Looks up a log option, treating empty values as absent.
    #[must_use]
    pub fn option(&self, key: &str) -> Option<&str> {
        self.config
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// Reply to `StartLogging` and `StopLogging`; an empty `Err` means success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PluginResponse {
    /// Error text, empty on success.
    #[serde(rename = "Err")]
    pub err: String,
}

impl PluginResponse {
    /// Successful reply.
    #[must_use]
    pub const fn ok() -> Self {
        Self { err: String::new() }
    }

    /// Failed reply carrying the given error text.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            err: message.into(),
        }
    }
}

/// Capabilities advertised by the logging driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Capability {
    /// Whether `docker logs` can read previously shipped entries.
    #[serde(rename = "ReadLogs")]
    pub read_logs: bool,
}

/// Reply to `/LogDriver.Capabilities`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CapabilitiesResponse {
    /// Advertised capabilities.
    #[serde(rename = "Cap")]
    pub cap: Capability,
}

/// Reply to `/Plugin.Activate`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ActivateResponse {
    /// Plugin interfaces implemented by this plugin.
    #[serde(rename = "Implements")]
    pub implements: Vec<String>,
}

impl ActivateResponse {
    /// Activation reply for a logging driver.
    #[must_use]
    pub fn logging_driver() -> Self {
        Self {
            implements: vec![String::from("LoggingDriver")],
        }
    }
}

fn short(value: &str) -> String {
    value.chars().take(SHORT_ID_LENGTH).collect()
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}
