//! Shared configuration for the fluentd-async logging plugin.
//!
//! Values are layered by `ortho_config`: built-in defaults, configuration
//! files, `FLUENTD_ASYNC_*` environment variables and finally command-line
//! flags. Per-container delivery options are not part of this configuration;
//! they arrive with each `StartLogging` request and are resolved by the daemon.

mod defaults;
mod logging;
mod socket;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_LOG_FILTER, PLUGIN_NAME, PLUGIN_SOCKET_DIRECTORY, default_log_filter,
    default_log_filter_string, default_log_format, default_plugin_socket,
};
pub use logging::{
    LEGACY_LOG_LEVEL_ENV, LegacyLogLevel, LogFormat, LogFormatParseError, LogLevelParseError,
    legacy_log_level, parse_legacy_log_level,
};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Process-level configuration of the plugin daemon.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "FLUENTD_ASYNC")]
pub struct Config {
    /// Socket the plugin host listens on.
    #[ortho_config(default = default_plugin_socket())]
    pub plugin_socket: SocketEndpoint,
    /// `tracing` filter expression.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for daemon logs.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Config {
    /// Socket the plugin host listens on.
    #[must_use]
    pub fn plugin_socket(&self) -> &SocketEndpoint {
        &self.plugin_socket
    }

    /// Filter expression handed to the tracing subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Output format for daemon logs.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Replaces the log filter when the legacy `LOG_LEVEL` variable is set.
    pub fn with_legacy_log_level(mut self) -> Result<Self, LogLevelParseError> {
        if let Some(level) = legacy_log_level()? {
            self.log_filter = level.filter().to_owned();
        }
        Ok(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            plugin_socket: default_plugin_socket(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}
