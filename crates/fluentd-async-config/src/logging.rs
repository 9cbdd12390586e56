use std::env;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// Environment variable honoured for compatibility with earlier plugin builds.
pub const LEGACY_LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Supported logging output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// Structured JSON suitable for ingestion by logging stacks.
    #[default]
    Json,
    /// Human-readable single line output.
    Compact,
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;

/// Level names accepted by the legacy `LOG_LEVEL` variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LegacyLogLevel {
    /// Only unrecoverable failures.
    Panic,
    /// Failures that stop the process.
    Fatal,
    /// Errors.
    Error,
    /// Warnings.
    #[strum(serialize = "warn", serialize = "warning")]
    Warn,
    /// Informational messages.
    Info,
    /// Debug output.
    Debug,
    /// Everything.
    Trace,
}

impl LegacyLogLevel {
    /// Returns the equivalent tracing filter directive.
    #[must_use]
    pub fn filter(self) -> &'static str {
        match self {
            Self::Panic | Self::Fatal | Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Raised when `LOG_LEVEL` holds an unknown level name.
#[derive(Debug, Error)]
#[error("failed to parse log level '{value}'")]
pub struct LogLevelParseError {
    /// Raw environment value.
    pub value: String,
}

/// Reads the legacy `LOG_LEVEL` variable, if set.
pub fn legacy_log_level() -> Result<Option<LegacyLogLevel>, LogLevelParseError> {
    match env::var(LEGACY_LOG_LEVEL_ENV) {
        Ok(value) => parse_legacy_log_level(&value).map(Some),
        Err(_) => Ok(None),
    }
}

/// Parses a logrus-style level name.
pub fn parse_legacy_log_level(value: &str) -> Result<LegacyLogLevel, LogLevelParseError> {
    value
        .trim()
        .parse::<LegacyLogLevel>()
        .map_err(|_| LogLevelParseError {
            value: value.to_owned(),
        })
}
