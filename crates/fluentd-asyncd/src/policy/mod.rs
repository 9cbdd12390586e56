//! Resolution of per-container log options into a delivery policy.
//!
//! Options arrive as the free-form `--log-opt` map of a `StartLogging`
//! request. [`resolve`] validates every recognised key and returns either a
//! complete [`DeliveryPolicy`] or the first error; unrecognised keys are left
//! to other consumers such as the tag template and extra attributes.

mod address;
mod errors;
mod units;

use std::collections::HashMap;
use std::hash::BuildHasher;
use std::time::Duration;

pub use self::address::{DEFAULT_HOST, DEFAULT_PORT, Target};
pub use self::errors::PolicyError;

/// Collector address (`tcp://host:port`, `unix:///path`, ...).
pub const ADDRESS_KEY: &str = "fluentd-address";
/// Upper bound of queued, undelivered bytes.
pub const BUFFER_LIMIT_KEY: &str = "fluentd-buffer-limit";
/// Attempts per event before it is discarded.
pub const MAX_RETRIES_KEY: &str = "fluentd-max-retries";
/// Initial backoff between attempts.
pub const RETRY_WAIT_KEY: &str = "fluentd-retry-wait";
/// Whether to wait for collector acknowledgements.
pub const REQUEST_ACK_KEY: &str = "fluentd-request-ack";
/// Whether to send nanosecond event times.
pub const SUB_SECOND_PRECISION_KEY: &str = "fluentd-sub-second-precision";
/// Whether closing abandons undelivered events.
pub const FORCE_STOP_ASYNC_SEND_KEY: &str = "fluentd-force-stop-async-send";

/// Default buffer limit: 1 MiB.
pub const DEFAULT_BUFFER_LIMIT: usize = 1024 * 1024;
/// Default initial backoff.
pub const DEFAULT_RETRY_WAIT: Duration = Duration::from_millis(1000);
/// Default attempt budget, equal to `i32::MAX`; retries effectively never stop.
pub const DEFAULT_MAX_RETRIES: u64 = 2_147_483_647;

/// Fully resolved delivery settings for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Where events are sent.
    pub target: Target,
    /// Maximum bytes of encoded events waiting for delivery.
    pub buffer_limit: usize,
    /// Initial backoff; grows by half after every failed attempt.
    pub retry_wait: Duration,
    /// Attempts per event before it is discarded.
    pub max_retries: u64,
    /// Wait for `{"ack": chunk}` replies on stream transports.
    pub request_ack: bool,
    /// Encode event times with nanosecond precision.
    pub sub_second_precision: bool,
    /// Abandon pending events when the client is closed.
    pub force_stop_on_close: bool,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            target: Target::default(),
            buffer_limit: DEFAULT_BUFFER_LIMIT,
            retry_wait: DEFAULT_RETRY_WAIT,
            max_retries: DEFAULT_MAX_RETRIES,
            request_ack: false,
            sub_second_precision: false,
            force_stop_on_close: true,
        }
    }
}

/// Resolves the delivery policy from a log option map.
///
/// Missing keys and keys with empty values take their defaults.
///
/// # Errors
///
/// Returns [`PolicyError::InvalidAddress`] for an unusable address and
/// [`PolicyError::InvalidOption`] for any other malformed value.
pub fn resolve<S: BuildHasher>(
    options: &HashMap<String, String, S>,
) -> Result<DeliveryPolicy, PolicyError> {
    let lookup = |key: &str| {
        options
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    };

    let target = address::parse_address(lookup(ADDRESS_KEY).unwrap_or_default())?;

    let buffer_limit = match lookup(BUFFER_LIMIT_KEY) {
        None => DEFAULT_BUFFER_LIMIT,
        Some(raw) => units::parse_size(raw)
            .and_then(|bytes| {
                usize::try_from(bytes).map_err(|_| format!("size '{raw}' is out of range"))
            })
            .map_err(|reason| PolicyError::invalid_option(BUFFER_LIMIT_KEY, raw, reason))?,
    };

    let retry_wait = match lookup(RETRY_WAIT_KEY) {
        None => DEFAULT_RETRY_WAIT,
        Some(raw) => units::parse_duration(raw)
            .map(units::whole_millis)
            .map_err(|reason| PolicyError::invalid_option(RETRY_WAIT_KEY, raw, reason))?,
    };

    let max_retries = match lookup(MAX_RETRIES_KEY) {
        None => DEFAULT_MAX_RETRIES,
        Some(raw) => units::parse_count(raw)
            .map_err(|reason| PolicyError::invalid_option(MAX_RETRIES_KEY, raw, reason))?,
    };

    Ok(DeliveryPolicy {
        target,
        buffer_limit,
        retry_wait,
        max_retries,
        request_ack: flag(lookup, REQUEST_ACK_KEY, false)?,
        sub_second_precision: flag(lookup, SUB_SECOND_PRECISION_KEY, false)?,
        force_stop_on_close: flag(lookup, FORCE_STOP_ASYNC_SEND_KEY, true)?,
    })
}

fn flag<'a>(
    lookup: impl Fn(&str) -> Option<&'a str>,
    key: &'static str,
    default: bool,
) -> Result<bool, PolicyError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => units::parse_bool(raw)
            .map_err(|reason| PolicyError::invalid_option(key, raw, reason)),
    }
}
