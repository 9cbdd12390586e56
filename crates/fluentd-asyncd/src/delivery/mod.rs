//! Delivery of records to the remote collector.
//!
//! The forwarder only sees the [`Delivery`] trait: `post` enqueues and
//! returns, `close` stops the client according to its policy and `drain`
//! flushes the queue before stopping whatever the policy says. Network
//! retries and backoff live entirely behind the trait in [`FluentClient`].

mod client;
mod connection;
mod errors;
mod forward;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use crate::policy::DeliveryPolicy;

pub use self::client::{FluentClient, MAX_RETRY_WAIT};
pub use self::errors::DeliveryError;

const DELIVERY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::delivery");

/// Flat key/value record as shipped to the collector.
pub type Record = BTreeMap<String, String>;

/// Buffered, retrying sink for tagged records.
pub trait Delivery: Send + Sync {
    /// Enqueues `record` under `tag` with its capture time. Never waits for
    /// the network.
    fn post(&self, tag: &str, time: SystemTime, record: &Record) -> Result<(), DeliveryError>;

    /// Stops accepting records and shuts the client down. Calling it again
    /// has no further effect.
    fn close(&self) -> Result<(), DeliveryError>;

    /// Stops accepting records and returns once every queued record has been
    /// delivered or discarded after its retries, ignoring
    /// `force_stop_on_close`. A `close` from another thread still interrupts
    /// a drain in progress when the policy forces stops.
    fn drain(&self) -> Result<(), DeliveryError>;
}

/// Builds delivery clients for resolved policies.
pub trait DeliveryFactory: Send + Sync {
    /// Creates a client bound to `policy`.
    fn create(&self, policy: &DeliveryPolicy) -> Result<Arc<dyn Delivery>, DeliveryError>;
}

/// Factory producing [`FluentClient`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct FluentDeliveryFactory;

impl DeliveryFactory for FluentDeliveryFactory {
    fn create(&self, policy: &DeliveryPolicy) -> Result<Arc<dyn Delivery>, DeliveryError> {
        Ok(Arc::new(FluentClient::new(policy.clone())?))
    }
}
