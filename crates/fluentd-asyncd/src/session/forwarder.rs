//! Bridges one log stream to its delivery client.

use std::sync::Arc;

use tracing::{debug, warn};

use fluentd_async_types::LoggerInfo;

use crate::delivery::{Delivery, DeliveryError, DeliveryFactory, Record};
use crate::framing::LogRecord;
use crate::metadata::SessionMetadata;
use crate::policy;

use super::SessionError;

const FORWARDER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::forwarder");

/// Counters reported when a forwarding loop ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ForwardSummary {
    /// Records accepted by the delivery client.
    pub posted: u64,
    /// Records the delivery client refused.
    pub failed: u64,
}

/// Per-session forwarder.
pub struct Forwarder {
    metadata: SessionMetadata,
    delivery: Arc<dyn Delivery>,
}

impl Forwarder {
    /// Resolves options and metadata from `info` and creates the delivery
    /// client through `factory`.
    pub fn new(info: &LoggerInfo, factory: &dyn DeliveryFactory) -> Result<Self, SessionError> {
        let policy = policy::resolve(&info.config)?;
        let metadata = SessionMetadata::from_info(info)?;
        let delivery = factory.create(&policy).map_err(SessionError::Delivery)?;
        debug!(
            target: FORWARDER_TARGET,
            container = %metadata.container_id,
            tag = %metadata.tag,
            address = %policy.target,
            "forwarder created"
        );
        Ok(Self::with_delivery(metadata, delivery))
    }

    /// Builds a forwarder around an existing client.
    pub fn with_delivery(metadata: SessionMetadata, delivery: Arc<dyn Delivery>) -> Self {
        Self { metadata, delivery }
    }

    /// Session metadata.
    pub fn metadata(&self) -> &SessionMetadata {
        &self.metadata
    }

    /// Shared handle to the delivery client, used to close it on stop.
    pub fn delivery(&self) -> Arc<dyn Delivery> {
        Arc::clone(&self.delivery)
    }

    /// Builds the flat record shipped for `record`.
    ///
    /// Extra attributes override the base fields; fragment fields are added
    /// last.
    pub fn build_record(&self, record: &LogRecord) -> Record {
        let mut fields = Record::new();
        fields.insert(String::from("container_id"), self.metadata.container_id.clone());
        fields.insert(
            String::from("container_name"),
            self.metadata.container_name.clone(),
        );
        fields.insert(String::from("source"), record.source.clone());
        fields.insert(
            String::from("log"),
            String::from_utf8_lossy(&record.line).into_owned(),
        );
        fields.extend(
            self.metadata
                .extra
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );

        if let Some(partial) = &record.partial {
            fields.insert(String::from("partial_message"), String::from("true"));
            fields.insert(String::from("partial_id"), partial.id.clone());
            fields.insert(String::from("partial_ordinal"), partial.ordinal.to_string());
            fields.insert(String::from("partial_last"), partial.last.to_string());
        }
        fields
    }

    /// Posts one record under the session tag.
    pub fn forward(&self, record: &LogRecord) -> Result<(), DeliveryError> {
        let fields = self.build_record(record);
        self.delivery
            .post(&self.metadata.tag, record.timestamp(), &fields)
            .inspect_err(|error| {
                warn!(
                    target: FORWARDER_TARGET,
                    container = %self.metadata.container_id,
                    error = %error,
                    record = ?fields,
                    "failed to post log record"
                );
            })
    }

    /// Forwards every record until the sequence ends. Failed posts are
    /// logged and skipped.
    pub fn run(&self, records: impl IntoIterator<Item = LogRecord>) -> ForwardSummary {
        let mut summary = ForwardSummary::default();
        for record in records {
            match self.forward(&record) {
                Ok(()) => summary.posted += 1,
                Err(_) => summary.failed += 1,
            }
        }
        debug!(
            target: FORWARDER_TARGET,
            container = %self.metadata.container_id,
            posted = summary.posted,
            failed = summary.failed,
            "log stream exhausted"
        );
        summary
    }
}
