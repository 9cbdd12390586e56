//! In-memory delivery clients that record what the forwarder posts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::delivery::{Delivery, DeliveryError, DeliveryFactory, Record};
use crate::policy::DeliveryPolicy;

/// One record accepted by a [`RecordingDelivery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedRecord {
    pub tag: String,
    pub time: SystemTime,
    pub record: Record,
}

/// Delivery double that keeps every posted record.
#[derive(Debug)]
pub struct RecordingDelivery {
    policy: DeliveryPolicy,
    posted: Mutex<Vec<PostedRecord>>,
    closed: AtomicBool,
    drained: AtomicBool,
}

impl RecordingDelivery {
    fn new(policy: DeliveryPolicy) -> Self {
        Self {
            policy,
            posted: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            drained: AtomicBool::new(false),
        }
    }

    /// Policy the client was created with.
    pub fn policy(&self) -> &DeliveryPolicy {
        &self.policy
    }

    /// Snapshot of posted records in order.
    pub fn posted(&self) -> Vec<PostedRecord> {
        self.posted
            .lock()
            .expect("posted records mutex poisoned")
            .clone()
    }

    /// Whether `close` or `drain` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Whether the client was shut down through `drain`.
    pub fn is_drained(&self) -> bool {
        self.drained.load(Ordering::SeqCst)
    }
}

impl Delivery for RecordingDelivery {
    fn post(&self, tag: &str, time: SystemTime, record: &Record) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Closed);
        }
        self.posted
            .lock()
            .expect("posted records mutex poisoned")
            .push(PostedRecord {
                tag: tag.to_owned(),
                time,
                record: record.clone(),
            });
        Ok(())
    }

    fn close(&self) -> Result<(), DeliveryError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn drain(&self) -> Result<(), DeliveryError> {
        self.drained.store(true, Ordering::SeqCst);
        self.close()
    }
}

/// Factory handing out [`RecordingDelivery`] clients and remembering them.
#[derive(Debug, Default)]
pub struct RecordingDeliveryFactory {
    clients: Mutex<Vec<Arc<RecordingDelivery>>>,
}

impl RecordingDeliveryFactory {
    /// Every client created so far, oldest first.
    pub fn clients(&self) -> Vec<Arc<RecordingDelivery>> {
        self.clients
            .lock()
            .expect("delivery clients mutex poisoned")
            .clone()
    }

    /// The most recently created client.
    pub fn last_client(&self) -> Option<Arc<RecordingDelivery>> {
        self.clients().pop()
    }
}

impl DeliveryFactory for RecordingDeliveryFactory {
    fn create(&self, policy: &DeliveryPolicy) -> Result<Arc<dyn Delivery>, DeliveryError> {
        let client = Arc::new(RecordingDelivery::new(policy.clone()));
        self.clients
            .lock()
            .expect("delivery clients mutex poisoned")
            .push(Arc::clone(&client));
        Ok(client)
    }
}
