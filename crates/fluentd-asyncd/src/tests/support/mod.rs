//! Test doubles and scenario state shared by the behavioural suites.

mod config_loader;
mod delivery;
mod reporter;
mod shutdown;
mod world;

pub use delivery::{PostedRecord, RecordingDelivery, RecordingDeliveryFactory};
pub use reporter::HealthEvent;
pub use world::{TestWorld, world};
