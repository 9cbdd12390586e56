//! Forwarding sessions: one per container log stream.
//!
//! [`Registry`] owns the table of sessions. Each session runs a
//! [`Forwarder`] on its own thread, decoding frames from the stream and
//! posting enriched records to the session's delivery client until the
//! stream ends or the session is stopped.

mod errors;
mod forwarder;
mod registry;

pub use self::errors::{ErrorKind, SessionError};
pub use self::forwarder::{ForwardSummary, Forwarder};
pub use self::registry::Registry;
