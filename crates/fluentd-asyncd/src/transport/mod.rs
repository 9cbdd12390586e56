//! Socket listener for the plugin endpoint.
//!
//! The listener binds the configured endpoint, accepts connections on a
//! background thread and hands each connection to a [`ConnectionHandler`] on
//! its own thread.

mod errors;
mod handler;
mod listener;

pub(crate) use self::errors::ListenerError;
pub(crate) use self::handler::{ConnectionHandler, ConnectionStream};
pub(crate) use self::listener::{ListenerHandle, SocketListener};

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
