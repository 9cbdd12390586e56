//! Docker logging-driver plugin protocol.
//!
//! The engine talks to the plugin with HTTP `POST` requests carrying JSON
//! bodies. [`PluginConnectionHandler`] reads one request per connection,
//! routes it and writes a single response before closing.

mod errors;
mod handler;
mod request;
mod response;
mod router;
#[cfg(test)]
mod tests;

pub use self::errors::PluginError;
pub use self::handler::PluginConnectionHandler;
pub use self::router::Endpoint;

const PLUGIN_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::plugin");
