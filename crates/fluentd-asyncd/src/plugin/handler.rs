//! Connection handler serving the plugin protocol.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::session::Registry;
use crate::transport::{ConnectionHandler, ConnectionStream};

use super::PLUGIN_TARGET;
use super::request::PluginRequest;
use super::response::HttpResponse;
use super::router::PluginRouter;

/// Bound on reading a request and writing its response.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Handler answering one plugin request per connection.
pub struct PluginConnectionHandler {
    router: PluginRouter,
}

impl PluginConnectionHandler {
    /// Creates a handler driving `registry`.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            router: PluginRouter::new(registry),
        }
    }

    fn serve(&self, mut stream: ConnectionStream) {
        if let Err(error) = stream.set_timeouts(CONNECTION_TIMEOUT) {
            warn!(target: PLUGIN_TARGET, %error, "failed to set connection timeouts");
        }

        let response = match PluginRequest::read_from(&mut stream) {
            Ok(Some(request)) => self.router.route(&request).unwrap_or_else(|error| {
                debug!(
                    target: PLUGIN_TARGET,
                    path = %request.path,
                    %error,
                    "plugin request rejected"
                );
                HttpResponse::from_error(&error)
            }),
            Ok(None) => {
                debug!(target: PLUGIN_TARGET, "client disconnected without request");
                return;
            }
            Err(error) => {
                warn!(target: PLUGIN_TARGET, %error, "failed to read plugin request");
                HttpResponse::from_error(&error)
            }
        };

        if let Err(error) = response.write_to(&mut stream) {
            warn!(target: PLUGIN_TARGET, %error, "failed to write plugin response");
        }
    }
}

impl ConnectionHandler for PluginConnectionHandler {
    fn handle(&self, stream: ConnectionStream) {
        self.serve(stream);
    }
}
