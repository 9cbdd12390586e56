//! Maps plugin protocol endpoints onto the session registry.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use strum::{Display, EnumString};
use tracing::{debug, warn};

use fluentd_async_types::{
    ActivateResponse, CapabilitiesResponse, Capability, PluginResponse, StartLoggingRequest,
    StopLoggingRequest,
};

use crate::session::Registry;

use super::PLUGIN_TARGET;
use super::errors::PluginError;
use super::request::PluginRequest;
use super::response::HttpResponse;

/// Endpoints of the logging-driver plugin protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum Endpoint {
    #[strum(serialize = "/Plugin.Activate")]
    Activate,
    #[strum(serialize = "/LogDriver.StartLogging")]
    StartLogging,
    #[strum(serialize = "/LogDriver.StopLogging")]
    StopLogging,
    #[strum(serialize = "/LogDriver.Capabilities")]
    Capabilities,
    #[strum(serialize = "/LogDriver.ReadLogs")]
    ReadLogs,
}

/// Routes parsed requests to their handlers.
pub struct PluginRouter {
    registry: Arc<Registry>,
}

impl PluginRouter {
    /// Creates a router driving `registry`.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Produces the response for `request`.
    pub fn route(&self, request: &PluginRequest) -> Result<HttpResponse, PluginError> {
        let endpoint: Endpoint =
            request
                .path
                .parse()
                .map_err(|_| PluginError::UnknownEndpoint {
                    path: request.path.clone(),
                })?;
        if !request.method.eq_ignore_ascii_case("POST") {
            return Err(PluginError::MethodNotAllowed {
                method: request.method.clone(),
            });
        }
        debug!(target: PLUGIN_TARGET, %endpoint, "plugin request");

        match endpoint {
            Endpoint::Activate => HttpResponse::json(&ActivateResponse::logging_driver()),
            Endpoint::StartLogging => {
                let start: StartLoggingRequest = parse_body(&request.body)?;
                HttpResponse::json(&self.start_logging(&start))
            }
            Endpoint::StopLogging => {
                let stop: StopLoggingRequest = parse_body(&request.body)?;
                HttpResponse::json(&self.stop_logging(&stop))
            }
            Endpoint::Capabilities => HttpResponse::json(&CapabilitiesResponse {
                cap: Capability { read_logs: false },
            }),
            Endpoint::ReadLogs => Err(PluginError::NotImplemented {
                endpoint: endpoint.to_string(),
            }),
        }
    }

    fn start_logging(&self, request: &StartLoggingRequest) -> PluginResponse {
        match self.registry.start(&request.file, &request.info) {
            Ok(()) => PluginResponse::ok(),
            Err(error) => {
                warn!(
                    target: PLUGIN_TARGET,
                    stream = %request.file,
                    container = %request.info.container_id,
                    kind = ?error.kind(),
                    error = %error,
                    "failed to start logging"
                );
                PluginResponse::error(error.to_string())
            }
        }
    }

    fn stop_logging(&self, request: &StopLoggingRequest) -> PluginResponse {
        match self.registry.stop(&request.file) {
            Ok(()) => PluginResponse::ok(),
            Err(error) => {
                warn!(
                    target: PLUGIN_TARGET,
                    stream = %request.file,
                    error = %error,
                    "failed to stop logging"
                );
                PluginResponse::error(error.to_string())
            }
        }
    }
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, PluginError> {
    serde_json::from_slice(body).map_err(PluginError::InvalidBody)
}
