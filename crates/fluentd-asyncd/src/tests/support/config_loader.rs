//! Configuration loaders for the success and failure paths.

use std::ffi::OsString;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use tempfile::TempDir;

use fluentd_async_config::{Config, SocketEndpoint};

use crate::bootstrap::ConfigLoader;

/// Loader placing the plugin socket under a private temporary directory.
pub struct TestConfigLoader {
    socket_dir: TempDir,
}

impl TestConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            socket_dir: TempDir::new().expect("temporary socket directory"),
        }
    }

    /// Endpoint every loaded configuration points at.
    #[must_use]
    pub fn endpoint(&self) -> SocketEndpoint {
        let path = self.socket_dir.path().join("run").join("fluentd-async.sock");
        SocketEndpoint::unix(
            path.to_str()
                .expect("temporary socket path was not valid UTF-8")
                .to_owned(),
        )
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            plugin_socket: self.endpoint(),
            ..Config::default()
        })
    }
}

/// Loader that fails by passing an unparseable socket on the command line.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load_from_iter([
            OsString::from("fluentd-asyncd"),
            OsString::from("--plugin-socket"),
            OsString::from("ftp://nowhere"),
        ])
    }
}
