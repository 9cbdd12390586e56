use crate::logging::LogFormat;
use crate::socket::SocketEndpoint;

/// Directory in which the Docker engine discovers plugin sockets.
pub const PLUGIN_SOCKET_DIRECTORY: &str = "/run/docker/plugins";

/// Name under which the plugin registers its socket.
pub const PLUGIN_NAME: &str = "fluentd-async";

/// Default log filter expression used by the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression used by the daemon.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the daemon.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Computes the socket the plugin host listens on by default.
#[must_use]
pub fn default_plugin_socket() -> SocketEndpoint {
    SocketEndpoint::unix(format!("{PLUGIN_SOCKET_DIRECTORY}/{PLUGIN_NAME}.sock"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_socket_lives_in_docker_plugin_directory() {
        assert_eq!(
            default_plugin_socket().to_string(),
            "unix:///run/docker/plugins/fluentd-async.sock"
        );
    }
}
