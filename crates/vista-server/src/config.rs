//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use vista_settings::ServerSettings;

/// Configuration for the bridge server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Path of the observer endpoint.
    pub api_path: String,
    /// Outbound frames queued per connection.
    pub max_send_queue: usize,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close a client silent for this many seconds.
    pub client_timeout_secs: u64,
    /// Outbound call timeout in milliseconds.
    pub rpc_timeout_ms: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            api_path: settings.api_path.clone(),
            max_send_queue: settings.max_send_queue,
            heartbeat_interval_secs: settings.heartbeat_interval_secs,
            client_timeout_secs: settings.client_timeout_secs,
            rpc_timeout_ms: settings.rpc_timeout_ms,
            max_message_size: settings.max_message_size,
        }
    }

    /// Heartbeat interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Silence after which a client is dropped.
    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }

    /// Outbound call timeout.
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            ..Self::from_settings(&ServerSettings::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_zero() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.api_path, "/__vista_api__");
    }

    #[test]
    fn durations() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(cfg.client_timeout(), Duration::from_secs(90));
        assert_eq!(cfg.rpc_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn from_settings_copies_every_field() {
        let settings = ServerSettings {
            host: "0.0.0.0".into(),
            port: 8080,
            api_path: "/api".into(),
            max_send_queue: 8,
            heartbeat_interval_secs: 5,
            client_timeout_secs: 15,
            rpc_timeout_ms: 250,
            max_message_size: 1024,
        };
        let cfg = ServerConfig::from_settings(&settings);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.api_path, "/api");
        assert_eq!(cfg.max_send_queue, 8);
        assert_eq!(cfg.rpc_timeout(), Duration::from_millis(250));
        assert_eq!(cfg.max_message_size, 1024);
    }
}
