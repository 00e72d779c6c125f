//! Settings types.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VistaSettings {
    /// Listener and connection settings.
    pub server: ServerSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl VistaSettings {
    /// Reject combinations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.server.api_path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "apiPath must start with '/', got '{}'",
                self.server.api_path
            )));
        }
        if self.server.max_send_queue == 0 {
            return Err(SettingsError::InvalidValue(
                "maxSendQueue must be at least 1".into(),
            ));
        }
        if self.server.client_timeout_secs <= self.server.heartbeat_interval_secs {
            return Err(SettingsError::InvalidValue(format!(
                "clientTimeoutSecs ({}) must exceed heartbeatIntervalSecs ({})",
                self.server.client_timeout_secs, self.server.heartbeat_interval_secs
            )));
        }
        Ok(())
    }
}

/// Listener and connection settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Path observers connect to.
    pub api_path: String,
    /// Outbound frames queued per connection before new ones are dropped.
    pub max_send_queue: usize,
    /// Seconds between pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds of silence after which a client is disconnected.
    pub client_timeout_secs: u64,
    /// Milliseconds an outbound call waits for its response.
    pub rpc_timeout_ms: u64,
    /// Largest accepted inbound message in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 51204,
            api_path: "/__vista_api__".to_string(),
            max_send_queue: 1024,
            heartbeat_interval_secs: 30,
            client_timeout_secs: 90,
            rpc_timeout_ms: 60_000,
            max_message_size: 64 * 1024 * 1024,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
