//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a single HTTP server instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080"). Port 0 asks the OS for a free port.
    pub address: String,

    /// Upper bound for graceful shutdown, in milliseconds.
    ///
    /// Zero means no grace period: connections still open after the stop
    /// signal has been delivered once are aborted.
    pub shutdown_timeout_ms: u64,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Terminate the process when graceful shutdown fails.
    pub exit_on_shutdown_failure: bool,
}

impl ServerConfig {
    /// Address handed to the listener. An empty host (`:8080`) binds every
    /// IPv4 interface; host names are resolved at bind time.
    pub fn bind_address(&self) -> String {
        let address = self.address.trim();
        match address.strip_prefix(':') {
            Some(port) if !port.contains(':') => format!("0.0.0.0:{}", port),
            _ => address.to_string(),
        }
    }

    /// Shutdown grace period as a [`Duration`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8080".to_string(),
            shutdown_timeout_ms: 5_000,
            max_connections: 10_000,
            exit_on_shutdown_failure: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: ServerConfig = toml::from_str(r#"address = "127.0.0.1:9000""#).unwrap();
        assert_eq!(config.address, "127.0.0.1:9000");
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_connections, 10_000);
        assert!(!config.exit_on_shutdown_failure);
    }

    #[test]
    fn empty_host_binds_every_interface() {
        let config = ServerConfig {
            address: ":8080".into(),
            ..ServerConfig::default()
        };
        assert_eq!(config.bind_address(), "0.0.0.0:8080");

        let config = ServerConfig {
            address: " localhost:0 ".into(),
            ..ServerConfig::default()
        };
        assert_eq!(config.bind_address(), "localhost:0");
    }

    #[test]
    fn zero_timeout_is_preserved() {
        let config: ServerConfig = toml::from_str("shutdown_timeout_ms = 0").unwrap();
        assert_eq!(config.shutdown_timeout(), Duration::ZERO);
    }
}
