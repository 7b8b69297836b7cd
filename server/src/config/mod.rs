//! Configuration module for the dockweb server
//!
//! Supports configuration via:
//! - TOML/YAML config files
//! - Environment variables (DOCKWEB__ prefix, `__` between nested keys)

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::relay::RelayLimits;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for the JSON log file (stdout only when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Engine API address, e.g. unix:///run/podman/podman.sock
    #[serde(default)]
    pub docker_host: Option<String>,

    /// Browser origins allowed to call the API and open log streams
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// Seconds to wait for relay sessions to close on shutdown
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,

    /// Timeout for REST requests in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum REST request body size in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Log relay settings
    #[serde(default)]
    pub relay: RelayConfig,
}

/// Log relay settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Bytes per source read (and so per frame)
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// Chunks buffered between reading and writing
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Per-frame write deadline in seconds
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,

    /// Maximum client silence in seconds
    #[serde(default = "default_liveness_deadline")]
    pub liveness_deadline_secs: u64,

    /// Heartbeat ping period in seconds
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Liveness check period in seconds
    #[serde(default = "default_liveness_check_interval")]
    pub liveness_check_interval_secs: u64,

    /// Largest accepted client message in bytes
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_shutdown_grace() -> u64 {
    20
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    8 << 20
}

fn default_read_buffer_size() -> usize {
    2048
}

fn default_channel_capacity() -> usize {
    8
}

fn default_write_timeout() -> u64 {
    10
}

fn default_liveness_deadline() -> u64 {
    60
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_liveness_check_interval() -> u64 {
    5
}

fn default_max_message_bytes() -> usize {
    512 * 1024
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: default_read_buffer_size(),
            channel_capacity: default_channel_capacity(),
            write_timeout_secs: default_write_timeout(),
            liveness_deadline_secs: default_liveness_deadline(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            liveness_check_interval_secs: default_liveness_check_interval(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

impl RelayConfig {
    /// Per-session limits derived from these settings
    pub fn limits(&self) -> RelayLimits {
        RelayLimits {
            read_buffer_size: self.read_buffer_size,
            channel_capacity: self.channel_capacity,
            write_timeout: Duration::from_secs(self.write_timeout_secs),
            liveness_deadline: Duration::from_secs(self.liveness_deadline_secs),
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            liveness_check_interval: Duration::from_secs(self.liveness_check_interval_secs),
            max_message_bytes: self.max_message_bytes,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_dir: None,
            docker_host: None,
            allowed_origins: default_allowed_origins(),
            shutdown_grace_secs: default_shutdown_grace(),
            request_timeout_secs: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
            relay: RelayConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        // Try to load .env file if present
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            // Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // Load from config file if present
            .add_source(config::File::with_name("config/dockweb").required(false))
            .add_source(config::File::with_name("/etc/dockweb/config").required(false))
            // Override with environment variables (DOCKWEB__ prefix)
            .add_source(
                config::Environment::with_prefix("DOCKWEB")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("allowed_origins")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("Port cannot be 0");
        }

        if self.allowed_origins.is_empty() {
            anyhow::bail!("At least one allowed origin is required (use \"*\" to allow any)");
        }

        let relay = &self.relay;
        if relay.read_buffer_size == 0 {
            anyhow::bail!("Relay read buffer size cannot be 0");
        }

        if relay.channel_capacity == 0 {
            anyhow::bail!("Relay channel capacity cannot be 0");
        }

        if relay.write_timeout_secs == 0 {
            anyhow::bail!("Relay write timeout cannot be 0");
        }

        if relay.liveness_check_interval_secs == 0 {
            anyhow::bail!("Liveness check interval cannot be 0");
        }

        if relay.heartbeat_interval_secs == 0
            || relay.heartbeat_interval_secs >= relay.liveness_deadline_secs
        {
            anyhow::bail!("Heartbeat interval must be non-zero and shorter than the liveness deadline");
        }

        Ok(())
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.allowed_origins, vec!["http://localhost:3000"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_relay_limits() {
        let limits = RelayConfig::default().limits();
        assert_eq!(limits, RelayLimits::default());
        assert_eq!(limits.write_timeout, Duration::from_secs(10));
        assert_eq!(limits.liveness_deadline, Duration::from_secs(60));
        assert_eq!(limits.max_message_bytes, 524_288);
    }

    #[test]
    fn test_validation() {
        let config = AppConfig {
            port: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AppConfig {
            allowed_origins: vec![],
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_heartbeat_must_beat_the_deadline() {
        let config = AppConfig {
            relay: RelayConfig {
                heartbeat_interval_secs: 60,
                ..RelayConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
