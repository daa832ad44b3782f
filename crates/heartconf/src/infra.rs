//! Infrastructure configuration - things that cannot change at runtime.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Where samples arrive from.
///
/// The ingestion transport itself lives outside the pipeline; this only
/// records what it binds and which channel addresses it routes into buffers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Bind address of the sample transport.
    /// Default: 127.0.0.1:13000
    #[serde(default = "IngestConfig::default_bind")]
    pub bind: String,

    /// Channel addresses; each gets its own sample buffer.
    /// Default: ["/ecg"]
    #[serde(default = "IngestConfig::default_addresses")]
    pub addresses: Vec<String>,
}

impl IngestConfig {
    fn default_bind() -> String {
        "127.0.0.1:13000".to_string()
    }

    fn default_addresses() -> Vec<String> {
        vec!["/ecg".to_string()]
    }

    /// `bind` parsed as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind.parse().map_err(|e| {
            ConfigError::Invalid(format!(
                "ingest.bind {:?} is not a socket address: {e}",
                self.bind
            ))
        })
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bind: Self::default_bind(),
            addresses: Self::default_addresses(),
        }
    }
}

/// Lighting console the protocol adapter sends to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Console address.
    /// Default: 127.0.0.1:12000
    #[serde(default = "ConsoleConfig::default_target")]
    pub target: String,

    /// Message address commands are sent under.
    /// Default: /cmd
    #[serde(default = "ConsoleConfig::default_address")]
    pub address: String,

    /// How often the adapter reads fixture state, in milliseconds.
    /// Default: 40
    #[serde(default = "ConsoleConfig::default_frame_ms")]
    pub frame_ms: u64,
}

impl ConsoleConfig {
    fn default_target() -> String {
        "127.0.0.1:12000".to_string()
    }

    fn default_address() -> String {
        "/cmd".to_string()
    }

    fn default_frame_ms() -> u64 {
        40
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            target: Self::default_target(),
            address: Self::default_address(),
            frame_ms: Self::default_frame_ms(),
        }
    }
}

/// Telemetry and observability configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log filter (trace, debug, info, warn, error, or an EnvFilter directive).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

/// Infrastructure configuration - cannot change at runtime.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InfraConfig {
    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub console: ConsoleConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}
