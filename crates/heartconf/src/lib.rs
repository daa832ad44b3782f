//! Minimal configuration loading for heartlight.
//!
//! # Configuration Philosophy
//!
//! Configuration is split into two categories:
//!
//! - **Infrastructure** (`InfraConfig`): things fixed for the life of the
//!   process - the ingestion bind address, the lighting console target,
//!   telemetry.
//!
//! - **Bootstrap** (`BootstrapConfig`): values that seed the pipeline - buffer
//!   sizes, gating, fixture lists, mapping ranges. After startup the pipeline
//!   state is the source of truth.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins, tables are merged key by key):
//! 1. `/etc/heartlight/config.toml` (system)
//! 2. `~/.config/heartlight/config.toml` (user)
//! 3. `./heartlight.toml` or the path given on the command line
//! 4. Environment variables (`HEARTLIGHT_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [ingest]
//! bind = "127.0.0.1:13000"
//! addresses = ["/aud", "/brs", "/conductor", "/vn1"]
//!
//! [console]
//! target = "10.101.90.103:12000"
//!
//! [telemetry]
//! log_level = "debug"
//!
//! [bootstrap.buffers]
//! capacity = 2560
//! sample_rate = 256
//!
//! [bootstrap.lighting]
//! fixtures = [101, 102, 103, 104, 105, 106]
//! anchors = [101, 103, 106]
//! ```

pub mod bootstrap;
pub mod infra;
pub mod loader;

pub use bootstrap::{
    BootstrapConfig, BuffersConfig, GatingConfig, LightingConfig, MappingConfig, TriggerConfig,
};
pub use infra::{ConsoleConfig, InfraConfig, IngestConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete heartlight configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HeartConfig {
    /// Infrastructure - fixed for the life of the process.
    #[serde(flatten)]
    pub infra: InfraConfig,

    /// Bootstrap - seeds pipeline state.
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

impl HeartConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration with an explicit file taking the place of
    /// `./heartlight.toml`. System and user configs still load first.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and report where values came from.
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in loader::discover_config_files_with_override(config_path) {
            let table = loader::load_table(&path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path);
        }

        let mut config = loader::from_table(merged)?;
        loader::apply_env_overrides(&mut config, &mut sources);
        config.validate()?;

        Ok((config, sources))
    }

    /// Check cross-field invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bootstrap.buffers.capacity == 0 {
            return Err(ConfigError::Invalid(
                "bootstrap.buffers.capacity must be at least 1".to_string(),
            ));
        }
        self.infra.ingest.bind_addr()?;
        if self.infra.ingest.addresses.is_empty() {
            return Err(ConfigError::Invalid(
                "ingest.addresses must name at least one channel".to_string(),
            ));
        }
        let lighting = &self.bootstrap.lighting;
        if lighting.fixtures.is_empty() {
            return Err(ConfigError::Invalid(
                "bootstrap.lighting.fixtures must not be empty".to_string(),
            ));
        }
        if let Some(missing) = lighting
            .anchors
            .iter()
            .find(|id| !lighting.fixtures.contains(id))
        {
            return Err(ConfigError::Invalid(format!(
                "anchor {missing} is not in bootstrap.lighting.fixtures"
            )));
        }
        if self.bootstrap.mapping.low >= self.bootstrap.mapping.high {
            return Err(ConfigError::Invalid(
                "bootstrap.mapping.low must be below bootstrap.mapping.high".to_string(),
            ));
        }
        Ok(())
    }

    /// Serialize the effective config to a TOML string.
    pub fn to_toml(&self) -> String {
        let body = toml::to_string_pretty(self).unwrap_or_default();
        format!("# heartlight configuration\n\n{body}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HeartConfig::default();
        assert_eq!(config.infra.ingest.bind, "127.0.0.1:13000");
        assert_eq!(config.bootstrap.buffers.sample_rate, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_to_toml() {
        let config = HeartConfig::default();
        let toml = config.to_toml();
        assert!(toml.contains("[ingest]"));
        assert!(toml.contains("[telemetry]"));
        assert!(toml.contains("[bootstrap.lighting]"));
    }

    #[test]
    fn test_to_toml_roundtrips_through_loader() {
        let config = HeartConfig::default();
        let rendered = config.to_toml();
        let table: toml::Table = rendered.parse().unwrap();
        let parsed = loader::from_table(table).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_validate_rejects_unknown_anchor() {
        let mut config = HeartConfig::default();
        config.bootstrap.lighting.anchors.push(9999);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("9999"));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = HeartConfig::default();
        config.bootstrap.buffers.capacity = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_bad_bind() {
        let mut config = HeartConfig::default();
        config.infra.ingest.bind = "not-an-address".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ingest.bind"));
    }

    #[test]
    fn test_validate_rejects_inverted_mapping_range() {
        let mut config = HeartConfig::default();
        config.bootstrap.mapping.low = 120.0;
        config.bootstrap.mapping.high = 60.0;
        assert!(config.validate().is_err());
    }
}
