//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, HeartConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/heartlight/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("heartlight/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("heartlight.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file into a raw table.
pub fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_table(&contents, path)
}

fn parse_table(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    contents
        .parse()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Load a single file as a complete config (defaults fill the gaps).
pub fn load_from_file(path: &Path) -> Result<HeartConfig, ConfigError> {
    let table = load_table(path)?;
    from_table(table).map_err(|e| match e {
        ConfigError::Parse { message, .. } => ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        },
        other => other,
    })
}

/// Deserialize a merged table; missing keys take their defaults.
pub fn from_table(table: toml::Table) -> Result<HeartConfig, ConfigError> {
    toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: PathBuf::from("<merged>"),
            message: e.to_string(),
        })
}

/// Merge `overlay` into `base`. Nested tables merge key by key; any other
/// value in the overlay replaces the base value.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut HeartConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("HEARTLIGHT_INGEST_BIND") {
        config.infra.ingest.bind = v;
        sources.env_overrides.push("HEARTLIGHT_INGEST_BIND".to_string());
    }
    if let Ok(v) = env::var("HEARTLIGHT_INGEST_ADDRESSES") {
        config.infra.ingest.addresses = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        sources
            .env_overrides
            .push("HEARTLIGHT_INGEST_ADDRESSES".to_string());
    }
    if let Ok(v) = env::var("HEARTLIGHT_CONSOLE_TARGET") {
        config.infra.console.target = v;
        sources
            .env_overrides
            .push("HEARTLIGHT_CONSOLE_TARGET".to_string());
    }

    if let Ok(v) = env::var("HEARTLIGHT_LOG_LEVEL") {
        config.infra.telemetry.log_level = v;
        sources.env_overrides.push("HEARTLIGHT_LOG_LEVEL".to_string());
    }
    // Also support RUST_LOG
    if let Ok(v) = env::var("RUST_LOG") {
        config.infra.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }

    if let Ok(v) = env::var("HEARTLIGHT_BUFFER_CAPACITY") {
        if let Ok(capacity) = v.parse() {
            config.bootstrap.buffers.capacity = capacity;
            sources
                .env_overrides
                .push("HEARTLIGHT_BUFFER_CAPACITY".to_string());
        }
    }
    if let Ok(v) = env::var("HEARTLIGHT_SAMPLE_RATE") {
        if let Ok(rate) = v.parse() {
            config.bootstrap.buffers.sample_rate = rate;
            sources.env_overrides.push("HEARTLIGHT_SAMPLE_RATE".to_string());
        }
    }
}
