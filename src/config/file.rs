//! TOML configuration file loading
//!
//! Supports `~/.config/edge-agent/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct AgentConfigFile {
    /// Directory holding the agent database
    #[serde(default)]
    pub data_dir: Option<String>,

    /// HTTP API server configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Catalog configuration
    #[serde(default)]
    pub catalog: CatalogFileConfig,

    /// Event forwarding configuration
    #[serde(default)]
    pub events: EventsFileConfig,
}

/// Server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// API server port
    pub port: Option<u16>,

    /// Bearer key required on the management API
    pub api_key: Option<String>,
}

/// Catalog configuration
#[derive(Debug, Default, Deserialize)]
pub struct CatalogFileConfig {
    /// Exchange base URL
    pub url: Option<String>,

    /// Local catalog JSON file
    pub file: Option<String>,

    /// Per-call timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Event forwarding configuration
#[derive(Debug, Default, Deserialize)]
pub struct EventsFileConfig {
    /// Webhook receiving policy change events
    pub webhook_url: Option<String>,

    /// Capacity of the in-process event channel
    pub channel_capacity: Option<usize>,
}

/// Load the TOML config file from the standard path
///
/// Returns `AgentConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> AgentConfigFile {
    config_file_path().map_or_else(AgentConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from an explicit path
pub fn load_from(path: &Path) -> AgentConfigFile {
    if !path.exists() {
        return AgentConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                AgentConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            AgentConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/edge-agent/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("edge-agent").join("config.toml"))
}
