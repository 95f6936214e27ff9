//! Configuration management for the edge agent
//!
//! Precedence is env > TOML file > default.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::events::DEFAULT_CHANNEL_CAPACITY;
use crate::{Error, Result};

/// Default API port
pub const DEFAULT_PORT: u16 = 8510;

/// Default catalog call timeout
pub const DEFAULT_CATALOG_TIMEOUT: Duration = Duration::from_secs(20);

/// Edge agent configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to data directory (database)
    pub data_dir: PathBuf,

    /// HTTP API server configuration
    pub api_server: ApiServerConfig,

    /// Where microservice and pattern definitions come from
    pub catalog: CatalogConfig,

    /// Policy change event forwarding
    pub events: EventsConfig,
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port to listen on
    pub port: u16,

    /// API key for management endpoints (from `EDGE_AGENT_API_KEY` env)
    pub api_key: Option<String>,
}

/// Catalog configuration
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Exchange base URL
    pub url: Option<Url>,

    /// Local catalog file, used when no URL is set
    pub file: Option<PathBuf>,

    /// Bound on every catalog call
    pub timeout: Duration,
}

/// Event forwarding configuration
#[derive(Debug, Clone)]
pub struct EventsConfig {
    pub webhook_url: Option<Url>,
    pub channel_capacity: usize,
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a configured URL is invalid
    pub fn load() -> Result<Self> {
        let config = Self::from_sources(file::load_config_file(), |key| std::env::var(key).ok())?;

        if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
            tracing::warn!(
                path = %config.data_dir.display(),
                error = %e,
                "failed to create data directory"
            );
        }

        Ok(config)
    }

    /// Resolve configuration from a parsed file and an env lookup
    ///
    /// # Errors
    ///
    /// Returns error if a configured URL is invalid
    pub fn from_sources<F>(fc: file::AgentConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Data directory (~/.local/share/edge-agent on Linux)
        let data_dir = env("EDGE_AGENT_DATA_DIR")
            .or(fc.data_dir)
            .map_or_else(default_data_dir, PathBuf::from);

        let api_server = ApiServerConfig {
            port: env("EDGE_AGENT_PORT")
                .and_then(|s| s.parse().ok())
                .or(fc.server.port)
                .unwrap_or(DEFAULT_PORT),
            api_key: env("EDGE_AGENT_API_KEY")
                .or(fc.server.api_key)
                .filter(|k| !k.is_empty()),
        };

        let catalog = CatalogConfig {
            url: env("EDGE_AGENT_CATALOG_URL")
                .or(fc.catalog.url)
                .map(|u| parse_url("catalog url", &u))
                .transpose()?,
            file: env("EDGE_AGENT_CATALOG_FILE")
                .or(fc.catalog.file)
                .map(PathBuf::from),
            timeout: env("EDGE_AGENT_CATALOG_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .or(fc.catalog.timeout_secs)
                .map_or(DEFAULT_CATALOG_TIMEOUT, Duration::from_secs),
        };

        let events = EventsConfig {
            webhook_url: env("EDGE_AGENT_EVENTS_WEBHOOK")
                .or(fc.events.webhook_url)
                .map(|u| parse_url("events webhook url", &u))
                .transpose()?,
            channel_capacity: fc
                .events
                .channel_capacity
                .filter(|&c| c > 0)
                .unwrap_or(DEFAULT_CHANNEL_CAPACITY),
        };

        Ok(Self {
            data_dir,
            api_server,
            catalog,
            events,
        })
    }

    /// Path of the agent database
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("edge-agent.db")
    }
}

fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("edge-agent"))
}

fn parse_url(what: &str, raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| Error::Config(format!("invalid {what} '{raw}': {e}")))
}
