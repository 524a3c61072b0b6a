//! Application configuration
//!
//! Settings are read from `<config dir>/pgdm/config.toml` when it exists and
//! fall back to defaults otherwise. Connection settings can be overridden by
//! `PGDM_DATABASE_URL` / `DATABASE_URL` (a `.env` file is honoured) and then by
//! command-line flags.

pub mod tables;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub use tables::{
    DeleteColumnType, TableConfig, TableConfigOverride, TableConfigRecord, TableConfigSet,
};

/// Default number of rows combined into one statement
pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub connection: ConnectionConfig,
    pub schema: SchemaConfig,
    pub apply: ApplyConfig,
}

/// PostgreSQL connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Full connection URL; takes precedence over the individual fields
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub database: Option<String>,
    pub password: Option<String>,
}

/// Names of the bookkeeping tables and columns
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Source registry table (name, target, revision)
    pub registry_table: String,
    /// Table config store (name, target, primary_key, delete_target_is_view)
    pub table_config_table: String,
    /// Optional keyed overrides (table_name, key, value)
    pub table_overrides_table: Option<String>,
    /// Column tagging every stored row with its source name
    pub source_column: String,
}

/// Statement execution settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApplyConfig {
    pub batch_size: usize,
    /// Keep executing after a failed statement to report every error.
    /// The transaction is still rolled back.
    pub continue_on_error: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            user: None,
            database: None,
            password: None,
        }
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            registry_table: "source".to_string(),
            table_config_table: "tables".to_string(),
            table_overrides_table: None,
            source_column: "source_name".to_string(),
        }
    }
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            continue_on_error: false,
        }
    }
}

impl AppConfig {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pgdm").join("config.toml"))
    }

    /// Load configuration from `path`, or from the default location.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    log::debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        // A missing .env file is fine
        let _ = dotenvy::dotenv();
        if let Some(url) = std::env::var("PGDM_DATABASE_URL")
            .ok()
            .or_else(|| std::env::var("DATABASE_URL").ok())
        {
            config.connection.url = Some(url);
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.apply.batch_size == 0 {
            anyhow::bail!("apply.batch_size must be at least 1");
        }
        if self.schema.source_column.trim().is_empty() {
            anyhow::bail!("schema.source_column must not be empty");
        }
        Ok(())
    }
}
