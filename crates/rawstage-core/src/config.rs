//! Loader configuration
//!
//! A `LoaderConfig` is read from TOML:
//!
//! ```toml
//! dialect = "redshift"
//!
//! [connection]
//! host = "examplecluster.abc123.us-west-2.redshift.amazonaws.com"
//! port = 5439
//! database = "dev"
//! username = "loader"
//! password = "secret"
//!
//! [connection.tls]
//! mode = "require"
//!
//! [limits]
//! max_payload_bytes = 1000000
//! max_string_bytes = 65535
//!
//! [migration]
//! strategy = "per_table"
//! ```

use crate::naming::DEFAULT_RAW_TABLE_MARKER;
use crate::{RawstageError, Result, TlsConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Byte-size ceilings enforced on every payload before insertion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeLimits {
    /// Maximum size of the whole serialized payload
    pub max_payload_bytes: usize,
    /// Maximum size of any single string value nested in the payload
    pub max_string_bytes: usize,
}

impl SizeLimits {
    pub const fn new(max_payload_bytes: usize, max_string_bytes: usize) -> Self {
        Self {
            max_payload_bytes,
            max_string_bytes,
        }
    }
}

/// How legacy tables are rewritten at destination close
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStrategy {
    /// One transaction per table. A failure rolls back only that table.
    #[default]
    PerTable,
    /// Every table's statements concatenated into one batch.
    Combined,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationConfig {
    #[serde(default)]
    pub strategy: MigrationStrategy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Substring that identifies raw staging tables during discovery
    #[serde(default = "default_raw_table_marker")]
    pub raw_table_marker: String,
}

fn default_raw_table_marker() -> String {
    DEFAULT_RAW_TABLE_MARKER.to_string()
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            raw_table_marker: default_raw_table_marker(),
        }
    }
}

/// Connection configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Host address
    #[serde(default)]
    pub host: String,
    /// Port number (0 for the driver default)
    #[serde(default)]
    pub port: u16,
    /// Database name
    #[serde(default)]
    pub database: Option<String>,
    /// Username
    #[serde(default)]
    pub username: Option<String>,
    /// Password
    #[serde(default)]
    pub password: Option<String>,
    /// TLS settings
    #[serde(default)]
    pub tls: TlsConfig,
    /// Additional connection parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl ConnectionConfig {
    /// Create a configuration for a host and database
    pub fn new(host: &str, port: u16, database: &str, username: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            database: Some(database.to_string()),
            username: Some(username.to_string()),
            ..Self::default()
        }
    }

    /// Set a connection parameter
    pub fn with_param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        let str_val = match value.into() {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        self.params.insert(key.to_string(), str_val);
        self
    }

    /// Get a string parameter
    pub fn get_string(&self, key: &str) -> Option<String> {
        if let Some(val) = self.params.get(key) {
            return Some(val.clone());
        }
        match key {
            "host" if !self.host.is_empty() => Some(self.host.clone()),
            "database" => self.database.clone(),
            "username" | "user" => self.username.clone(),
            "password" => self.password.clone(),
            _ => None,
        }
    }
}

/// Top-level loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Dialect that selects the `SqlOperations` implementation
    #[serde(default = "default_dialect")]
    pub dialect: String,
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Overrides the dialect's default size limits
    #[serde(default)]
    pub limits: Option<SizeLimits>,
    #[serde(default)]
    pub staging: StagingConfig,
    #[serde(default)]
    pub migration: MigrationConfig,
}

fn default_dialect() -> String {
    "redshift".to_string()
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            dialect: default_dialect(),
            connection: ConnectionConfig::default(),
            limits: None,
            staging: StagingConfig::default(),
            migration: MigrationConfig::default(),
        }
    }
}

impl LoaderConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "loading loader configuration");
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dialect.trim().is_empty() {
            return Err(RawstageError::Configuration(
                "dialect cannot be empty".to_string(),
            ));
        }

        if let Some(limits) = &self.limits {
            if limits.max_payload_bytes == 0 || limits.max_string_bytes == 0 {
                return Err(RawstageError::Configuration(
                    "size limits must be greater than zero".to_string(),
                ));
            }
            if limits.max_string_bytes > limits.max_payload_bytes {
                return Err(RawstageError::Configuration(format!(
                    "max_string_bytes ({}) cannot exceed max_payload_bytes ({})",
                    limits.max_string_bytes, limits.max_payload_bytes
                )));
            }
        }

        // The marker ends up inside a LIKE pattern, keep it to identifier characters
        crate::validate_identifier(&self.staging.raw_table_marker).map_err(|e| {
            RawstageError::Configuration(format!("invalid raw_table_marker: {}", e))
        })?;

        self.connection.tls.validate()
    }
}
