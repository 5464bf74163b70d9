//! Error types for Rawstage

use thiserror::Error;

/// Core error type for Rawstage operations
#[derive(Error, Debug)]
pub enum RawstageError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    /// The catalog query that looks for legacy tables failed.
    #[error("Discovery error in schema {schema}: {message}")]
    Discovery { schema: String, message: String },

    /// Rewriting legacy tables failed. `migrated` tables were already
    /// committed before the failure.
    #[error("Migration error on {table} ({migrated} table(s) already migrated): {message}")]
    Migration {
        table: String,
        migrated: usize,
        message: String,
    },

    #[error("Invalid identifier {identifier:?}: {reason}")]
    InvalidIdentifier { identifier: String, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Security error: {0}")]
    Security(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Not supported: {0}")]
    NotSupported(String),
}

/// Result type alias for Rawstage operations
pub type Result<T> = std::result::Result<T, RawstageError>;
