//! Database driver trait definition

use crate::{Connection, ConnectionConfig, LoaderConfig, Result, SqlOperations};
use async_trait::async_trait;
use std::sync::Arc;

/// Capabilities that a driver may support
#[derive(Debug, Clone, Default)]
pub struct DriverCapabilities {
    /// Supports transactional DDL (ALTER TABLE inside BEGIN/COMMIT)
    pub supports_transactional_ddl: bool,
    /// Supports multiple statements in one round trip
    pub supports_multiple_statements: bool,
    /// Has a semi-structured column type
    pub supports_semi_structured: bool,
    /// Supports SSL/TLS
    pub supports_ssl: bool,
    /// Maximum identifier length (None = no limit)
    pub max_identifier_length: Option<usize>,
    /// Maximum parameters per query (None = no limit)
    pub max_parameters: Option<usize>,
}

/// Core driver trait that every warehouse dialect implements
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Unique identifier for this driver (e.g., "redshift")
    fn name(&self) -> &'static str;

    /// Display name for logs
    fn display_name(&self) -> &'static str {
        self.name()
    }

    /// Supported features/capabilities
    fn capabilities(&self) -> DriverCapabilities;

    /// Default connection port
    fn default_port(&self) -> Option<u16> {
        None
    }

    /// Build the dialect's SQL operations from loader configuration
    fn sql_operations(&self, config: &LoaderConfig) -> Arc<dyn SqlOperations>;

    /// Create a new connection
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>>;

    /// Build a connection string from configuration, password omitted
    fn build_connection_string(&self, config: &ConnectionConfig) -> String;
}
