//! Redshift driver implementation

use async_trait::async_trait;
use rawstage_core::{
    Connection, ConnectionConfig, DatabaseDriver, DriverCapabilities, LoaderConfig, RawstageError,
    Result, SqlOperations,
};
use std::sync::Arc;

use crate::connection::DEFAULT_PORT;
use crate::tls::build_tls_params;
use crate::{RedshiftConnection, RedshiftSqlOperations};

/// Amazon Redshift driver
pub struct RedshiftDriver;

impl RedshiftDriver {
    pub fn new() -> Self {
        tracing::debug!("Redshift driver initialized");
        Self
    }
}

impl Default for RedshiftDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for RedshiftDriver {
    fn name(&self) -> &'static str {
        "redshift"
    }

    fn display_name(&self) -> &'static str {
        "Amazon Redshift"
    }

    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities {
            supports_transactional_ddl: true,
            supports_multiple_statements: true,
            supports_semi_structured: true,
            supports_ssl: true,
            max_identifier_length: Some(127),
            max_parameters: Some(65535),
        }
    }

    fn default_port(&self) -> Option<u16> {
        Some(DEFAULT_PORT)
    }

    fn sql_operations(&self, config: &LoaderConfig) -> Arc<dyn SqlOperations> {
        Arc::new(RedshiftSqlOperations::from_config(config))
    }

    #[tracing::instrument(skip(self, config), fields(host = %config.host, database = config.database.as_deref()))]
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        let conn = RedshiftConnection::connect(config).await.map_err(|e| {
            tracing::error!(error = %e, "failed to connect to Redshift cluster");
            match e {
                RawstageError::Connection(_) | RawstageError::Configuration(_) | RawstageError::Security(_) => e,
                other => RawstageError::Connection(other.to_string()),
            }
        })?;

        Ok(Arc::new(conn))
    }

    /// libpq-style connection string, password omitted
    fn build_connection_string(&self, config: &ConnectionConfig) -> String {
        let host = config
            .get_string("host")
            .unwrap_or_else(|| "localhost".to_string());
        let port = if config.port > 0 {
            config.port
        } else {
            DEFAULT_PORT
        };
        let database = config
            .get_string("database")
            .unwrap_or_else(|| "dev".to_string());

        let mut conn_str = format!("host={} port={} dbname={}", host, port, database);
        if let Some(user) = config.get_string("user") {
            conn_str.push_str(&format!(" user={}", user));
        }
        conn_str.push(' ');
        conn_str.push_str(&build_tls_params(&config.tls));

        conn_str
    }
}
