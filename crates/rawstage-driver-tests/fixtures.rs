//! Live test fixtures
//!
//! The cluster comes from `RAWSTAGE_TEST_REDSHIFT_URL`, a libpq-style URL or
//! key=value string. When it is unset, `TestStage::connect` returns
//! `Ok(None)` and tests skip themselves:
//!
//! ```rust,ignore
//! #[rstest]
//! #[tokio::test]
//! async fn test_something(unique_schema: String) -> Result<()> {
//!     let Some(stage) = TestStage::connect(&unique_schema).await? else {
//!         return Ok(());
//!     };
//!     // test code...
//!     stage.cleanup().await
//! }
//! ```

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use rawstage_core::{
    Connection, ConnectionConfig, LoaderConfig, SqlOperations, TlsConfig, TlsMode,
    quote_identifier,
};
use rawstage_drivers::DriverRegistry;
use rstest::fixture;
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use tokio_postgres::config::{Host, SslMode};

/// Environment variable holding the test cluster URL
pub const REDSHIFT_URL_ENV: &str = "RAWSTAGE_TEST_REDSHIFT_URL";

static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("rawstage=debug,info")),
        )
        .with_test_writer()
        .try_init();
});

/// Install the test subscriber once per process
pub fn init_tracing() {
    Lazy::force(&TRACING);
}

/// Turn a libpq-style URL into a connection configuration
pub fn connection_config_from_url(url: &str) -> Result<ConnectionConfig> {
    let pg = tokio_postgres::Config::from_str(url).context("invalid Redshift test URL")?;

    let host = pg
        .get_hosts()
        .iter()
        .find_map(|host| match host {
            Host::Tcp(name) => Some(name.clone()),
            #[allow(unreachable_patterns)]
            _ => None,
        })
        .context("Redshift test URL has no TCP host")?;

    let mut config = ConnectionConfig {
        host,
        port: pg.get_ports().first().copied().unwrap_or(0),
        database: pg.get_dbname().map(str::to_string),
        username: pg.get_user().map(str::to_string),
        password: pg
            .get_password()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned()),
        ..ConnectionConfig::default()
    };

    config.tls = match pg.get_ssl_mode() {
        SslMode::Disable => TlsConfig::disabled(),
        SslMode::Prefer => TlsConfig::new(TlsMode::Prefer),
        _ => TlsConfig::new(TlsMode::Require),
    };
    config = config.with_param("application_name", "rawstage-driver-tests");
    if let Some(timeout) = pg.get_connect_timeout() {
        config = config.with_param("connect_timeout", timeout.as_secs());
    }

    Ok(config)
}

/// Loader configuration for the test cluster, if one is configured
pub fn redshift_config() -> Result<Option<LoaderConfig>> {
    let Ok(url) = env::var(REDSHIFT_URL_ENV) else {
        return Ok(None);
    };

    let config = LoaderConfig {
        connection: connection_config_from_url(&url)?,
        ..LoaderConfig::default()
    };
    config.validate()?;
    Ok(Some(config))
}

/// Fresh schema name per test
#[fixture]
pub fn unique_schema() -> String {
    format!("rawstage_test_{}", uuid::Uuid::new_v4().simple())
}

/// A live connection, the Redshift operations and a private schema
pub struct TestStage {
    /// Open cluster connection
    pub conn: Arc<dyn Connection>,
    /// Operations selected from the loader configuration
    pub ops: Arc<dyn SqlOperations>,
    /// Schema owned by this test
    pub schema: String,
}

impl TestStage {
    /// Connect and create `schema`, or `None` when no cluster is configured
    pub async fn connect(schema: &str) -> Result<Option<Self>> {
        init_tracing();

        let Some(config) = redshift_config()? else {
            tracing::info!("{} not set, skipping live Redshift test", REDSHIFT_URL_ENV);
            return Ok(None);
        };

        let registry = DriverRegistry::with_defaults();
        let driver = registry.driver_for(&config.dialect)?;
        let conn = driver
            .connect(&config.connection)
            .await
            .context("failed to connect to the test cluster")?;
        let ops = driver.sql_operations(&config);

        ops.create_schema_if_not_exists(conn.as_ref(), schema).await?;

        Ok(Some(Self {
            conn,
            ops,
            schema: schema.to_string(),
        }))
    }

    /// Count the rows of a table in the test schema
    pub async fn row_count(&self, table: &str) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) AS count FROM {}",
            rawstage_core::qualified_name(&self.schema, table)?
        );
        let result = self.conn.query(&sql, &[]).await?;
        result
            .rows
            .first()
            .and_then(|row| row.get_by_name("count"))
            .and_then(|value| value.as_i64())
            .context("COUNT(*) returned no value")
    }

    /// Drop the test schema and everything in it
    pub async fn cleanup(self) -> Result<()> {
        let sql = format!("DROP SCHEMA IF EXISTS {} CASCADE", quote_identifier(&self.schema)?);
        self.conn.execute(&sql, &[]).await?;
        self.conn.close().await?;
        Ok(())
    }
}
