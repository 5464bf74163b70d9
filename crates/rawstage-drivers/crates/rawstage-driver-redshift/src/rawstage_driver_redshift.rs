//! Amazon Redshift driver for Rawstage
//!
//! Redshift speaks the Postgres wire protocol, so the connection is built on
//! tokio-postgres. The dialect-specific part lives in `RedshiftSqlOperations`:
//! SUPER-typed staging tables, `JSON_PARSE` bulk inserts, payload size checks
//! and the one-time VARCHAR to SUPER migration of legacy staging tables.

mod connection;
mod driver;
mod migration;
mod operations;
mod tls;
mod validator;

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod driver_tests;
#[cfg(test)]
mod migration_tests;
#[cfg(test)]
mod operations_tests;

pub use connection::RedshiftConnection;
pub use driver::RedshiftDriver;
pub use migration::{LegacyColumnMigrator, discovery_query, migration_statements};
pub use operations::RedshiftSqlOperations;
pub use tls::{RedshiftTlsConnector, TlsError};
pub use validator::{PayloadRejection, PayloadValidator, REDSHIFT_LIMITS, REDSHIFT_SUPER_MAX_BYTE_SIZE, REDSHIFT_VARCHAR_MAX_BYTE_SIZE};
