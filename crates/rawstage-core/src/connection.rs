//! Connection trait and transaction handling

use crate::{QueryResult, Result, StatementResult, Value};
use async_trait::async_trait;

/// A database connection
///
/// Implementations own a single session. Callers run validation, inserts and
/// the close-time migration sequentially on one connection; nothing here
/// guards concurrent use of the same staging table.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "redshift")
    fn driver_name(&self) -> &str;

    /// Execute a single statement that modifies data or schema, with bound
    /// parameters (`$1`, `$2`, ...)
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;

    /// Execute a query that returns rows
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Execute several `;`-separated statements in one round trip.
    ///
    /// No parameters can be bound here, so only structural SQL built from
    /// validated identifiers may be passed.
    async fn execute_batch(&self, sql: &str) -> Result<()>;

    /// Begin a transaction
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}

/// A database transaction
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;

    /// Execute a query within the transaction
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Execute a statement within the transaction
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;
}
