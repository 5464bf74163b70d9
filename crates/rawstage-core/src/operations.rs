//! Per-dialect SQL operations
//!
//! `SqlOperations` is the capability interface each warehouse dialect
//! implements: staging DDL, the bulk insert statement, payload validation
//! and the close-time legacy column migration. The provided methods run the
//! generated SQL against a `Connection`.

use crate::{Connection, LegacyTableDescriptor, Record, Result, SizeLimits, Value};
use async_trait::async_trait;
use std::borrow::Cow;
use std::collections::BTreeSet;

/// Bind parameters the Postgres wire protocol allows in one statement
pub const MAX_BIND_PARAMETERS: usize = 65_535;

/// Parameters bound per staging row: id, data, emitted_at
pub const PARAMS_PER_ROW: usize = 3;

/// Most rows a single multi-row INSERT can carry
pub const MAX_ROWS_PER_STATEMENT: usize = MAX_BIND_PARAMETERS / PARAMS_PER_ROW;

/// A multi-row INSERT with its bound parameters
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    /// SQL text containing only placeholders for data values
    pub sql: String,
    /// One `[id, data, emitted_at]` parameter row per record
    pub rows: Vec<[Value; PARAMS_PER_ROW]>,
}

impl InsertStatement {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Parameters flattened in placeholder order
    pub fn params(&self) -> Vec<Value> {
        self.rows.iter().flat_map(|row| row.iter().cloned()).collect()
    }
}

/// Result of `SqlOperations::insert_records`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Rows the database reported as inserted
    pub inserted: u64,
    /// Records excluded because their payload failed validation
    pub rejected: usize,
    /// INSERT statements executed
    pub statements: usize,
}

/// Result of a close-time legacy column migration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Tables discovery reported as legacy, across all schemas
    pub discovered: Vec<LegacyTableDescriptor>,
    /// Tables rewritten to the semi-structured type
    pub migrated: Vec<LegacyTableDescriptor>,
    /// ALTER/UPDATE statements sent to the database
    pub statements_executed: usize,
}

impl MigrationReport {
    /// True when nothing needed migrating
    pub fn is_noop(&self) -> bool {
        self.discovered.is_empty()
    }
}

/// Run `statements` in order inside one transaction.
///
/// The first failure rolls the transaction back and is returned.
pub async fn execute_in_transaction(conn: &dyn Connection, statements: &[String]) -> Result<()> {
    let tx = conn.begin_transaction().await?;
    for sql in statements {
        if let Err(e) = tx.execute(sql, &[]).await {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!(error = %rollback_err, "rollback after failed statement also failed");
            }
            return Err(e);
        }
    }
    tx.commit().await
}

/// SQL operations for one warehouse dialect
#[async_trait]
pub trait SqlOperations: Send + Sync {
    /// Dialect identifier (e.g., "redshift")
    fn dialect_id(&self) -> &'static str;

    /// Size limits this instance validates payloads against
    fn size_limits(&self) -> SizeLimits;

    /// `CREATE SCHEMA IF NOT EXISTS`
    fn create_schema_statement(&self, schema: &str) -> Result<String>;

    /// Idempotent DDL for a staging table with the three staging columns
    fn create_table_statement(&self, schema: &str, table: &str) -> Result<String>;

    /// `DROP TABLE IF EXISTS`
    fn drop_table_statement(&self, schema: &str, table: &str) -> Result<String>;

    fn truncate_table_statement(&self, schema: &str, table: &str) -> Result<String>;

    /// Copy every row of `source` into `destination`, both in `schema`
    fn copy_table_statement(&self, schema: &str, source: &str, destination: &str)
    -> Result<String>;

    /// Build one INSERT covering every record in `records`
    fn build_insert(&self, schema: &str, table: &str, records: &[Record])
    -> Result<InsertStatement>;

    /// Check a payload against the dialect's size limits
    fn is_valid_payload(&self, payload: &serde_json::Value) -> bool;

    async fn create_schema_if_not_exists(&self, conn: &dyn Connection, schema: &str) -> Result<()> {
        let sql = self.create_schema_statement(schema)?;
        conn.execute(&sql, &[]).await?;
        Ok(())
    }

    async fn create_table_if_not_exists(
        &self,
        conn: &dyn Connection,
        schema: &str,
        table: &str,
    ) -> Result<()> {
        let sql = self.create_table_statement(schema, table)?;
        conn.execute(&sql, &[]).await?;
        Ok(())
    }

    async fn drop_table_if_exists(
        &self,
        conn: &dyn Connection,
        schema: &str,
        table: &str,
    ) -> Result<()> {
        let sql = self.drop_table_statement(schema, table)?;
        conn.execute(&sql, &[]).await?;
        Ok(())
    }

    /// Run `statements` in order inside one transaction
    async fn execute_transaction(&self, conn: &dyn Connection, statements: &[String]) -> Result<()> {
        execute_in_transaction(conn, statements).await
    }

    /// Validate `records` and insert the accepted ones into `schema.table`.
    ///
    /// Rejected payloads are logged and counted, never inserted. Accepted
    /// records go out as a single statement unless they exceed the
    /// protocol's parameter ceiling, in which case consecutive chunks of
    /// `MAX_ROWS_PER_STATEMENT` rows are sent. Any execution failure is
    /// returned as is.
    #[tracing::instrument(skip(self, conn, records), fields(dialect = self.dialect_id(), record_count = records.len()))]
    async fn insert_records(
        &self,
        conn: &dyn Connection,
        records: &[Record],
        schema: &str,
        table: &str,
    ) -> Result<InsertOutcome> {
        if records.is_empty() {
            return Ok(InsertOutcome::default());
        }

        let verdicts: Vec<bool> = records
            .iter()
            .map(|record| self.is_valid_payload(&record.data))
            .collect();
        let rejected = verdicts.iter().filter(|valid| !**valid).count();

        let accepted: Cow<'_, [Record]> = if rejected == 0 {
            Cow::Borrowed(records)
        } else {
            for (record, _) in records.iter().zip(&verdicts).filter(|(_, valid)| !**valid) {
                tracing::warn!(
                    record_id = %record.id,
                    schema = %schema,
                    table = %table,
                    "payload exceeds size limits, record excluded from batch"
                );
            }
            Cow::Owned(
                records
                    .iter()
                    .zip(&verdicts)
                    .filter(|(_, valid)| **valid)
                    .map(|(record, _)| record.clone())
                    .collect(),
            )
        };

        let mut outcome = InsertOutcome {
            rejected,
            ..InsertOutcome::default()
        };

        for chunk in accepted.chunks(MAX_ROWS_PER_STATEMENT) {
            let statement = self.build_insert(schema, table, chunk)?;
            let result = conn.execute(&statement.sql, &statement.params()).await?;
            outcome.inserted += result.affected_rows;
            outcome.statements += 1;
        }

        tracing::info!(
            schema = %schema,
            table = %table,
            inserted = outcome.inserted,
            rejected = outcome.rejected,
            statements = outcome.statements,
            "batch inserted"
        );
        Ok(outcome)
    }

    /// Rewrite staging tables in `schemas` that predate the dialect's
    /// current column types. Dialects without legacy tables keep the no-op.
    async fn run_legacy_migration(
        &self,
        _conn: &dyn Connection,
        _schemas: &BTreeSet<String>,
    ) -> Result<MigrationReport> {
        Ok(MigrationReport::default())
    }

    /// Post-processing run once when the destination closes
    async fn on_destination_close(
        &self,
        conn: &dyn Connection,
        schemas: &BTreeSet<String>,
    ) -> Result<MigrationReport> {
        self.run_legacy_migration(conn, schemas).await
    }
}
