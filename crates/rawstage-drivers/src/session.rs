//! A staging load against one connection
//!
//! The session remembers every schema it wrote to so the dialect's
//! close-time post-processing covers all of them, and guarantees that
//! post-processing runs at most once.

use crate::registry::DriverRegistry;
use crate::runtime::block_on_tokio;
use rawstage_core::{
    Connection, InsertOutcome, LoaderConfig, MigrationReport, RawstageError, Record, Result,
    SqlOperations,
};
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct StagingSession {
    conn: Arc<dyn Connection>,
    ops: Arc<dyn SqlOperations>,
    touched_schemas: BTreeSet<String>,
    totals: InsertOutcome,
    closed: bool,
}

impl StagingSession {
    pub fn new(conn: Arc<dyn Connection>, ops: Arc<dyn SqlOperations>) -> Self {
        Self {
            conn,
            ops,
            touched_schemas: BTreeSet::new(),
            totals: InsertOutcome::default(),
            closed: false,
        }
    }

    /// Connect with the driver `config.dialect` selects
    pub async fn open(registry: &DriverRegistry, config: &LoaderConfig) -> Result<Self> {
        config.validate()?;
        let driver = registry.driver_for(&config.dialect)?;
        let conn = driver.connect(&config.connection).await?;
        tracing::info!(driver = %driver.display_name(), "staging session opened");
        Ok(Self::new(conn, driver.sql_operations(config)))
    }

    pub fn operations(&self) -> &Arc<dyn SqlOperations> {
        &self.ops
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    /// Schemas written to so far, in the order post-processing visits them
    pub fn touched_schemas(&self) -> &BTreeSet<String> {
        &self.touched_schemas
    }

    /// Inserted and rejected counts summed over every batch
    pub fn totals(&self) -> &InsertOutcome {
        &self.totals
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(RawstageError::InvalidInput(
                "staging session is already closed".to_string(),
            ));
        }
        Ok(())
    }

    /// Create the schema and staging table if they don't exist yet
    pub async fn prepare_table(&mut self, schema: &str, table: &str) -> Result<()> {
        self.ensure_open()?;
        self.ops
            .create_schema_if_not_exists(self.conn.as_ref(), schema)
            .await?;
        self.ops
            .create_table_if_not_exists(self.conn.as_ref(), schema, table)
            .await?;
        self.touched_schemas.insert(schema.to_string());
        Ok(())
    }

    /// Validate and insert one batch into `schema.table`
    pub async fn write_batch(
        &mut self,
        schema: &str,
        table: &str,
        records: &[Record],
    ) -> Result<InsertOutcome> {
        self.ensure_open()?;
        self.touched_schemas.insert(schema.to_string());

        let outcome = self
            .ops
            .insert_records(self.conn.as_ref(), records, schema, table)
            .await?;

        self.totals.inserted += outcome.inserted;
        self.totals.rejected += outcome.rejected;
        self.totals.statements += outcome.statements;
        Ok(outcome)
    }

    /// Run the close-time post-processing over every touched schema, then
    /// close the connection.
    ///
    /// The session counts as closed even when post-processing fails, so a
    /// second call never repeats it.
    pub async fn close(&mut self) -> Result<MigrationReport> {
        self.ensure_open()?;
        self.closed = true;

        tracing::info!(
            schemas = self.touched_schemas.len(),
            inserted = self.totals.inserted,
            rejected = self.totals.rejected,
            "closing staging session"
        );

        let report = self
            .ops
            .on_destination_close(self.conn.as_ref(), &self.touched_schemas)
            .await;

        if let Err(e) = self.conn.close().await {
            tracing::warn!(error = %e, "failed to close connection");
        }

        let report = report?;
        if !report.is_noop() {
            tracing::info!(
                discovered = report.discovered.len(),
                migrated = report.migrated.len(),
                "close-time migration finished"
            );
        }
        Ok(report)
    }

    /// `close` for callers outside any async runtime
    pub fn close_blocking(&mut self) -> Result<MigrationReport> {
        block_on_tokio(self.close())
    }
}
