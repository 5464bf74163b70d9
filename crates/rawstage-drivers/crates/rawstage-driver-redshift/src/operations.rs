//! Redshift SQL operations

use crate::migration::LegacyColumnMigrator;
use crate::validator::{PayloadValidator, REDSHIFT_LIMITS};
use async_trait::async_trait;
use rawstage_core::naming::{
    COLUMN_NAME_AB_ID, COLUMN_NAME_DATA, COLUMN_NAME_EMITTED_AT, DEFAULT_RAW_TABLE_MARKER,
};
use rawstage_core::{
    Connection, InsertStatement, LoaderConfig, MAX_ROWS_PER_STATEMENT, MigrationReport,
    MigrationStrategy, PARAMS_PER_ROW, RawstageError, Record, Result, SizeLimits, SqlOperations,
    Value, qualified_name, quote_identifier,
};
use std::collections::BTreeSet;

/// Staging-table operations for Redshift.
///
/// Raw payloads live in a SUPER column and are written through
/// `JSON_PARSE`. Tables created before SUPER support are rewritten once
/// when the destination closes.
#[derive(Debug, Clone)]
pub struct RedshiftSqlOperations {
    validator: PayloadValidator,
    migrator: LegacyColumnMigrator,
}

impl Default for RedshiftSqlOperations {
    fn default() -> Self {
        Self::new(REDSHIFT_LIMITS)
    }
}

impl RedshiftSqlOperations {
    pub fn new(limits: SizeLimits) -> Self {
        Self {
            validator: PayloadValidator::new(limits),
            migrator: LegacyColumnMigrator::new(DEFAULT_RAW_TABLE_MARKER, MigrationStrategy::default()),
        }
    }

    /// Build from loader configuration, falling back to Redshift's limits
    pub fn from_config(config: &LoaderConfig) -> Self {
        Self {
            validator: PayloadValidator::new(config.limits.unwrap_or(REDSHIFT_LIMITS)),
            migrator: LegacyColumnMigrator::new(
                config.staging.raw_table_marker.clone(),
                config.migration.strategy,
            ),
        }
    }

    pub fn with_migrator(mut self, migrator: LegacyColumnMigrator) -> Self {
        self.migrator = migrator;
        self
    }

    pub fn validator(&self) -> &PayloadValidator {
        &self.validator
    }

    pub fn migrator(&self) -> &LegacyColumnMigrator {
        &self.migrator
    }
}

fn staging_column_list() -> Result<String> {
    Ok([COLUMN_NAME_AB_ID, COLUMN_NAME_DATA, COLUMN_NAME_EMITTED_AT]
        .iter()
        .map(|column| quote_identifier(column))
        .collect::<Result<Vec<_>>>()?
        .join(", "))
}

#[async_trait]
impl SqlOperations for RedshiftSqlOperations {
    fn dialect_id(&self) -> &'static str {
        "redshift"
    }

    fn size_limits(&self) -> SizeLimits {
        self.validator.limits()
    }

    fn create_schema_statement(&self, schema: &str) -> Result<String> {
        Ok(format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            quote_identifier(schema)?
        ))
    }

    fn create_table_statement(&self, schema: &str, table: &str) -> Result<String> {
        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} (\n {} VARCHAR PRIMARY KEY,\n {} SUPER,\n {} TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP)",
            qualified_name(schema, table)?,
            quote_identifier(COLUMN_NAME_AB_ID)?,
            quote_identifier(COLUMN_NAME_DATA)?,
            quote_identifier(COLUMN_NAME_EMITTED_AT)?,
        ))
    }

    fn drop_table_statement(&self, schema: &str, table: &str) -> Result<String> {
        Ok(format!(
            "DROP TABLE IF EXISTS {}",
            qualified_name(schema, table)?
        ))
    }

    fn truncate_table_statement(&self, schema: &str, table: &str) -> Result<String> {
        Ok(format!("TRUNCATE TABLE {}", qualified_name(schema, table)?))
    }

    fn copy_table_statement(
        &self,
        schema: &str,
        source: &str,
        destination: &str,
    ) -> Result<String> {
        Ok(format!(
            "INSERT INTO {} SELECT * FROM {}",
            qualified_name(schema, destination)?,
            qualified_name(schema, source)?
        ))
    }

    /// One multi-row INSERT. Each row binds id, serialized data and
    /// emitted_at; the data placeholder is wrapped in `JSON_PARSE` so it
    /// lands as SUPER rather than as a string.
    fn build_insert(
        &self,
        schema: &str,
        table: &str,
        records: &[Record],
    ) -> Result<InsertStatement> {
        if records.is_empty() {
            return Err(RawstageError::InvalidInput(
                "cannot build an INSERT for an empty batch".to_string(),
            ));
        }
        if records.len() > MAX_ROWS_PER_STATEMENT {
            return Err(RawstageError::InvalidInput(format!(
                "batch of {} records exceeds {} rows per statement",
                records.len(),
                MAX_ROWS_PER_STATEMENT
            )));
        }

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES\n",
            qualified_name(schema, table)?,
            staging_column_list()?
        );
        let mut rows = Vec::with_capacity(records.len());

        for (index, record) in records.iter().enumerate() {
            let base = index * PARAMS_PER_ROW;
            if index > 0 {
                sql.push_str(",\n");
            }
            sql.push_str(&format!(
                "(${}, JSON_PARSE(${}), ${})",
                base + 1,
                base + 2,
                base + 3
            ));

            rows.push([
                Value::String(record.id.clone()),
                Value::String(serde_json::to_string(&record.data)?),
                Value::DateTimeUtc(record.emitted_at),
            ]);
        }

        tracing::debug!(schema = %schema, table = %table, rows = rows.len(), "built bulk insert");
        Ok(InsertStatement { sql, rows })
    }

    fn is_valid_payload(&self, payload: &serde_json::Value) -> bool {
        match self.validator.validate(payload) {
            Ok(()) => true,
            Err(rejection) => {
                tracing::debug!(reason = %rejection, "payload rejected");
                false
            }
        }
    }

    async fn run_legacy_migration(
        &self,
        conn: &dyn Connection,
        schemas: &BTreeSet<String>,
    ) -> Result<MigrationReport> {
        self.migrator.run_once(conn, schemas).await
    }
}
