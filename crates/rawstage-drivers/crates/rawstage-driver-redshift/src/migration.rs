//! VARCHAR to SUPER migration of legacy raw tables
//!
//! Raw tables created before SUPER support store `_airbyte_data` as
//! VARCHAR. Redshift can't cast a VARCHAR column to SUPER in place, so each
//! table gets parallel columns that are populated and then renamed over the
//! originals. Recreating `_airbyte_emitted_at` as well keeps the column
//! order the positional INSERT relies on.

use rawstage_core::naming::{
    COLUMN_NAME_AB_ID, COLUMN_NAME_DATA, COLUMN_NAME_EMITTED_AT, temporary_data_column,
    temporary_emitted_at_column,
};
use rawstage_core::{
    Connection, LegacyTableDescriptor, MigrationReport, MigrationStrategy, RawstageError, Result,
    Value, execute_in_transaction, qualified_name, quote_identifier, validate_identifier,
};
use std::collections::BTreeSet;

/// Catalog query listing raw tables whose data column is not SUPER.
///
/// Parameters: `$1` schema, `$2` LIKE pattern for the raw table marker,
/// `$3`..`$5` the three staging column names in declaration order.
pub fn discovery_query() -> &'static str {
    r#"SELECT tablename, schemaname
FROM pg_table_def
WHERE tablename IN (
    SELECT tablename
    FROM pg_table_def
    WHERE schemaname = $1
      AND tablename LIKE $2
      AND "column" IN ($3, $4, $5)
    GROUP BY tablename
    HAVING COUNT(*) = 3)
  AND schemaname = $1
  AND type <> 'super'
  AND "column" = $4"#
}

/// The eight statements that rewrite one legacy table, in execution order
pub fn migration_statements(descriptor: &LegacyTableDescriptor) -> Result<Vec<String>> {
    let table = qualified_name(&descriptor.schema, &descriptor.table)?;
    let data = quote_identifier(COLUMN_NAME_DATA)?;
    let emitted_at = quote_identifier(COLUMN_NAME_EMITTED_AT)?;
    let data_super = quote_identifier(&temporary_data_column())?;
    let emitted_at_reserve = quote_identifier(&temporary_emitted_at_column())?;

    Ok(vec![
        format!("ALTER TABLE {table} ADD COLUMN {data_super} SUPER"),
        format!(
            "ALTER TABLE {table} ADD COLUMN {emitted_at_reserve} TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP"
        ),
        format!("UPDATE {table} SET {data_super} = JSON_PARSE({data})"),
        format!("UPDATE {table} SET {emitted_at_reserve} = {emitted_at}"),
        format!("ALTER TABLE {table} DROP COLUMN {data}"),
        format!("ALTER TABLE {table} DROP COLUMN {emitted_at}"),
        format!("ALTER TABLE {table} RENAME COLUMN {data_super} TO {data}"),
        format!("ALTER TABLE {table} RENAME COLUMN {emitted_at_reserve} TO {emitted_at}"),
    ])
}

/// Finds legacy raw tables and rewrites them to SUPER
#[derive(Debug, Clone)]
pub struct LegacyColumnMigrator {
    raw_table_marker: String,
    strategy: MigrationStrategy,
}

impl LegacyColumnMigrator {
    pub fn new(raw_table_marker: impl Into<String>, strategy: MigrationStrategy) -> Self {
        Self {
            raw_table_marker: raw_table_marker.into(),
            strategy,
        }
    }

    pub fn strategy(&self) -> MigrationStrategy {
        self.strategy
    }

    /// List the legacy tables of one schema.
    ///
    /// `pg_table_def` only reports schemas on the search path, so the
    /// schema is put there for the duration of the query.
    #[tracing::instrument(skip(self, conn))]
    pub async fn discover(
        &self,
        conn: &dyn Connection,
        schema: &str,
    ) -> Result<Vec<LegacyTableDescriptor>> {
        let discovery_error = |message: String| RawstageError::Discovery {
            schema: schema.to_string(),
            message,
        };

        let quoted_schema = quote_identifier(schema).map_err(|e| discovery_error(e.to_string()))?;
        validate_identifier(&self.raw_table_marker).map_err(|e| discovery_error(e.to_string()))?;

        conn.execute(&format!("SET search_path TO {quoted_schema}"), &[])
            .await
            .map_err(|e| discovery_error(e.to_string()))?;

        let params = [
            Value::String(schema.to_string()),
            Value::String(format!("%{}%", self.raw_table_marker)),
            Value::String(COLUMN_NAME_AB_ID.to_string()),
            Value::String(COLUMN_NAME_DATA.to_string()),
            Value::String(COLUMN_NAME_EMITTED_AT.to_string()),
        ];
        let queried = conn.query(discovery_query(), &params).await;

        let reset = conn.execute("RESET search_path", &[]).await;
        let result = queried.map_err(|e| discovery_error(e.to_string()))?;
        reset.map_err(|e| discovery_error(e.to_string()))?;

        let mut tables = Vec::with_capacity(result.row_count());
        for row in &result.rows {
            let table = row
                .get_by_name("tablename")
                .or_else(|| row.get(0))
                .and_then(Value::as_str)
                .map(str::trim)
                .ok_or_else(|| discovery_error("catalog row without a table name".to_string()))?;
            let table_schema = row
                .get_by_name("schemaname")
                .or_else(|| row.get(1))
                .and_then(Value::as_str)
                .map(str::trim)
                .unwrap_or(schema);

            validate_identifier(table).map_err(|e| discovery_error(e.to_string()))?;
            validate_identifier(table_schema).map_err(|e| discovery_error(e.to_string()))?;
            tables.push(LegacyTableDescriptor::new(table_schema, table));
        }

        tracing::info!(schema = %schema, found = tables.len(), "legacy raw table discovery finished");
        Ok(tables)
    }

    /// Discover legacy tables across `schemas`, in order, and migrate them.
    ///
    /// Any discovery failure aborts before a single table is touched. With
    /// nothing discovered no statement is executed.
    #[tracing::instrument(skip(self, conn, schemas), fields(schema_count = schemas.len(), strategy = ?self.strategy))]
    pub async fn run_once(
        &self,
        conn: &dyn Connection,
        schemas: &BTreeSet<String>,
    ) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();

        for schema in schemas {
            match self.discover(conn, schema).await {
                Ok(tables) => report.discovered.extend(tables),
                Err(e) => {
                    tracing::error!(schema = %schema, error = %e, "legacy table discovery failed");
                    return Err(e);
                }
            }
        }

        if report.is_noop() {
            tracing::debug!(schemas = schemas.len(), "no legacy raw tables to migrate");
            return Ok(report);
        }

        tracing::info!(
            tables = report.discovered.len(),
            strategy = ?self.strategy,
            "Executing operations for Redshift destination..."
        );

        match self.strategy {
            MigrationStrategy::PerTable => self.migrate_per_table(conn, &mut report).await?,
            MigrationStrategy::Combined => self.migrate_combined(conn, &mut report).await?,
        }

        tracing::info!(
            migrated = report.migrated.len(),
            statements = report.statements_executed,
            "legacy raw tables migrated to SUPER"
        );
        Ok(report)
    }

    async fn migrate_per_table(
        &self,
        conn: &dyn Connection,
        report: &mut MigrationReport,
    ) -> Result<()> {
        for descriptor in report.discovered.clone() {
            let statements = migration_statements(&descriptor)?;

            if let Err(e) = execute_in_transaction(conn, &statements).await {
                tracing::error!(
                    table = %descriptor,
                    migrated = report.migrated.len(),
                    error = %e,
                    "legacy table migration failed, table rolled back"
                );
                return Err(RawstageError::Migration {
                    table: descriptor.to_string(),
                    migrated: report.migrated.len(),
                    message: e.to_string(),
                });
            }

            tracing::debug!(table = %descriptor, "legacy table migrated");
            report.statements_executed += statements.len();
            report.migrated.push(descriptor);
        }
        Ok(())
    }

    async fn migrate_combined(
        &self,
        conn: &dyn Connection,
        report: &mut MigrationReport,
    ) -> Result<()> {
        let mut statements = Vec::new();
        for descriptor in &report.discovered {
            statements.extend(migration_statements(descriptor)?);
        }
        let batch = statements.iter().map(|sql| format!("{sql};\n")).collect::<String>();

        if let Err(e) = conn.execute_batch(&batch).await {
            let tables = report
                .discovered
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            tracing::error!(tables = %tables, error = %e, "combined legacy table migration failed");
            return Err(RawstageError::Migration {
                table: tables,
                migrated: 0,
                message: e.to_string(),
            });
        }

        report.statements_executed = statements.len();
        report.migrated = report.discovered.clone();
        Ok(())
    }
}
