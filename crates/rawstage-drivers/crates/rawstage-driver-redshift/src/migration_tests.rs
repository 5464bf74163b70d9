use crate::test_support::RecordingConnection;
use crate::{LegacyColumnMigrator, RedshiftSqlOperations, discovery_query, migration_statements};
use pretty_assertions::assert_eq;
use rawstage_core::naming::COLUMN_NAME_DATA;
use rawstage_core::{
    LegacyTableDescriptor, MigrationStrategy, QueryResult, RawstageError, SqlOperations, Value,
};
use std::collections::BTreeSet;

fn schemas(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn catalog_rows(rows: &[(&str, &str)]) -> QueryResult {
    QueryResult::from_rows(
        &["tablename", "schemaname"],
        rows.iter()
            .map(|(table, schema)| {
                vec![
                    Value::String(table.to_string()),
                    Value::String(schema.to_string()),
                ]
            })
            .collect(),
    )
}

fn per_table() -> LegacyColumnMigrator {
    LegacyColumnMigrator::new("airbyte_raw", MigrationStrategy::PerTable)
}

#[test]
fn migration_statements_follow_the_eight_step_sequence() {
    let statements =
        migration_statements(&LegacyTableDescriptor::new("public", "_airbyte_raw_users")).unwrap();

    let table = r#""public"."_airbyte_raw_users""#;
    assert_eq!(
        statements,
        vec![
            format!(r#"ALTER TABLE {table} ADD COLUMN "_airbyte_data_super" SUPER"#),
            format!(
                r#"ALTER TABLE {table} ADD COLUMN "_airbyte_emitted_at_reserve" TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP"#
            ),
            format!(r#"UPDATE {table} SET "_airbyte_data_super" = JSON_PARSE("_airbyte_data")"#),
            format!(r#"UPDATE {table} SET "_airbyte_emitted_at_reserve" = "_airbyte_emitted_at""#),
            format!(r#"ALTER TABLE {table} DROP COLUMN "_airbyte_data""#),
            format!(r#"ALTER TABLE {table} DROP COLUMN "_airbyte_emitted_at""#),
            format!(r#"ALTER TABLE {table} RENAME COLUMN "_airbyte_data_super" TO "_airbyte_data""#),
            format!(
                r#"ALTER TABLE {table} RENAME COLUMN "_airbyte_emitted_at_reserve" TO "_airbyte_emitted_at""#
            ),
        ]
    );
}

#[test]
fn discovery_query_filters_on_non_super_data_column() {
    let sql = discovery_query();
    assert!(sql.contains("FROM pg_table_def"));
    assert!(sql.contains("HAVING COUNT(*) = 3"));
    assert!(sql.contains("type <> 'super'"));
    assert!(sql.contains(r#""column" = $4"#));
}

#[tokio::test]
async fn discovery_binds_schema_marker_and_columns() {
    let conn = RecordingConnection::new();
    conn.push_query_result(catalog_rows(&[("_airbyte_raw_users", "public")]));

    let tables = per_table().discover(&conn, "public").await.unwrap();

    assert_eq!(tables, vec![LegacyTableDescriptor::new("public", "_airbyte_raw_users")]);

    let executed = conn.executed();
    assert_eq!(executed.len(), 3);
    assert_eq!(executed[0].sql, r#"SET search_path TO "public""#);
    assert_eq!(executed[1].sql, discovery_query());
    assert_eq!(
        executed[1].params,
        vec![
            Value::String("public".into()),
            Value::String("%airbyte_raw%".into()),
            Value::String("_airbyte_ab_id".into()),
            Value::String("_airbyte_data".into()),
            Value::String("_airbyte_emitted_at".into()),
        ]
    );
    assert_eq!(executed[2].sql, "RESET search_path");
}

#[tokio::test]
async fn no_legacy_tables_means_no_migration_statements() {
    let ops = RedshiftSqlOperations::default();
    let conn = RecordingConnection::new();

    let report = ops
        .on_destination_close(&conn, &schemas(&["public", "staging"]))
        .await
        .unwrap();

    assert!(report.is_noop());
    assert_eq!(report.statements_executed, 0);
    assert!(
        conn.statements()
            .iter()
            .all(|sql| !sql.starts_with("ALTER") && !sql.starts_with("UPDATE"))
    );
}

#[tokio::test]
async fn type_filter_applies_to_the_bound_data_column() {
    let conn = RecordingConnection::new();
    LegacyColumnMigrator::new("raw", MigrationStrategy::PerTable)
        .discover(&conn, "staging")
        .await
        .unwrap();

    // The outer filter, after the column-count subquery, is what excludes
    // tables whose data column is already SUPER
    let sql = discovery_query();
    let (_, outer_filter) = sql.split_once("HAVING COUNT(*) = 3)").unwrap();
    assert!(outer_filter.contains("schemaname = $1"));
    assert!(outer_filter.contains("type <> 'super'"));
    assert!(outer_filter.contains(r#""column" = $4"#));

    let query = conn
        .executed()
        .into_iter()
        .find(|statement| statement.sql == sql)
        .unwrap();
    assert_eq!(query.params[0], Value::String("staging".into()));
    assert_eq!(query.params[1], Value::String("%raw%".into()));
    assert_eq!(query.params[3], Value::String(COLUMN_NAME_DATA.into()));
}

#[tokio::test]
async fn per_table_strategy_wraps_each_table_in_a_transaction() {
    let ops = RedshiftSqlOperations::default();
    let conn = RecordingConnection::new();
    conn.push_query_result(catalog_rows(&[
        ("_airbyte_raw_orders", "public"),
        ("_airbyte_raw_users", "public"),
    ]));

    let report = ops
        .on_destination_close(&conn, &schemas(&["public"]))
        .await
        .unwrap();

    assert_eq!(report.discovered.len(), 2);
    assert_eq!(report.migrated, report.discovered);
    assert_eq!(report.statements_executed, 16);

    let statements = conn.statements();
    let migration: Vec<&String> = statements.iter().skip(3).collect();
    assert_eq!(migration.len(), 2 * 10);
    assert_eq!(migration[0], "BEGIN");
    assert!(migration[1].contains(r#""_airbyte_raw_orders""#));
    assert_eq!(migration[9], "COMMIT");
    assert_eq!(migration[10], "BEGIN");
    assert!(migration[11].contains(r#""_airbyte_raw_users""#));
    assert_eq!(migration[19], "COMMIT");
}

#[tokio::test]
async fn per_table_failure_rolls_back_only_the_failing_table() {
    let migrator = per_table();
    let conn = RecordingConnection::new().fail_on(r#"UPDATE "public"."_airbyte_raw_users""#);
    conn.push_query_result(catalog_rows(&[
        ("_airbyte_raw_orders", "public"),
        ("_airbyte_raw_users", "public"),
    ]));

    let err = migrator
        .run_once(&conn, &schemas(&["public"]))
        .await
        .unwrap_err();

    match err {
        RawstageError::Migration {
            table, migrated, ..
        } => {
            assert_eq!(table, "public._airbyte_raw_users");
            assert_eq!(migrated, 1);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let statements = conn.statements();
    assert_eq!(statements.last().map(String::as_str), Some("ROLLBACK"));
    assert_eq!(statements.iter().filter(|s| *s == "COMMIT").count(), 1);
}

#[tokio::test]
async fn combined_strategy_sends_one_batch() {
    let migrator = LegacyColumnMigrator::new("airbyte_raw", MigrationStrategy::Combined);
    let conn = RecordingConnection::new();
    conn.push_query_result(catalog_rows(&[("_airbyte_raw_a", "s1")]));
    conn.push_query_result(catalog_rows(&[("_airbyte_raw_b", "s2")]));

    let report = migrator
        .run_once(&conn, &schemas(&["s1", "s2"]))
        .await
        .unwrap();

    assert_eq!(report.migrated.len(), 2);
    assert_eq!(report.statements_executed, 16);

    let statements = conn.statements();
    // Two discoveries of three statements each, then the batch
    assert_eq!(statements.len(), 7);
    let batch = &statements[6];
    assert_eq!(batch.matches(";\n").count(), 16);
    assert!(batch.find(r#""s1"."_airbyte_raw_a""#) < batch.find(r#""s2"."_airbyte_raw_b""#));
    assert!(!statements.iter().any(|s| s == "BEGIN"));
}

#[tokio::test]
async fn combined_strategy_failure_is_a_migration_error() {
    let migrator = LegacyColumnMigrator::new("airbyte_raw", MigrationStrategy::Combined);
    let conn = RecordingConnection::new().fail_on("JSON_PARSE");
    conn.push_query_result(catalog_rows(&[("_airbyte_raw_a", "public")]));

    let err = migrator
        .run_once(&conn, &schemas(&["public"]))
        .await
        .unwrap_err();

    assert!(matches!(err, RawstageError::Migration { migrated: 0, .. }));
}

#[tokio::test]
async fn discovery_failure_aborts_before_any_rewrite() {
    let ops = RedshiftSqlOperations::default();
    let conn = RecordingConnection::new();
    conn.push_query_result(catalog_rows(&[("_airbyte_raw_a", "alpha")]));
    conn.push_query_error("permission denied for relation pg_table_def");

    let err = ops
        .on_destination_close(&conn, &schemas(&["alpha", "beta"]))
        .await
        .unwrap_err();

    match &err {
        RawstageError::Discovery { schema, message } => {
            assert_eq!(schema, "beta");
            assert!(message.contains("permission denied"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let statements = conn.statements();
    assert!(!statements.iter().any(|s| s.starts_with("ALTER")));
    // search_path is restored even when the catalog query fails
    assert_eq!(statements.last().map(String::as_str), Some("RESET search_path"));
}

#[tokio::test]
async fn discovered_names_outside_the_allow_list_are_rejected() {
    let conn = RecordingConnection::new();
    conn.push_query_result(catalog_rows(&[("_airbyte_raw_x\"; DROP TABLE y; --", "public")]));

    let err = per_table().discover(&conn, "public").await.unwrap_err();
    assert!(matches!(err, RawstageError::Discovery { .. }));
}

#[tokio::test]
async fn discovery_trims_padded_catalog_names() {
    // pg_table_def can return blank-padded names
    let conn = RecordingConnection::new();
    conn.push_query_result(catalog_rows(&[("_airbyte_raw_users   ", "public  ")]));

    let tables = per_table().discover(&conn, "public").await.unwrap();
    assert_eq!(tables, vec![LegacyTableDescriptor::new("public", "_airbyte_raw_users")]);
}

#[tokio::test]
async fn invalid_schema_is_a_discovery_error() {
    let conn = RecordingConnection::new();
    let err = per_table().discover(&conn, "bad schema").await.unwrap_err();

    assert!(matches!(err, RawstageError::Discovery { .. }));
    assert!(conn.executed().is_empty());
}
