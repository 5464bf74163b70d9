//! Legacy VARCHAR raw tables migrated to SUPER on a live cluster

use crate::fixtures::{TestStage, unique_schema};
use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use indoc::formatdoc;
use pretty_assertions::assert_eq;
use rawstage_core::{LegacyTableDescriptor, Value, qualified_name};
use rstest::rstest;
use serde_json::json;
use std::collections::BTreeSet;

const LEGACY_TABLE: &str = "_airbyte_raw_legacy";
const CURRENT_TABLE: &str = "_airbyte_raw_current";

async fn create_legacy_table(stage: &TestStage) -> Result<()> {
    let sql = formatdoc! {r#"
        CREATE TABLE {table} (
         "_airbyte_ab_id" VARCHAR PRIMARY KEY,
         "_airbyte_data" VARCHAR(65535),
         "_airbyte_emitted_at" TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP)"#,
        table = qualified_name(&stage.schema, LEGACY_TABLE)?,
    };
    stage.conn.execute(&sql, &[]).await?;
    Ok(())
}

async fn column_types(stage: &TestStage, table: &str) -> Result<Vec<(String, String)>> {
    let result = stage
        .conn
        .query(
            "SELECT column_name, data_type FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position",
            &[
                Value::String(stage.schema.clone()),
                Value::String(table.to_string()),
            ],
        )
        .await?;

    result
        .rows
        .iter()
        .map(|row| {
            let name = row.get(0).and_then(Value::as_str).context("column_name")?;
            let data_type = row.get(1).and_then(Value::as_str).context("data_type")?;
            Ok((name.to_string(), data_type.to_lowercase()))
        })
        .collect()
}

#[rstest]
#[tokio::test]
async fn test_migration_rewrites_legacy_table(unique_schema: String) -> Result<()> {
    let Some(stage) = TestStage::connect(&unique_schema).await? else {
        return Ok(());
    };
    create_legacy_table(&stage).await?;

    let emitted_at = Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap();
    let insert = format!(
        "INSERT INTO {} VALUES ($1, $2, $3)",
        qualified_name(&stage.schema, LEGACY_TABLE)?
    );
    stage
        .conn
        .execute(
            &insert,
            &[
                Value::String("a".to_string()),
                Value::String(r#"{"x":1}"#.to_string()),
                Value::DateTimeUtc(emitted_at),
            ],
        )
        .await?;

    let schemas = BTreeSet::from([stage.schema.clone()]);
    let report = stage
        .ops
        .on_destination_close(stage.conn.as_ref(), &schemas)
        .await?;

    assert_eq!(
        report.migrated,
        vec![LegacyTableDescriptor::new(stage.schema.clone(), LEGACY_TABLE)]
    );
    assert_eq!(report.statements_executed, 8);
    assert_eq!(stage.row_count(LEGACY_TABLE).await?, 1);

    let columns = column_types(&stage, LEGACY_TABLE).await?;
    let names: Vec<&str> = columns.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(
        names,
        vec!["_airbyte_ab_id", "_airbyte_data", "_airbyte_emitted_at"]
    );
    assert_eq!(columns[1].1, "super");

    let select = format!(
        "SELECT JSON_SERIALIZE(\"_airbyte_data\") AS data, \"_airbyte_emitted_at\" AS emitted_at \
         FROM {} WHERE \"_airbyte_ab_id\" = 'a'",
        qualified_name(&stage.schema, LEGACY_TABLE)?
    );
    let result = stage.conn.query(&select, &[]).await?;
    let row = result.rows.first().context("row a should survive the migration")?;
    assert_eq!(
        row.get_by_name("data").and_then(Value::as_json),
        Some(json!({ "x": 1 }))
    );
    assert_eq!(
        row.get_by_name("emitted_at").and_then(Value::as_datetime_utc),
        Some(emitted_at)
    );

    // A second close finds nothing left to migrate
    let again = stage
        .ops
        .on_destination_close(stage.conn.as_ref(), &schemas)
        .await?;
    assert!(again.is_noop());

    stage.cleanup().await
}

#[rstest]
#[tokio::test]
async fn test_super_tables_are_not_discovered(unique_schema: String) -> Result<()> {
    let Some(stage) = TestStage::connect(&unique_schema).await? else {
        return Ok(());
    };
    stage
        .ops
        .create_table_if_not_exists(stage.conn.as_ref(), &stage.schema, CURRENT_TABLE)
        .await?;

    let report = stage
        .ops
        .on_destination_close(stage.conn.as_ref(), &BTreeSet::from([stage.schema.clone()]))
        .await?;

    assert!(report.is_noop());
    assert_eq!(report.statements_executed, 0);

    let columns = column_types(&stage, CURRENT_TABLE).await?;
    assert_eq!(columns[1].1, "super");

    stage.cleanup().await
}

#[rstest]
#[tokio::test]
async fn test_only_legacy_tables_are_migrated(unique_schema: String) -> Result<()> {
    let Some(stage) = TestStage::connect(&unique_schema).await? else {
        return Ok(());
    };
    create_legacy_table(&stage).await?;
    stage
        .ops
        .create_table_if_not_exists(stage.conn.as_ref(), &stage.schema, CURRENT_TABLE)
        .await?;

    let report = stage
        .ops
        .on_destination_close(stage.conn.as_ref(), &BTreeSet::from([stage.schema.clone()]))
        .await?;

    assert_eq!(
        report.discovered,
        vec![LegacyTableDescriptor::new(stage.schema.clone(), LEGACY_TABLE)]
    );

    stage.cleanup().await
}
