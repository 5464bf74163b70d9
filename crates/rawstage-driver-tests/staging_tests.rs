//! Staging table DDL and bulk insert against a live cluster

use crate::fixtures::{TestStage, unique_schema};
use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use rawstage_core::{Record, Value, qualified_name};
use rstest::rstest;
use serde_json::json;

const TABLE: &str = "_airbyte_raw_users";

#[rstest]
#[tokio::test]
async fn test_create_table_is_idempotent(unique_schema: String) -> Result<()> {
    let Some(stage) = TestStage::connect(&unique_schema).await? else {
        return Ok(());
    };

    stage
        .ops
        .create_table_if_not_exists(stage.conn.as_ref(), &stage.schema, TABLE)
        .await?;
    stage
        .ops
        .create_table_if_not_exists(stage.conn.as_ref(), &stage.schema, TABLE)
        .await
        .context("second CREATE TABLE IF NOT EXISTS should succeed")?;

    let columns = stage
        .conn
        .query(
            "SELECT column_name, data_type FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position",
            &[
                Value::String(stage.schema.clone()),
                Value::String(TABLE.to_string()),
            ],
        )
        .await?;
    let names: Vec<String> = columns
        .rows
        .iter()
        .filter_map(|row| row.get(0).and_then(Value::as_str).map(str::to_string))
        .collect();
    assert_eq!(
        names,
        vec!["_airbyte_ab_id", "_airbyte_data", "_airbyte_emitted_at"]
    );

    stage.cleanup().await
}

#[rstest]
#[case::single(1)]
#[case::batch(250)]
#[tokio::test]
async fn test_insert_batch_writes_every_row(unique_schema: String, #[case] rows: usize) -> Result<()> {
    let Some(stage) = TestStage::connect(&unique_schema).await? else {
        return Ok(());
    };
    stage
        .ops
        .create_table_if_not_exists(stage.conn.as_ref(), &stage.schema, TABLE)
        .await?;

    let emitted_at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
    let records: Vec<Record> = (0..rows)
        .map(|i| {
            Record::with_id(
                format!("rec-{i}"),
                json!({ "n": i, "name": format!("user {i}"), "tags": ["a", "b"] }),
                emitted_at,
            )
        })
        .collect();

    let outcome = stage
        .ops
        .insert_records(stage.conn.as_ref(), &records, &stage.schema, TABLE)
        .await?;

    assert_eq!(outcome.inserted, rows as u64);
    assert_eq!(outcome.statements, 1);
    assert_eq!(stage.row_count(TABLE).await?, rows as i64);

    let sql = format!(
        "SELECT JSON_SERIALIZE(\"_airbyte_data\") AS data, \"_airbyte_emitted_at\" AS emitted_at \
         FROM {} WHERE \"_airbyte_ab_id\" = $1",
        qualified_name(&stage.schema, TABLE)?
    );
    let result = stage
        .conn
        .query(&sql, &[Value::String("rec-0".to_string())])
        .await?;
    let row = result.rows.first().context("rec-0 should exist")?;

    let data = row
        .get_by_name("data")
        .and_then(Value::as_json)
        .context("data should be JSON text")?;
    assert_eq!(data, json!({ "n": 0, "name": "user 0", "tags": ["a", "b"] }));
    assert_eq!(
        row.get_by_name("emitted_at").and_then(Value::as_datetime_utc),
        Some(emitted_at)
    );

    stage.cleanup().await
}

#[rstest]
#[tokio::test]
async fn test_oversized_payloads_are_not_inserted(unique_schema: String) -> Result<()> {
    let Some(stage) = TestStage::connect(&unique_schema).await? else {
        return Ok(());
    };
    stage
        .ops
        .create_table_if_not_exists(stage.conn.as_ref(), &stage.schema, TABLE)
        .await?;

    let limits = stage.ops.size_limits();
    let records = vec![
        Record::new(json!({ "ok": true }), Utc::now()),
        Record::new(json!({ "text": "x".repeat(limits.max_string_bytes + 1) }), Utc::now()),
    ];

    let outcome = stage
        .ops
        .insert_records(stage.conn.as_ref(), &records, &stage.schema, TABLE)
        .await?;

    assert_eq!(outcome.inserted, 1);
    assert_eq!(outcome.rejected, 1);
    assert_eq!(stage.row_count(TABLE).await?, 1);

    stage.cleanup().await
}

#[rstest]
#[tokio::test]
async fn test_primary_key_is_not_enforced(unique_schema: String) -> Result<()> {
    let Some(stage) = TestStage::connect(&unique_schema).await? else {
        return Ok(());
    };
    stage
        .ops
        .create_table_if_not_exists(stage.conn.as_ref(), &stage.schema, TABLE)
        .await?;

    let record = Record::with_id("dup", json!({}), Utc::now());
    stage
        .ops
        .insert_records(stage.conn.as_ref(), &[record.clone()], &stage.schema, TABLE)
        .await?;

    // Redshift doesn't enforce primary keys, so the second insert succeeds
    // and both rows are kept
    let outcome = stage
        .ops
        .insert_records(stage.conn.as_ref(), &[record], &stage.schema, TABLE)
        .await?;
    assert_eq!(outcome.inserted, 1);
    assert_eq!(stage.row_count(TABLE).await?, 2);

    stage.cleanup().await
}
