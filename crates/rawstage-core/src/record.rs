//! Load data model: records, staging tables and legacy table descriptors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One ingested record, owned by the upstream pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Opaque unique identifier, the staging table's primary key
    pub id: String,
    /// Semi-structured payload
    pub data: serde_json::Value,
    /// Time the source emitted the record
    pub emitted_at: DateTime<Utc>,
}

impl Record {
    /// Create a record with a freshly generated id
    pub fn new(data: serde_json::Value, emitted_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            data,
            emitted_at,
        }
    }

    /// Create a record with an explicit id
    pub fn with_id(id: impl Into<String>, data: serde_json::Value, emitted_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            data,
            emitted_at,
        }
    }

    /// Create a record from an epoch-milliseconds emission time
    pub fn from_epoch_millis(data: serde_json::Value, emitted_at_ms: i64) -> Option<Self> {
        DateTime::<Utc>::from_timestamp_millis(emitted_at_ms).map(|emitted_at| Self::new(data, emitted_at))
    }
}

/// A staging table, identified by schema and table name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StagingTable {
    pub schema: String,
    pub table: String,
}

impl StagingTable {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }
}

impl std::fmt::Display for StagingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// A staging table whose data column still has the plain string type.
///
/// Produced by discovery and consumed once by the migration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LegacyTableDescriptor {
    pub schema: String,
    pub table: String,
}

impl LegacyTableDescriptor {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// The table this descriptor points at
    pub fn staging_table(&self) -> StagingTable {
        StagingTable::new(self.schema.clone(), self.table.clone())
    }
}

impl std::fmt::Display for LegacyTableDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}
