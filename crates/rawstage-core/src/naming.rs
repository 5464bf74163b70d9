//! Canonical staging table column names
//!
//! Every staging table carries exactly these three columns, in this order.
//! The bulk insert binds values positionally, so the order matters.

/// Unique record identifier, primary key
pub const COLUMN_NAME_AB_ID: &str = "_airbyte_ab_id";

/// Semi-structured record payload
pub const COLUMN_NAME_DATA: &str = "_airbyte_data";

/// Time the record was emitted by the source
pub const COLUMN_NAME_EMITTED_AT: &str = "_airbyte_emitted_at";

/// All staging columns in declaration order
pub const STAGING_COLUMNS: [&str; 3] = [COLUMN_NAME_AB_ID, COLUMN_NAME_DATA, COLUMN_NAME_EMITTED_AT];

/// Substring every raw staging table name contains
pub const DEFAULT_RAW_TABLE_MARKER: &str = "airbyte_raw";

/// Suffix of the temporary semi-structured column added during migration
pub const SUPER_COLUMN_SUFFIX: &str = "_super";

/// Suffix of the temporary timestamp column added during migration
pub const RESERVE_COLUMN_SUFFIX: &str = "_reserve";

/// Temporary name for the migrated data column
pub fn temporary_data_column() -> String {
    format!("{COLUMN_NAME_DATA}{SUPER_COLUMN_SUFFIX}")
}

/// Temporary name for the recreated emitted-at column
pub fn temporary_emitted_at_column() -> String {
    format!("{COLUMN_NAME_EMITTED_AT}{RESERVE_COLUMN_SUFFIX}")
}
