//! Identifier allow-list
//!
//! Schema, table and column names are the only pieces of SQL text that get
//! interpolated. Each one must pass `validate_identifier` first and is then
//! double-quoted.

use crate::{RawstageError, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Longest identifier the warehouse accepts, in bytes
pub const MAX_IDENTIFIER_BYTES: usize = 127;

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").expect("identifier pattern is a valid regex")
    })
}

/// Check an identifier against the allow-list
pub fn validate_identifier(identifier: &str) -> Result<()> {
    let reject = |reason: &str| {
        Err(RawstageError::InvalidIdentifier {
            identifier: identifier.to_string(),
            reason: reason.to_string(),
        })
    };

    if identifier.is_empty() {
        return reject("identifier is empty");
    }
    if identifier.len() > MAX_IDENTIFIER_BYTES {
        return reject("identifier exceeds 127 bytes");
    }
    if !identifier_pattern().is_match(identifier) {
        return reject("only letters, digits, '_' and '$' are allowed, and it must not start with a digit");
    }
    Ok(())
}

/// Validate and double-quote a single identifier
pub fn quote_identifier(identifier: &str) -> Result<String> {
    validate_identifier(identifier)?;
    Ok(format!("\"{}\"", identifier))
}

/// Validate and quote a `schema.table` pair
pub fn qualified_name(schema: &str, table: &str) -> Result<String> {
    Ok(format!(
        "{}.{}",
        quote_identifier(schema)?,
        quote_identifier(table)?
    ))
}
