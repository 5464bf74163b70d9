//! Payload size validation
//!
//! A SUPER value holds at most 1 MB, and each string nested inside it is
//! bounded by the VARCHAR limit. Records over either limit are rejected
//! before they reach the insert statement.

use rawstage_core::SizeLimits;
use rawstage_core::json::{flatten, serialized_len};
use serde_json::Value as JsonValue;

/// Largest serialized payload a SUPER column accepts
pub const REDSHIFT_SUPER_MAX_BYTE_SIZE: usize = 1_000_000;

/// Largest string value Redshift stores
pub const REDSHIFT_VARCHAR_MAX_BYTE_SIZE: usize = 65_535;

pub const REDSHIFT_LIMITS: SizeLimits =
    SizeLimits::new(REDSHIFT_SUPER_MAX_BYTE_SIZE, REDSHIFT_VARCHAR_MAX_BYTE_SIZE);

/// Why a payload was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadRejection {
    #[error("payload is {size} bytes, limit is {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("string at {path:?} is {size} bytes, limit is {limit}")]
    StringTooLarge {
        path: String,
        size: usize,
        limit: usize,
    },
}

/// Checks payloads against a fixed pair of size limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadValidator {
    limits: SizeLimits,
}

impl Default for PayloadValidator {
    fn default() -> Self {
        Self::new(REDSHIFT_LIMITS)
    }
}

impl PayloadValidator {
    pub fn new(limits: SizeLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> SizeLimits {
        self.limits
    }

    /// Check the whole payload first, then every string leaf. Stops at the
    /// first violation.
    pub fn validate(&self, payload: &JsonValue) -> Result<(), PayloadRejection> {
        let size = serialized_len(payload);
        if size > self.limits.max_payload_bytes {
            return Err(PayloadRejection::PayloadTooLarge {
                size,
                limit: self.limits.max_payload_bytes,
            });
        }

        for (path, leaf) in flatten(payload) {
            if let JsonValue::String(text) = &leaf
                && text.len() > self.limits.max_string_bytes
            {
                return Err(PayloadRejection::StringTooLarge {
                    path,
                    size: text.len(),
                    limit: self.limits.max_string_bytes,
                });
            }
        }

        Ok(())
    }

    pub fn is_valid(&self, payload: &JsonValue) -> bool {
        self.validate(payload).is_ok()
    }
}
