//! Rawstage Drivers - Warehouse driver implementations
//!
//! Selects a driver, and with it the dialect's `SqlOperations`, from the
//! configured dialect name, and wraps a connection plus its operations in a
//! `StagingSession` that runs the close-time post-processing exactly once.

#[cfg(feature = "redshift")]
pub use rawstage_driver_redshift as redshift;

mod registry;
mod runtime;
mod session;

pub use registry::DriverRegistry;
pub use runtime::{block_on_tokio, get_tokio_runtime};
pub use session::StagingSession;

/// Re-export commonly used types from rawstage-core
pub use rawstage_core::{
    Connection, ConnectionConfig, DatabaseDriver, DriverCapabilities, InsertOutcome, LoaderConfig,
    MigrationReport, QueryResult, RawstageError, Record, Result, Row, SqlOperations,
    StatementResult, Transaction, Value,
};
