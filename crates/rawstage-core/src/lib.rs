//! Rawstage Core - Core abstractions for warehouse staging loads
//!
//! This crate provides the fundamental traits and types that the dialect
//! drivers depend on. It defines:
//!
//! - `Connection` / `Transaction` - Traits for an open database connection
//! - `SqlOperations` - Per-dialect capability interface (DDL, bulk insert,
//!   payload validation, legacy column migration)
//! - `DatabaseDriver` - Trait for opening connections and building operations
//! - `Record`, `StagingTable`, `LegacyTableDescriptor` - Load data model
//! - `LoaderConfig` and friends - TOML-backed configuration
//! - Common types like `Value`, `Row`, `QueryResult`

mod config;
mod connection;
mod driver;
mod error;
pub mod identifier;
pub mod json;
pub mod naming;
mod operations;
mod record;
pub mod security;
mod types;

pub use config::*;
pub use connection::*;
pub use driver::*;
pub use error::*;
pub use identifier::{qualified_name, quote_identifier, validate_identifier};
pub use operations::*;
pub use record::*;
pub use security::*;
pub use types::*;
