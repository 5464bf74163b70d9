//! Security-related configuration types for warehouse connections
//!
//! This module provides the TLS/SSL settings used when opening a connection.

mod tls_config;

pub use tls_config::*;
