//! TLS/SSL Configuration Types
//!
//! Warehouse clusters are normally reached over the public network, so TLS
//! defaults to `require`. The modes follow libpq's `sslmode` naming.

use crate::{RawstageError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// TLS/SSL mode for warehouse connections
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TlsMode {
    /// Plain TCP, only for local test clusters
    Disable,
    /// Try TLS first, fall back to unencrypted if the server refuses
    Prefer,
    /// Require TLS, don't verify the server certificate
    #[default]
    Require,
    /// Require TLS and verify the server certificate against the CA
    VerifyCa,
    /// Require TLS, verify the CA and that the hostname matches
    VerifyFull,
}

impl TlsMode {
    /// Returns true if this mode requires encryption
    pub fn requires_encryption(&self) -> bool {
        matches!(
            self,
            TlsMode::Require | TlsMode::VerifyCa | TlsMode::VerifyFull
        )
    }

    /// Returns true if this mode verifies the certificate chain
    pub fn requires_ca_verification(&self) -> bool {
        matches!(self, TlsMode::VerifyCa | TlsMode::VerifyFull)
    }

    /// Returns true if this mode verifies the hostname
    pub fn requires_hostname_verification(&self) -> bool {
        matches!(self, TlsMode::VerifyFull)
    }

    /// libpq-style `sslmode` value
    pub fn as_sslmode(&self) -> &'static str {
        match self {
            TlsMode::Disable => "disable",
            TlsMode::Prefer => "prefer",
            TlsMode::Require => "require",
            TlsMode::VerifyCa => "verify-ca",
            TlsMode::VerifyFull => "verify-full",
        }
    }
}

/// Configuration for TLS/SSL warehouse connections
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TlsConfig {
    /// TLS mode determining the level of security
    #[serde(default)]
    pub mode: TlsMode,
    /// PEM bundle used to verify the server, e.g. the cluster's CA bundle
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self::new(TlsMode::default())
    }
}

impl TlsConfig {
    /// Create a new TLS configuration with the specified mode
    pub fn new(mode: TlsMode) -> Self {
        Self {
            mode,
            ca_cert: None,
        }
    }

    /// Create a disabled TLS configuration
    pub fn disabled() -> Self {
        Self::new(TlsMode::Disable)
    }

    /// Create a TLS configuration with full verification
    pub fn verify_full() -> Self {
        Self::new(TlsMode::VerifyFull)
    }

    /// Set the CA bundle path for server verification
    pub fn ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    /// Validate the TLS configuration
    pub fn validate(&self) -> Result<()> {
        if self.mode.requires_ca_verification() && self.ca_cert.is_none() {
            return Err(RawstageError::Configuration(format!(
                "TLS mode {} requires CA certificate but none provided",
                self.mode.as_sslmode()
            )));
        }

        if let Some(ca_cert) = &self.ca_cert
            && ca_cert.as_os_str().is_empty()
        {
            return Err(RawstageError::Configuration(
                "CA certificate path cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
