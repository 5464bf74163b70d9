//! Redshift TLS support
//!
//! Builds the `native-tls` connector tokio-postgres uses for encrypted
//! cluster connections.

use anyhow::{Context, Result};
use native_tls::{Certificate, TlsConnector as NativeTlsConnector, TlsConnectorBuilder};
use postgres_native_tls::MakeTlsConnector;
use rawstage_core::security::{TlsConfig, TlsMode};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Error types for TLS operations
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    /// Failed to load CA certificate
    #[error("Failed to load CA certificate from {path}: {source}")]
    CaCertLoadFailed {
        path: String,
        source: std::io::Error,
    },

    /// Invalid CA certificate format
    #[error("Invalid CA certificate format: {0}")]
    InvalidCaCert(String),

    #[error("TLS configuration error: {0}")]
    ConfigurationError(String),

    /// `Disable` has no connector, callers use `NoTls` instead
    #[error("TLS mode {mode:?} is not supported for this operation")]
    UnsupportedMode { mode: TlsMode },
}

/// Builds TLS connectors for tokio-postgres from a `TlsConfig`
#[derive(Debug, Clone)]
pub struct RedshiftTlsConnector;

impl RedshiftTlsConnector {
    /// Build a `MakeTlsConnector` for the configured mode.
    ///
    /// Fails for `TlsMode::Disable`, for an invalid configuration, and when
    /// the CA bundle cannot be read or parsed.
    pub fn build(config: &TlsConfig) -> Result<MakeTlsConnector> {
        config.validate().context("Invalid TLS configuration")?;

        if config.mode == TlsMode::Disable {
            return Err(TlsError::UnsupportedMode { mode: config.mode }.into());
        }

        info!(mode = ?config.mode, "Building Redshift TLS connector");

        let mut builder = NativeTlsConnector::builder();
        configure_verification(&mut builder, config.mode)?;

        if let Some(ca_cert_path) = &config.ca_cert {
            apply_ca_cert(&mut builder, ca_cert_path)?;
        }

        let connector = builder
            .build()
            .map_err(|e| TlsError::ConfigurationError(e.to_string()))?;

        debug!("TLS connector built successfully");
        Ok(MakeTlsConnector::new(connector))
    }

    pub fn is_required(config: &TlsConfig) -> bool {
        config.mode.requires_encryption()
    }

    pub fn is_disabled(config: &TlsConfig) -> bool {
        config.mode == TlsMode::Disable
    }
}

fn configure_verification(builder: &mut TlsConnectorBuilder, mode: TlsMode) -> Result<()> {
    match mode {
        TlsMode::Disable => {
            return Err(TlsError::UnsupportedMode { mode }.into());
        }
        TlsMode::Prefer | TlsMode::Require => {
            debug!("Encrypting without certificate verification");
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
        TlsMode::VerifyCa => {
            debug!("Enabling CA verification only (hostname verification disabled)");
            builder.danger_accept_invalid_hostnames(true);
        }
        TlsMode::VerifyFull => {
            debug!("Enabling full certificate verification");
        }
    }

    Ok(())
}

/// Load a PEM bundle and add every certificate in it as a root
fn apply_ca_cert(builder: &mut TlsConnectorBuilder, path: &Path) -> Result<()> {
    debug!(path = %path.display(), "Loading CA certificate");

    let pem_data = fs::read(path).map_err(|e| TlsError::CaCertLoadFailed {
        path: path.display().to_string(),
        source: e,
    })?;

    let cert =
        Certificate::from_pem(&pem_data).map_err(|e| TlsError::InvalidCaCert(e.to_string()))?;
    builder.add_root_certificate(cert);

    Ok(())
}

/// Connection string parameters describing the TLS setup
pub fn build_tls_params(config: &TlsConfig) -> String {
    let mut params = vec![format!("sslmode={}", config.mode.as_sslmode())];

    if let Some(ca_cert) = &config.ca_cert {
        params.push(format!("sslrootcert={}", ca_cert.display()));
    }

    params.join(" ")
}
