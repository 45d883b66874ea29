//! certgate Library
//!
//! Certificate-based request authentication for services that sit behind a
//! TLS-terminating reverse proxy.
//!
//! # Features
//!
//! - **Header decoding**: raw base64 DER, PEM with real or escaped line breaks,
//!   percent-encoded PEM
//! - **Trust store**: SHA-256 fingerprint allow-list with validity, usage and
//!   revocation checks
//! - **Identity**: caller country from the certificate subject, a stored
//!   record, or a proxy-validated distinguished name
//! - **Fail closed**: every failure is a uniform `403` with the reason only in
//!   the audit log

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod certauth;
pub mod cli;
pub mod config;
pub mod error;
pub mod server;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Internal(e.to_string()))?,
        _ => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Internal(e.to_string()))?,
    }

    Ok(())
}
