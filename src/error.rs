//! Error types for certgate

use std::io;

use thiserror::Error;

/// Result type alias for certgate
pub type Result<T> = std::result::Result<T, Error>;

/// Process-level errors.
///
/// Request-scoped authentication failures are not errors in this sense; they
/// are [`Rejection`](crate::certauth::Rejection)s and never leave the filter.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A certificate imported into the trust store could not be used
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// Two trust store records would share a fingerprint
    #[error("Duplicate fingerprint in trust store: {0}")]
    DuplicateFingerprint(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
