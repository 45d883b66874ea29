//! Authentication outcomes attached to (or refused for) a request.

use serde::Serialize;
use thiserror::Error;

use super::decoder::DecodeError;
use super::fingerprint::Fingerprint;

/// Why a request was refused.
///
/// The reason is logged and audited but never sent to the caller; every
/// variant produces the same `403 Forbidden`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// A certificate or hash header was present but could not be decoded
    #[error("malformed certificate")]
    MalformedCertificate,

    /// Decoded fine but no usable trust store record matched
    #[error("untrusted certificate")]
    UntrustedCertificate,

    /// Distinguished name had no country attribute
    #[error("missing country")]
    MissingCountry,

    /// No recognised authentication header
    #[error("no certificate")]
    NoCertificate,

    /// The country claimed by the request differs from the trusted record
    #[error("country mismatch")]
    CountryMismatch,
}

impl Rejection {
    /// Stable identifier for logs and audit events.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::MalformedCertificate => "malformed_certificate",
            Self::UntrustedCertificate => "untrusted_certificate",
            Self::MissingCountry => "missing_country",
            Self::NoCertificate => "no_certificate",
            Self::CountryMismatch => "country_mismatch",
        }
    }
}

impl From<DecodeError> for Rejection {
    fn from(_: DecodeError) -> Self {
        Self::MalformedCertificate
    }
}

/// Who vouched for the caller's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// A TLS-terminating proxy validated the certificate and forwarded the DN
    ProxyValidated,
    /// Full certificate presented and its fingerprint found in the trust store
    TrustStore,
    /// Only a hash token presented; found in the trust store
    HashToken,
    /// Full certificate parsed without a trust store check
    UnverifiedCertificate,
}

/// An admitted caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Admission {
    /// Verified country code
    pub country: String,
    /// How the identity was established
    pub provenance: Provenance,
    /// Fingerprint involved in the decision, when there was one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
}

/// Country code of an admitted caller, inserted into request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCountry(pub String);

impl VerifiedCountry {
    /// The country code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Result of running the filter over one request.
///
/// Exactly one of country or rejection reason exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Request may proceed
    Admitted(Admission),
    /// Request is refused
    Rejected(Rejection),
}

impl AuthOutcome {
    /// Reason for a rejection.
    #[must_use]
    pub const fn rejection(&self) -> Option<Rejection> {
        match self {
            Self::Admitted(_) => None,
            Self::Rejected(r) => Some(*r),
        }
    }
}

impl From<Result<Admission, Rejection>> for AuthOutcome {
    fn from(result: Result<Admission, Rejection>) -> Self {
        match result {
            Ok(admission) => Self::Admitted(admission),
            Err(rejection) => Self::Rejected(rejection),
        }
    }
}
