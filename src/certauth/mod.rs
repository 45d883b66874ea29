//! Certificate-based request authentication.
//!
//! Certificates arrive in HTTP headers injected by a TLS-terminating reverse
//! proxy. The filter turns them into a verified country code or refuses the
//! request.
//!
//! # Architecture
//!
//! ```text
//! request headers
//!   → decoder        (header value → canonical DER)
//!   → fingerprint    (SHA-256 of DER)
//!   → trust_store    (fingerprint → TrustedCertificate)
//!   → identity       (subject / proxy DN → country)
//!   → filter         (admit: VerifiedCountry in extensions | reject: 403)
//! ```
//!
//! # Modules
//!
//! - [`decoder`]: header normalization pipeline (`PresentedCertificate`)
//! - [`fingerprint`]: SHA-256 fingerprints and hash-token parsing
//! - [`trust_store`]: `TrustStore` trait and `InMemoryTrustStore`
//! - [`identity`]: distinguished name parsing (`DistinguishedName`)
//! - [`filter`]: `CertAuthFilter` and the axum middleware
//! - [`outcome`]: `AuthOutcome`, `Rejection`, `Provenance`
//! - [`audit`]: structured audit events
//!
//! # Quick start
//!
//! ```yaml
//! cert_auth:
//!   header_fields:
//!     full_cert: "X-SSL-Client-Cert"
//!     thumbprint: "X-SSL-Client-SHA256"
//!     distinguished_name: "X-SSL-Client-DN"
//!     calculate_hash: true
//!   trust_distinguished_name: false
//! trust_store:
//!   certificates:
//!     - path: "/etc/certgate/trusted/de.pem"
//!       country: "DE"
//! ```

pub mod audit;
pub mod decoder;
pub mod filter;
pub mod fingerprint;
pub mod identity;
pub mod outcome;
pub mod trust_store;

pub use decoder::{DecodeError, PresentedCertificate, SourceEncoding};
pub use filter::{CertAuthFilter, cert_auth_middleware};
pub use fingerprint::Fingerprint;
pub use identity::DistinguishedName;
pub use outcome::{Admission, AuthOutcome, Provenance, Rejection, VerifiedCountry};
pub use trust_store::{CertificateUsage, InMemoryTrustStore, TrustStore, TrustedCertificate};
