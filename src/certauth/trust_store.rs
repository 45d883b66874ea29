//! Trusted certificate store.
//!
//! The [`TrustStore`] trait is the read interface the filter depends on. The
//! records behind it are imported by an administrative process; the request
//! path never writes.
//!
//! [`InMemoryTrustStore`] is a `DashMap` keyed by fingerprint, filled at
//! startup from the `trust_store` configuration block.

use std::path::Path;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::decoder::{decode_to_der, parse_der};
use super::fingerprint::Fingerprint;
use super::identity::DistinguishedName;
use crate::config::{TrustStoreConfig, TrustedCertificateEntry};
use crate::{Error, Result};

/// What a trusted certificate may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CertificateUsage {
    /// Client authentication (the only usage the filter accepts)
    #[default]
    Authentication,
    /// Payload signing
    Signing,
    /// Outbound callback TLS
    Callback,
}

/// One certificate the system is willing to accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrustedCertificate {
    /// SHA-256 of `der`
    pub fingerprint: Fingerprint,
    /// Country that owns the certificate
    pub country: String,
    /// Canonical DER bytes
    #[serde(skip)]
    pub der: Vec<u8>,
    /// Start of the validity window
    pub not_before: DateTime<Utc>,
    /// End of the validity window
    pub not_after: DateTime<Utc>,
    /// Administratively revoked
    pub revoked: bool,
    /// Permitted usage
    pub usage: CertificateUsage,
}

impl TrustedCertificate {
    /// Build a record from DER bytes, reading the validity window from the
    /// certificate itself.
    pub fn from_der(der: Vec<u8>, country: impl Into<String>, usage: CertificateUsage) -> Result<Self> {
        let cert = parse_der(&der).map_err(|e| Error::Certificate(e.to_string()))?;
        let validity = cert.validity();
        let not_before = timestamp(validity.not_before.timestamp())?;
        let not_after = timestamp(validity.not_after.timestamp())?;
        let fingerprint = Fingerprint::of_der(&der);

        Ok(Self {
            fingerprint,
            country: country.into(),
            der,
            not_before,
            not_after,
            revoked: false,
            usage,
        })
    }

    /// Mark the record revoked.
    #[must_use]
    pub fn with_revoked(mut self, revoked: bool) -> Self {
        self.revoked = revoked;
        self
    }

    /// Override the validity window.
    #[must_use]
    pub fn with_validity(mut self, not_before: DateTime<Utc>, not_after: DateTime<Utc>) -> Self {
        self.not_before = not_before;
        self.not_after = not_after;
        self
    }

    /// Subject of the stored certificate.
    pub fn subject(&self) -> Result<DistinguishedName> {
        let cert = parse_der(&self.der).map_err(|e| Error::Certificate(e.to_string()))?;
        Ok(DistinguishedName::from_x509(cert.subject()))
    }

    /// Whether the record may admit a request at `now`.
    ///
    /// Revoked, expired, not-yet-valid and non-authentication records are
    /// never usable.
    #[must_use]
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked
            && self.usage == CertificateUsage::Authentication
            && self.not_before <= now
            && now <= self.not_after
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| Error::Certificate(format!("validity timestamp out of range: {secs}")))
}

/// Read interface over trusted certificates.
///
/// Implementations must be `Send + Sync`; many requests look up concurrently
/// and the filter adds no locking of its own.
#[async_trait::async_trait]
pub trait TrustStore: Send + Sync + 'static {
    /// Find the record for a fingerprint.
    async fn lookup(&self, fingerprint: &Fingerprint) -> Option<TrustedCertificate>;
}

/// Trust store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryTrustStore {
    by_fingerprint: DashMap<Fingerprint, TrustedCertificate>,
}

impl InMemoryTrustStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Import every certificate listed in the configuration.
    pub fn from_config(config: &TrustStoreConfig) -> Result<Self> {
        let store = Self::new();
        for entry in &config.certificates {
            let record = load_entry(entry)?;
            let subject = record.subject()?;
            debug!(
                fingerprint = %record.fingerprint,
                country = %record.country,
                subject = %subject,
                path = %entry.path,
                "Imported trusted certificate"
            );
            // Full-certificate requests compare the two and would be refused
            if subject.country() != Some(record.country.as_str()) {
                warn!(
                    path = %entry.path,
                    configured = %record.country,
                    subject = %subject,
                    "Configured country differs from certificate subject"
                );
            }
            store.insert(record)?;
        }
        info!(certificates = store.len(), "Trust store loaded");
        Ok(store)
    }

    /// Add a record. Fails if the fingerprint is already present.
    pub fn insert(&self, record: TrustedCertificate) -> Result<()> {
        match self.by_fingerprint.entry(record.fingerprint) {
            Entry::Occupied(_) => {
                Err(Error::DuplicateFingerprint(record.fingerprint.to_hex()))
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_fingerprint.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_fingerprint.is_empty()
    }
}

#[async_trait::async_trait]
impl TrustStore for InMemoryTrustStore {
    async fn lookup(&self, fingerprint: &Fingerprint) -> Option<TrustedCertificate> {
        self.by_fingerprint.get(fingerprint).map(|r| r.value().clone())
    }
}

/// Read a certificate file (PEM or DER) named by a configuration entry.
fn load_entry(entry: &TrustedCertificateEntry) -> Result<TrustedCertificate> {
    let path = Path::new(&entry.path);
    let bytes = std::fs::read(path).map_err(|e| {
        Error::Config(format!("Failed to read certificate {}: {e}", path.display()))
    })?;

    // Certificate DER is never valid UTF-8 (long-form length octets), so text means PEM or base64.
    let der = match String::from_utf8(bytes) {
        Ok(text) => decode_to_der(&text)
            .map(|(der, _)| der)
            .map_err(|e| Error::Certificate(format!("{}: {e}", path.display())))?,
        Err(e) => e.into_bytes(),
    };

    Ok(TrustedCertificate::from_der(der, entry.country.clone(), entry.usage)?
        .with_revoked(entry.revoked))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rcgen::{CertificateParams, DistinguishedName as RcgenDn, DnType, KeyPair};

    fn make_cert(country: &str) -> rcgen::Certificate {
        let mut params = CertificateParams::default();
        let mut dn = RcgenDn::new();
        dn.push(DnType::CountryName, country);
        params.distinguished_name = dn;
        let key_pair = KeyPair::generate().unwrap();
        params.self_signed(&key_pair).unwrap()
    }

    fn record(country: &str) -> TrustedCertificate {
        let der = make_cert(country).der().to_vec();
        TrustedCertificate::from_der(der, country, CertificateUsage::Authentication).unwrap()
    }

    #[test]
    fn from_der_derives_fingerprint_and_validity() {
        let der = make_cert("DE").der().to_vec();
        let rec = TrustedCertificate::from_der(der.clone(), "DE", CertificateUsage::Authentication)
            .unwrap();
        assert_eq!(rec.fingerprint, Fingerprint::of_der(&der));
        assert!(rec.not_before < rec.not_after);
        assert_eq!(rec.subject().unwrap().country(), Some("DE"));
    }

    #[test]
    fn from_der_rejects_garbage() {
        let result =
            TrustedCertificate::from_der(b"nope".to_vec(), "DE", CertificateUsage::Authentication);
        assert!(matches!(result, Err(Error::Certificate(_))));
    }

    #[test]
    fn usable_only_when_valid_unrevoked_and_for_authentication() {
        let now = Utc::now();
        let rec = record("DE");
        assert!(rec.is_usable_at(now));

        assert!(!rec.clone().with_revoked(true).is_usable_at(now));

        let mut signing = rec.clone();
        signing.usage = CertificateUsage::Signing;
        assert!(!signing.is_usable_at(now));

        let expired = rec
            .clone()
            .with_validity(now - Duration::days(10), now - Duration::days(1));
        assert!(!expired.is_usable_at(now));

        let not_yet = rec.with_validity(now + Duration::days(1), now + Duration::days(10));
        assert!(!not_yet.is_usable_at(now));
    }

    #[tokio::test]
    async fn lookup_hits_and_misses() {
        let store = InMemoryTrustStore::new();
        let rec = record("DE");
        let fp = rec.fingerprint;
        store.insert(rec).unwrap();

        assert_eq!(store.lookup(&fp).await.map(|r| r.country), Some("DE".to_string()));
        assert!(store.lookup(&Fingerprint::of_der(b"other")).await.is_none());
    }

    #[test]
    fn duplicate_fingerprint_is_rejected() {
        let store = InMemoryTrustStore::new();
        let rec = record("DE");
        store.insert(rec.clone()).unwrap();
        assert!(matches!(store.insert(rec), Err(Error::DuplicateFingerprint(_))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn from_config_loads_pem_and_der_files() {
        // GIVEN: one PEM file and one DER file on disk
        let dir = tempfile::tempdir().unwrap();
        let pem_cert = make_cert("DE");
        let der_cert = make_cert("FR");
        let pem_path = dir.path().join("de.pem");
        let der_path = dir.path().join("fr.der");
        std::fs::write(&pem_path, pem_cert.pem()).unwrap();
        std::fs::write(&der_path, der_cert.der().as_ref()).unwrap();

        let config = TrustStoreConfig {
            certificates: vec![
                TrustedCertificateEntry {
                    path: pem_path.display().to_string(),
                    country: "DE".to_string(),
                    usage: CertificateUsage::Authentication,
                    revoked: false,
                },
                TrustedCertificateEntry {
                    path: der_path.display().to_string(),
                    country: "FR".to_string(),
                    usage: CertificateUsage::Signing,
                    revoked: true,
                },
            ],
        };

        // WHEN: loading
        let store = InMemoryTrustStore::from_config(&config).unwrap();

        // THEN: both imported with their attributes
        assert_eq!(store.len(), 2);
        let fr = store
            .by_fingerprint
            .get(&Fingerprint::of_der(der_cert.der()))
            .unwrap()
            .clone();
        assert!(fr.revoked);
        assert_eq!(fr.usage, CertificateUsage::Signing);
        assert!(
            store
                .by_fingerprint
                .contains_key(&Fingerprint::of_der(pem_cert.der()))
        );
    }

    #[test]
    fn from_config_missing_file_is_config_error() {
        let config = TrustStoreConfig {
            certificates: vec![TrustedCertificateEntry {
                path: "/nonexistent/cert.pem".to_string(),
                country: "DE".to_string(),
                usage: CertificateUsage::Authentication,
                revoked: false,
            }],
        };
        assert!(matches!(
            InMemoryTrustStore::from_config(&config),
            Err(Error::Config(_))
        ));
    }
}
