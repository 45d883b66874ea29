//! Certificate authentication filter and axum middleware.
//!
//! One pass per request, no retries:
//!
//! 1. trusted proxy DN header → country from the DN
//! 2. full certificate header → decode, optionally verify against the trust
//!    store, country from the certificate subject
//! 3. hash token header → trust store lookup, country from the record
//! 4. nothing → [`Rejection::NoCertificate`]
//!
//! An admitted request gets [`VerifiedCountry`] and [`Admission`] in its
//! extensions. A rejected request gets an empty `403`.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::{debug, warn};

use super::audit::{self, AuditEvent};
use super::decoder::PresentedCertificate;
use super::fingerprint::Fingerprint;
use super::identity::DistinguishedName;
use super::outcome::{Admission, AuthOutcome, Provenance, Rejection, VerifiedCountry};
use super::trust_store::{TrustStore, TrustedCertificate};
use crate::config::{CertAuthConfig, HeaderFieldConfig};

/// Per-deployment filter. Immutable once built; share through `Arc`.
pub struct CertAuthFilter {
    header_fields: HeaderFieldConfig,
    trust_distinguished_name: bool,
    public_paths: Vec<String>,
    store: Arc<dyn TrustStore>,
}

impl std::fmt::Debug for CertAuthFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertAuthFilter")
            .field("header_fields", &self.header_fields)
            .field("trust_distinguished_name", &self.trust_distinguished_name)
            .field("public_paths", &self.public_paths)
            .finish_non_exhaustive()
    }
}

impl CertAuthFilter {
    /// Build a filter from configuration and a trust store.
    pub fn new(config: &CertAuthConfig, store: Arc<dyn TrustStore>) -> Self {
        Self {
            header_fields: config.header_fields.clone(),
            trust_distinguished_name: config.trust_distinguished_name,
            public_paths: config.public_paths.clone(),
            store,
        }
    }

    /// Check if a path bypasses authentication.
    ///
    /// Matches the configured path itself or anything below it, so `/health`
    /// covers `/health/live` but not `/healthz`.
    #[must_use]
    pub fn is_public_path(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| {
            path.strip_prefix(p.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }

    /// Decide one request from its headers.
    pub async fn authenticate(&self, headers: &HeaderMap) -> AuthOutcome {
        self.evaluate(headers).await.into()
    }

    async fn evaluate(&self, headers: &HeaderMap) -> Result<Admission, Rejection> {
        let dn = header_value(headers, &self.header_fields.distinguished_name)?
            .map(DistinguishedName::from_header_value);
        let full_cert = header_value(headers, &self.header_fields.full_cert)?;
        let thumbprint = header_value(headers, &self.header_fields.thumbprint)?;

        if self.trust_distinguished_name {
            if let Some(dn) = &dn {
                return Ok(Admission {
                    country: dn.require_country()?,
                    provenance: Provenance::ProxyValidated,
                    fingerprint: None,
                });
            }
        }

        let admission = if let Some(value) = full_cert {
            self.admit_certificate(value).await?
        } else if let Some(token) = thumbprint {
            self.admit_hash_token(token).await?
        } else {
            return Err(Rejection::NoCertificate);
        };

        // An untrusted DN header may still name a country; it has to agree.
        if let Some(claimed) = dn.as_ref().and_then(DistinguishedName::country) {
            if claimed != admission.country {
                debug!(claimed, admitted = %admission.country, "DN header country disagrees");
                return Err(Rejection::CountryMismatch);
            }
        }

        Ok(admission)
    }

    async fn admit_certificate(&self, value: &str) -> Result<Admission, Rejection> {
        let presented = PresentedCertificate::from_header_value(value).map_err(|e| {
            debug!(error = %e, "Failed to decode certificate header");
            Rejection::from(e)
        })?;
        debug!(
            encoding = %presented.encoding,
            fingerprint = %presented.fingerprint,
            common_name = presented.subject.common_name().unwrap_or_default(),
            "Decoded client certificate"
        );

        if !self.header_fields.calculate_hash {
            return Ok(Admission {
                country: presented.subject.require_country()?,
                provenance: Provenance::UnverifiedCertificate,
                fingerprint: Some(presented.fingerprint),
            });
        }

        let record = self.lookup_usable(&presented.fingerprint).await?;
        let country = presented.subject.require_country()?;
        ensure_record_country(&record, &country)?;

        Ok(Admission {
            country,
            provenance: Provenance::TrustStore,
            fingerprint: Some(presented.fingerprint),
        })
    }

    async fn admit_hash_token(&self, token: &str) -> Result<Admission, Rejection> {
        let fingerprint = Fingerprint::parse_token(token).map_err(|e| {
            debug!(error = %e, "Failed to parse hash token header");
            Rejection::from(e)
        })?;
        let record = self.lookup_usable(&fingerprint).await?;
        if record.country.trim().is_empty() {
            return Err(Rejection::MissingCountry);
        }

        Ok(Admission {
            country: record.country,
            provenance: Provenance::HashToken,
            fingerprint: Some(fingerprint),
        })
    }

    async fn lookup_usable(&self, fingerprint: &Fingerprint) -> Result<TrustedCertificate, Rejection> {
        let Some(record) = self.store.lookup(fingerprint).await else {
            debug!(fingerprint = %fingerprint, "Fingerprint not in trust store");
            return Err(Rejection::UntrustedCertificate);
        };
        if !record.is_usable_at(Utc::now()) {
            debug!(
                fingerprint = %fingerprint,
                revoked = record.revoked,
                usage = ?record.usage,
                "Trust store record not usable"
            );
            return Err(Rejection::UntrustedCertificate);
        }
        Ok(record)
    }
}

/// Trimmed, non-empty header value. Non-UTF-8 values are malformed.
///
/// Non-ASCII DNs such as `O=Gesundheitsamt Köln,C=DE` are valid input.
fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, Rejection> {
    let Some(raw) = headers.get(name) else {
        return Ok(None);
    };
    let value = std::str::from_utf8(raw.as_bytes()).map_err(|_| {
        debug!(header = name, "Header value is not valid UTF-8");
        Rejection::MalformedCertificate
    })?;
    let value = value.trim();
    Ok((!value.is_empty()).then_some(value))
}

fn ensure_record_country(record: &TrustedCertificate, country: &str) -> Result<(), Rejection> {
    if record.country == country {
        Ok(())
    } else {
        debug!(
            record = %record.country,
            certificate = country,
            "Certificate subject country differs from trust store record"
        );
        Err(Rejection::CountryMismatch)
    }
}

/// Certificate authentication middleware
pub async fn cert_auth_middleware(
    State(filter): State<Arc<CertAuthFilter>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();

    if filter.is_public_path(&path) {
        debug!(path = %path, "Public path, skipping certificate authentication");
        return next.run(request).await;
    }

    let outcome = filter.authenticate(request.headers()).await;
    audit::emit(&AuditEvent::for_outcome(&outcome, &path));

    match outcome {
        AuthOutcome::Admitted(admission) => {
            debug!(
                path = %path,
                country = %admission.country,
                provenance = ?admission.provenance,
                "Authenticated request"
            );
            request
                .extensions_mut()
                .insert(VerifiedCountry(admission.country.clone()));
            request.extensions_mut().insert(admission);
            next.run(request).await
        }
        AuthOutcome::Rejected(reason) => {
            warn!(path = %path, reason = reason.code(), "Certificate authentication rejected");
            forbidden_response()
        }
    }
}

/// Create a 403 Forbidden response without any diagnostic body
fn forbidden_response() -> Response {
    StatusCode::FORBIDDEN.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certauth::trust_store::{CertificateUsage, InMemoryTrustStore};
    use axum::http::HeaderValue;
    use base64::{Engine, engine::general_purpose::STANDARD};
    use rcgen::{CertificateParams, DistinguishedName as RcgenDn, DnType, KeyPair};

    const DN: &str = "O=Test Firma GmbH,O=XXX,C=DE,U=Abteilung XYZ,TR=test";

    fn make_cert_der(country: Option<&str>) -> Vec<u8> {
        let mut params = CertificateParams::default();
        let mut dn = RcgenDn::new();
        dn.push(DnType::OrganizationName, "Test Firma GmbH");
        if let Some(c) = country {
            dn.push(DnType::CountryName, c);
        }
        params.distinguished_name = dn;
        let key_pair = KeyPair::generate().unwrap();
        params.self_signed(&key_pair).unwrap().der().to_vec()
    }

    fn config(calculate_hash: bool, trust_dn: bool) -> CertAuthConfig {
        CertAuthConfig {
            header_fields: HeaderFieldConfig {
                calculate_hash,
                ..HeaderFieldConfig::default()
            },
            trust_distinguished_name: trust_dn,
            ..CertAuthConfig::default()
        }
    }

    fn filter_with(records: Vec<TrustedCertificate>, calculate_hash: bool, trust_dn: bool) -> CertAuthFilter {
        let store = InMemoryTrustStore::new();
        for r in records {
            store.insert(r).unwrap();
        }
        CertAuthFilter::new(&config(calculate_hash, trust_dn), Arc::new(store))
    }

    fn trusted(der: &[u8], country: &str) -> TrustedCertificate {
        TrustedCertificate::from_der(der.to_vec(), country, CertificateUsage::Authentication).unwrap()
    }

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(
                axum::http::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_bytes(v.as_bytes()).unwrap(),
            );
        }
        map
    }

    fn expect_admitted(outcome: AuthOutcome) -> Admission {
        match outcome {
            AuthOutcome::Admitted(admission) => admission,
            AuthOutcome::Rejected(reason) => panic!("expected admission, got {reason:?}"),
        }
    }

    fn cert_header(der: &[u8]) -> (&'static str, String) {
        ("X-SSL-Client-Cert", STANDARD.encode(der))
    }

    #[tokio::test]
    async fn test_no_headers_is_no_certificate() {
        let filter = filter_with(vec![], true, false);
        let outcome = filter.authenticate(&HeaderMap::new()).await;
        assert_eq!(outcome.rejection(), Some(Rejection::NoCertificate));
    }

    #[tokio::test]
    async fn test_empty_certificate_header_is_no_certificate() {
        let filter = filter_with(vec![], true, false);
        let outcome = filter
            .authenticate(&headers(&[("X-SSL-Client-Cert", "   ")]))
            .await;
        assert_eq!(outcome.rejection(), Some(Rejection::NoCertificate));
    }

    #[tokio::test]
    async fn test_trusted_certificate_with_dn_admits() {
        let der = make_cert_der(Some("DE"));
        let filter = filter_with(vec![trusted(&der, "DE")], true, false);
        let (name, value) = cert_header(&der);

        let outcome = filter
            .authenticate(&headers(&[(name, &value), ("X-SSL-Client-DN", DN)]))
            .await;

        let admission = expect_admitted(outcome);
        assert_eq!(admission.country, "DE");
        assert_eq!(admission.provenance, Provenance::TrustStore);
        assert_eq!(admission.fingerprint, Some(Fingerprint::of_der(&der)));
    }

    #[tokio::test]
    async fn test_unknown_certificate_is_untrusted() {
        let der = make_cert_der(Some("DE"));
        let filter = filter_with(vec![], true, false);
        let (name, value) = cert_header(&der);
        let outcome = filter.authenticate(&headers(&[(name, &value)])).await;
        assert_eq!(outcome.rejection(), Some(Rejection::UntrustedCertificate));
    }

    #[tokio::test]
    async fn test_untrusted_beats_missing_country() {
        // GIVEN: an unknown certificate without a country
        let der = make_cert_der(None);
        let filter = filter_with(vec![], true, false);
        let (name, value) = cert_header(&der);
        let outcome = filter.authenticate(&headers(&[(name, &value)])).await;
        // THEN: trust is checked first
        assert_eq!(outcome.rejection(), Some(Rejection::UntrustedCertificate));
    }

    #[tokio::test]
    async fn test_trusted_certificate_without_country_is_missing_country() {
        let der = make_cert_der(None);
        let filter = filter_with(vec![trusted(&der, "DE")], true, false);
        let (name, value) = cert_header(&der);
        let outcome = filter.authenticate(&headers(&[(name, &value)])).await;
        assert_eq!(outcome.rejection(), Some(Rejection::MissingCountry));
    }

    #[tokio::test]
    async fn test_malformed_certificate() {
        let filter = filter_with(vec![], true, false);
        let outcome = filter
            .authenticate(&headers(&[("X-SSL-Client-Cert", "%%%not-a-cert")]))
            .await;
        assert_eq!(outcome.rejection(), Some(Rejection::MalformedCertificate));
    }

    #[tokio::test]
    async fn test_calculate_hash_disabled_skips_lookup() {
        // GIVEN: empty trust store, hash checking off
        let der = make_cert_der(Some("FR"));
        let filter = filter_with(vec![], false, false);
        let (name, value) = cert_header(&der);

        let outcome = filter.authenticate(&headers(&[(name, &value)])).await;

        let admission = expect_admitted(outcome);
        assert_eq!(admission.country, "FR");
        assert_eq!(admission.provenance, Provenance::UnverifiedCertificate);
    }

    #[tokio::test]
    async fn test_trusted_dn_header_bypasses_certificate() {
        // GIVEN: proxy DN trusted, garbage certificate header alongside
        let filter = filter_with(vec![], true, true);
        let outcome = filter
            .authenticate(&headers(&[("X-SSL-Client-DN", DN), ("X-SSL-Client-Cert", "garbage")]))
            .await;
        // THEN: DN wins, no decoding attempted
        let admission = expect_admitted(outcome);
        assert_eq!(admission.country, "DE");
        assert_eq!(admission.provenance, Provenance::ProxyValidated);
        assert!(admission.fingerprint.is_none());
    }

    #[tokio::test]
    async fn test_trusted_dn_without_country_is_missing_country() {
        let filter = filter_with(vec![], true, true);
        let outcome = filter
            .authenticate(&headers(&[("X-SSL-Client-DN", "O=Org,OU=Dept")]))
            .await;
        assert_eq!(outcome.rejection(), Some(Rejection::MissingCountry));
    }

    #[tokio::test]
    async fn test_untrusted_dn_alone_is_no_certificate() {
        let filter = filter_with(vec![], true, false);
        let outcome = filter.authenticate(&headers(&[("X-SSL-Client-DN", DN)])).await;
        assert_eq!(outcome.rejection(), Some(Rejection::NoCertificate));
    }

    #[tokio::test]
    async fn test_hash_token_admits_with_stored_country() {
        let der = make_cert_der(Some("DE"));
        let filter = filter_with(vec![trusted(&der, "BE")], true, false);
        let token = Fingerprint::of_der(&der).to_hex();

        let outcome = filter
            .authenticate(&headers(&[("X-SSL-Client-SHA256", &token)]))
            .await;

        let admission = expect_admitted(outcome);
        assert_eq!(admission.country, "BE");
        assert_eq!(admission.provenance, Provenance::HashToken);
    }

    #[tokio::test]
    async fn test_hash_token_miss_and_garbage() {
        let filter = filter_with(vec![], true, false);
        let miss = Fingerprint::of_der(b"unknown").to_hex();
        let outcome = filter
            .authenticate(&headers(&[("X-SSL-Client-SHA256", &miss)]))
            .await;
        assert_eq!(outcome.rejection(), Some(Rejection::UntrustedCertificate));

        let outcome = filter
            .authenticate(&headers(&[("X-SSL-Client-SHA256", "xyz")]))
            .await;
        assert_eq!(outcome.rejection(), Some(Rejection::MalformedCertificate));
    }

    #[tokio::test]
    async fn test_record_country_must_match_certificate() {
        let der = make_cert_der(Some("DE"));
        let filter = filter_with(vec![trusted(&der, "FR")], true, false);
        let (name, value) = cert_header(&der);
        let outcome = filter.authenticate(&headers(&[(name, &value)])).await;
        assert_eq!(outcome.rejection(), Some(Rejection::CountryMismatch));
    }

    #[tokio::test]
    async fn test_untrusted_dn_country_must_match() {
        let der = make_cert_der(Some("DE"));
        let filter = filter_with(vec![trusted(&der, "DE")], true, false);
        let (name, value) = cert_header(&der);
        let outcome = filter
            .authenticate(&headers(&[(name, &value), ("X-SSL-Client-DN", "O=Org,C=AT")]))
            .await;
        assert_eq!(outcome.rejection(), Some(Rejection::CountryMismatch));
    }

    #[tokio::test]
    async fn test_revoked_record_is_untrusted() {
        let der = make_cert_der(Some("DE"));
        let filter = filter_with(vec![trusted(&der, "DE").with_revoked(true)], true, false);
        let (name, value) = cert_header(&der);
        let outcome = filter.authenticate(&headers(&[(name, &value)])).await;
        assert_eq!(outcome.rejection(), Some(Rejection::UntrustedCertificate));
    }

    #[tokio::test]
    async fn test_filter_is_deterministic() {
        let der = make_cert_der(Some("DE"));
        let filter = filter_with(vec![trusted(&der, "DE")], true, false);
        let (name, value) = cert_header(&der);
        let request = headers(&[(name, &value)]);
        assert_eq!(filter.authenticate(&request).await, filter.authenticate(&request).await);
    }

    #[test]
    fn test_public_path_check() {
        let filter = filter_with(vec![], true, false);
        assert!(filter.is_public_path("/health"));
        assert!(filter.is_public_path("/health/live"));
        assert!(!filter.is_public_path("/identity"));
    }

    #[test]
    fn test_public_path_does_not_match_sibling_prefix() {
        let filter = filter_with(vec![], true, false);
        assert!(!filter.is_public_path("/healthz"));
        assert!(!filter.is_public_path("/health-admin"));
        assert!(!filter.is_public_path("/healthz-admin/secrets"));
    }

    const UTF8_DN: &str = "O=Gesundheitsamt Köln,C=DE";

    #[tokio::test]
    async fn test_utf8_dn_admitted_when_trusted() {
        // GIVEN: proxy DN trusted, organization with a non-ASCII character
        let filter = filter_with(vec![], false, true);

        // WHEN: only the DN header is sent
        let outcome = filter.authenticate(&headers(&[("X-SSL-Client-DN", UTF8_DN)])).await;

        // THEN: admitted as DE
        let admission = expect_admitted(outcome);
        assert_eq!(admission.country, "DE");
        assert_eq!(admission.provenance, Provenance::ProxyValidated);
    }

    #[tokio::test]
    async fn test_utf8_dn_alongside_trusted_certificate() {
        // GIVEN: hash checking on, DN not trusted, certificate in the store
        let der = make_cert_der(Some("DE"));
        let filter = filter_with(vec![trusted(&der, "DE")], true, false);
        let (name, value) = cert_header(&der);

        // WHEN: the proxy forwards the certificate and a UTF-8 DN
        let outcome = filter
            .authenticate(&headers(&[(name, &value), ("X-SSL-Client-DN", UTF8_DN)]))
            .await;

        // THEN: the certificate decides, the DN country agrees
        let admission = expect_admitted(outcome);
        assert_eq!(admission.country, "DE");
        assert_eq!(admission.provenance, Provenance::TrustStore);
    }

    #[tokio::test]
    async fn test_invalid_utf8_header_is_malformed() {
        let filter = filter_with(vec![], false, true);
        let mut map = HeaderMap::new();
        map.insert("x-ssl-client-dn", HeaderValue::from_bytes(b"O=Org,C=\xff\xfe").unwrap());
        let outcome = filter.authenticate(&map).await;
        assert_eq!(outcome.rejection(), Some(Rejection::MalformedCertificate));
    }
}
