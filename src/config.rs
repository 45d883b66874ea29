//! Configuration management

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::certauth::CertificateUsage;
use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Certificate authentication configuration
    pub cert_auth: CertAuthConfig,
    /// Trusted certificates imported at startup
    pub trust_store: TrustStoreConfig,
}

impl Config {
    /// Load configuration from an optional YAML file plus `CERTGATE_`
    /// environment variables (`__` separates nested keys).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("CERTGATE_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the filter cannot run with.
    pub fn validate(&self) -> Result<()> {
        let fields = &self.cert_auth.header_fields;
        for (key, value) in [
            ("full_cert", &fields.full_cert),
            ("thumbprint", &fields.thumbprint),
            ("distinguished_name", &fields.distinguished_name),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!(
                    "cert_auth.header_fields.{key} must not be empty"
                )));
            }
            if axum::http::HeaderName::from_bytes(value.as_bytes()).is_err() {
                return Err(Error::Config(format!(
                    "cert_auth.header_fields.{key} is not a valid header name: {value}"
                )));
            }
        }
        for entry in &self.trust_store.certificates {
            if entry.country.trim().is_empty() {
                return Err(Error::Config(format!(
                    "trust_store entry {} has no country",
                    entry.path
                )));
            }
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8443,
        }
    }
}

/// Certificate authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CertAuthConfig {
    /// Header names and hash-check toggle
    pub header_fields: HeaderFieldConfig,

    /// Admit requests on the distinguished-name header alone.
    ///
    /// Only enable behind a reverse proxy that validates the client
    /// certificate and strips this header from untrusted input.
    pub trust_distinguished_name: bool,

    /// Paths that bypass authentication (default: `["/health"]`)
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
}

fn default_public_paths() -> Vec<String> {
    vec!["/health".to_string()]
}

impl Default for CertAuthConfig {
    fn default() -> Self {
        Self {
            header_fields: HeaderFieldConfig::default(),
            trust_distinguished_name: false,
            public_paths: default_public_paths(),
        }
    }
}

/// Which headers carry the client's credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderFieldConfig {
    /// Header carrying the full certificate (PEM or base64 DER)
    pub full_cert: String,
    /// Header carrying a SHA-256 fingerprint (hex or base64)
    pub thumbprint: String,
    /// Header carrying the subject distinguished name
    pub distinguished_name: String,
    /// Require a presented full certificate to hash-match a trust store entry
    pub calculate_hash: bool,
}

impl Default for HeaderFieldConfig {
    fn default() -> Self {
        Self {
            full_cert: "X-SSL-Client-Cert".to_string(),
            thumbprint: "X-SSL-Client-SHA256".to_string(),
            distinguished_name: "X-SSL-Client-DN".to_string(),
            calculate_hash: false,
        }
    }
}

/// Trusted certificates to import at startup
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TrustStoreConfig {
    /// Certificate files and their owners
    pub certificates: Vec<TrustedCertificateEntry>,
}

/// One trusted certificate file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustedCertificateEntry {
    /// Path to a PEM or DER certificate
    pub path: String,
    /// Owning country code
    pub country: String,
    /// Permitted usage
    #[serde(default)]
    pub usage: CertificateUsage,
    /// Administratively revoked
    #[serde(default)]
    pub revoked: bool,
}
