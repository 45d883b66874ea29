//! Certificate fingerprints.
//!
//! A [`Fingerprint`] is the SHA-256 digest of a certificate's canonical DER
//! encoding. It is the trust store key and the value carried by the
//! hash-token header.

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use super::decoder::{DecodeError, url_decode};

/// Length of a SHA-256 digest in bytes.
pub const FINGERPRINT_LEN: usize = 32;

/// SHA-256 digest of a DER-encoded certificate.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Compute the fingerprint of canonical DER bytes.
    #[must_use]
    pub fn of_der(der: &[u8]) -> Self {
        let digest = Sha256::digest(der);
        let mut bytes = [0u8; FINGERPRINT_LEN];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// Lowercase hex rendering.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a hash-token header value.
    ///
    /// Accepts 64 hex characters in either case, or the base64 encoding of
    /// the 32 digest bytes. Base64 tokens are percent-decoded first when they
    /// contain `%`.
    pub fn parse_token(token: &str) -> Result<Self, DecodeError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(DecodeError::Empty);
        }

        if token.len() == FINGERPRINT_LEN * 2 && token.bytes().all(|b| b.is_ascii_hexdigit()) {
            let mut bytes = [0u8; FINGERPRINT_LEN];
            hex::decode_to_slice(token, &mut bytes)
                .map_err(|e| DecodeError::Fingerprint(e.to_string()))?;
            return Ok(Self(bytes));
        }

        let (token, _) = url_decode(token)?;
        let raw = STANDARD.decode(token.trim())?;
        let bytes: [u8; FINGERPRINT_LEN] = raw.try_into().map_err(|raw: Vec<u8>| {
            DecodeError::Fingerprint(format!(
                "expected {FINGERPRINT_LEN} digest bytes, got {}",
                raw.len()
            ))
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse_token(&s).map_err(serde::de::Error::custom)
    }
}
