//! Distinguished name parsing and country extraction.
//!
//! Two sources produce a [`DistinguishedName`]:
//!
//! - a `key=value,key=value` string forwarded by a TLS-terminating proxy
//!   (e.g. `O=Test Firma GmbH,O=XXX,C=DE,U=Abteilung XYZ,TR=test`), and
//! - the subject of a parsed X.509 certificate.
//!
//! Attribute order is preserved. When a key occurs more than once the last
//! occurrence wins.

use std::fmt;

use serde::Serialize;
use x509_parser::oid_registry::{
    OID_X509_COMMON_NAME, OID_X509_COUNTRY_NAME, OID_X509_LOCALITY_NAME,
    OID_X509_ORGANIZATION_NAME, OID_X509_ORGANIZATIONAL_UNIT, OID_X509_STATE_OR_PROVINCE_NAME,
};
use x509_parser::x509::X509Name;

use super::Rejection;
use super::decoder::url_decode;

/// Attribute key holding the country code.
pub const COUNTRY_KEY: &str = "C";

/// Ordered list of distinguished name attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DistinguishedName {
    attributes: Vec<(String, String)>,
}

impl DistinguishedName {
    /// Parse a comma-separated `key=value` string.
    ///
    /// Keys and values are trimmed. Segments without `=` and segments with an
    /// empty key are skipped. Unknown keys are kept but never interpreted.
    ///
    /// A backslash escapes the next character (RFC 4514), so `O=Evil\,C=FR`
    /// is one organization attribute and cannot inject a country. Hex pair
    /// escapes (`\4B`) are not decoded.
    #[must_use]
    pub fn parse(dn: &str) -> Self {
        let attributes = split_unescaped(dn)
            .into_iter()
            .filter_map(|segment| {
                let (key, value) = segment.split_once('=')?;
                let key = key.trim();
                if key.is_empty() {
                    return None;
                }
                Some((key.to_owned(), unescape(value.trim())))
            })
            .collect();
        Self { attributes }
    }

    /// Parse a header value, percent-decoding it first when it contains `%`.
    ///
    /// Decoding follows [`url_decode`] (`+` is a space). A value that fails
    /// to decode is parsed as is.
    #[must_use]
    pub fn from_header_value(value: &str) -> Self {
        match url_decode(value) {
            Ok((decoded, _)) => Self::parse(&decoded),
            Err(_) => Self::parse(value),
        }
    }

    /// Collect the subject attributes of a parsed certificate.
    #[must_use]
    pub fn from_x509(name: &X509Name<'_>) -> Self {
        let attributes = name
            .iter_attributes()
            .filter_map(|attr| {
                let value = attr.as_str().ok()?;
                let oid = attr.attr_type();
                let key = if *oid == OID_X509_COUNTRY_NAME {
                    "C".to_owned()
                } else if *oid == OID_X509_ORGANIZATION_NAME {
                    "O".to_owned()
                } else if *oid == OID_X509_ORGANIZATIONAL_UNIT {
                    "OU".to_owned()
                } else if *oid == OID_X509_COMMON_NAME {
                    "CN".to_owned()
                } else if *oid == OID_X509_LOCALITY_NAME {
                    "L".to_owned()
                } else if *oid == OID_X509_STATE_OR_PROVINCE_NAME {
                    "ST".to_owned()
                } else {
                    oid.to_id_string()
                };
                Some((key, value.trim().to_owned()))
            })
            .collect();
        Self { attributes }
    }

    /// Value of the last attribute named `key` (case-insensitive).
    ///
    /// Empty values count as absent.
    #[must_use]
    pub fn last(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    /// Country code, if any.
    #[must_use]
    pub fn country(&self) -> Option<&str> {
        self.last(COUNTRY_KEY)
    }

    /// Country code, or [`Rejection::MissingCountry`].
    pub fn require_country(&self) -> Result<String, Rejection> {
        self.country()
            .map(str::to_owned)
            .ok_or(Rejection::MissingCountry)
    }

    /// Common name, if any.
    #[must_use]
    pub fn common_name(&self) -> Option<&str> {
        self.last("CN")
    }

    /// Whether no attributes were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Split on commas that are not preceded by a backslash escape.
fn split_unescaped(dn: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in dn.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            ',' => {
                segments.push(&dn[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&dn[start..]);
    segments
}

/// Drop the backslash from `\x` escapes.
fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
                continue;
            }
        }
        out.push(c);
    }
    out
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.attributes.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}
