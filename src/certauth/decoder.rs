//! Header value → canonical DER normalization.
//!
//! Reverse proxies and clients put certificates into headers in several
//! shapes: raw base64 DER, PEM with real or escaped line breaks, and either of
//! those percent-encoded. Decoding runs as a pipeline:
//!
//! ```text
//! url_decode → unescape_line_breaks → detect_encoding
//!   → strip_pem_armor (PEM only) → decode_base64 → parse_der
//! ```
//!
//! Every stage is a plain function so it can be tested on its own. The
//! pipeline never depends on which line break variant was used; all of them
//! are removed before base64 decoding.

use std::borrow::Cow;
use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::Serialize;
use thiserror::Error;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

use super::fingerprint::Fingerprint;
use super::identity::DistinguishedName;

/// Maximum accepted header value size (16 KiB is generous for one cert).
pub const MAX_HEADER_VALUE_LEN: usize = 16 * 1024;

/// PEM begin marker for X.509 certificates.
pub const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";

/// PEM end marker for X.509 certificates.
pub const PEM_END: &str = "-----END CERTIFICATE-----";

/// Errors raised by the decoding pipeline.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Header value was empty or whitespace only
    #[error("empty certificate value")]
    Empty,

    /// Header value exceeded [`MAX_HEADER_VALUE_LEN`]
    #[error("certificate value too large: {0} bytes (max {MAX_HEADER_VALUE_LEN})")]
    TooLarge(usize),

    /// Percent-decoding failed
    #[error("invalid url encoding: {0}")]
    UrlEncoding(String),

    /// PEM markers present but not well formed
    #[error("invalid PEM structure: {0}")]
    PemStructure(&'static str),

    /// Base64 payload could not be decoded
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Decoded bytes are not a DER X.509 certificate
    #[error("invalid DER certificate: {0}")]
    Der(String),

    /// Hash token is not a SHA-256 digest
    #[error("invalid fingerprint: {0}")]
    Fingerprint(String),
}

/// Line break style found in a PEM value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineBreak {
    /// No line breaks (single-line PEM)
    None,
    /// `\n`
    Lf,
    /// `\r\n`
    CrLf,
    /// The two characters `\` `n`
    EscapedLf,
    /// The four characters `\` `r` `\` `n`
    EscapedCrLf,
}

/// How the certificate was carried in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum SourceEncoding {
    /// Binary DER read from a file; headers never carry this
    Der,
    /// Base64 DER without PEM armor
    RawBase64 {
        /// Value was percent-encoded
        url_encoded: bool,
    },
    /// PEM text
    Pem {
        /// Value was percent-encoded
        url_encoded: bool,
        /// Line break style
        line_break: LineBreak,
    },
}

impl fmt::Display for SourceEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Der => write!(f, "der")?,
            Self::RawBase64 { url_encoded } => {
                write!(f, "raw-base64")?;
                if *url_encoded {
                    write!(f, "+url")?;
                }
            }
            Self::Pem {
                url_encoded,
                line_break,
            } => {
                write!(f, "pem/{line_break:?}")?;
                if *url_encoded {
                    write!(f, "+url")?;
                }
            }
        }
        Ok(())
    }
}

/// A certificate decoded from one request.
///
/// Lives only for the request that carried it.
#[derive(Debug, Clone)]
pub struct PresentedCertificate {
    /// Canonical DER bytes
    pub der: Vec<u8>,
    /// SHA-256 of `der`
    pub fingerprint: Fingerprint,
    /// Subject distinguished name
    pub subject: DistinguishedName,
    /// Encoding detected in the header value
    pub encoding: SourceEncoding,
}

impl PresentedCertificate {
    /// Run the full pipeline over a header value.
    pub fn from_header_value(value: &str) -> Result<Self, DecodeError> {
        let (der, encoding) = decode_to_der(value)?;
        Self::from_der(der, encoding)
    }

    /// Build from DER bytes already extracted.
    pub fn from_der(der: Vec<u8>, encoding: SourceEncoding) -> Result<Self, DecodeError> {
        let cert = parse_der(&der)?;
        let subject = DistinguishedName::from_x509(cert.subject());
        let fingerprint = Fingerprint::of_der(&der);
        Ok(Self {
            der,
            fingerprint,
            subject,
            encoding,
        })
    }
}

/// Decode a header value into DER bytes without building the subject.
///
/// DER is still parsed once so that garbage that happens to be valid base64
/// is rejected here.
pub fn decode_to_der(value: &str) -> Result<(Vec<u8>, SourceEncoding), DecodeError> {
    if value.len() > MAX_HEADER_VALUE_LEN {
        return Err(DecodeError::TooLarge(value.len()));
    }
    let value = value.trim();
    if value.is_empty() {
        return Err(DecodeError::Empty);
    }

    let (decoded, url_encoded) = url_decode(value)?;
    let line_break = detect_line_break(&decoded);
    let unescaped = unescape_line_breaks(&decoded);
    let unescaped = unescaped.trim();

    let (body, encoding) = if unescaped.starts_with(PEM_BEGIN) {
        (
            strip_pem_armor(unescaped)?,
            SourceEncoding::Pem {
                url_encoded,
                line_break,
            },
        )
    } else {
        (
            strip_whitespace(unescaped),
            SourceEncoding::RawBase64 { url_encoded },
        )
    };

    let der = decode_base64(&body)?;
    parse_der(&der)?;
    Ok((der, encoding))
}

/// Percent-decode a value when it contains `%`.
///
/// Uses form semantics (`+` is a space), matching how clients encode the PEM
/// begin marker as `-----BEGIN+CERTIFICATE-----`. A literal `+` only occurs
/// in values that were never percent-encoded, so those are left alone.
pub fn url_decode(value: &str) -> Result<(Cow<'_, str>, bool), DecodeError> {
    if !value.contains('%') {
        return Ok((Cow::Borrowed(value), false));
    }
    let spaced = value.replace('+', " ");
    let decoded = urlencoding::decode(&spaced)
        .map_err(|e| DecodeError::UrlEncoding(e.to_string()))?
        .into_owned();
    Ok((Cow::Owned(decoded), true))
}

/// Inspect which line break variant a (url-decoded) value uses.
pub fn detect_line_break(value: &str) -> LineBreak {
    if value.contains("\\r\\n") {
        LineBreak::EscapedCrLf
    } else if value.contains("\\n") {
        LineBreak::EscapedLf
    } else if value.contains("\r\n") {
        LineBreak::CrLf
    } else if value.contains('\n') {
        LineBreak::Lf
    } else {
        LineBreak::None
    }
}

/// Turn escaped `\r\n` and `\n` sequences back into real line breaks.
///
/// Base64 never contains a backslash, so any escape found is structural.
pub fn unescape_line_breaks(value: &str) -> Cow<'_, str> {
    if !value.contains('\\') {
        return Cow::Borrowed(value);
    }
    Cow::Owned(
        value
            .replace("\\r\\n", "\n")
            .replace("\\n", "\n")
            .replace("\\r", "\n"),
    )
}

/// Extract the base64 body between the PEM markers, whitespace removed.
pub fn strip_pem_armor(pem: &str) -> Result<String, DecodeError> {
    let rest = pem
        .strip_prefix(PEM_BEGIN)
        .ok_or(DecodeError::PemStructure("missing BEGIN marker"))?;
    let end = rest
        .find(PEM_END)
        .ok_or(DecodeError::PemStructure("missing END marker"))?;
    let body = strip_whitespace(&rest[..end]);
    if body.is_empty() {
        return Err(DecodeError::PemStructure("empty body"));
    }
    Ok(body)
}

/// Base64-decode a whitespace-free body.
pub fn decode_base64(body: &str) -> Result<Vec<u8>, DecodeError> {
    if body.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(STANDARD.decode(body)?)
}

/// Parse DER bytes as a single X.509 certificate with no trailing data.
pub fn parse_der(der: &[u8]) -> Result<X509Certificate<'_>, DecodeError> {
    let (rest, cert) =
        X509Certificate::from_der(der).map_err(|e| DecodeError::Der(e.to_string()))?;
    if !rest.is_empty() {
        return Err(DecodeError::Der(format!(
            "{} trailing bytes after certificate",
            rest.len()
        )));
    }
    Ok(cert)
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}
