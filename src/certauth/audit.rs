//! Audit logging for authentication decisions.
//!
//! Every filtered request produces exactly one event, emitted via
//! `tracing::info!` with the serialized event in the `audit` field.
//!
//! | Event | When |
//! |-------|------|
//! | `cert_auth.admitted` | The request passed the filter |
//! | `cert_auth.rejected` | The request was refused; `reason` names why |

use serde::Serialize;

use super::fingerprint::Fingerprint;
use super::outcome::{Admission, AuthOutcome, Provenance, Rejection};

/// Structured audit event for one authentication decision.
#[derive(Debug, Serialize)]
pub struct AuditEvent {
    /// Event type string (e.g., `"cert_auth.admitted"`).
    pub event: &'static str,
    /// Request path.
    pub path: String,
    /// Admitted country.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// Trust mode that admitted the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
    /// Fingerprint involved in the decision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
    /// Rejection reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Rejection>,
}

impl AuditEvent {
    /// Construct a `cert_auth.admitted` event.
    #[must_use]
    pub fn admitted(admission: &Admission, path: &str) -> Self {
        Self {
            event: "cert_auth.admitted",
            path: path.to_owned(),
            country: Some(admission.country.clone()),
            provenance: Some(admission.provenance),
            fingerprint: admission.fingerprint,
            reason: None,
        }
    }

    /// Construct a `cert_auth.rejected` event.
    #[must_use]
    pub fn rejected(reason: Rejection, path: &str) -> Self {
        Self {
            event: "cert_auth.rejected",
            path: path.to_owned(),
            country: None,
            provenance: None,
            fingerprint: None,
            reason: Some(reason),
        }
    }

    /// Event for whichever way the filter decided.
    #[must_use]
    pub fn for_outcome(outcome: &AuthOutcome, path: &str) -> Self {
        match outcome {
            AuthOutcome::Admitted(admission) => Self::admitted(admission, path),
            AuthOutcome::Rejected(reason) => Self::rejected(*reason, path),
        }
    }
}

/// Emit an audit event via `tracing::info!` with structured fields.
///
/// ```text
/// INFO certgate::certauth::audit audit={"event":"cert_auth.rejected","path":"/identity","reason":"no_certificate"}
/// ```
pub fn emit(event: &AuditEvent) {
    match serde_json::to_string(event) {
        Ok(ref json) => tracing::info!(audit = %json, "cert_auth audit"),
        Err(ref e) => tracing::warn!(error = %e, "Failed to serialize audit event"),
    }
}
