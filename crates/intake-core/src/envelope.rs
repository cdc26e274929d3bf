// SPDX-License-Identifier: MIT OR Apache-2.0
//! The response envelope shared by every ingest-family endpoint.
//!
//! Envelopes are cached verbatim on the intent row for idempotent replay, so
//! every optional member uses `skip_serializing_if` — a replayed envelope
//! must serialise byte-equal to the first emission.

use crate::plan::Plan;
use crate::status::{AnswerType, ClarificationStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Outcome tag carried by a response envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeStatus {
    /// Canonicalisation complete; a plan is attached.
    Ready,
    /// Blocked on the attached clarification.
    NeedsClarification,
    /// Refused by validation or policy.
    Rejected,
    /// Journalled without normalisation (`/v1/actions`).
    Accepted,
    /// Plan dispatched; every action succeeded.
    Executed,
    /// Plan dispatch failed or was not configured.
    Failed,
}

impl EnvelopeStatus {
    /// Stable string tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::NeedsClarification => "needs_clarification",
            Self::Rejected => "rejected",
            Self::Accepted => "accepted",
            Self::Executed => "executed",
            Self::Failed => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// Supporting payloads
// ---------------------------------------------------------------------------

/// One disambiguation candidate offered to the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Stable candidate identifier.
    pub id: String,
    /// Human-readable label.
    pub label: String,
    /// Resolver score in `[0, 1]`, when the candidate came from a search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Opaque resolver metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// Clarification as presented to the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClarificationView {
    /// Row identifier, used by the answer endpoint.
    pub clarification_id: String,
    /// Owning intent.
    pub intent_id: String,
    /// The question to put to the user.
    pub question: String,
    /// Expected answer shape.
    pub expected_answer_type: AnswerType,
    /// Ordered candidates (empty for free-form questions).
    pub candidates: Vec<Candidate>,
    /// Current lifecycle status.
    pub status: ClarificationStatus,
    /// The accepted answer, once answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<Value>,
    /// When the answer was accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answered_at: Option<DateTime<Utc>>,
}

/// Structured error payload (`error` member of the envelope and the 4xx
/// pre-ingest body).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Extra context; `status_code` is set for HTTP-adjacent failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorPayload {
    /// Build a payload with no details.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Attach an HTTP status code (and optional extra details), mirroring
    /// the `details.status_code` convention of the edge error body.
    pub fn with_status_code(mut self, status_code: u16, details: Option<Value>) -> Self {
        let mut map = match details {
            Some(Value::Object(map)) => map,
            Some(other) => {
                let mut map = serde_json::Map::new();
                map.insert("details".into(), other);
                map
            }
            None => serde_json::Map::new(),
        };
        map.entry("status_code")
            .or_insert_with(|| Value::from(status_code));
        self.details = Some(Value::Object(map));
        self
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The response envelope for ingest, replay, status reads, and answers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Outcome tag.
    pub status: EnvelopeStatus,
    /// Owning intent.
    pub intent_id: String,
    /// Correlation ID echoed to the caller.
    pub correlation_id: String,
    /// Receipt handle (the intent ID today).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_id: Option<String>,
    /// Trace ID for log correlation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Idempotency key of the originating body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// Action plan (status `ready` / `executed`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    /// Open clarification (status `needs_clarification`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification: Option<ClarificationView>,
    /// Rejection code (status `rejected` / `failed`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Human-readable outcome message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Endpoint-specific context (`request_id`, execution results, …).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Structured error, when the outcome is an error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl Envelope {
    /// Minimal envelope with the given status and identity.
    pub fn new(
        status: EnvelopeStatus,
        intent_id: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            status,
            intent_id: intent_id.into(),
            correlation_id: correlation_id.into(),
            receipt_id: None,
            trace_id: None,
            idempotency_key: None,
            plan: None,
            clarification: None,
            error_code: None,
            message: None,
            details: None,
            error: None,
        }
    }

    /// Fill `receipt_id`, `trace_id`, and `idempotency_key`.
    ///
    /// With `overwrite = false` existing values are kept — used when
    /// replaying a cached envelope, which must be returned verbatim.
    pub fn attach_receipt_fields(
        &mut self,
        intent_id: &str,
        trace_id: &str,
        idempotency_key: &str,
        overwrite: bool,
    ) {
        if overwrite || self.receipt_id.is_none() {
            self.receipt_id = Some(intent_id.to_string());
        }
        if overwrite || self.trace_id.is_none() {
            self.trace_id = Some(trace_id.to_string());
        }
        if overwrite || self.idempotency_key.is_none() {
            self.idempotency_key = Some(idempotency_key.to_string());
        }
    }

    /// Merge `request_id` into `details` without clobbering existing keys.
    pub fn attach_request_id(&mut self, request_id: &str) {
        let mut map = match self.details.take() {
            Some(Value::Object(map)) => map,
            Some(other) => {
                let mut map = serde_json::Map::new();
                map.insert("details".into(), other);
                map
            }
            None => serde_json::Map::new(),
        };
        map.entry("request_id")
            .or_insert_with(|| Value::from(request_id));
        self.details = Some(Value::Object(map));
    }
}
