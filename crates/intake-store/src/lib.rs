// SPDX-License-Identifier: MIT OR Apache-2.0
//! Storage traits and row models for the intake service.
//!
//! Three stores back the lifecycle: the intent table (upsert-by-idempotency-
//! key with mutable status and canonical slots), the clarification table
//! (insert / guarded answer / expiry), and the append-only artifact journal.
//! The controller only sees these traits; [`memory::MemoryStore`] backs the
//! test suite and [`postgres::PgStore`] backs production.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use intake_core::{
    AnswerType, ArtifactKind, Candidate, ClarificationStatus, IntentStatus, canonical_json,
    sha256_hex,
};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database could not be reached or the query failed.
    #[error("database unavailable: {0}")]
    Unavailable(String),

    /// The referenced row does not exist.
    #[error("row not found: {0}")]
    NotFound(String),

    /// A stored row could not be decoded into its typed form.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// An artifact arrived with a hash that does not match its body.
    #[error("artifact hash mismatch: declared {declared}, computed {computed}")]
    HashMismatch {
        /// The hash declared on the artifact.
        declared: String,
        /// The hash computed from the artifact body.
        computed: String,
    },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".into()),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Intent rows
// ---------------------------------------------------------------------------

/// A persisted intent.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentRecord {
    /// Primary key (`int_<ULID>` or caller-supplied).
    pub intent_id: String,
    /// Lifecycle status.
    pub status: IntentStatus,
    /// Unique idempotency key of the originating body.
    pub idempotency_key: String,
    /// Correlation ID.
    pub correlation_id: String,
    /// Trace ID minted at first ingest.
    pub trace_id: String,
    /// Acting principal, when known.
    pub actor_id: Option<String>,
    /// The body exactly as received.
    pub raw_packet: Value,
    /// Canonical form between normalisation rounds.
    pub canonical_draft: Option<Value>,
    /// Accepted canonical form.
    pub final_canonical: Option<Value>,
    /// Last emitted response envelope, cached for replay.
    pub response_envelope: Option<Value>,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

/// Values for a first-time intent insert. Status starts at `received`.
#[derive(Debug, Clone)]
pub struct NewIntent {
    /// Primary key.
    pub intent_id: String,
    /// Unique idempotency key.
    pub idempotency_key: String,
    /// Correlation ID.
    pub correlation_id: String,
    /// Trace ID.
    pub trace_id: String,
    /// Acting principal, when known.
    pub actor_id: Option<String>,
    /// The body exactly as received.
    pub raw_packet: Value,
}

/// Partial update of an intent row; `None` members are left untouched.
#[derive(Debug, Clone, Default)]
pub struct IntentUpdate {
    /// New lifecycle status.
    pub status: Option<IntentStatus>,
    /// New canonical draft.
    pub canonical_draft: Option<Value>,
    /// New accepted canonical form.
    pub final_canonical: Option<Value>,
    /// New cached response envelope.
    pub response_envelope: Option<Value>,
}

/// Upsert-by-idempotency-key intent storage.
#[async_trait]
pub trait IntentStore: Send + Sync {
    /// Insert the intent, or return the existing row for the same
    /// idempotency key. The boolean is `true` iff this call created the
    /// row. Runs as a single transaction: exactly one concurrent caller
    /// observes `true`.
    async fn upsert_by_idempotency_key(
        &self,
        new: NewIntent,
    ) -> Result<(IntentRecord, bool), StoreError>;

    /// Fetch by primary key.
    async fn get(&self, intent_id: &str) -> Result<Option<IntentRecord>, StoreError>;

    /// Apply a partial update and return the new row.
    async fn update(&self, intent_id: &str, update: IntentUpdate)
    -> Result<IntentRecord, StoreError>;

    /// Liveness probe for the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Clarification rows
// ---------------------------------------------------------------------------

/// A persisted clarification.
#[derive(Debug, Clone, PartialEq)]
pub struct ClarificationRecord {
    /// Primary key (UUID).
    pub clarification_id: String,
    /// Owning intent.
    pub intent_id: String,
    /// Lifecycle status.
    pub status: ClarificationStatus,
    /// Question text.
    pub question: String,
    /// Expected answer shape.
    pub expected_answer_type: AnswerType,
    /// Ordered candidates.
    pub candidates: Vec<Candidate>,
    /// The accepted answer; non-null iff `status = answered`.
    pub answer: Option<Value>,
    /// When the answer was accepted.
    pub answered_at: Option<DateTime<Utc>>,
    /// Acting principal, when known.
    pub actor_id: Option<String>,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
}

impl From<&ClarificationRecord> for intake_core::ClarificationView {
    fn from(record: &ClarificationRecord) -> Self {
        Self {
            clarification_id: record.clarification_id.clone(),
            intent_id: record.intent_id.clone(),
            question: record.question.clone(),
            expected_answer_type: record.expected_answer_type,
            candidates: record.candidates.clone(),
            status: record.status,
            answer: record.answer.clone(),
            answered_at: record.answered_at,
        }
    }
}

/// Values for a clarification insert. Status starts at `open`.
#[derive(Debug, Clone)]
pub struct NewClarification {
    /// Owning intent.
    pub intent_id: String,
    /// Question text.
    pub question: String,
    /// Expected answer shape.
    pub expected_answer_type: AnswerType,
    /// Ordered candidates.
    pub candidates: Vec<Candidate>,
    /// Acting principal, when known.
    pub actor_id: Option<String>,
}

/// Clarification storage with guarded transitions.
#[async_trait]
pub trait ClarificationStore: Send + Sync {
    /// Insert a new open clarification.
    async fn insert(&self, new: NewClarification) -> Result<ClarificationRecord, StoreError>;

    /// Fetch by primary key.
    async fn get(&self, clarification_id: &str)
    -> Result<Option<ClarificationRecord>, StoreError>;

    /// The most recent open clarification for an intent, if any.
    async fn open_for_intent(
        &self,
        intent_id: &str,
    ) -> Result<Option<ClarificationRecord>, StoreError>;

    /// All open clarifications, oldest first, optionally actor-scoped
    /// (rows without an actor are visible to everyone).
    async fn list_open(
        &self,
        actor_id: Option<&str>,
    ) -> Result<Vec<ClarificationRecord>, StoreError>;

    /// Guarded answer: flips `open → answered` and sets the answer and
    /// `answered_at`, returning the updated row. Returns `None` when the
    /// row is no longer open — the caller lost the race.
    async fn answer(
        &self,
        clarification_id: &str,
        answer: &Value,
    ) -> Result<Option<ClarificationRecord>, StoreError>;

    /// Flip a single clarification to `expired`.
    async fn expire(&self, clarification_id: &str) -> Result<(), StoreError>;

    /// Sweep: expire every open clarification created before `cutoff`,
    /// returning the owning intent IDs for cascade.
    async fn expire_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<String>, StoreError>;
}

// ---------------------------------------------------------------------------
// Journal rows
// ---------------------------------------------------------------------------

/// A persisted journal artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactRecord {
    /// Surrogate primary key (UUID).
    pub id: String,
    /// Owning intent.
    pub intent_id: String,
    /// Correlation ID.
    pub correlation_id: String,
    /// Artifact family.
    pub kind: ArtifactKind,
    /// Intent type, for intent artifacts.
    pub intent_type: Option<String>,
    /// Action name, for action artifacts.
    pub action: Option<String>,
    /// Lifecycle tag (`received`, `ready`, `clarification_answered`, …).
    pub status: String,
    /// Idempotency key, when the artifact stems from an ingest.
    pub idempotency_key: Option<String>,
    /// Artifact schema version.
    pub artifact_version: i32,
    /// SHA-256 of the canonical JSON of `artifact`.
    pub artifact_hash: String,
    /// Full JSON snapshot.
    pub artifact: Value,
    /// Insertion time.
    pub received_at: DateTime<Utc>,
}

/// Values for a journal append.
#[derive(Debug, Clone)]
pub struct NewArtifact {
    /// Owning intent.
    pub intent_id: String,
    /// Correlation ID.
    pub correlation_id: String,
    /// Artifact family.
    pub kind: ArtifactKind,
    /// Intent type, for intent artifacts.
    pub intent_type: Option<String>,
    /// Action name, for action artifacts.
    pub action: Option<String>,
    /// Lifecycle tag.
    pub status: String,
    /// Idempotency key, when known.
    pub idempotency_key: Option<String>,
    /// Artifact schema version.
    pub artifact_version: i32,
    /// SHA-256 of the canonical JSON of `artifact`.
    pub artifact_hash: String,
    /// Full JSON snapshot.
    pub artifact: Value,
}

impl NewArtifact {
    /// Build an artifact, computing the hash from the body.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        intent_id: impl Into<String>,
        correlation_id: impl Into<String>,
        kind: ArtifactKind,
        intent_type: Option<String>,
        action: Option<String>,
        status: impl Into<String>,
        idempotency_key: Option<String>,
        artifact_version: i32,
        artifact: Value,
    ) -> Self {
        let artifact_hash = sha256_hex(&canonical_json(&artifact));
        Self {
            intent_id: intent_id.into(),
            correlation_id: correlation_id.into(),
            kind,
            intent_type,
            action,
            status: status.into(),
            idempotency_key,
            artifact_version,
            artifact_hash,
            artifact,
        }
    }

    /// Check the declared hash against the body.
    pub fn verify_hash(&self) -> Result<(), StoreError> {
        let computed = sha256_hex(&canonical_json(&self.artifact));
        if computed == self.artifact_hash {
            Ok(())
        } else {
            Err(StoreError::HashMismatch {
                declared: self.artifact_hash.clone(),
                computed,
            })
        }
    }
}

/// Append-only artifact journal.
#[async_trait]
pub trait JournalStore: Send + Sync {
    /// Append one artifact. The declared hash is verified; mismatches are
    /// refused. There is no update and no delete.
    async fn append(&self, new: NewArtifact) -> Result<ArtifactRecord, StoreError>;

    /// Latest artifact for an intent with the given kind and status
    /// (`received_at DESC`).
    async fn latest(
        &self,
        intent_id: &str,
        kind: ArtifactKind,
        status: &str,
    ) -> Result<Option<ArtifactRecord>, StoreError>;

    /// Every artifact for an intent, oldest first.
    async fn list_for_intent(&self, intent_id: &str) -> Result<Vec<ArtifactRecord>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_artifact_computes_a_verifiable_hash() {
        let artifact = NewArtifact::new(
            "int_1",
            "cor_1",
            ArtifactKind::Intent,
            Some("create_task".into()),
            None,
            "received",
            Some("key".into()),
            1,
            json!({"kind": "intent", "server_time": "2026-03-04T12:00:00Z"}),
        );
        artifact.verify_hash().unwrap();
        assert_eq!(artifact.artifact_hash.len(), 64);
    }

    #[test]
    fn tampered_artifact_fails_verification() {
        let mut artifact = NewArtifact::new(
            "int_1",
            "cor_1",
            ArtifactKind::Action,
            None,
            Some("notion.tasks.create".into()),
            "executed",
            None,
            1,
            json!({"ok": true}),
        );
        artifact.artifact = json!({"ok": false});
        assert!(matches!(
            artifact.verify_hash(),
            Err(StoreError::HashMismatch { .. })
        ));
    }

    #[test]
    fn hash_ignores_key_order_in_the_body() {
        let a = NewArtifact::new(
            "int_1",
            "cor_1",
            ArtifactKind::Intent,
            None,
            None,
            "received",
            None,
            1,
            serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap(),
        );
        let b = NewArtifact::new(
            "int_1",
            "cor_1",
            ArtifactKind::Intent,
            None,
            None,
            "received",
            None,
            1,
            serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap(),
        );
        assert_eq!(a.artifact_hash, b.artifact_hash);
    }
}
