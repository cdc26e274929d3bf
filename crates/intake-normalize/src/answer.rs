// SPDX-License-Identifier: MIT OR Apache-2.0
//! Clarification answer application.
//!
//! The stored draft's `pending.field` names what was asked; applying the
//! answer writes the corresponding field back into the draft and clears the
//! marker, after which the draft is normalised again.

use intake_core::{CanonicalDraft, PendingField};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /v1/clarifications/{id}/answer`. At least one member must
/// be present; `None` members are omitted on the wire so the stored answer
/// compares byte-for-byte on idempotent re-submission.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerPayload {
    /// Candidate id picked from the offered list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice_id: Option<String>,
    /// Free-form answer text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_text: Option<String>,
}

impl AnswerPayload {
    /// True when neither member is present.
    pub fn is_empty(&self) -> bool {
        self.choice_id.is_none() && self.answer_text.is_none()
    }
}

/// Apply an answer to the draft, keyed by `pending.field`.
///
/// - `intent_type`: prefers `answer_text`, falls back to `choice_id`.
/// - `project`: prefers `choice_id`; sets `project_resolved` so the next
///   normalisation pass skips the resolver, and drops a stale `project_id`.
/// - `due`: prefers `answer_text`; the next pass re-validates it.
///
/// A draft without a `pending` marker is returned unchanged.
pub fn apply_answer(draft: &mut CanonicalDraft, answer: &AnswerPayload) {
    let Some(pending) = draft.pending.take() else {
        return;
    };
    let choice = answer.choice_id.as_deref();
    let text = answer.answer_text.as_deref();

    match pending.field {
        PendingField::IntentType => {
            if let Some(value) = text.or(choice) {
                draft.intent_type = Some(value.to_string());
            }
        }
        PendingField::Project => {
            if let Some(value) = choice.or(text) {
                draft.fields.insert("project".into(), Value::from(value));
                draft.fields.insert("project_resolved".into(), Value::from(true));
                draft.fields.remove("project_id");
            }
        }
        PendingField::Due => {
            if let Some(value) = text.or(choice) {
                draft.fields.insert("due".into(), Value::from(value));
            }
        }
    }
}
