// SPDX-License-Identifier: MIT OR Apache-2.0
//! The intent normaliser.
//!
//! [`normalize`] is a pure function over the packet, the current instant,
//! the policy knobs, and an injected [`ProjectResolver`]: it performs no I/O
//! of its own and never touches storage. The lifecycle controller owns all
//! persistence around it.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod answer;
pub mod dates;
pub mod resolver;

pub use answer::{AnswerPayload, apply_answer};
pub use resolver::{ProjectResolver, StaticProjectResolver, StubProjectResolver, select_candidate};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use dates::DueResolution;
use intake_core::{
    AnswerType, Candidate, CanonicalDraft, FinalCanonical, Inference, IntentPacket, Pending,
    PendingField, RejectCode, Resolution,
};
use serde_json::{Map, Value, json};

/// Intent types the normaliser accepts.
pub const SUPPORTED_INTENT_TYPES: &[&str] =
    &["create_task", "update_task", "add_list_item", "capture_note"];

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// Policy knobs for a normalisation pass.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeConfig {
    /// Timezone relative due dates resolve in.
    pub user_timezone: Tz,
    /// Confidence floor; packets below it are rejected.
    pub min_confidence_to_write: f64,
    /// Maximum number of inferences before rejection.
    pub max_inferred_fields: usize,
    /// Resolver score a project candidate must reach.
    pub project_resolution_threshold: f64,
    /// Required lead of the top candidate over the runner-up.
    pub project_resolution_margin: f64,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            user_timezone: chrono_tz::Europe::London,
            min_confidence_to_write: 0.75,
            max_inferred_fields: 2,
            project_resolution_threshold: 0.90,
            project_resolution_margin: 0.10,
        }
    }
}

/// The question the controller should open a clarification with.
#[derive(Debug, Clone, PartialEq)]
pub struct ClarificationRequest {
    /// Question text for the caller.
    pub question: String,
    /// Expected answer shape.
    pub expected_answer_type: AnswerType,
    /// Candidates to offer (empty for free-form questions).
    pub candidates: Vec<Candidate>,
}

/// Outcome of a normalisation pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalization {
    /// Fully canonical; a plan can be built.
    Ready {
        /// The accepted canonical form.
        canonical: FinalCanonical,
    },
    /// Blocked on a question to the caller.
    NeedsClarification {
        /// State to persist for the next round.
        draft: CanonicalDraft,
        /// The question to open.
        clarification: ClarificationRequest,
    },
    /// Refused by validation or policy.
    Rejected {
        /// Stable rejection code.
        code: RejectCode,
        /// Human-readable message.
        message: String,
        /// Structured context.
        details: Option<Value>,
    },
}

// ---------------------------------------------------------------------------
// Normalisation
// ---------------------------------------------------------------------------

/// Normalise a packet into a canonical form, a clarification, or a
/// rejection. Checks run in a fixed order: confidence gate, intent-type
/// presence, whitelist, required fields, project resolution, due-date
/// resolution, patch assembly, inference budget.
pub async fn normalize(
    packet: &IntentPacket,
    now: DateTime<Utc>,
    cfg: &NormalizeConfig,
    resolver: &dyn ProjectResolver,
) -> Normalization {
    // 1. Confidence gate. Equal to the floor is accepted.
    if let Some(confidence) = packet.confidence
        && confidence < cfg.min_confidence_to_write
    {
        return Normalization::Rejected {
            code: RejectCode::PolicyLowConfidence,
            message: format!(
                "Confidence {confidence} below minimum {}",
                cfg.min_confidence_to_write
            ),
            details: Some(json!({
                "confidence": confidence,
                "min_confidence_to_write": cfg.min_confidence_to_write,
            })),
        };
    }

    // 2. Intent type presence.
    let Some(intent_type) = packet.intent_type.as_deref().filter(|t| !t.is_empty()) else {
        return Normalization::NeedsClarification {
            draft: CanonicalDraft {
                intent_type: None,
                fields: packet.fields.clone(),
                pending: Some(Pending {
                    field: PendingField::IntentType,
                    selector: None,
                }),
            },
            clarification: ClarificationRequest {
                question: "What is the intent type?".into(),
                expected_answer_type: AnswerType::FreeText,
                candidates: Vec::new(),
            },
        };
    };

    // 3. Whitelist.
    if !SUPPORTED_INTENT_TYPES.contains(&intent_type) {
        return Normalization::Rejected {
            code: RejectCode::UnsupportedIntentType,
            message: format!("Unsupported intent_type: {intent_type}"),
            details: None,
        };
    }

    let mut inferences: Vec<Inference> = Vec::new();
    let outcome = match intent_type {
        "create_task" => normalize_create_task(packet, now, cfg, resolver, &mut inferences).await,
        "update_task" => normalize_update_task(packet, now, cfg, &mut inferences),
        // List items and notes have no required fields; their field bags
        // pass through with due-date resolution applied.
        _ => normalize_passthrough(intent_type, packet, now, cfg, &mut inferences),
    };

    let mut canonical_fields = match outcome {
        FieldsOutcome::Fields(fields) => fields,
        FieldsOutcome::Short(normalization) => return normalization,
    };
    canonical_fields.remove("project_resolved");

    // 6b. Inference budget.
    if inferences.len() > cfg.max_inferred_fields {
        return Normalization::Rejected {
            code: RejectCode::PolicyTooManyInferences,
            message: format!(
                "{} fields inferred, limit is {}",
                inferences.len(),
                cfg.max_inferred_fields
            ),
            details: Some(json!({
                "inferred": inferences.len(),
                "max_inferred_fields": cfg.max_inferred_fields,
            })),
        };
    }

    Normalization::Ready {
        canonical: FinalCanonical {
            intent_type: intent_type.to_string(),
            fields: canonical_fields,
            resolution: Resolution { inferences },
        },
    }
}

/// Either the canonical fields so far, or an early exit.
enum FieldsOutcome {
    Fields(Map<String, Value>),
    Short(Normalization),
}

async fn normalize_create_task(
    packet: &IntentPacket,
    now: DateTime<Utc>,
    cfg: &NormalizeConfig,
    resolver: &dyn ProjectResolver,
    inferences: &mut Vec<Inference>,
) -> FieldsOutcome {
    let fields = &packet.fields;

    // 4. Required fields.
    let title = fields
        .get("title")
        .and_then(Value::as_str)
        .or_else(|| packet.top_level_title())
        .map(str::trim)
        .filter(|t| !t.is_empty());
    let Some(title) = title else {
        return FieldsOutcome::Short(Normalization::Rejected {
            code: RejectCode::ValidationError,
            message: "Missing required field: title".into(),
            details: Some(json!({"field": "title"})),
        });
    };

    let mut canonical = Map::new();
    canonical.insert("title".into(), Value::from(title));
    for key in ["status", "priority", "due"] {
        if let Some(value) = fields.get(key) {
            canonical.insert(key.into(), value.clone());
        }
    }

    // 5. Project resolution.
    let already_resolved = fields.get("project_resolved").and_then(Value::as_bool) == Some(true);
    if let Some(project_id) = fields.get("project_id") {
        canonical.insert("project_id".into(), project_id.clone());
    } else if let Some(selector) = fields.get("project").and_then(Value::as_str) {
        if already_resolved {
            canonical.insert("project".into(), Value::from(selector));
            // Keep the marker so a later-round draft does not re-resolve.
            canonical.insert("project_resolved".into(), Value::from(true));
        } else {
            let candidates = resolver.resolve(selector).await;
            match select_candidate(
                &candidates,
                cfg.project_resolution_threshold,
                cfg.project_resolution_margin,
            ) {
                Some(winner) => {
                    canonical.insert("project".into(), Value::from(winner.label.clone()));
                    canonical.insert("project_resolved".into(), Value::from(true));
                    inferences.push(Inference {
                        field: "project".into(),
                        source: selector.to_string(),
                        resolved: winner.label.clone(),
                    });
                }
                None => {
                    let expected = if candidates.is_empty() {
                        AnswerType::FreeText
                    } else {
                        AnswerType::Choice
                    };
                    let question = if candidates.is_empty() {
                        format!("Provide the project id for '{selector}'.")
                    } else {
                        format!("Which project matches '{selector}'?")
                    };
                    return FieldsOutcome::Short(Normalization::NeedsClarification {
                        draft: CanonicalDraft {
                            intent_type: Some("create_task".into()),
                            fields: canonical,
                            pending: Some(Pending {
                                field: PendingField::Project,
                                selector: Some(selector.to_string()),
                            }),
                        },
                        clarification: ClarificationRequest {
                            question,
                            expected_answer_type: expected,
                            candidates,
                        },
                    });
                }
            }
        }
    }

    // 6. Due-date resolution.
    if let Some(short) = resolve_due_field(
        &mut canonical,
        "create_task",
        now,
        cfg.user_timezone,
        inferences,
    ) {
        return FieldsOutcome::Short(short);
    }

    FieldsOutcome::Fields(canonical)
}

fn normalize_update_task(
    packet: &IntentPacket,
    now: DateTime<Utc>,
    cfg: &NormalizeConfig,
    inferences: &mut Vec<Inference>,
) -> FieldsOutcome {
    let fields = &packet.fields;

    // 4. Required fields.
    let task_id = ["task_id", "notion_page_id"]
        .iter()
        .find_map(|key| fields.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    let Some(task_id) = task_id else {
        return FieldsOutcome::Short(Normalization::Rejected {
            code: RejectCode::PolicyMissingTaskId,
            message: "update_task requires task_id or notion_page_id".into(),
            details: None,
        });
    };

    let mut canonical = Map::new();
    canonical.insert("task_id".into(), Value::from(task_id));
    for key in ["status", "priority", "due"] {
        if let Some(value) = fields.get(key) {
            canonical.insert(key.into(), value.clone());
        }
    }

    // 6. Due-date resolution, against the flat fields.
    if let Some(short) = resolve_due_field(
        &mut canonical,
        "update_task",
        now,
        cfg.user_timezone,
        inferences,
    ) {
        return FieldsOutcome::Short(short);
    }

    // 7. Patch assembly.
    let mut patch = Map::new();
    for key in ["status", "priority", "due"] {
        if let Some(value) = canonical.remove(key) {
            patch.insert(key.into(), value);
        }
    }
    if patch.is_empty() {
        return FieldsOutcome::Short(Normalization::Rejected {
            code: RejectCode::ValidationError,
            message: "update_task has no updatable fields".into(),
            details: Some(json!({"updatable": ["status", "priority", "due"]})),
        });
    }
    canonical.insert("patch".into(), Value::Object(patch));

    FieldsOutcome::Fields(canonical)
}

fn normalize_passthrough(
    intent_type: &str,
    packet: &IntentPacket,
    now: DateTime<Utc>,
    cfg: &NormalizeConfig,
    inferences: &mut Vec<Inference>,
) -> FieldsOutcome {
    let mut canonical = packet.fields.clone();
    if let Some(short) =
        resolve_due_field(&mut canonical, intent_type, now, cfg.user_timezone, inferences)
    {
        return FieldsOutcome::Short(short);
    }
    FieldsOutcome::Fields(canonical)
}

/// Resolve `fields.due` in place. Returns an early exit when the value is
/// neither a recognised label nor ISO-8601. Non-string values pass through
/// untouched.
fn resolve_due_field(
    canonical: &mut Map<String, Value>,
    intent_type: &str,
    now: DateTime<Utc>,
    tz: Tz,
    inferences: &mut Vec<Inference>,
) -> Option<Normalization> {
    let due = canonical.get("due")?.as_str()?.to_string();
    match dates::resolve_due(&due, now, tz) {
        DueResolution::Resolved { source, date } => {
            canonical.insert("due".into(), Value::from(date.clone()));
            inferences.push(Inference {
                field: "due".into(),
                source,
                resolved: date,
            });
            None
        }
        DueResolution::AlreadyAbsolute => None,
        DueResolution::Unrecognised => {
            canonical.remove("due");
            Some(Normalization::NeedsClarification {
                draft: CanonicalDraft {
                    intent_type: Some(intent_type.to_string()),
                    fields: canonical.clone(),
                    pending: Some(Pending {
                        field: PendingField::Due,
                        selector: Some(due),
                    }),
                },
                clarification: ClarificationRequest {
                    question: "What is the due date?".into(),
                    expected_answer_type: AnswerType::Date,
                    candidates: Vec::new(),
                },
            })
        }
    }
}

/// Rebuild a packet from a draft for the next normalisation round.
pub fn packet_from_draft(draft: &CanonicalDraft) -> IntentPacket {
    IntentPacket {
        kind: intake_core::PacketKind::Intent,
        intent_type: draft.intent_type.clone(),
        intent_id: None,
        correlation_id: None,
        actor_id: None,
        confidence: None,
        fields: draft.fields.clone(),
        extra: Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn packet(value: Value) -> IntentPacket {
        serde_json::from_value(value).unwrap()
    }

    // A Wednesday noon, UTC.
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap()
    }

    fn cfg() -> NormalizeConfig {
        NormalizeConfig::default()
    }

    fn candidate(id: &str, label: &str, score: f64) -> Candidate {
        Candidate {
            id: id.into(),
            label: label.into(),
            score: Some(score),
            meta: None,
        }
    }

    async fn run(value: Value) -> Normalization {
        normalize(&packet(value), now(), &cfg(), &StubProjectResolver).await
    }

    // -- Confidence gate -------------------------------------------------

    #[tokio::test]
    async fn low_confidence_is_rejected() {
        let result = run(json!({
            "kind": "intent", "intent_type": "create_task",
            "confidence": 0.1, "fields": {"title": "x"}
        }))
        .await;
        match result {
            Normalization::Rejected { code, details, .. } => {
                assert_eq!(code, RejectCode::PolicyLowConfidence);
                assert_eq!(details.unwrap()["min_confidence_to_write"], 0.75);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn confidence_exactly_at_floor_is_accepted() {
        let result = run(json!({
            "kind": "intent", "intent_type": "create_task",
            "confidence": 0.75, "fields": {"title": "x"}
        }))
        .await;
        assert!(matches!(result, Normalization::Ready { .. }));
    }

    // -- Intent type -----------------------------------------------------

    #[tokio::test]
    async fn missing_intent_type_asks_for_it() {
        let result = run(json!({"kind": "intent", "fields": {"title": "x"}})).await;
        match result {
            Normalization::NeedsClarification {
                draft,
                clarification,
            } => {
                assert_eq!(clarification.question, "What is the intent type?");
                assert_eq!(clarification.expected_answer_type, AnswerType::FreeText);
                assert_eq!(
                    draft.pending.unwrap().field,
                    PendingField::IntentType
                );
                assert_eq!(draft.fields["title"], json!("x"));
            }
            other => panic!("expected clarification, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unsupported_intent_type_is_rejected() {
        let result = run(json!({"kind": "intent", "intent_type": "launch_rocket"})).await;
        match result {
            Normalization::Rejected { code, message, .. } => {
                assert_eq!(code, RejectCode::UnsupportedIntentType);
                assert!(message.contains("launch_rocket"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    // -- Required fields -------------------------------------------------

    #[tokio::test]
    async fn create_task_without_title_is_rejected() {
        let result = run(json!({"kind": "intent", "intent_type": "create_task"})).await;
        match result {
            Normalization::Rejected { code, details, .. } => {
                assert_eq!(code, RejectCode::ValidationError);
                assert_eq!(details.unwrap()["field"], "title");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_task_accepts_top_level_title() {
        let result =
            run(json!({"kind": "intent", "intent_type": "create_task", "title": "Ship this"}))
                .await;
        match result {
            Normalization::Ready { canonical } => {
                assert_eq!(canonical.fields["title"], json!("Ship this"));
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_task_without_task_id_is_rejected() {
        let result = run(json!({
            "kind": "intent", "intent_type": "update_task",
            "fields": {"status": "done"}
        }))
        .await;
        assert!(matches!(
            result,
            Normalization::Rejected {
                code: RejectCode::PolicyMissingTaskId,
                ..
            }
        ));
    }

    // -- Project resolution ----------------------------------------------

    #[tokio::test]
    async fn confident_candidate_resolves_to_its_label() {
        let resolver = StaticProjectResolver::new(vec![
            candidate("proj_1", "Operations", 0.97),
            candidate("proj_2", "Ops Archive", 0.40),
        ]);
        let result = normalize(
            &packet(json!({
                "kind": "intent", "intent_type": "create_task",
                "fields": {"title": "x", "project": "ops"}
            })),
            now(),
            &cfg(),
            &resolver,
        )
        .await;
        match result {
            Normalization::Ready { canonical } => {
                assert_eq!(canonical.fields["project"], json!("Operations"));
                assert_eq!(canonical.resolution.inferences.len(), 1);
                assert_eq!(canonical.resolution.inferences[0].field, "project");
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn near_tie_opens_a_choice_clarification() {
        let resolver = StaticProjectResolver::new(vec![
            candidate("proj_1", "John", 0.95),
            candidate("proj_2", "Sagita", 0.93),
        ]);
        let result = normalize(
            &packet(json!({
                "kind": "intent", "intent_type": "create_task",
                "fields": {"title": "x", "project": "John and Sagita", "due": "2026-04-01"}
            })),
            now(),
            &cfg(),
            &resolver,
        )
        .await;
        match result {
            Normalization::NeedsClarification {
                draft,
                clarification,
            } => {
                assert_eq!(clarification.expected_answer_type, AnswerType::Choice);
                assert_eq!(clarification.candidates.len(), 2);
                assert!(clarification.question.contains("John and Sagita"));
                let pending = draft.pending.unwrap();
                assert_eq!(pending.field, PendingField::Project);
                assert_eq!(pending.selector.as_deref(), Some("John and Sagita"));
                // The unprocessed due value survives in the draft.
                assert_eq!(draft.fields["due"], json!("2026-04-01"));
            }
            other => panic!("expected clarification, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_candidates_opens_a_free_text_clarification() {
        let result = run(json!({
            "kind": "intent", "intent_type": "create_task",
            "fields": {"title": "x", "project": "mystery"}
        }))
        .await;
        match result {
            Normalization::NeedsClarification { clarification, .. } => {
                assert_eq!(clarification.expected_answer_type, AnswerType::FreeText);
                assert!(clarification.candidates.is_empty());
            }
            other => panic!("expected clarification, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn resolved_marker_short_circuits_the_resolver() {
        // The stub resolver would force a clarification if consulted.
        let result = run(json!({
            "kind": "intent", "intent_type": "create_task",
            "fields": {"title": "x", "project": "proj_123", "project_resolved": true}
        }))
        .await;
        match result {
            Normalization::Ready { canonical } => {
                assert_eq!(canonical.fields["project"], json!("proj_123"));
                assert!(!canonical.fields.contains_key("project_resolved"));
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn project_id_takes_precedence_over_selector() {
        let result = run(json!({
            "kind": "intent", "intent_type": "create_task",
            "fields": {"title": "x", "project_id": "proj_9", "project": "whatever"}
        }))
        .await;
        match result {
            Normalization::Ready { canonical } => {
                assert_eq!(canonical.fields["project_id"], json!("proj_9"));
                assert!(!canonical.fields.contains_key("project"));
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }

    // -- Due dates -------------------------------------------------------

    #[tokio::test]
    async fn relative_due_is_resolved_and_recorded() {
        let result = run(json!({
            "kind": "intent", "intent_type": "create_task",
            "fields": {"title": "x", "due": "next monday"}
        }))
        .await;
        match result {
            Normalization::Ready { canonical } => {
                // 2026-03-04 is a Wednesday; next Monday is the 9th.
                assert_eq!(canonical.fields["due"], json!("2026-03-09"));
                assert_eq!(canonical.resolution.inferences[0].source, "next monday");
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn iso_due_passes_through_without_inference() {
        let result = run(json!({
            "kind": "intent", "intent_type": "create_task",
            "fields": {"title": "x", "due": "2026-04-01T10:00:00Z"}
        }))
        .await;
        match result {
            Normalization::Ready { canonical } => {
                assert_eq!(canonical.fields["due"], json!("2026-04-01T10:00:00Z"));
                assert!(canonical.resolution.is_empty());
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unparseable_due_opens_a_date_clarification() {
        let result = run(json!({
            "kind": "intent", "intent_type": "create_task",
            "fields": {"title": "x", "due": "when convenient"}
        }))
        .await;
        match result {
            Normalization::NeedsClarification {
                draft,
                clarification,
            } => {
                assert_eq!(clarification.expected_answer_type, AnswerType::Date);
                let pending = draft.pending.unwrap();
                assert_eq!(pending.field, PendingField::Due);
                assert_eq!(pending.selector.as_deref(), Some("when convenient"));
                assert!(!draft.fields.contains_key("due"));
            }
            other => panic!("expected clarification, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn inference_budget_is_enforced() {
        let resolver =
            StaticProjectResolver::new(vec![candidate("proj_1", "Operations", 0.99)]);
        let tight = NormalizeConfig {
            max_inferred_fields: 1,
            ..NormalizeConfig::default()
        };
        // Project resolution + relative due = two inferences, limit one.
        let result = normalize(
            &packet(json!({
                "kind": "intent", "intent_type": "create_task",
                "fields": {"title": "x", "project": "ops", "due": "tomorrow"}
            })),
            now(),
            &tight,
            &resolver,
        )
        .await;
        assert!(matches!(
            result,
            Normalization::Rejected {
                code: RejectCode::PolicyTooManyInferences,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn inference_count_at_limit_is_accepted() {
        let result = run(json!({
            "kind": "intent", "intent_type": "create_task",
            "fields": {"title": "x", "due": "tomorrow"}
        }))
        .await;
        assert!(matches!(result, Normalization::Ready { .. }));
    }

    // -- update_task -----------------------------------------------------

    #[tokio::test]
    async fn update_task_builds_a_patch() {
        let result = run(json!({
            "kind": "intent", "intent_type": "update_task",
            "fields": {"task_id": "pg_1", "status": "done", "due": "friday"}
        }))
        .await;
        match result {
            Normalization::Ready { canonical } => {
                assert_eq!(canonical.fields["task_id"], json!("pg_1"));
                let patch = &canonical.fields["patch"];
                assert_eq!(patch["status"], json!("done"));
                // Friday after Wednesday 2026-03-04.
                assert_eq!(patch["due"], json!("2026-03-06"));
                assert!(!canonical.fields.contains_key("status"));
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_task_accepts_notion_page_id_alias() {
        let result = run(json!({
            "kind": "intent", "intent_type": "update_task",
            "fields": {"notion_page_id": "pg_2", "priority": "high"}
        }))
        .await;
        match result {
            Normalization::Ready { canonical } => {
                assert_eq!(canonical.fields["task_id"], json!("pg_2"));
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_task_with_no_updatable_fields_is_rejected() {
        let result = run(json!({
            "kind": "intent", "intent_type": "update_task",
            "fields": {"task_id": "pg_1"}
        }))
        .await;
        assert!(matches!(
            result,
            Normalization::Rejected {
                code: RejectCode::ValidationError,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn update_task_due_clarification_keeps_flat_fields() {
        let result = run(json!({
            "kind": "intent", "intent_type": "update_task",
            "fields": {"task_id": "pg_1", "status": "done", "due": "sometime"}
        }))
        .await;
        match result {
            Normalization::NeedsClarification { draft, .. } => {
                assert_eq!(draft.fields["task_id"], json!("pg_1"));
                assert_eq!(draft.fields["status"], json!("done"));
                assert!(!draft.fields.contains_key("due"));
            }
            other => panic!("expected clarification, got {other:?}"),
        }
    }

    // -- Fixed point through answer application --------------------------

    #[tokio::test]
    async fn answer_then_renormalise_reaches_ready() {
        let first = run(json!({
            "kind": "intent", "intent_type": "create_task",
            "fields": {"title": "x", "project": "mystery"}
        }))
        .await;
        let Normalization::NeedsClarification { mut draft, .. } = first else {
            panic!("expected clarification");
        };
        apply_answer(
            &mut draft,
            &AnswerPayload {
                choice_id: Some("proj_123".into()),
                answer_text: None,
            },
        );
        let second = normalize(&packet_from_draft(&draft), now(), &cfg(), &StubProjectResolver)
            .await;
        match second {
            Normalization::Ready { canonical } => {
                assert_eq!(canonical.fields["project"], json!("proj_123"));
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bad_due_answer_yields_a_new_clarification() {
        let first = run(json!({
            "kind": "intent", "intent_type": "create_task",
            "fields": {"title": "x", "due": "later"}
        }))
        .await;
        let Normalization::NeedsClarification { mut draft, .. } = first else {
            panic!("expected clarification");
        };
        apply_answer(
            &mut draft,
            &AnswerPayload {
                choice_id: None,
                answer_text: Some("still later".into()),
            },
        );
        let second = normalize(&packet_from_draft(&draft), now(), &cfg(), &StubProjectResolver)
            .await;
        assert!(matches!(second, Normalization::NeedsClarification { .. }));
    }

    // -- Passthrough types -----------------------------------------------

    #[tokio::test]
    async fn capture_note_passes_fields_through() {
        let result = run(json!({
            "kind": "intent", "intent_type": "capture_note",
            "fields": {"text": "remember this", "due": "tomorrow"}
        }))
        .await;
        match result {
            Normalization::Ready { canonical } => {
                assert_eq!(canonical.fields["text"], json!("remember this"));
                assert_eq!(canonical.fields["due"], json!("2026-03-05"));
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }
}
