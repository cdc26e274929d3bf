// SPDX-License-Identifier: MIT OR Apache-2.0
//! The lifecycle controller.
//!
//! Owns every mutation of intent and clarification rows. The ingest path is
//! persist-first: the upsert and the `received` artifact land before
//! normalisation runs, so a normalisation-time crash always leaves a
//! `received` record behind. Replays are served from the cached response
//! envelope; transition outcomes are journalled before they are returned.

use crate::{ApiError, AppState};
use chrono::{Duration, Utc};
use intake_core::{
    ArtifactKind, CanonicalDraft, ClarificationStatus, ClarificationView, Envelope,
    EnvelopeStatus, ErrorPayload, FinalCanonical, IntentPacket, IntentStatus, PacketKind, Plan,
    RejectCode, build_plan, idempotency_key, new_correlation_id, new_intent_id, new_trace_id,
};
use intake_normalize::{
    AnswerPayload, ClarificationRequest, Normalization, apply_answer, normalize,
    packet_from_draft,
};
use intake_store::{
    IntentRecord, IntentUpdate, NewArtifact, NewClarification, NewIntent,
};
use serde_json::{Map, Value, json};
use tracing::info;

// ---------------------------------------------------------------------------
// Ingest
// ---------------------------------------------------------------------------

/// Result of an ingest, with the values the edge echoes as headers.
pub struct IngestOutcome {
    /// The response envelope.
    pub envelope: Envelope,
    /// Intent ID (`X-Intent-Id`).
    pub intent_id: String,
    /// Correlation ID (`X-Correlation-Id`).
    pub correlation_id: String,
    /// Request ID (`X-Request-Id`).
    pub request_id: String,
    /// Trace ID (`X-Trace-Id`).
    pub trace_id: String,
}

/// Ingest one intent body: parse, persist-first, then normalise or replay.
pub async fn ingest(
    state: &AppState,
    body: &[u8],
    actor_header: Option<String>,
) -> Result<IngestOutcome, ApiError> {
    // 1. Parse and schema-check.
    let raw: Value = serde_json::from_slice(body).map_err(|_| ApiError::bad_json())?;
    let Some(raw_map) = raw.as_object() else {
        return Err(ApiError::schema_validation(
            "Intent payload must be a JSON object",
            None,
        ));
    };
    if let Some(version) = raw_map.get("schema_version").and_then(Value::as_str)
        && version != "v1"
    {
        return Err(ApiError::unsupported_schema_version(version));
    }
    let packet: IntentPacket = serde_json::from_value(raw.clone()).map_err(|err| {
        ApiError::schema_validation(
            "Intent payload failed schema validation",
            Some(json!({"errors": [err.to_string()]})),
        )
    })?;
    if packet.kind != PacketKind::Intent {
        return Err(ApiError::schema_validation(
            "Intent packets must have kind 'intent'",
            None,
        ));
    }

    // 2–3. Idempotency key from the raw body, then mint missing IDs.
    let idem = idempotency_key(&raw);
    let request_id = packet
        .request_id()
        .unwrap_or_else(|| format!("intent:{idem}"));
    let actor_id = actor_header.or_else(|| packet.actor_id.clone());

    // 4. Persist-first upsert. The first writer's identifiers win.
    let (row, created) = state
        .stores
        .intents
        .upsert_by_idempotency_key(NewIntent {
            intent_id: packet.intent_id.clone().unwrap_or_else(new_intent_id),
            idempotency_key: idem.clone(),
            correlation_id: packet
                .correlation_id
                .clone()
                .unwrap_or_else(new_correlation_id),
            trace_id: new_trace_id(),
            actor_id: actor_id.clone(),
            raw_packet: raw.clone(),
        })
        .await?;
    let intent_id = row.intent_id.clone();
    let correlation_id = row.correlation_id.clone();
    let trace_id = row.trace_id.clone();

    // 5. Journal the received packet with the server-injected identifiers.
    let mut packet_data = raw_map.clone();
    packet_data.insert("request_id".into(), Value::from(request_id.clone()));
    packet_data.insert("intent_id".into(), Value::from(intent_id.clone()));
    packet_data.insert("correlation_id".into(), Value::from(correlation_id.clone()));
    packet_data.insert("trace_id".into(), Value::from(trace_id.clone()));
    if let Some(actor) = &actor_id {
        packet_data.insert("actor_id".into(), Value::from(actor.clone()));
    }
    journal(
        state,
        Value::Object(packet_data),
        ArtifactKind::Intent,
        packet.intent_type.clone(),
        None,
        &intent_id,
        &correlation_id,
        "received",
        Some(idem.clone()),
    )
    .await?;

    info!(
        receipt_id = %intent_id,
        trace_id = %trace_id,
        idempotency_key = %idem,
        created,
        "intent ingest received"
    );

    let ctx = TransitionCtx {
        intent_id: &intent_id,
        correlation_id: &correlation_id,
        actor_id: actor_id.as_deref(),
        intent_type: packet.intent_type.as_deref(),
        idempotency_key: Some(&idem),
        request_id: Some(&request_id),
        trace_id: Some(&trace_id),
        execute: state.settings.execute_actions,
    };

    let envelope = if created {
        // 7. Fresh branch: normalise and transition.
        let result = normalize(&packet, Utc::now(), &state.normalize_cfg, state.resolver.as_ref())
            .await;
        apply_transition(state, &ctx, result).await?
    } else {
        // 6. Replay branch.
        replay(state, &ctx, &row).await?
    };

    Ok(IngestOutcome {
        envelope,
        intent_id,
        correlation_id,
        request_id,
        trace_id,
    })
}

async fn replay(
    state: &AppState,
    ctx: &TransitionCtx<'_>,
    row: &IntentRecord,
) -> Result<Envelope, ApiError> {
    let (Some(idem), Some(trace_id)) = (ctx.idempotency_key, ctx.trace_id) else {
        return Err(ApiError::internal("replay without receipt context"));
    };

    // Cached envelope: O(1) replay, returned verbatim.
    if let Some(cached) = &row.response_envelope
        && let Ok(mut envelope) = serde_json::from_value::<Envelope>(cached.clone())
    {
        envelope.attach_receipt_fields(ctx.intent_id, trace_id, idem, false);
        info!(receipt_id = %ctx.intent_id, status = envelope.status.as_str(), "intent replay (cached)");
        return Ok(envelope);
    }

    // Recorded outcome artifact.
    if let Some(mut envelope) = load_outcome(state, ctx.intent_id).await? {
        envelope.attach_receipt_fields(ctx.intent_id, trace_id, idem, true);
        return Ok(envelope);
    }

    // Reconstruct from the intent's current status, then journal and cache
    // so the next replay is O(1).
    let mut envelope = outcome_from_intent(state, row).await?;
    if let Some(request_id) = ctx.request_id {
        envelope.attach_request_id(request_id);
    }
    envelope.attach_receipt_fields(ctx.intent_id, trace_id, idem, true);
    journal_envelope(state, ctx, &envelope).await?;
    cache_envelope(state, ctx.intent_id, &envelope).await?;
    info!(receipt_id = %ctx.intent_id, status = envelope.status.as_str(), "intent replay (reconstructed)");
    Ok(envelope)
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// Per-request values shared by every transition helper.
pub(crate) struct TransitionCtx<'a> {
    pub intent_id: &'a str,
    pub correlation_id: &'a str,
    pub actor_id: Option<&'a str>,
    pub intent_type: Option<&'a str>,
    pub idempotency_key: Option<&'a str>,
    pub request_id: Option<&'a str>,
    pub trace_id: Option<&'a str>,
    /// Dispatch ready plans to the gateway. Only the ingest path executes;
    /// answering a clarification stops at `ready`.
    pub execute: bool,
}

impl TransitionCtx<'_> {
    fn decorate(&self, envelope: &mut Envelope) {
        if let Some(request_id) = self.request_id {
            envelope.attach_request_id(request_id);
        }
        if let (Some(idem), Some(trace_id)) = (self.idempotency_key, self.trace_id) {
            envelope.attach_receipt_fields(self.intent_id, trace_id, idem, true);
        }
    }
}

/// Dispatch a normalisation result into the matching transition.
async fn apply_transition(
    state: &AppState,
    ctx: &TransitionCtx<'_>,
    result: Normalization,
) -> Result<Envelope, ApiError> {
    match result {
        Normalization::NeedsClarification {
            draft,
            clarification,
        } => needs_clarification_transition(state, ctx, draft, clarification).await,
        Normalization::Ready { canonical } => ready_transition(state, ctx, canonical).await,
        Normalization::Rejected {
            code,
            message,
            details,
        } => rejected_transition(state, ctx, code, message, details).await,
    }
}

async fn needs_clarification_transition(
    state: &AppState,
    ctx: &TransitionCtx<'_>,
    draft: CanonicalDraft,
    request: ClarificationRequest,
) -> Result<Envelope, ApiError> {
    let clarification = state
        .stores
        .clarifications
        .insert(NewClarification {
            intent_id: ctx.intent_id.to_string(),
            question: request.question,
            expected_answer_type: request.expected_answer_type,
            candidates: request.candidates,
            actor_id: ctx.actor_id.map(str::to_string),
        })
        .await?;
    let draft_value = serde_json::to_value(&draft).map_err(ApiError::encoding)?;
    state
        .stores
        .intents
        .update(
            ctx.intent_id,
            IntentUpdate {
                status: Some(IntentStatus::NeedsClarification),
                canonical_draft: Some(draft_value.clone()),
                ..IntentUpdate::default()
            },
        )
        .await?;

    let view = ClarificationView::from(&clarification);
    let mut envelope = Envelope::new(
        EnvelopeStatus::NeedsClarification,
        ctx.intent_id,
        ctx.correlation_id,
    );
    envelope.clarification = Some(view.clone());
    ctx.decorate(&mut envelope);

    journal(
        state,
        json!({
            "status": "needs_clarification",
            "clarification": view,
            "canonical_draft": draft_value,
        }),
        ArtifactKind::Intent,
        ctx.intent_type.map(str::to_string),
        None,
        ctx.intent_id,
        ctx.correlation_id,
        "needs_clarification",
        ctx.idempotency_key.map(str::to_string),
    )
    .await?;
    cache_envelope(state, ctx.intent_id, &envelope).await?;
    Ok(envelope)
}

async fn ready_transition(
    state: &AppState,
    ctx: &TransitionCtx<'_>,
    canonical: FinalCanonical,
) -> Result<Envelope, ApiError> {
    let canonical_value = serde_json::to_value(&canonical).map_err(ApiError::encoding)?;
    state
        .stores
        .intents
        .update(
            ctx.intent_id,
            IntentUpdate {
                status: Some(IntentStatus::Ready),
                canonical_draft: Some(canonical_value.clone()),
                final_canonical: Some(canonical_value.clone()),
                ..IntentUpdate::default()
            },
        )
        .await?;
    let plan = build_plan(ctx.intent_id, ctx.correlation_id, &canonical);

    if ctx.execute {
        return execute_transition(state, ctx, plan).await;
    }

    let mut envelope = Envelope::new(EnvelopeStatus::Ready, ctx.intent_id, ctx.correlation_id);
    envelope.plan = Some(plan.clone());
    ctx.decorate(&mut envelope);

    journal(
        state,
        json!({
            "status": "ready",
            "final_canonical": canonical_value,
            "plan": plan,
        }),
        ArtifactKind::Intent,
        ctx.intent_type.map(str::to_string),
        None,
        ctx.intent_id,
        ctx.correlation_id,
        "ready",
        ctx.idempotency_key.map(str::to_string),
    )
    .await?;
    cache_envelope(state, ctx.intent_id, &envelope).await?;
    info!(receipt_id = %ctx.intent_id, "intent ready");
    Ok(envelope)
}

async fn execute_transition(
    state: &AppState,
    ctx: &TransitionCtx<'_>,
    plan: Plan,
) -> Result<Envelope, ApiError> {
    let Some(executor) = &state.executor else {
        state
            .stores
            .intents
            .update(
                ctx.intent_id,
                IntentUpdate {
                    status: Some(IntentStatus::Failed),
                    ..IntentUpdate::default()
                },
            )
            .await?;
        let mut envelope =
            Envelope::new(EnvelopeStatus::Failed, ctx.intent_id, ctx.correlation_id);
        envelope.error_code = Some(RejectCode::ExecutionNotConfigured.as_str().into());
        envelope.message = Some("Gateway execution not configured".into());
        envelope.details = Some(json!({"execution_results": []}));
        envelope.error = Some(
            ErrorPayload::new(
                RejectCode::ExecutionNotConfigured.as_str(),
                "Gateway execution not configured",
            )
            .with_status_code(500, None),
        );
        ctx.decorate(&mut envelope);
        journal_envelope(state, ctx, &envelope).await?;
        cache_envelope(state, ctx.intent_id, &envelope).await?;
        return Ok(envelope);
    };

    let (all_success, outcomes) = executor
        .execute_plan(
            ctx.intent_id,
            ctx.correlation_id,
            ctx.actor_id,
            ctx.request_id,
            &plan,
        )
        .await?;
    let results = serde_json::to_value(&outcomes).map_err(ApiError::encoding)?;

    let mut envelope = if all_success {
        state
            .stores
            .intents
            .update(
                ctx.intent_id,
                IntentUpdate {
                    status: Some(IntentStatus::Executed),
                    ..IntentUpdate::default()
                },
            )
            .await?;
        let notion_task_id = outcomes
            .iter()
            .find_map(|outcome| outcome.notion_task_id.clone());
        let mut envelope =
            Envelope::new(EnvelopeStatus::Executed, ctx.intent_id, ctx.correlation_id);
        envelope.plan = Some(plan);
        envelope.details = Some(json!({
            "execution_results": results,
            "notion_task_id": notion_task_id,
        }));
        envelope
    } else {
        state
            .stores
            .intents
            .update(
                ctx.intent_id,
                IntentUpdate {
                    status: Some(IntentStatus::Failed),
                    ..IntentUpdate::default()
                },
            )
            .await?;
        let failure = outcomes.iter().find(|outcome| !outcome.success);
        let (code, message, status_code, detail) = match failure {
            Some(failure) => (
                failure
                    .error_code
                    .clone()
                    .unwrap_or_else(|| RejectCode::ExecutionFailed.as_str().into()),
                failure
                    .error
                    .clone()
                    .unwrap_or_else(|| "One or more actions failed".into()),
                failure.status_code.unwrap_or(502),
                Some(json!({
                    "endpoint": failure.endpoint,
                    "request_id": failure.request_id,
                    "idempotency_key": failure.idempotency_key,
                })),
            ),
            None => (
                RejectCode::ExecutionFailed.as_str().to_string(),
                "Execution failed".to_string(),
                502,
                None,
            ),
        };
        let mut envelope =
            Envelope::new(EnvelopeStatus::Failed, ctx.intent_id, ctx.correlation_id);
        envelope.error_code = Some(RejectCode::ExecutionFailed.as_str().into());
        envelope.message = Some("One or more actions failed".into());
        envelope.details = Some(json!({"execution_results": results}));
        envelope.error = Some(ErrorPayload::new(code, message).with_status_code(status_code, detail));
        envelope
    };

    ctx.decorate(&mut envelope);
    journal_envelope(state, ctx, &envelope).await?;
    cache_envelope(state, ctx.intent_id, &envelope).await?;
    info!(
        receipt_id = %ctx.intent_id,
        status = envelope.status.as_str(),
        "plan execution finished"
    );
    Ok(envelope)
}

async fn rejected_transition(
    state: &AppState,
    ctx: &TransitionCtx<'_>,
    code: RejectCode,
    message: String,
    details: Option<Value>,
) -> Result<Envelope, ApiError> {
    state
        .stores
        .intents
        .update(
            ctx.intent_id,
            IntentUpdate {
                status: Some(IntentStatus::Failed),
                ..IntentUpdate::default()
            },
        )
        .await?;
    let mut envelope = Envelope::new(EnvelopeStatus::Rejected, ctx.intent_id, ctx.correlation_id);
    envelope.error_code = Some(code.as_str().into());
    envelope.message = Some(message.clone());
    envelope.details = details;
    envelope.error = Some(ErrorPayload::new(code.as_str(), message).with_status_code(400, None));
    ctx.decorate(&mut envelope);
    journal_envelope(state, ctx, &envelope).await?;
    cache_envelope(state, ctx.intent_id, &envelope).await?;
    info!(receipt_id = %ctx.intent_id, code = code.as_str(), "intent rejected");
    Ok(envelope)
}

// ---------------------------------------------------------------------------
// Clarification answer
// ---------------------------------------------------------------------------

/// Answer a clarification and resume normalisation.
pub async fn answer_clarification(
    state: &AppState,
    clarification_id: &str,
    payload: AnswerPayload,
    actor_id: Option<String>,
) -> Result<Envelope, ApiError> {
    if payload.is_empty() {
        return Err(ApiError::invalid_request("Answer payload required"));
    }
    let clarification = state
        .stores
        .clarifications
        .get(clarification_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Clarification not found"))?;
    // Actor mismatches read as absence, not as forbidden.
    if let (Some(caller), Some(owner)) = (actor_id.as_deref(), clarification.actor_id.as_deref())
        && caller != owner
    {
        return Err(ApiError::not_found("Clarification not found"));
    }

    // Lazy expiry: an open row past the deadline flips itself and its
    // intent before the answer is considered.
    if clarification.status == ClarificationStatus::Open {
        let cutoff = Utc::now() - Duration::hours(state.settings.clarification_expiry_hours);
        if clarification.created_at < cutoff {
            state
                .stores
                .clarifications
                .expire(clarification_id)
                .await?;
            state
                .stores
                .intents
                .update(
                    &clarification.intent_id,
                    IntentUpdate {
                        status: Some(IntentStatus::Expired),
                        ..IntentUpdate::default()
                    },
                )
                .await?;
            return Err(ApiError::conflict("Clarification expired"));
        }
    }

    let answer_value = serde_json::to_value(&payload).map_err(ApiError::encoding)?;

    if clarification.status != ClarificationStatus::Open {
        // Idempotent re-answer: the byte-equal payload replays the current
        // outcome instead of conflicting.
        if clarification.status == ClarificationStatus::Answered
            && clarification.answer.as_ref() == Some(&answer_value)
        {
            let intent = state
                .stores
                .intents
                .get(&clarification.intent_id)
                .await?
                .ok_or_else(|| ApiError::not_found("Intent not found"))?;
            if let Some(cached) = &intent.response_envelope
                && let Ok(envelope) = serde_json::from_value::<Envelope>(cached.clone())
            {
                return Ok(envelope);
            }
            return outcome_from_intent(state, &intent).await;
        }
        return Err(ApiError::conflict("Clarification already answered"));
    }

    // Guarded CAS: at most one caller wins the open -> answered flip.
    let answered = state
        .stores
        .clarifications
        .answer(clarification_id, &answer_value)
        .await?;
    if answered.is_none() {
        return Err(ApiError::conflict("Clarification already answered"));
    }

    let intent = state
        .stores
        .intents
        .get(&clarification.intent_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Intent not found"))?;

    journal(
        state,
        json!({
            "clarification_id": clarification_id,
            "intent_id": intent.intent_id,
            "answer": answer_value,
        }),
        ArtifactKind::Intent,
        None,
        None,
        &intent.intent_id,
        &intent.correlation_id,
        "clarification_answered",
        None,
    )
    .await?;

    // Apply the answer to the stored draft and run the next round.
    let mut draft: CanonicalDraft = intent
        .canonical_draft
        .clone()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| ApiError::internal(format!("stored draft is corrupt: {e}")))?
        .unwrap_or_default();
    apply_answer(&mut draft, &payload);

    let next_packet = packet_from_draft(&draft);
    let result = normalize(
        &next_packet,
        Utc::now(),
        &state.normalize_cfg,
        state.resolver.as_ref(),
    )
    .await;

    let ctx = TransitionCtx {
        intent_id: &intent.intent_id,
        correlation_id: &intent.correlation_id,
        actor_id: intent.actor_id.as_deref(),
        intent_type: next_packet.intent_type.as_deref(),
        idempotency_key: None,
        request_id: None,
        trace_id: None,
        execute: false,
    };
    apply_transition(state, &ctx, result).await
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Current envelope for an intent (actor-scoped).
pub async fn get_intent(
    state: &AppState,
    intent_id: &str,
    actor_id: Option<String>,
) -> Result<Envelope, ApiError> {
    let intent = state
        .stores
        .intents
        .get(intent_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Intent not found"))?;
    if let (Some(caller), Some(owner)) = (actor_id.as_deref(), intent.actor_id.as_deref())
        && caller != owner
    {
        return Err(ApiError::not_found("Intent not found"));
    }
    outcome_from_intent(state, &intent).await
}

/// Open clarifications for the caller, sweeping expired rows first.
pub async fn list_open_clarifications(
    state: &AppState,
    actor_id: Option<String>,
) -> Result<Vec<ClarificationView>, ApiError> {
    let cutoff = Utc::now() - Duration::hours(state.settings.clarification_expiry_hours);
    let expired_intents = state
        .stores
        .clarifications
        .expire_older_than(cutoff)
        .await?;
    for intent_id in expired_intents {
        // Cascade; a vanished intent row is not an error here.
        let _ = state
            .stores
            .intents
            .update(
                &intent_id,
                IntentUpdate {
                    status: Some(IntentStatus::Expired),
                    ..IntentUpdate::default()
                },
            )
            .await;
    }
    let rows = state
        .stores
        .clarifications
        .list_open(actor_id.as_deref())
        .await?;
    Ok(rows.iter().map(ClarificationView::from).collect())
}

// ---------------------------------------------------------------------------
// Envelope reconstruction
// ---------------------------------------------------------------------------

/// Rebuild the current envelope for an intent from its row and journal.
async fn outcome_from_intent(
    state: &AppState,
    intent: &IntentRecord,
) -> Result<Envelope, ApiError> {
    match intent.status {
        IntentStatus::Executed | IntentStatus::Failed => {
            if let Some(envelope) = load_outcome(state, &intent.intent_id).await? {
                return Ok(envelope);
            }
            let mut envelope = Envelope::new(
                if intent.status == IntentStatus::Executed {
                    EnvelopeStatus::Executed
                } else {
                    EnvelopeStatus::Failed
                },
                &intent.intent_id,
                &intent.correlation_id,
            );
            envelope.message = Some(
                if intent.status == IntentStatus::Executed {
                    "Intent completed"
                } else {
                    "Intent failed"
                }
                .into(),
            );
            Ok(envelope)
        }
        IntentStatus::NeedsClarification => {
            let open = state
                .stores
                .clarifications
                .open_for_intent(&intent.intent_id)
                .await?;
            let mut envelope = Envelope::new(
                EnvelopeStatus::NeedsClarification,
                &intent.intent_id,
                &intent.correlation_id,
            );
            envelope.clarification = open.as_ref().map(ClarificationView::from);
            Ok(envelope)
        }
        IntentStatus::Ready => {
            let canonical: FinalCanonical = intent
                .final_canonical
                .clone()
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| ApiError::internal(format!("stored canonical is corrupt: {e}")))?
                .ok_or_else(|| ApiError::internal("ready intent without canonical form"))?;
            let mut envelope = Envelope::new(
                EnvelopeStatus::Ready,
                &intent.intent_id,
                &intent.correlation_id,
            );
            envelope.plan = Some(build_plan(
                &intent.intent_id,
                &intent.correlation_id,
                &canonical,
            ));
            Ok(envelope)
        }
        IntentStatus::Expired => {
            let mut envelope = Envelope::new(
                EnvelopeStatus::Rejected,
                &intent.intent_id,
                &intent.correlation_id,
            );
            envelope.error_code = Some(RejectCode::Rejected.as_str().into());
            envelope.message = Some("Intent rejected".into());
            envelope.error = Some(
                ErrorPayload::new(RejectCode::IntentFailed.as_str(), "Intent rejected")
                    .with_status_code(400, None),
            );
            Ok(envelope)
        }
        IntentStatus::Received => {
            let mut envelope = Envelope::new(
                EnvelopeStatus::Accepted,
                &intent.intent_id,
                &intent.correlation_id,
            );
            envelope.message = Some("Intent accepted".into());
            Ok(envelope)
        }
    }
}

/// Latest recorded outcome envelope (`executed`, then `failed`, then
/// `rejected`) from the journal.
async fn load_outcome(state: &AppState, intent_id: &str) -> Result<Option<Envelope>, ApiError> {
    for status in ["executed", "failed", "rejected"] {
        if let Some(artifact) = state
            .stores
            .journal
            .latest(intent_id, ArtifactKind::Intent, status)
            .await?
            && let Ok(envelope) = serde_json::from_value::<Envelope>(artifact.artifact.clone())
        {
            return Ok(Some(envelope));
        }
    }
    Ok(None)
}

// ---------------------------------------------------------------------------
// Journal + cache plumbing
// ---------------------------------------------------------------------------

/// Append one artifact, injecting identity and the server timestamp into
/// the snapshot body.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn journal(
    state: &AppState,
    packet: Value,
    kind: ArtifactKind,
    intent_type: Option<String>,
    action: Option<String>,
    intent_id: &str,
    correlation_id: &str,
    status: &str,
    idem: Option<String>,
) -> Result<(), ApiError> {
    let mut artifact = match packet {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("payload".into(), other);
            map
        }
    };
    artifact.insert("intent_id".into(), Value::from(intent_id));
    artifact.insert("correlation_id".into(), Value::from(correlation_id));
    artifact.insert("server_time".into(), Value::from(Utc::now().to_rfc3339()));

    state
        .stores
        .journal
        .append(NewArtifact::new(
            intent_id,
            correlation_id,
            kind,
            intent_type,
            action,
            status,
            idem,
            state.settings.artifact_version,
            Value::Object(artifact),
        ))
        .await?;
    Ok(())
}

async fn journal_envelope(
    state: &AppState,
    ctx: &TransitionCtx<'_>,
    envelope: &Envelope,
) -> Result<(), ApiError> {
    journal(
        state,
        serde_json::to_value(envelope).map_err(ApiError::encoding)?,
        ArtifactKind::Intent,
        ctx.intent_type.map(str::to_string),
        None,
        ctx.intent_id,
        ctx.correlation_id,
        envelope.status.as_str(),
        ctx.idempotency_key.map(str::to_string),
    )
    .await
}

async fn cache_envelope(
    state: &AppState,
    intent_id: &str,
    envelope: &Envelope,
) -> Result<(), ApiError> {
    state
        .stores
        .intents
        .update(
            intent_id,
            IntentUpdate {
                response_envelope: Some(
                    serde_json::to_value(envelope).map_err(ApiError::encoding)?,
                ),
                ..IntentUpdate::default()
            },
        )
        .await?;
    Ok(())
}
