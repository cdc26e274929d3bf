// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP edge for the intent intake service.
//!
//! [`build_app`] wires the axum router: unauthenticated `/health` and
//! `/version`, bearer-guarded `/v1/*` for ingest, reads, clarification
//! answers, and the journal-only actions endpoint. The hard work lives in
//! [`controller`].

#![deny(unsafe_code)]

pub mod controller;
pub mod middleware;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path as AxPath, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use intake_config::Settings;
use intake_core::{ActionPacket, Envelope, EnvelopeStatus, ErrorPayload, PacketKind, RejectCode};
use intake_gateway::{Executor, GatewayConfig};
use intake_normalize::{AnswerPayload, NormalizeConfig, ProjectResolver};
use intake_store::{ClarificationStore, IntentStore, JournalStore, StoreError};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// The three store handles the controller works against.
#[derive(Clone)]
pub struct Stores {
    /// Intent rows.
    pub intents: Arc<dyn IntentStore>,
    /// Clarification rows.
    pub clarifications: Arc<dyn ClarificationStore>,
    /// The append-only artifact journal.
    pub journal: Arc<dyn JournalStore>,
}

/// Shared application state.
pub struct AppState {
    /// Runtime settings (read-only after construction).
    pub settings: Settings,
    /// Storage handles.
    pub stores: Stores,
    /// Injected project resolver.
    pub resolver: Arc<dyn ProjectResolver>,
    /// Plan executor; `None` when the gateway is unconfigured.
    pub executor: Option<Executor>,
    /// Pre-parsed normalisation knobs.
    pub normalize_cfg: NormalizeConfig,
}

impl AppState {
    /// Build state from settings, stores, and a resolver. Fails when the
    /// configured timezone is unknown or the HTTP client cannot be built.
    pub fn new(
        settings: Settings,
        stores: Stores,
        resolver: Arc<dyn ProjectResolver>,
    ) -> anyhow::Result<Self> {
        let user_timezone = settings
            .user_timezone
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid USER_TIMEZONE: {e}"))?;
        let normalize_cfg = NormalizeConfig {
            user_timezone,
            min_confidence_to_write: settings.min_confidence_to_write,
            max_inferred_fields: settings.max_inferred_fields,
            project_resolution_threshold: settings.project_resolution_threshold,
            project_resolution_margin: settings.project_resolution_margin,
        };
        let executor = match GatewayConfig::from_settings(&settings) {
            Some(cfg) => Some(Executor::new(
                cfg,
                stores.journal.clone(),
                settings.artifact_version,
            )?),
            None => None,
        };
        Ok(Self {
            settings,
            stores,
            resolver,
            executor,
            normalize_cfg,
        })
    }
}

// ---------------------------------------------------------------------------
// API errors
// ---------------------------------------------------------------------------

/// Structured API error: `{error: {code, message, details: {status_code}}}`.
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status to respond with.
    pub status: StatusCode,
    /// Machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Extra context merged into `details`.
    pub details: Option<Value>,
}

impl ApiError {
    fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// 400 — the body is not valid JSON.
    pub fn bad_json() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_json", "Invalid JSON payload")
    }

    /// 400 — the body failed schema validation.
    pub fn schema_validation(message: impl Into<String>, details: Option<Value>) -> Self {
        let mut err = Self::new(StatusCode::BAD_REQUEST, "schema_validation_failed", message);
        err.details = details;
        err
    }

    /// 400 — unknown `schema_version`.
    pub fn unsupported_schema_version(version: &str) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "unsupported_schema_version",
            format!("Unsupported schema_version: {version}"),
        )
    }

    /// 400 — malformed request outside the schema family.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    /// 401 — missing or wrong bearer token.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    /// 404 — absent, or hidden by actor scoping.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    /// 409 — conflicting lifecycle state.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", message)
    }

    /// 503 — the database is unreachable.
    pub fn db_unavailable() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "DB_UNAVAILABLE",
            "Database unavailable",
        )
    }

    /// 500 — unexpected internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    /// 500 — a value failed to serialise.
    pub fn encoding(err: serde_json::Error) -> Self {
        Self::internal(format!("encoding failed: {err}"))
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::not_found(what),
            other => {
                tracing::error!(error = %other, "storage failure");
                Self::db_unavailable()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = ErrorPayload::new(self.code, self.message)
            .with_status_code(self.status.as_u16(), self.details);
        (self.status, Json(json!({"error": payload}))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the axum router with all daemon routes.
pub fn build_app(state: Arc<AppState>) -> Router {
    let guarded = Router::new()
        .route("/intents", post(cmd_ingest_intent))
        .route("/intents/{intent_id}", get(cmd_get_intent))
        .route("/clarifications", get(cmd_list_clarifications))
        .route(
            "/clarifications/{clarification_id}/answer",
            post(cmd_answer_clarification),
        )
        .route("/actions", post(cmd_ingest_action))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_bearer,
        ));

    let mut app = Router::new()
        .route("/health", get(cmd_health))
        .route("/version", get(cmd_version))
        .nest("/v1", guarded)
        .layer(axum::middleware::from_fn(
            middleware::request_observability,
        ))
        .with_state(state.clone());

    if let Some(cors) = middleware::cors_layer(&state.settings.cors_origins()) {
        app = app.layer(cors);
    }
    app
}

fn actor_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-actor-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn set_header(response: &mut Response, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        response.headers_mut().insert(name, value);
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn cmd_health(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    state
        .stores
        .intents
        .ping()
        .await
        .map_err(|_| ApiError::db_unavailable())?;
    Ok(Json(json!({"status": "ok"})))
}

async fn cmd_version(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "version": state.settings.version,
        "git_sha": state.settings.git_sha,
        "artifact_version": state.settings.artifact_version,
    }))
}

async fn cmd_ingest_intent(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let actor = actor_from_headers(&headers);
    let outcome = controller::ingest(&state, &body, actor).await?;
    let mut response = Json(&outcome.envelope).into_response();
    set_header(&mut response, "x-intent-id", &outcome.intent_id);
    set_header(&mut response, "x-correlation-id", &outcome.correlation_id);
    set_header(&mut response, "x-request-id", &outcome.request_id);
    set_header(&mut response, "x-trace-id", &outcome.trace_id);
    Ok(response)
}

async fn cmd_get_intent(
    State(state): State<Arc<AppState>>,
    AxPath(intent_id): AxPath<String>,
    headers: HeaderMap,
) -> Result<Json<Envelope>, ApiError> {
    let actor = actor_from_headers(&headers);
    let envelope = controller::get_intent(&state, &intent_id, actor).await?;
    Ok(Json(envelope))
}

async fn cmd_list_clarifications(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Vec<intake_core::ClarificationView>>, ApiError> {
    let status = params.get("status").map(String::as_str).unwrap_or("open");
    if status != "open" {
        return Err(ApiError::invalid_request("Unsupported status filter"));
    }
    let actor = actor_from_headers(&headers);
    let views = controller::list_open_clarifications(&state, actor).await?;
    Ok(Json(views))
}

async fn cmd_answer_clarification(
    State(state): State<Arc<AppState>>,
    AxPath(clarification_id): AxPath<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Envelope>, ApiError> {
    let payload: AnswerPayload =
        serde_json::from_slice(&body).map_err(|_| ApiError::bad_json())?;
    let actor = actor_from_headers(&headers);
    let envelope =
        controller::answer_clarification(&state, &clarification_id, payload, actor).await?;
    Ok(Json(envelope))
}

async fn cmd_ingest_action(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let raw: Value = serde_json::from_slice(&body).map_err(|_| ApiError::bad_json())?;
    let packet: ActionPacket = serde_json::from_value(raw.clone()).map_err(|err| {
        ApiError::schema_validation(
            "Action payload failed schema validation",
            Some(json!({"errors": [err.to_string()]})),
        )
    })?;
    if packet.kind != PacketKind::Action {
        return Err(ApiError::schema_validation(
            "Action packets must have kind 'action'",
            None,
        ));
    }

    let intent_id = packet
        .intent_id
        .clone()
        .unwrap_or_else(intake_core::new_intent_id);
    let correlation_id = packet
        .correlation_id
        .clone()
        .unwrap_or_else(intake_core::new_correlation_id);

    controller::journal(
        &state,
        raw,
        intake_core::ArtifactKind::Action,
        None,
        packet.action.clone(),
        &intent_id,
        &correlation_id,
        "received",
        None,
    )
    .await?;

    let envelope = match packet.action.as_deref().filter(|a| !a.is_empty()) {
        Some(_) => {
            let mut envelope =
                Envelope::new(EnvelopeStatus::Accepted, &intent_id, &correlation_id);
            envelope.message = Some("Action recorded".into());
            envelope
        }
        None => {
            let mut envelope =
                Envelope::new(EnvelopeStatus::Rejected, &intent_id, &correlation_id);
            envelope.error_code = Some(RejectCode::ValidationError.as_str().into());
            envelope.message = Some("Missing action".into());
            envelope.error = Some(
                ErrorPayload::new(RejectCode::ValidationError.as_str(), "Missing action")
                    .with_status_code(400, None),
            );
            envelope
        }
    };

    controller::journal(
        &state,
        serde_json::to_value(&envelope).map_err(ApiError::encoding)?,
        intake_core::ArtifactKind::Action,
        None,
        packet.action.clone(),
        &intent_id,
        &correlation_id,
        envelope.status.as_str(),
        None,
    )
    .await?;

    let mut response = Json(&envelope).into_response();
    set_header(&mut response, "x-intent-id", &intent_id);
    set_header(&mut response, "x-correlation-id", &correlation_id);
    Ok(response)
}
