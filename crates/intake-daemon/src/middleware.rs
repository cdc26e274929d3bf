// SPDX-License-Identifier: MIT OR Apache-2.0
//! Middleware stack for the intake daemon HTTP API.

use crate::{ApiError, AppState};
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::info;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Bearer auth
// ---------------------------------------------------------------------------

/// Axum middleware enforcing `Authorization: Bearer <token>` on `/v1/*`.
pub async fn require_bearer(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let header = req
        .headers()
        .get("authorization")
        .and_then(|value| value.to_str().ok());
    let Some(header) = header else {
        return ApiError::unauthorized("Missing bearer token").into_response();
    };
    let Some((scheme, token)) = header.split_once(' ') else {
        return ApiError::unauthorized("Invalid authorization header").into_response();
    };
    if !scheme.eq_ignore_ascii_case("bearer") || token != state.settings.intent_service_token {
        return ApiError::unauthorized("Invalid bearer token").into_response();
    }
    next.run(req).await
}

// ---------------------------------------------------------------------------
// Request IDs + structured request logging
// ---------------------------------------------------------------------------

/// Axum middleware that logs each request and guarantees an `X-Request-Id`
/// response header. A request ID set by a handler (the ingest path derives
/// one from the packet) is left untouched.
pub async fn request_observability(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let start = Instant::now();

    let mut resp = next.run(req).await;

    if !resp.headers().contains_key("x-request-id") {
        let id = Uuid::new_v4().to_string();
        if let Ok(value) = HeaderValue::from_str(&id) {
            resp.headers_mut().insert("x-request-id", value);
        }
    }

    info!(
        http.method = %method,
        http.path = %path,
        http.status = resp.status().as_u16(),
        http.duration_ms = start.elapsed().as_millis() as u64,
        "request completed"
    );
    resp
}

// ---------------------------------------------------------------------------
// CORS
// ---------------------------------------------------------------------------

/// CORS layer for the configured origins; `None` when CORS is disabled.
pub fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(parsed))
            .allow_methods(AllowMethods::any())
            .allow_headers(AllowHeaders::any()),
    )
}
