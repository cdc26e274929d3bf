// SPDX-License-Identifier: MIT OR Apache-2.0
//! Gateway-side plumbing: request shaping, plan execution, and the HTTP
//! project resolver.
//!
//! The gateway itself is opaque — this crate only knows the per-action
//! endpoint mapping, the request envelope, and how to classify responses.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod executor;
pub mod resolver;

pub use executor::{ActionOutcome, Executor};
pub use resolver::HttpProjectResolver;

use intake_core::{ActionDescriptor, action_idempotency_key};
use intake_config::Settings;
use serde_json::{Value, json};
use std::time::Duration;
use uuid::Uuid;

/// Errors raised while shaping or dispatching gateway requests.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Gateway execution was requested without base URL / credentials.
    #[error("gateway execution not configured")]
    NotConfigured,

    /// The action name has no endpoint mapping.
    #[error("unsupported action: {action}")]
    UnsupportedAction {
        /// The offending action name.
        action: String,
    },

    /// `notion.tasks.update` payloads must carry `notion_page_id`.
    #[error("missing notion_page_id for update")]
    MissingPageId,

    /// The HTTP client could not be constructed.
    #[error("http client: {0}")]
    Client(String),
}

/// Resolved gateway endpoints and credentials.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL, no trailing slash.
    pub base_url: String,
    /// Bearer token sent on every request.
    pub bearer_token: String,
    /// Path for `notion.tasks.create`.
    pub tasks_create_path: String,
    /// Path for `notion.tasks.update`.
    pub tasks_update_path: String,
    /// Path for `notion.list.add_item`.
    pub lists_add_item_path: String,
    /// Path for `notion.note.capture`.
    pub notes_capture_path: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl GatewayConfig {
    /// Build from settings; `None` when the gateway is not configured.
    pub fn from_settings(settings: &Settings) -> Option<Self> {
        if !settings.gateway_configured() {
            return None;
        }
        Some(Self {
            base_url: settings
                .gateway_base_url
                .clone()?
                .trim_end_matches('/')
                .to_string(),
            bearer_token: settings.gateway_bearer_token.clone()?,
            tasks_create_path: settings.gateway_tasks_create_path.clone(),
            tasks_update_path: settings.gateway_tasks_update_path.clone(),
            lists_add_item_path: settings.gateway_lists_add_item_path.clone(),
            notes_capture_path: settings.gateway_notes_capture_path.clone(),
            timeout: Duration::from_secs_f64(settings.gateway_timeout_seconds),
        })
    }
}

/// Map an action to its endpoint and wrap the payload the way the gateway
/// expects. Returns `(endpoint_path, request_envelope)`.
///
/// The envelope is `{request_id, idempotency_key, actor, payload}`;
/// `request_id` is the caller's when present (end-to-end deduplication),
/// else a fresh UUID.
pub fn build_gateway_request(
    action: &ActionDescriptor,
    actor_id: Option<&str>,
    request_id: Option<&str>,
    cfg: &GatewayConfig,
) -> Result<(String, Value), GatewayError> {
    let payload = &action.payload;
    let (endpoint, gateway_payload) = match action.action.as_str() {
        "notion.tasks.create" => (cfg.tasks_create_path.clone(), json!({"task": payload})),
        "notion.tasks.update" => {
            let has_page = payload
                .get("notion_page_id")
                .and_then(Value::as_str)
                .is_some_and(|s| !s.is_empty());
            if !has_page {
                return Err(GatewayError::MissingPageId);
            }
            (cfg.tasks_update_path.clone(), payload.clone())
        }
        "notion.list.add_item" => (
            cfg.lists_add_item_path.clone(),
            json!({"list_item": payload}),
        ),
        "notion.note.capture" => (cfg.notes_capture_path.clone(), json!({"note": payload})),
        other => {
            return Err(GatewayError::UnsupportedAction {
                action: other.to_string(),
            });
        }
    };

    let idempotency_key = if action.idempotency_key.is_empty() {
        action_idempotency_key(&action.action, payload)
    } else {
        action.idempotency_key.clone()
    };
    let request_id = request_id
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let envelope = json!({
        "request_id": request_id,
        "idempotency_key": idempotency_key,
        "actor": actor_id.unwrap_or("intent-intake"),
        "payload": gateway_payload,
    });
    Ok((endpoint, envelope))
}
