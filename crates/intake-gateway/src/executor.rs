// SPDX-License-Identifier: MIT OR Apache-2.0
//! Plan execution.
//!
//! Actions are dispatched sequentially. A response counts as success only
//! when the HTTP status is 2xx AND the body does not carry `{status:
//! "error"}` or an `error` object. Every action outcome is journalled
//! before aggregation, so a crash mid-plan never loses history.

use crate::{GatewayConfig, GatewayError, build_gateway_request};
use intake_core::{ArtifactKind, Plan};
use intake_store::{JournalStore, NewArtifact, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one dispatched action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// Action name.
    pub action: String,
    /// Endpoint path the request went to.
    pub endpoint: String,
    /// Request ID sent to the gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Idempotency key sent to the gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// HTTP status, when a response arrived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Whether the action counts as executed.
    pub success: bool,
    /// Raw response body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    /// Parsed response body, when it was JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_json: Option<Value>,
    /// Error code extracted from the response body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Transport or shaping error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Task ID extracted from `data.{notion_page_id|notion_task_id|page_id}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notion_task_id: Option<String>,
}

/// Dispatches plans to the action gateway and journals each outcome.
pub struct Executor {
    client: reqwest::Client,
    cfg: GatewayConfig,
    journal: Arc<dyn JournalStore>,
    artifact_version: i32,
}

impl Executor {
    /// Build an executor over a keep-alive client with the configured
    /// per-request timeout.
    pub fn new(
        cfg: GatewayConfig,
        journal: Arc<dyn JournalStore>,
        artifact_version: i32,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| GatewayError::Client(e.to_string()))?;
        Ok(Self {
            client,
            cfg,
            journal,
            artifact_version,
        })
    }

    /// Execute every action in order. Returns `(all_succeeded, outcomes)`.
    /// Journal failures abort the request (the journal is the system of
    /// record); gateway failures are captured in the outcomes.
    pub async fn execute_plan(
        &self,
        intent_id: &str,
        correlation_id: &str,
        actor_id: Option<&str>,
        request_id: Option<&str>,
        plan: &Plan,
    ) -> Result<(bool, Vec<ActionOutcome>), StoreError> {
        let mut outcomes = Vec::with_capacity(plan.actions.len());
        for action in &plan.actions {
            let outcome = self.dispatch(action, actor_id, request_id).await;
            self.journal_outcome(intent_id, correlation_id, &outcome)
                .await?;
            outcomes.push(outcome);
        }
        let all_success = outcomes.iter().all(|o| o.success);
        Ok((all_success, outcomes))
    }

    async fn dispatch(
        &self,
        action: &intake_core::ActionDescriptor,
        actor_id: Option<&str>,
        request_id: Option<&str>,
    ) -> ActionOutcome {
        let mut outcome = ActionOutcome {
            action: action.action.clone(),
            endpoint: String::new(),
            request_id: None,
            idempotency_key: None,
            status_code: None,
            success: false,
            response_body: None,
            response_json: None,
            error_code: None,
            error: None,
            notion_task_id: None,
        };

        let (endpoint, envelope) =
            match build_gateway_request(action, actor_id, request_id, &self.cfg) {
                Ok(shaped) => shaped,
                Err(err) => {
                    outcome.error = Some(err.to_string());
                    return outcome;
                }
            };
        outcome.endpoint = endpoint.clone();
        outcome.request_id = envelope["request_id"].as_str().map(str::to_string);
        outcome.idempotency_key = envelope["idempotency_key"].as_str().map(str::to_string);

        let url = format!("{}{}", self.cfg.base_url, endpoint);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.cfg.bearer_token)
            .json(&envelope)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                warn!(action = %action.action, error = %err, "gateway request failed");
                outcome.error = Some(err.to_string());
                return outcome;
            }
        };

        let status = response.status();
        outcome.status_code = Some(status.as_u16());
        let body = response.text().await.unwrap_or_default();
        outcome.response_body = Some(body.clone());
        let body_json: Option<Value> = serde_json::from_str(&body).ok();
        outcome.response_json = body_json.clone();

        outcome.success = status.is_success();
        if let Some(Value::Object(map)) = &body_json {
            if let Some(error) = map.get("error").filter(|e| !e.is_null()) {
                outcome.error_code = error
                    .get("code")
                    .or_else(|| error.get("type"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                if outcome.error.is_none() {
                    outcome.error = error
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                }
                outcome.success = false;
            }
            if map.get("status").and_then(Value::as_str) == Some("error") {
                outcome.success = false;
            }
            if let Some(Value::Object(data)) = map.get("data") {
                outcome.notion_task_id = ["notion_page_id", "notion_task_id", "page_id"]
                    .iter()
                    .find_map(|key| data.get(*key))
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
        }

        info!(
            action = %action.action,
            status = status.as_u16(),
            success = outcome.success,
            "gateway action dispatched"
        );
        outcome
    }

    async fn journal_outcome(
        &self,
        intent_id: &str,
        correlation_id: &str,
        outcome: &ActionOutcome,
    ) -> Result<(), StoreError> {
        let artifact = json!({
            "request": {
                "endpoint": outcome.endpoint,
                "request_id": outcome.request_id,
                "idempotency_key": outcome.idempotency_key,
            },
            "response": {
                "status_code": outcome.status_code,
                "body": outcome.response_body,
                "json": outcome.response_json,
                "error": outcome.error,
                "error_code": outcome.error_code,
            },
            "success": outcome.success,
        });
        self.journal
            .append(NewArtifact::new(
                intent_id,
                correlation_id,
                ArtifactKind::Action,
                None,
                Some(outcome.action.clone()),
                if outcome.success { "executed" } else { "failed" },
                outcome.idempotency_key.clone(),
                self.artifact_version,
                artifact,
            ))
            .await?;
        Ok(())
    }
}
