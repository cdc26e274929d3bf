// SPDX-License-Identifier: MIT OR Apache-2.0
//! Plan construction.
//!
//! A plan is the ordered list of gateway actions derived from an accepted
//! canonical form. Each action carries its own idempotency key so the
//! gateway can deduplicate retries independently of the intent.

use crate::canonical::{canonical_json, sha256_hex};
use crate::draft::FinalCanonical;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// One dispatchable action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    /// Always `"action"`; kept on the wire for packet symmetry.
    pub kind: String,
    /// Gateway action name.
    pub action: String,
    /// Owning intent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_id: Option<String>,
    /// Correlation ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Per-action idempotency key (`action:<sha256>`).
    pub idempotency_key: String,
    /// Payload handed to the gateway.
    pub payload: Value,
}

/// An ordered list of actions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Actions in dispatch order.
    pub actions: Vec<ActionDescriptor>,
}

/// Idempotency key for a single action:
/// `"action:" + sha256_hex(canonical_json({action, payload}))`.
pub fn action_idempotency_key(action: &str, payload: &Value) -> String {
    let body = json!({"action": action, "payload": payload});
    format!("action:{}", sha256_hex(&canonical_json(&body)))
}

/// Derive the plan for an accepted canonical form.
///
/// `create_task` carries the whole canonical field bag; `update_task`
/// reshapes to `{notion_page_id, patch}`; list items and notes pass their
/// fields through.
pub fn build_plan(intent_id: &str, correlation_id: &str, canonical: &FinalCanonical) -> Plan {
    let fields = Value::Object(canonical.fields.clone());
    let (action, payload) = match canonical.intent_type.as_str() {
        "update_task" => (
            "notion.tasks.update",
            json!({
                "notion_page_id": canonical.fields.get("task_id").cloned().unwrap_or(Value::Null),
                "patch": canonical.fields.get("patch").cloned().unwrap_or_else(|| json!({})),
            }),
        ),
        "add_list_item" => ("notion.list.add_item", fields),
        "capture_note" => ("notion.note.capture", fields),
        _ => ("notion.tasks.create", fields),
    };
    let idempotency_key = action_idempotency_key(action, &payload);
    Plan {
        actions: vec![ActionDescriptor {
            kind: "action".into(),
            action: action.into(),
            intent_id: Some(intent_id.to_string()),
            correlation_id: Some(correlation_id.to_string()),
            idempotency_key,
            payload,
        }],
    }
}
