// SPDX-License-Identifier: MIT OR Apache-2.0
//! Inbound packet models.
//!
//! Packets are deliberately open: unknown members are collected into `extra`
//! and travel with the packet into the journal, so callers can attach their
//! own correlation data without a schema change.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Discriminator carried by every packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketKind {
    /// A user intent to be normalised.
    Intent,
    /// A pre-built action, journalled verbatim.
    Action,
}

/// A loosely structured intent packet as submitted by the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentPacket {
    /// Packet discriminator; must be `intent` for the ingest endpoint.
    pub kind: PacketKind,
    /// Requested operation (`create_task`, `update_task`, …).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_type: Option<String>,
    /// Caller-supplied intent ID; minted when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_id: Option<String>,
    /// Caller-supplied correlation ID; minted when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Acting principal; the `X-Actor-Id` header takes precedence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    /// Upstream parser confidence in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// The loosely structured field bag to normalise.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
    /// Unrecognised members, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A pre-built action packet for the journal-only `/v1/actions` endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionPacket {
    /// Packet discriminator; must be `action`.
    pub kind: PacketKind,
    /// Gateway action name (e.g. `notion.tasks.create`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Owning intent, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_id: Option<String>,
    /// Correlation ID, minted when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Pre-computed action idempotency key, if the caller has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// Action payload forwarded to the gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Unrecognised members, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IntentPacket {
    /// The caller's request ID: `request_id`, then `requestId`, from the
    /// extra bag. Used for end-to-end gateway deduplication.
    pub fn request_id(&self) -> Option<String> {
        for key in ["request_id", "requestId"] {
            if let Some(value) = self.extra.get(key)
                && let Some(s) = value.as_str()
                && !s.is_empty()
            {
                return Some(s.to_string());
            }
        }
        None
    }

    /// Top-level `title` fallback (some callers put it beside `fields`).
    pub fn top_level_title(&self) -> Option<&str> {
        self.extra.get("title").and_then(Value::as_str)
    }
}
