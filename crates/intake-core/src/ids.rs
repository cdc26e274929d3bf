// SPDX-License-Identifier: MIT OR Apache-2.0
//! Identifier minting.
//!
//! Intent and correlation IDs are prefixed ULIDs so that rows sort by
//! creation time; trace IDs are plain random UUIDs.

use ulid::Ulid;
use uuid::Uuid;

/// Mint a new intent ID (`int_<ULID>`).
pub fn new_intent_id() -> String {
    format!("int_{}", Ulid::new())
}

/// Mint a new correlation ID (`cor_<ULID>`).
pub fn new_correlation_id() -> String {
    format!("cor_{}", Ulid::new())
}

/// Mint a new trace ID (UUID v4).
pub fn new_trace_id() -> String {
    Uuid::new_v4().to_string()
}
