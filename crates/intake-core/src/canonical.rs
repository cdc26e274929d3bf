// SPDX-License-Identifier: MIT OR Apache-2.0
//! Canonical JSON serialisation and SHA-256 hashing.
//!
//! Canonical form: object keys sorted lexicographically at every level, no
//! insignificant whitespace, UTF-8 preserved (no ASCII escaping), numbers in
//! serde_json's shortest round-trip form. Idempotency keys and artifact
//! hashes are the hex SHA-256 of this form, so two payloads that differ only
//! in key order or whitespace hash identically.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Produce the canonical JSON string for a value.
///
/// The writer sorts object keys itself rather than trusting the map order of
/// the parsed [`Value`], so the output is stable regardless of how the value
/// was built.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // serde_json handles escaping; to_string on a &str never fails.
                out.push_str(&serde_json::to_string(key).expect("string serialises"));
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => {
            out.push_str(&serde_json::to_string(scalar).expect("scalar serialises"));
        }
    }
}

/// Hex-encoded SHA-256 of a string.
pub fn sha256_hex(input: &str) -> String {
    use std::fmt::Write as _;
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Idempotency key for a raw request payload: `sha256_hex(canonical_json(p))`.
///
/// Computed over the body as received, before the server injects
/// `intent_id`, `correlation_id`, or `trace_id`.
pub fn idempotency_key(payload: &Value) -> String {
    sha256_hex(&canonical_json(payload))
}
