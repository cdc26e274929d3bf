// SPDX-License-Identifier: MIT OR Apache-2.0
//! Core vocabulary for the intent intake service.
//!
//! This crate defines the wire-facing types shared by every other crate:
//! intent and action packets, the response envelope, plans, canonical
//! drafts, lifecycle status machines, and the canonical-JSON / SHA-256
//! primitives that idempotency keys and artifact hashes are built on.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod canonical;
pub mod draft;
pub mod envelope;
pub mod ids;
pub mod packet;
pub mod plan;
pub mod reject;
pub mod status;

pub use canonical::{canonical_json, idempotency_key, sha256_hex};
pub use draft::{CanonicalDraft, FinalCanonical, Inference, Pending, PendingField, Resolution};
pub use envelope::{Candidate, ClarificationView, Envelope, EnvelopeStatus, ErrorPayload};
pub use ids::{new_correlation_id, new_intent_id, new_trace_id};
pub use packet::{ActionPacket, IntentPacket, PacketKind};
pub use plan::{ActionDescriptor, Plan, action_idempotency_key, build_plan};
pub use reject::RejectCode;
pub use status::{AnswerType, ArtifactKind, ClarificationStatus, IntentStatus};
