// SPDX-License-Identifier: MIT OR Apache-2.0
//! Stable rejection and failure codes.
//!
//! Codes surface in `rejected`/`failed` envelopes and are part of the wire
//! contract: they never change across releases.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable rejection / failure code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectCode {
    /// A required field is missing or malformed.
    ValidationError,
    /// The intent type is not in the supported whitelist.
    UnsupportedIntentType,
    /// An `update_task` arrived without a task reference.
    PolicyMissingTaskId,
    /// Upstream confidence fell below `min_confidence_to_write`.
    PolicyLowConfidence,
    /// More relative values were inferred than `max_inferred_fields` allows.
    PolicyTooManyInferences,
    /// Execution requested but the gateway is not configured.
    ExecutionNotConfigured,
    /// One or more gateway actions failed.
    ExecutionFailed,
    /// Catch-all for replayed failures without a finer code.
    Rejected,
    /// Replay of an intent that previously failed or expired.
    IntentFailed,
}

impl RejectCode {
    /// Stable `&'static str` representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::UnsupportedIntentType => "UNSUPPORTED_INTENT_TYPE",
            Self::PolicyMissingTaskId => "POLICY_MISSING_TASK_ID",
            Self::PolicyLowConfidence => "POLICY_LOW_CONFIDENCE",
            Self::PolicyTooManyInferences => "POLICY_TOO_MANY_INFERENCES",
            Self::ExecutionNotConfigured => "EXECUTION_NOT_CONFIGURED",
            Self::ExecutionFailed => "EXECUTION_FAILED",
            Self::Rejected => "REJECTED",
            Self::IntentFailed => "INTENT_FAILED",
        }
    }
}

impl fmt::Display for RejectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
