// SPDX-License-Identifier: MIT OR Apache-2.0
//! Lifecycle status machines for intents and clarifications.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// IntentStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of an intent row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    /// Persisted, not yet normalised.
    Received,
    /// Blocked on an open clarification.
    NeedsClarification,
    /// Normalised; a plan can be built from `final_canonical`.
    Ready,
    /// Every plan action succeeded at the gateway.
    Executed,
    /// Rejected by normalisation or failed at the gateway.
    Failed,
    /// The open clarification aged out.
    Expired,
}

impl IntentStatus {
    /// Returns `true` if this status represents a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Executed | Self::Failed | Self::Expired)
    }

    /// Returns the set of statuses that are valid successors of `self`.
    pub fn valid_transitions(&self) -> &'static [IntentStatus] {
        match self {
            Self::Received => &[Self::NeedsClarification, Self::Ready, Self::Failed],
            Self::NeedsClarification => &[
                Self::NeedsClarification,
                Self::Ready,
                Self::Failed,
                Self::Expired,
            ],
            Self::Ready => &[Self::Executed, Self::Failed],
            Self::Executed | Self::Failed | Self::Expired => &[],
        }
    }

    /// Returns `true` if transitioning from `self` to `next` is valid.
    pub fn can_transition_to(&self, next: IntentStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    /// Stable string tag used in rows, artifacts, and envelopes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::NeedsClarification => "needs_clarification",
            Self::Ready => "ready",
            Self::Executed => "executed",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(Self::Received),
            "needs_clarification" => Ok(Self::NeedsClarification),
            "ready" => Ok(Self::Ready),
            "executed" => Ok(Self::Executed),
            "failed" => Ok(Self::Failed),
            "expired" => Ok(Self::Expired),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A status tag that is not part of the lifecycle vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status tag: {0}")]
pub struct UnknownStatus(pub String);

// ---------------------------------------------------------------------------
// ClarificationStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a clarification row. Transitions are monotonic:
/// `open` moves to exactly one of `answered` or `expired`, once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClarificationStatus {
    /// Waiting for the caller's answer.
    Open,
    /// Answered; `answered_at` is set.
    Answered,
    /// Aged out before being answered.
    Expired,
}

impl ClarificationStatus {
    /// Returns the set of statuses that are valid successors of `self`.
    pub fn valid_transitions(&self) -> &'static [ClarificationStatus] {
        match self {
            Self::Open => &[Self::Answered, Self::Expired],
            Self::Answered | Self::Expired => &[],
        }
    }

    /// Returns `true` if transitioning from `self` to `next` is valid.
    pub fn can_transition_to(&self, next: ClarificationStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    /// Stable string tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Answered => "answered",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for ClarificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClarificationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "answered" => Ok(Self::Answered),
            "expired" => Ok(Self::Expired),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// AnswerType
// ---------------------------------------------------------------------------

/// What kind of answer a clarification expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerType {
    /// Pick one of the offered candidates by id.
    Choice,
    /// Free-form text.
    FreeText,
    /// An ISO-8601 date.
    Date,
    /// An ISO-8601 datetime.
    Datetime,
}

impl AnswerType {
    /// Stable string tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Choice => "choice",
            Self::FreeText => "free_text",
            Self::Date => "date",
            Self::Datetime => "datetime",
        }
    }
}

impl FromStr for AnswerType {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "choice" => Ok(Self::Choice),
            "free_text" => Ok(Self::FreeText),
            "date" => Ok(Self::Date),
            "datetime" => Ok(Self::Datetime),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ArtifactKind
// ---------------------------------------------------------------------------

/// Journal artifact family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Intent lifecycle transition.
    Intent,
    /// Gateway action outcome.
    Action,
}

impl ArtifactKind {
    /// Stable string tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intent => "intent",
            Self::Action => "action",
        }
    }
}
