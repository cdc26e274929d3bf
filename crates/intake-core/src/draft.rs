// SPDX-License-Identifier: MIT OR Apache-2.0
//! Progressive canonical forms.
//!
//! [`CanonicalDraft`] is the state between normalisation rounds: the fields
//! canonicalised so far plus an optional [`Pending`] marker naming the field
//! a clarification was asked about. [`FinalCanonical`] is the accepted form
//! a plan is built from.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which field an open clarification is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingField {
    /// The packet had no `intent_type`.
    IntentType,
    /// The project selector could not be resolved confidently.
    Project,
    /// The due value was not a recognised label or ISO date.
    Due,
}

/// Marker for the field blocking normalisation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pending {
    /// The blocked field.
    pub field: PendingField,
    /// The caller's original selector text, kept for the next round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

/// The canonical form under construction between normalisation rounds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDraft {
    /// Intent type, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_type: Option<String>,
    /// Fields canonicalised so far.
    #[serde(default)]
    pub fields: Map<String, Value>,
    /// Set while a clarification is open; cleared by answer application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<Pending>,
}

/// One relative-to-absolute resolution performed by the normaliser.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Inference {
    /// Canonical field the inference landed on.
    pub field: String,
    /// The caller's original value.
    pub source: String,
    /// The resolved absolute value.
    pub resolved: String,
}

/// Resolution metadata accumulated during normalisation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// Relative-date and reference resolutions, in the order applied.
    #[serde(default)]
    pub inferences: Vec<Inference>,
}

impl Resolution {
    /// True when nothing was inferred.
    pub fn is_empty(&self) -> bool {
        self.inferences.is_empty()
    }
}

/// The accepted canonical form of an intent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinalCanonical {
    /// Validated intent type.
    pub intent_type: String,
    /// Fully resolved fields.
    pub fields: Map<String, Value>,
    /// How ambiguous inputs were resolved.
    #[serde(default, skip_serializing_if = "Resolution::is_empty")]
    pub resolution: Resolution,
}
