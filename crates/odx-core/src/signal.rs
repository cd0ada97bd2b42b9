// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed workflow signals.
//!
//! Signals carry only references and decisions, never full orders. The set
//! is closed; unknown names or malformed payloads are parse errors that
//! callers drop with a log rather than fail on.

use crate::patch::PatchOp;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Signal name for a replacement upload.
pub const SIGNAL_FILE_REUPLOADED: &str = "FileReuploaded";
/// Signal name for mapping corrections.
pub const SIGNAL_CORRECTIONS_SUBMITTED: &str = "CorrectionsSubmitted";
/// Signal name for entity selections.
pub const SIGNAL_SELECTIONS_SUBMITTED: &str = "SelectionsSubmitted";
/// Signal name for the approval decision.
pub const SIGNAL_APPROVAL_RECEIVED: &str = "ApprovalReceived";

/// The customer chosen by a human.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SelectedCustomer {
    /// Accounting-system customer id.
    pub id: String,
}

/// The item chosen by a human for one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SelectedItem {
    /// Accounting-system item id.
    pub id: String,
}

/// A signal delivered to a running order workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "signal")]
pub enum WorkflowSignal {
    /// The user uploaded a replacement file.
    FileReuploaded {
        /// Where the new workbook can be fetched.
        blob_url: String,
    },
    /// The user corrected the proposed column mapping or line values.
    CorrectionsSubmitted {
        /// Structured patch operations over the canonical order.
        ops: Vec<PatchOp>,
    },
    /// The user chose among ambiguous customer/item candidates.
    SelectionsSubmitted {
        /// Chosen customer, when the customer was ambiguous.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        customer: Option<SelectedCustomer>,
        /// Chosen items keyed by line row index.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        items: BTreeMap<usize, SelectedItem>,
    },
    /// The approver accepted or rejected the order.
    ApprovalReceived {
        /// `true` to create the draft, `false` to cancel.
        approved: bool,
        /// Identity of the approver.
        approver: String,
        /// Free-text comments.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comments: Option<String>,
    },
}

/// Why a signal payload was rejected.
#[derive(Debug, thiserror::Error)]
pub enum SignalParseError {
    /// The name is not one of the four known signals.
    #[error("unknown signal name '{name}'")]
    UnknownName {
        /// The offending name.
        name: String,
    },
    /// The payload did not match the signal's shape.
    #[error("malformed payload for signal '{name}': {reason}")]
    Malformed {
        /// The signal name.
        name: String,
        /// Serde's explanation.
        reason: String,
    },
}

impl WorkflowSignal {
    /// The wire name of this signal.
    pub fn name(&self) -> &'static str {
        match self {
            Self::FileReuploaded { .. } => SIGNAL_FILE_REUPLOADED,
            Self::CorrectionsSubmitted { .. } => SIGNAL_CORRECTIONS_SUBMITTED,
            Self::SelectionsSubmitted { .. } => SIGNAL_SELECTIONS_SUBMITTED,
            Self::ApprovalReceived { .. } => SIGNAL_APPROVAL_RECEIVED,
        }
    }

    /// Parse a named payload into a typed signal.
    pub fn parse(name: &str, payload: Value) -> Result<Self, SignalParseError> {
        if ![
            SIGNAL_FILE_REUPLOADED,
            SIGNAL_CORRECTIONS_SUBMITTED,
            SIGNAL_SELECTIONS_SUBMITTED,
            SIGNAL_APPROVAL_RECEIVED,
        ]
        .contains(&name)
        {
            return Err(SignalParseError::UnknownName {
                name: name.to_string(),
            });
        }

        let mut tagged = match payload {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                return Err(SignalParseError::Malformed {
                    name: name.to_string(),
                    reason: format!("expected an object, got {other}"),
                });
            }
        };
        tagged.insert("signal".to_string(), Value::String(name.to_string()));

        serde_json::from_value(Value::Object(tagged)).map_err(|e| SignalParseError::Malformed {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_approval() {
        let signal = WorkflowSignal::parse(
            SIGNAL_APPROVAL_RECEIVED,
            json!({"approved": true, "approver": "lead@example.com"}),
        )
        .unwrap();
        match signal {
            WorkflowSignal::ApprovalReceived {
                approved, approver, ..
            } => {
                assert!(approved);
                assert_eq!(approver, "lead@example.com");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn parse_selections_with_items() {
        let signal = WorkflowSignal::parse(
            SIGNAL_SELECTIONS_SUBMITTED,
            json!({"items": {"2": {"id": "it-9"}}}),
        )
        .unwrap();
        match signal {
            WorkflowSignal::SelectionsSubmitted { customer, items } => {
                assert!(customer.is_none());
                assert_eq!(items[&2].id, "it-9");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = WorkflowSignal::parse("SelfDestruct", json!({})).unwrap_err();
        assert!(matches!(err, SignalParseError::UnknownName { .. }));
    }

    #[test]
    fn malformed_payload_is_rejected() {
        let err =
            WorkflowSignal::parse(SIGNAL_FILE_REUPLOADED, json!({"blob_url": 7})).unwrap_err();
        assert!(matches!(err, SignalParseError::Malformed { .. }));
    }

    #[test]
    fn name_roundtrip() {
        let signal = WorkflowSignal::FileReuploaded {
            blob_url: "file:///tmp/x.xlsx".into(),
        };
        assert_eq!(signal.name(), SIGNAL_FILE_REUPLOADED);
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["signal"], "FileReuploaded");
    }
}
