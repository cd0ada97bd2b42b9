// SPDX-License-Identifier: MIT OR Apache-2.0
//! The committee collaborator contract.
//!
//! The committee receives the inferred column mappings plus sample rows
//! and returns a consensus mapping with optional disagreements. How it
//! reaches consensus is its own business; this crate only consumes the
//! verdict.

use async_trait::async_trait;
use odx_core::{ColumnMapping, CommitteeOutcome, CommitteeVerdict, LanguageHint};
use serde::{Deserialize, Serialize};

/// What the committee is asked to review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitteeRequest {
    /// The parser's proposed mappings.
    pub mappings: Vec<ColumnMapping>,
    /// A few data rows rendered as strings, for context.
    pub sample_rows: Vec<Vec<String>>,
    /// The sniffed content language.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_hint: Option<LanguageHint>,
}

/// Committee failures.
#[derive(Debug, thiserror::Error)]
pub enum CommitteeError {
    /// Transport failure or timeout; worth retrying.
    #[error("committee unavailable: {reason}")]
    Unavailable {
        /// What went wrong.
        reason: String,
    },

    /// The reply did not match the contract.
    #[error("committee reply malformed: {reason}")]
    Malformed {
        /// What went wrong.
        reason: String,
    },
}

/// The review operation.
#[async_trait]
pub trait Committee: Send + Sync {
    /// Review proposed mappings, returning the consensus verdict.
    async fn review(&self, request: CommitteeRequest) -> Result<CommitteeVerdict, CommitteeError>;
}

/// A committee that agrees with whatever the parser proposed. The default
/// for deployments without the committee collaborator, and for tests.
#[derive(Debug, Default)]
pub struct EchoCommittee;

#[async_trait]
impl Committee for EchoCommittee {
    async fn review(&self, request: CommitteeRequest) -> Result<CommitteeVerdict, CommitteeError> {
        Ok(CommitteeVerdict {
            outcome: CommitteeOutcome::Unanimous,
            mappings: request.mappings,
            disagreements: Vec::new(),
        })
    }
}

/// reqwest-backed committee client.
pub struct HttpCommittee {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCommittee {
    /// Build a client against the committee's address.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Committee for HttpCommittee {
    async fn review(&self, request: CommitteeRequest) -> Result<CommitteeVerdict, CommitteeError> {
        let response = self
            .client
            .post(format!("{}/review", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| CommitteeError::Unavailable {
                reason: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(CommitteeError::Unavailable {
                reason: format!("HTTP {}", response.status()),
            });
        }
        response
            .json()
            .await
            .map_err(|e| CommitteeError::Malformed {
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odx_core::{CanonicalField, MappingMethod};

    fn mapping() -> ColumnMapping {
        ColumnMapping {
            field: CanonicalField::Quantity,
            source_header: "Qty".into(),
            source_column: 2,
            confidence: 0.95,
            method: MappingMethod::Dictionary,
            candidates: vec![],
        }
    }

    #[tokio::test]
    async fn echo_committee_is_unanimous() {
        let verdict = EchoCommittee
            .review(CommitteeRequest {
                mappings: vec![mapping()],
                sample_rows: vec![],
                language_hint: None,
            })
            .await
            .unwrap();
        assert_eq!(verdict.outcome, CommitteeOutcome::Unanimous);
        assert_eq!(verdict.mappings.len(), 1);
        assert!(!verdict.outcome.needs_human());
    }
}
