// SPDX-License-Identifier: MIT OR Apache-2.0
//! Append-only audit records.
//!
//! Every state transition of a case produces one record. Sinks only ever
//! append; nothing reads them back on the hot path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// The case the action applied to.
    pub case_id: Uuid,
    /// When the action happened.
    pub timestamp: DateTime<Utc>,
    /// Who (or which component) acted.
    pub actor: String,
    /// Machine-readable action name (e.g. `"status_change"`, `"patch"`).
    pub action: String,
    /// Structured description of what changed.
    pub diff: serde_json::Value,
}

impl AuditRecord {
    /// Build a record stamped now.
    pub fn new(
        case_id: Uuid,
        actor: impl Into<String>,
        action: impl Into<String>,
        diff: serde_json::Value,
    ) -> Self {
        Self {
            case_id,
            timestamp: Utc::now(),
            actor: actor.into(),
            action: action.into(),
            diff,
        }
    }
}

/// Where audit records go.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one record. Append-only by contract.
    async fn append(&self, record: AuditRecord);
}
