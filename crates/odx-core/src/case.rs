// SPDX-License-Identifier: MIT OR Apache-2.0
//! The case: a single user-submitted order tracked end-to-end.

use crate::issue::Issue;
use crate::order::CanonicalOrder;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum CaseStatus {
    /// Workflow activities are running.
    Processing,
    /// Suspended on a human decision.
    AwaitingInput,
    /// Approved and handed to draft creation (possibly queued for retry).
    Ready,
    /// The draft exists in the accounting system.
    DraftCreated,
    /// Cancelled by a user or by rejection.
    Cancelled,
    /// Terminally failed.
    Failed,
}

impl CaseStatus {
    /// `true` if this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::DraftCreated | Self::Cancelled | Self::Failed)
    }

    /// The set of statuses that are valid successors of `self`.
    pub fn valid_transitions(&self) -> &'static [CaseStatus] {
        match self {
            Self::Processing => &[
                Self::AwaitingInput,
                Self::Ready,
                Self::Cancelled,
                Self::Failed,
            ],
            Self::AwaitingInput => &[Self::Processing, Self::Cancelled, Self::Failed],
            Self::Ready => &[Self::DraftCreated, Self::Cancelled, Self::Failed],
            Self::DraftCreated | Self::Cancelled | Self::Failed => &[],
        }
    }

    /// `true` if transitioning from `self` to `next` is valid.
    pub fn can_transition_to(&self, next: CaseStatus) -> bool {
        self.valid_transitions().contains(&next)
    }
}

// ---------------------------------------------------------------------------
// Source metadata
// ---------------------------------------------------------------------------

/// Reference back to the chat message the upload arrived in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub struct ChatRef {
    /// Chat/conversation identifier.
    pub chat_id: String,
    /// Message identifier within the chat.
    pub message_id: String,
    /// Platform activity identifier.
    pub activity_id: String,
}

/// Where the case's source file came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SourceMeta {
    /// Original filename of the upload.
    pub filename: String,
    /// SHA-256 of the uploaded bytes, lowercase hex.
    pub sha256: String,
    /// Identity of the uploading user.
    pub uploader: String,
    /// Chat reference for notifications.
    pub chat: ChatRef,
}

// ---------------------------------------------------------------------------
// Case
// ---------------------------------------------------------------------------

/// The unit of work: one submitted order, tracked from upload to draft.
///
/// Cases are created when a file arrives, mutated only by workflow
/// activities and bot-initiated signals, and never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Case {
    /// Globally unique case identifier.
    pub case_id: Uuid,
    /// Owning tenant (partition key).
    pub tenant_id: String,
    /// Upload provenance.
    pub source: SourceMeta,
    /// Current lifecycle status.
    pub status: CaseStatus,
    /// Latest canonical order, once parsed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<CanonicalOrder>,
    /// Current issue list (mirrors the order's issues plus case-level ones).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
    /// Identifier of the driving workflow (equals the case id, by design
    /// only as a string; the case holds no workflow object).
    pub workflow_id: String,
    /// Accounting-system draft id once created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_id: Option<String>,
    /// Optimistic-concurrency version, incremented on every write.
    pub version: u64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Case {
    /// Create a fresh case in `Processing` with version 1.
    pub fn new(case_id: Uuid, tenant_id: impl Into<String>, source: SourceMeta) -> Self {
        let now = Utc::now();
        Self {
            case_id,
            tenant_id: tenant_id.into(),
            source,
            status: CaseStatus::Processing,
            order: None,
            issues: Vec::new(),
            workflow_id: case_id.to_string(),
            draft_id: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}
