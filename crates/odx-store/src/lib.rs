// SPDX-License-Identifier: MIT OR Apache-2.0
//! odx-store
//!
//! Case persistence: a versioned [`CaseStore`] trait with in-memory and
//! file-backed implementations, an append-only audit sink, and the
//! [`CaseService`] that routes every mutation through optimistic
//! concurrency and the audit trail.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Append-only audit records.
pub mod audit;
/// File-backed store implementations.
pub mod file;
/// In-memory store implementations.
pub mod memory;
/// The mutation service every component writes cases through.
pub mod service;

pub use audit::{AuditRecord, AuditSink};
pub use file::{FileAuditSink, FileCaseStore};
pub use memory::{MemoryAuditSink, MemoryCaseStore};
pub use service::CaseService;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use odx_core::{Case, CaseStatus};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from case persistence.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No case with the given id in the tenant partition.
    #[error("case {case_id} not found")]
    NotFound {
        /// The missing case id.
        case_id: Uuid,
    },

    /// A case with the given id already exists.
    #[error("case {case_id} already exists")]
    Duplicate {
        /// The conflicting case id.
        case_id: Uuid,
    },

    /// The write lost an optimistic-concurrency race.
    #[error("case {case_id} version conflict: expected {expected}, stored {stored}")]
    VersionConflict {
        /// The case id.
        case_id: Uuid,
        /// Version the writer based its update on.
        expected: u64,
        /// Version actually stored.
        stored: u64,
    },

    /// A status change that the case lifecycle does not allow.
    #[error("case {case_id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        /// The case id.
        case_id: Uuid,
        /// Current status.
        from: CaseStatus,
        /// Requested status.
        to: CaseStatus,
    },

    /// A patch failed (path, shape, or whitelist).
    #[error(transparent)]
    Patch(#[from] odx_core::PatchError),

    /// Underlying storage failure.
    #[error("storage failure: {reason}")]
    Storage {
        /// What went wrong.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// CaseStore
// ---------------------------------------------------------------------------

/// Filters for case listings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseFilter {
    /// Only cases in this status.
    pub status: Option<CaseStatus>,
    /// Only cases created at or after this instant.
    pub since: Option<DateTime<Utc>>,
}

/// Persistent storage of cases, partitioned by tenant.
///
/// `update` is optimistic: the incoming case's `version` must equal the
/// stored version, and the stored copy comes back with `version + 1`.
/// Cases are never deleted.
#[async_trait]
pub trait CaseStore: Send + Sync {
    /// Insert a new case. Fails on duplicate ids.
    async fn create(&self, case: Case) -> Result<(), StoreError>;

    /// Read a case from its tenant partition.
    async fn read(&self, tenant_id: &str, case_id: Uuid) -> Result<Case, StoreError>;

    /// Write an updated case under optimistic concurrency.
    async fn update(&self, case: Case) -> Result<Case, StoreError>;

    /// List a user's cases in a tenant, newest first.
    async fn list_by_user(
        &self,
        tenant_id: &str,
        uploader: &str,
        filter: &CaseFilter,
    ) -> Result<Vec<Case>, StoreError>;
}

pub(crate) fn matches_filter(case: &Case, uploader: &str, filter: &CaseFilter) -> bool {
    if case.source.uploader != uploader {
        return false;
    }
    if let Some(status) = filter.status {
        if case.status != status {
            return false;
        }
    }
    if let Some(since) = filter.since {
        if case.created_at < since {
            return false;
        }
    }
    true
}
