// SPDX-License-Identifier: MIT OR Apache-2.0
//! odx-workflow
//!
//! The order-processing saga: an explicit state machine from `stored` to
//! `completed`, driven by retryable activities and typed signals, with
//! reminder/escalation/max-wait timers on every human suspension point and
//! compensation on cancellation.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Retryable activities.
pub mod activities;
/// Blob storage contracts.
pub mod blob;
/// The committee collaborator contract.
pub mod committee;
/// Chat notification contracts.
pub mod notify;
/// Per-activity retry policies.
pub mod policy;
/// The saga itself.
pub mod saga;

pub use activities::{
    Activities, ActivityError, ModelParserGateway, ParserGateway, StoredUpload, XlsxParserGateway,
    hex_sha256,
};
pub use blob::{BlobError, BlobStore, HttpBlobFetcher, MemoryBlobStore};
pub use committee::{
    Committee, CommitteeError, CommitteeRequest, EchoCommittee, HttpCommittee,
};
pub use notify::{CaseNotifier, HttpBotClient, LogNotifier, NoticeKind, NotifyFailure};
pub use saga::{OrderWorkflow, TimerConfig, WorkflowInput};
