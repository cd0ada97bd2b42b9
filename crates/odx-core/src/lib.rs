// SPDX-License-Identifier: MIT OR Apache-2.0
//! odx-core
//!
//! The stable contract for Orderdesk.
//!
//! Every other crate in the workspace speaks in these types: the case
//! lifecycle, the evidence-tracked canonical order, the closed issue
//! taxonomy, order fingerprints, workflow signals, and structured patches.
//! If you only take one dependency, take this one.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Case lifecycle: the unit of work and its status machine.
pub mod case;
/// Cached catalog records shared by the matcher and the accounting client.
pub mod catalog;
/// Evidence cells and evidence-carrying values.
pub mod evidence;
/// Deterministic order fingerprints for idempotent draft creation.
pub mod fingerprint;
/// The closed issue taxonomy with table-driven severity and lexicon.
pub mod issue;
/// The canonical order produced by the parser.
pub mod order;
/// Structured patches over the editable regions of a canonical order.
pub mod patch;
/// Schema-inference and committee contract types.
pub mod schema;
/// Typed workflow signals.
pub mod signal;

pub use case::{Case, CaseStatus, ChatRef, SourceMeta};
pub use catalog::{CustomerRecord, ItemRecord};
pub use evidence::{Evidence, EvidenceError, Sourced, a1, column_label};
pub use fingerprint::{FingerprintLine, FingerprintRecord, FingerprintState, order_fingerprint};
pub use issue::{Issue, IssueCode, Severity};
pub use order::{
    CanonicalOrder, ConfidenceReport, CustomerBlock, LanguageHint, LineItem, OrderMeta,
    ResolutionStatus, Totals,
};
pub use patch::{PatchError, PatchOp, apply_patch};
pub use schema::{
    CanonicalField, ColumnMapping, CommitteeDisagreement, CommitteeOutcome, CommitteeVerdict,
    MappingCandidate, MappingMethod, SchemaInference, SheetSelectionStatus, TableRegion,
};
pub use signal::{
    SIGNAL_APPROVAL_RECEIVED, SIGNAL_CORRECTIONS_SUBMITTED, SIGNAL_FILE_REUPLOADED,
    SIGNAL_SELECTIONS_SUBMITTED, SelectedCustomer, SelectedItem, SignalParseError, WorkflowSignal,
};

/// Contract version embedded in wire messages and persisted documents.
pub const CONTRACT_VERSION: &str = "odx/v0.1";
