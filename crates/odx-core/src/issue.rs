// SPDX-License-Identifier: MIT OR Apache-2.0
//! The closed issue taxonomy.
//!
//! Every data-quality finding is tagged with an [`IssueCode`]. Severity,
//! default message, and the suggested user action are table-driven off the
//! code, so downstream components never branch on issue "kinds"; they
//! branch on severity or on the code itself.

use crate::evidence::Evidence;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Severity levels, ordered from advisory to prohibitive.
///
/// Presence of any [`Severity::Blocker`] prevents draft creation;
/// [`Severity::Error`] requires resolution or an explicit override;
/// the rest are advisory.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational only.
    Info,
    /// Advisory; the order can proceed unchanged.
    Warning,
    /// Needs resolution or an explicit override before approval.
    Error,
    /// Prevents draft creation outright.
    Blocker,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Blocker => "blocker",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// IssueCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable issue code. The set is closed: new findings get
/// new variants here, never free-form strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    /// A formula was found while the formula policy is `strict`.
    FormulasBlocked,
    /// A formula was found while the formula policy is `warn`.
    FormulasWarning,
    /// No sheet scored above the selection threshold.
    NoSuitableSheet,
    /// Two or more sheets scored within the ambiguity gap.
    MultipleSheetCandidates,
    /// A sheet referenced by name does not exist in the workbook.
    SheetNotFound,
    /// No row scored high enough to be the header row.
    NoHeaderRow,
    /// No column could be mapped to the quantity field.
    MissingQuantityColumn,
    /// The order has no customer value.
    MissingCustomer,
    /// A line has no quantity value.
    MissingQuantity,
    /// A line carries neither a SKU nor a GTIN.
    MissingItemIdentifier,
    /// A GTIN failed length or check-digit validation.
    GtinInvalid,
    /// `qty × unit price` disagrees with the line total beyond tolerance.
    ArithmeticMismatch,
    /// The stated subtotal disagrees with the sum of lines beyond tolerance.
    SubtotalMismatch,
    /// A line quantity is negative.
    NegativeQuantity,
    /// Customer matching produced several close candidates.
    AmbiguousCustomer,
    /// Customer matching found no acceptable candidate.
    CustomerNotFound,
    /// Item matching produced conflicting or several close candidates.
    AmbiguousItem,
    /// Item matching found no catalog entry.
    ItemNotFound,
    /// The committee could not reach consensus on the column mapping.
    CommitteeDisagreement,
    /// A human did not respond within the absolute maximum wait.
    HumanResponseTimeout,
}

impl IssueCode {
    /// The fixed severity for this code.
    pub fn severity(&self) -> Severity {
        match self {
            Self::FormulasBlocked | Self::NoSuitableSheet => Severity::Blocker,

            Self::NoHeaderRow
            | Self::MissingQuantityColumn
            | Self::MissingCustomer
            | Self::MissingQuantity
            | Self::MissingItemIdentifier
            | Self::CustomerNotFound
            | Self::ItemNotFound
            | Self::CommitteeDisagreement
            | Self::HumanResponseTimeout => Severity::Error,

            Self::FormulasWarning
            | Self::MultipleSheetCandidates
            | Self::SheetNotFound
            | Self::GtinInvalid
            | Self::ArithmeticMismatch
            | Self::SubtotalMismatch
            | Self::NegativeQuantity
            | Self::AmbiguousCustomer
            | Self::AmbiguousItem => Severity::Warning,
        }
    }

    /// Default human-readable message for this code.
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::FormulasBlocked => "the workbook contains formulas, which are not accepted",
            Self::FormulasWarning => "the workbook contains formulas; computed values were used",
            Self::NoSuitableSheet => "no sheet in the workbook looks like an order table",
            Self::MultipleSheetCandidates => "several sheets look like order tables",
            Self::SheetNotFound => "the requested sheet does not exist in the workbook",
            Self::NoHeaderRow => "no header row could be identified",
            Self::MissingQuantityColumn => "no column could be mapped to quantity",
            Self::MissingCustomer => "the order does not name a customer",
            Self::MissingQuantity => "the line has no quantity",
            Self::MissingItemIdentifier => "the line has neither a SKU nor a GTIN",
            Self::GtinInvalid => "the GTIN failed validation",
            Self::ArithmeticMismatch => "quantity times unit price disagrees with the line total",
            Self::SubtotalMismatch => "the stated subtotal disagrees with the sum of lines",
            Self::NegativeQuantity => "the line quantity is negative",
            Self::AmbiguousCustomer => "several customers match the order's customer name",
            Self::CustomerNotFound => "no customer matches the order's customer name",
            Self::AmbiguousItem => "several catalog items match the line",
            Self::ItemNotFound => "no catalog item matches the line",
            Self::CommitteeDisagreement => "column mapping review did not reach consensus",
            Self::HumanResponseTimeout => "no response was received within the maximum wait",
        }
    }

    /// Suggested user action, drawn from a closed lexicon.
    pub fn suggested_action(&self) -> &'static str {
        match self {
            Self::FormulasBlocked | Self::FormulasWarning => {
                "re-upload the file with formulas replaced by their values"
            }
            Self::NoSuitableSheet | Self::NoHeaderRow => {
                "re-upload the file with a single order table and a header row"
            }
            Self::MultipleSheetCandidates | Self::SheetNotFound => {
                "confirm which sheet holds the order"
            }
            Self::MissingQuantityColumn | Self::MissingQuantity => {
                "add a quantity column or correct the quantity values"
            }
            Self::MissingCustomer | Self::CustomerNotFound | Self::AmbiguousCustomer => {
                "select the intended customer"
            }
            Self::MissingItemIdentifier | Self::ItemNotFound | Self::AmbiguousItem => {
                "select the intended catalog item for the flagged lines"
            }
            Self::GtinInvalid => "verify the GTIN digits for the flagged lines",
            Self::ArithmeticMismatch | Self::SubtotalMismatch => {
                "verify the amounts on the flagged lines"
            }
            Self::NegativeQuantity => "verify the sign of the flagged quantities",
            Self::CommitteeDisagreement => "review and correct the proposed column mapping",
            Self::HumanResponseTimeout => "restart the order by uploading the file again",
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Reuse the serde rename so logs and wire agree.
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();
        f.write_str(&s)
    }
}

// ---------------------------------------------------------------------------
// Issue
// ---------------------------------------------------------------------------

/// A single finding attached to a canonical order or a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Issue {
    /// The closed-set code.
    pub code: IssueCode,
    /// Severity, always derived from the code.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
    /// Field paths the finding refers to, when applicable.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    /// Source cells backing the finding, when applicable.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<Evidence>,
    /// Suggested user action from the closed lexicon.
    pub suggested_user_action: String,
}

impl Issue {
    /// Build an issue from a code with the table-driven defaults.
    pub fn new(code: IssueCode) -> Self {
        Self {
            code,
            severity: code.severity(),
            message: code.default_message().to_string(),
            fields: Vec::new(),
            evidence: Vec::new(),
            suggested_user_action: code.suggested_action().to_string(),
        }
    }

    /// Replace the default message with a more specific one.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Attach the field paths this finding refers to.
    #[must_use]
    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    /// Attach backing evidence cells.
    #[must_use]
    pub fn with_evidence(mut self, evidence: Vec<Evidence>) -> Self {
        self.evidence = evidence;
        self
    }

    /// `true` if this issue prevents draft creation.
    pub fn is_blocker(&self) -> bool {
        self.severity == Severity::Blocker
    }
}

/// `true` if any issue in the slice is a blocker.
pub fn has_blocker(issues: &[Issue]) -> bool {
    issues.iter().any(Issue::is_blocker)
}
