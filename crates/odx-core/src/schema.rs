// SPDX-License-Identifier: MIT OR Apache-2.0
//! Schema-inference contract types.
//!
//! The parser emits a [`SchemaInference`] describing which sheet, region,
//! and columns it chose and how confident it is; the committee collaborator
//! consumes the same shapes and returns a [`CommitteeVerdict`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Canonical fields
// ---------------------------------------------------------------------------

/// The canonical order fields a source column can map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    /// Stock-keeping unit.
    Sku,
    /// Global trade item number.
    Gtin,
    /// Free-text product name.
    ProductName,
    /// Ordered quantity.
    Quantity,
    /// Unit price as written in the source.
    UnitPrice,
    /// Line total as written in the source.
    LineTotal,
    /// Customer name.
    Customer,
    /// Order subtotal.
    Subtotal,
    /// Order tax amount.
    Tax,
    /// Order grand total.
    Total,
}

impl CanonicalField {
    /// `true` for fields whose column body is expected to be numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Quantity | Self::UnitPrice | Self::LineTotal | Self::Subtotal | Self::Tax | Self::Total
        )
    }

    /// `true` for fields that appear once per order rather than per line.
    pub fn is_order_level(&self) -> bool {
        matches!(self, Self::Customer | Self::Subtotal | Self::Tax | Self::Total)
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Sku => "sku",
            Self::Gtin => "gtin",
            Self::ProductName => "product_name",
            Self::Quantity => "quantity",
            Self::UnitPrice => "unit_price",
            Self::LineTotal => "line_total",
            Self::Customer => "customer",
            Self::Subtotal => "subtotal",
            Self::Tax => "tax",
            Self::Total => "total",
        };
        f.write_str(s)
    }
}

/// How a column mapping was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum MappingMethod {
    /// Matched a bilingual synonym dictionary entry.
    Dictionary,
    /// Matched a header within edit-distance tolerance.
    Fuzzy,
    /// Matched by embedding similarity.
    Embedding,
    /// Decided by the committee collaborator as a tiebreak.
    LlmTiebreak,
    /// Chosen by a human.
    Manual,
}

// ---------------------------------------------------------------------------
// Mappings
// ---------------------------------------------------------------------------

/// A runner-up candidate for a column mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MappingCandidate {
    /// Candidate canonical field.
    pub field: CanonicalField,
    /// Candidate confidence in `[0, 1]`.
    pub confidence: f64,
}

/// The chosen canonical field for one source column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnMapping {
    /// The chosen canonical field.
    pub field: CanonicalField,
    /// Header text of the source column.
    pub source_header: String,
    /// Zero-based source column index.
    pub source_column: u32,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// How the mapping was decided.
    pub method: MappingMethod,
    /// Runner-up candidates, best first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<MappingCandidate>,
}

/// Outcome of the sheet-selection stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SheetSelectionStatus {
    /// Exactly one viable sheet, or a clear winner.
    Selected,
    /// Several viable sheets within the ambiguity gap; the top one is
    /// suggested pending user confirmation.
    Ambiguous,
    /// No sheet was viable.
    NoViableSheet,
}

/// Rectangular table region within the selected sheet (zero-based,
/// inclusive bounds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TableRegion {
    /// First data row.
    pub start_row: u32,
    /// Last data row.
    pub end_row: u32,
    /// First column.
    pub start_col: u32,
    /// Last column.
    pub end_col: u32,
}

/// Everything the parser decided about the workbook's layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct SchemaInference {
    /// Name of the selected sheet, when one was selected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    /// Outcome of sheet selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_status: Option<SheetSelectionStatus>,
    /// The table region data rows were read from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<TableRegion>,
    /// Zero-based header row index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_row: Option<u32>,
    /// One mapping per recognised source column.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mappings: Vec<ColumnMapping>,
}

impl SchemaInference {
    /// Look up the mapping for a canonical field, if any column mapped to it.
    pub fn mapping_for(&self, field: CanonicalField) -> Option<&ColumnMapping> {
        self.mappings.iter().find(|m| m.field == field)
    }
}

// ---------------------------------------------------------------------------
// Committee contract
// ---------------------------------------------------------------------------

/// Consensus level reached by the committee collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CommitteeOutcome {
    /// All members agreed.
    Unanimous,
    /// A majority agreed.
    Majority,
    /// Members split between mappings.
    Split,
    /// No mapping gathered meaningful support.
    NoConsensus,
}

impl CommitteeOutcome {
    /// `true` when the outcome requires a human to review the mapping.
    ///
    /// `Split` and `NoConsensus` are both treated as "needs human".
    pub fn needs_human(&self) -> bool {
        matches!(self, Self::Split | Self::NoConsensus)
    }
}

/// A column the committee could not settle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CommitteeDisagreement {
    /// Zero-based source column index.
    pub source_column: u32,
    /// Header text of the source column.
    pub source_header: String,
    /// The fields members proposed.
    pub options: Vec<CanonicalField>,
    /// Free-text note from the committee.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// The committee collaborator's reply: a consensus mapping plus optional
/// disagreements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CommitteeVerdict {
    /// Consensus level.
    pub outcome: CommitteeOutcome,
    /// The agreed mapping (possibly partial when disagreements exist).
    pub mappings: Vec<ColumnMapping>,
    /// Columns that need a human decision.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disagreements: Vec<CommitteeDisagreement>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_fields() {
        assert!(CanonicalField::Quantity.is_numeric());
        assert!(CanonicalField::Tax.is_numeric());
        assert!(!CanonicalField::Sku.is_numeric());
        assert!(!CanonicalField::Customer.is_numeric());
    }

    #[test]
    fn order_level_fields() {
        assert!(CanonicalField::Customer.is_order_level());
        assert!(!CanonicalField::Quantity.is_order_level());
    }

    #[test]
    fn mapping_method_kebab_wire_format() {
        assert_eq!(
            serde_json::to_string(&MappingMethod::LlmTiebreak).unwrap(),
            "\"llm-tiebreak\""
        );
    }

    #[test]
    fn mapping_lookup() {
        let schema = SchemaInference {
            mappings: vec![ColumnMapping {
                field: CanonicalField::Quantity,
                source_header: "تعداد".into(),
                source_column: 2,
                confidence: 0.92,
                method: MappingMethod::Dictionary,
                candidates: vec![],
            }],
            ..Default::default()
        };
        assert!(schema.mapping_for(CanonicalField::Quantity).is_some());
        assert!(schema.mapping_for(CanonicalField::Sku).is_none());
    }

    #[test]
    fn split_and_no_consensus_need_human() {
        assert!(CommitteeOutcome::Split.needs_human());
        assert!(CommitteeOutcome::NoConsensus.needs_human());
        assert!(!CommitteeOutcome::Unanimous.needs_human());
        assert!(!CommitteeOutcome::Majority.needs_human());
    }
}
