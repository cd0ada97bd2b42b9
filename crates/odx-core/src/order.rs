// SPDX-License-Identifier: MIT OR Apache-2.0
//! The canonical order: the parser's evidence-tracked structured
//! representation of a submitted spreadsheet.

use crate::evidence::Sourced;
use crate::issue::Issue;
use crate::schema::SchemaInference;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Meta
// ---------------------------------------------------------------------------

/// Language sniffed from the workbook's text content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LanguageHint {
    /// Predominantly English / Latin script.
    En,
    /// Predominantly Farsi / Arabic script.
    Fa,
}

/// Provenance and parse metadata for a canonical order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OrderMeta {
    /// The case this order belongs to.
    pub case_id: Uuid,
    /// Owning tenant.
    pub tenant_id: String,
    /// When the source file was received.
    pub received_at: DateTime<Utc>,
    /// Original filename of the upload.
    pub filename: String,
    /// SHA-256 of the uploaded bytes, lowercase hex.
    pub sha256: String,
    /// Sniffed content language, when detectable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_hint: Option<LanguageHint>,
    /// Version of the parser that produced this order.
    pub parser_version: String,
    /// Whether any cell in the workbook carried a formula.
    pub contains_formulas: bool,
    /// Names of the sheets the parser examined.
    pub sheets_processed: Vec<String>,
}

// ---------------------------------------------------------------------------
// Customer
// ---------------------------------------------------------------------------

/// Resolution state of the extracted customer against the accounting system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStatus {
    /// Not yet matched.
    Unresolved,
    /// Matched to exactly one record.
    Resolved,
    /// Several close candidates; a human must choose.
    Ambiguous,
    /// No acceptable candidate.
    NotFound,
}

/// The order's customer as extracted and (possibly) resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct CustomerBlock {
    /// Customer name as written in the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_name: Option<Sourced<String>>,
    /// Resolution state against the accounting system.
    #[serde(default)]
    pub resolution: ResolutionStatus,
    /// Accounting-system customer id once resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_id: Option<String>,
}

impl Default for ResolutionStatus {
    fn default() -> Self {
        Self::Unresolved
    }
}

// ---------------------------------------------------------------------------
// Lines and totals
// ---------------------------------------------------------------------------

/// One extracted order line.
///
/// `quantity` is semantically required; the parser still emits lines
/// without one so validation can attach a [`MISSING_QUANTITY`] issue to the
/// exact row instead of dropping it.
///
/// [`MISSING_QUANTITY`]: crate::issue::IssueCode::MissingQuantity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LineItem {
    /// Zero-based position within the extracted order.
    pub row_index: usize,
    /// One-based row number in the source sheet.
    pub source_row: u32,
    /// Stock-keeping unit, upper-cased and trimmed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<Sourced<String>>,
    /// GTIN digits. Retained even when check-digit validation failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gtin: Option<Sourced<String>>,
    /// Free-text product name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<Sourced<String>>,
    /// Ordered quantity. Zero is valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Sourced<f64>>,
    /// Unit price exactly as written in the source (no conversion).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Sourced<f64>>,
    /// Line total exactly as written in the source (no conversion).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_total: Option<Sourced<f64>>,
    /// Currency symbol or code seen on the line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<Sourced<String>>,
}

impl LineItem {
    /// An empty line at the given positions.
    pub fn new(row_index: usize, source_row: u32) -> Self {
        Self {
            row_index,
            source_row,
            sku: None,
            gtin: None,
            product_name: None,
            quantity: None,
            unit_price: None,
            line_total: None,
            currency: None,
        }
    }

    /// `true` when the line carries at least one of SKU or GTIN.
    pub fn has_item_identifier(&self) -> bool {
        self.sku.is_some() || self.gtin.is_some()
    }
}

/// Order-level totals as written in the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct Totals {
    /// Stated subtotal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtotal: Option<Sourced<f64>>,
    /// Stated tax amount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax: Option<Sourced<f64>>,
    /// Stated grand total.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grand_total: Option<Sourced<f64>>,
    /// Currency symbol or code seen on the totals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<Sourced<String>>,
}

impl Totals {
    /// `true` when no total was extracted at all.
    pub fn is_empty(&self) -> bool {
        self.subtotal.is_none()
            && self.tax.is_none()
            && self.grand_total.is_none()
            && self.currency.is_none()
    }
}

// ---------------------------------------------------------------------------
// Confidence
// ---------------------------------------------------------------------------

/// Per-stage parser confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct ConfidenceReport {
    /// Overall confidence across stages.
    pub overall: f64,
    /// Confidence in the sheet choice.
    pub sheet_selection: f64,
    /// Confidence in the header-row choice.
    pub header_detection: f64,
    /// Mean confidence of the column mappings.
    pub column_mapping: f64,
}

// ---------------------------------------------------------------------------
// CanonicalOrder
// ---------------------------------------------------------------------------

/// The extracted order, produced once per parse and mutated only through
/// structured patches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CanonicalOrder {
    /// Provenance and parse metadata.
    pub meta: OrderMeta,
    /// The extracted customer.
    #[serde(default)]
    pub customer: CustomerBlock,
    /// The extracted lines, in source order.
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    /// Order-level totals, when any were found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totals: Option<Totals>,
    /// Layout decisions the parser made.
    #[serde(default)]
    pub schema_inference: SchemaInference,
    /// Per-stage confidence.
    #[serde(default)]
    pub confidence: ConfidenceReport,
    /// Findings accumulated across the pipeline.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
}

impl CanonicalOrder {
    /// An order holding only metadata, the shape returned alongside a
    /// blocker, where no other field may be populated.
    pub fn empty(meta: OrderMeta) -> Self {
        Self {
            meta,
            customer: CustomerBlock::default(),
            line_items: Vec::new(),
            totals: None,
            schema_inference: SchemaInference::default(),
            confidence: ConfidenceReport::default(),
            issues: Vec::new(),
        }
    }

    /// `true` if any issue prevents draft creation.
    pub fn has_blocker(&self) -> bool {
        crate::issue::has_blocker(&self.issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::Evidence;
    use crate::issue::IssueCode;

    fn meta() -> OrderMeta {
        OrderMeta {
            case_id: Uuid::nil(),
            tenant_id: "t1".into(),
            received_at: DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            filename: "order.xlsx".into(),
            sha256: "00".repeat(32),
            language_hint: None,
            parser_version: "test".into(),
            contains_formulas: false,
            sheets_processed: vec!["Sheet1".into()],
        }
    }

    #[test]
    fn empty_order_has_no_lines_or_issues() {
        let order = CanonicalOrder::empty(meta());
        assert!(order.line_items.is_empty());
        assert!(order.issues.is_empty());
        assert!(order.totals.is_none());
        assert!(!order.has_blocker());
    }

    #[test]
    fn blocker_detection() {
        let mut order = CanonicalOrder::empty(meta());
        order.issues.push(Issue::new(IssueCode::FormulasBlocked));
        assert!(order.has_blocker());
    }

    #[test]
    fn line_item_identifier_check() {
        let mut line = LineItem::new(0, 2);
        assert!(!line.has_item_identifier());
        line.gtin = Some(Sourced::new(
            "4006381333931".to_string(),
            Evidence::new("Sheet1", "B2", "4006381333931"),
        ));
        assert!(line.has_item_identifier());
    }

    #[test]
    fn resolution_status_wire_format_is_kebab() {
        assert_eq!(
            serde_json::to_string(&ResolutionStatus::NotFound).unwrap(),
            "\"not-found\""
        );
    }

    #[test]
    fn order_serde_roundtrip() {
        let mut order = CanonicalOrder::empty(meta());
        order.customer.input_name = Some(Sourced::new(
            "Acme Co.".to_string(),
            Evidence::new("Sheet1", "B1", "Acme Co."),
        ));
        let mut line = LineItem::new(0, 3);
        line.quantity = Some(Sourced::new(12.0, Evidence::new("Sheet1", "C3", "12")));
        order.line_items.push(line);
        let json = serde_json::to_string(&order).unwrap();
        let back: CanonicalOrder = serde_json::from_str(&json).unwrap();
        assert_eq!(back, order);
    }
}
