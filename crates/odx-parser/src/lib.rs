// SPDX-License-Identifier: MIT OR Apache-2.0
//! odx-parser
//!
//! Deterministic, evidence-tracked spreadsheet parsing.
//!
//! The pipeline is ordered and short-circuiting: formula scan, sheet
//! selection, header detection, schema inference, row extraction, value
//! normalisation, validation. Same input, same output; every produced
//! value carries at least one evidence cell, and a blocker returns
//! immediately as the sole issue on an otherwise-empty order.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Formula scanning.
pub mod formula;
/// Header-row detection.
pub mod header;
/// The bilingual header and keyword lexicon.
pub mod lexicon;
/// Value normalisation: numbers, digits, identifiers, language.
pub mod number;
/// Row classification and extraction.
pub mod rows;
/// Column-mapping inference.
pub mod schema;
/// Sheet selection.
pub mod sheet;
/// Order validation (also used for post-patch revalidation).
pub mod validate;
/// The in-memory workbook model.
pub mod workbook;
/// `.xlsx` loading.
pub mod xlsx;

use chrono::{DateTime, Utc};
use odx_core::{
    CanonicalOrder, ConfidenceReport, Evidence, Issue, IssueCode, OrderMeta, SheetSelectionStatus,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;
use workbook::{CellValue, Workbook};

pub use validate::validate_order;
pub use xlsx::{LoadError, LoadLimits, load_xlsx};

/// Version string recorded in every order's metadata.
pub const PARSER_VERSION: &str = "odx-parser/0.1.0";

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// What to do when the workbook contains formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FormulaPolicy {
    /// Any formula blocks the parse.
    #[default]
    Strict,
    /// Formulas produce a warning; computed values are used.
    Warn,
    /// Formulas are ignored entirely.
    Allow,
}

/// Tuning knobs for a parse run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseOptions {
    /// Formula policy.
    pub formula_policy: FormulaPolicy,
    /// Minimum sheet score to be viable.
    pub selection_threshold: f64,
    /// Minimum score gap between the top two viable sheets.
    pub min_gap: f64,
    /// How many leading rows are scanned for the header.
    pub header_scan_rows: usize,
    /// Cap on extracted data rows.
    pub max_rows: usize,
    /// Parse this sheet regardless of scoring, when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_override: Option<String>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            formula_policy: FormulaPolicy::Strict,
            selection_threshold: 0.5,
            min_gap: 0.15,
            header_scan_rows: 10,
            max_rows: 10_000,
            sheet_override: None,
        }
    }
}

/// Provenance of the uploaded file, supplied by the caller so the parse
/// itself stays pure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Case the parse belongs to.
    pub case_id: Uuid,
    /// Owning tenant.
    pub tenant_id: String,
    /// When the file was received.
    pub received_at: DateTime<Utc>,
    /// Original filename.
    pub filename: String,
    /// SHA-256 of the uploaded bytes.
    pub sha256: String,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

fn base_meta(workbook: &Workbook, source: &SourceInfo, contains_formulas: bool) -> OrderMeta {
    OrderMeta {
        case_id: source.case_id,
        tenant_id: source.tenant_id.clone(),
        received_at: source.received_at,
        filename: source.filename.clone(),
        sha256: source.sha256.clone(),
        language_hint: None,
        parser_version: PARSER_VERSION.to_string(),
        contains_formulas,
        sheets_processed: workbook.visible_sheets().map(|s| s.name.clone()).collect(),
    }
}

fn blocker_order(meta: OrderMeta, issue: Issue) -> CanonicalOrder {
    let mut order = CanonicalOrder::empty(meta);
    order.issues = vec![issue];
    order
}

/// Parse a workbook into a canonical order.
pub fn parse(workbook: &Workbook, source: &SourceInfo, options: &ParseOptions) -> CanonicalOrder {
    // 1. Formula scan.
    let scan = if options.formula_policy == FormulaPolicy::Allow {
        formula::FormulaScan::default()
    } else {
        formula::scan_formulas(workbook)
    };
    let contains_formulas = scan.found();

    if contains_formulas && options.formula_policy == FormulaPolicy::Strict {
        let meta = base_meta(workbook, source, true);
        return blocker_order(
            meta,
            Issue::new(IssueCode::FormulasBlocked)
                .with_message(format!("{} formula cell(s) found", scan.count))
                .with_evidence(scan.samples),
        );
    }

    let mut issues: Vec<Issue> = Vec::new();
    if contains_formulas && options.formula_policy == FormulaPolicy::Warn {
        issues.push(
            Issue::new(IssueCode::FormulasWarning)
                .with_message(format!("{} formula cell(s) found", scan.count))
                .with_evidence(scan.samples),
        );
    }

    // 2. Sheet selection.
    let mut choice = sheet::select_sheet(workbook, options.selection_threshold, options.min_gap);
    if let Some(requested) = &options.sheet_override {
        if workbook.sheet(requested).is_some() {
            choice.status = SheetSelectionStatus::Selected;
            choice.selected = Some(requested.clone());
        } else {
            issues.push(
                Issue::new(IssueCode::SheetNotFound)
                    .with_message(format!("requested sheet '{requested}' does not exist")),
            );
        }
    }

    let mut meta = base_meta(workbook, source, contains_formulas);

    let selected_name = match (choice.status, choice.selected.clone()) {
        (SheetSelectionStatus::NoViableSheet, _) | (_, None) => {
            let mut order = blocker_order(meta, Issue::new(IssueCode::NoSuitableSheet));
            order.schema_inference.sheet_status = Some(SheetSelectionStatus::NoViableSheet);
            return order;
        }
        (status, Some(name)) => {
            if status == SheetSelectionStatus::Ambiguous {
                issues.push(
                    Issue::new(IssueCode::MultipleSheetCandidates).with_message(format!(
                        "sheets {:?} score within the ambiguity gap; '{name}' was assumed",
                        choice
                            .scores
                            .iter()
                            .filter(|s| s.score >= options.selection_threshold)
                            .map(|s| s.name.as_str())
                            .collect::<Vec<_>>()
                    )),
                );
            }
            name
        }
    };
    let Some(sheet) = workbook.sheet(&selected_name) else {
        return blocker_order(meta, Issue::new(IssueCode::NoSuitableSheet));
    };
    let sheet_confidence = choice
        .scores
        .iter()
        .find(|s| s.name == selected_name)
        .map(|s| s.score)
        .unwrap_or(0.0);

    // 8. Language sniff happens over the selected sheet's text.
    meta.language_hint = number::sniff_language(
        sheet
            .rows()
            .flat_map(|r| r.iter())
            .filter_map(|c| match &c.value {
                CellValue::Text(t) => Some(t.as_str()),
                _ => None,
            }),
    );

    let mut order = CanonicalOrder::empty(meta);
    order.schema_inference.sheet = Some(selected_name.clone());
    order.schema_inference.sheet_status = Some(choice.status);

    // 3. Header detection.
    let header = header::detect_header(sheet, options.header_scan_rows);
    let Some(header) = header else {
        issues.push(Issue::new(IssueCode::NoHeaderRow));
        // Best effort: a customer label can still be found without a table.
        order.customer.input_name = rows::extract(sheet, sheet.n_rows(), &[], 0).customer;
        order.issues = issues;
        order.confidence = ConfidenceReport {
            overall: sheet_confidence / 3.0,
            sheet_selection: sheet_confidence,
            header_detection: 0.0,
            column_mapping: 0.0,
        };
        return order;
    };
    order.schema_inference.header_row = Some(header.row as u32);
    debug!(sheet = %selected_name, row = header.row, score = header.score, "header detected");

    // 4. Schema inference.
    let mappings = schema::infer_mappings(sheet, header.row);
    if !mappings
        .iter()
        .any(|m| m.field == odx_core::CanonicalField::Quantity)
    {
        issues.push(Issue::new(IssueCode::MissingQuantityColumn));
    }

    // 5–6. Extraction and normalisation.
    let extraction = rows::extract(sheet, header.row, &mappings, options.max_rows);
    issues.extend(extraction.issues);

    order.customer.input_name = extraction.customer;
    order.line_items = extraction.line_items;
    order.totals = extraction.totals;
    order.schema_inference.region = extraction.region;
    order.schema_inference.mappings = mappings;

    let mapping_confidence = schema::mapping_confidence(&order.schema_inference.mappings);
    let header_confidence = header.score.min(1.0);
    order.confidence = ConfidenceReport {
        overall: (sheet_confidence + header_confidence + mapping_confidence) / 3.0,
        sheet_selection: sheet_confidence,
        header_detection: header_confidence,
        column_mapping: mapping_confidence,
    };

    // 7. Validation.
    issues.extend(validate::validate_order(&order));
    order.issues = issues;
    order
}

/// Convenience: load `.xlsx` bytes and parse them in one call.
///
/// Loading failures surface as a blocker order (the workbook never became
/// parseable), keeping the activity layer free of special cases.
pub fn parse_xlsx(
    bytes: &[u8],
    source: &SourceInfo,
    options: &ParseOptions,
    limits: &LoadLimits,
) -> CanonicalOrder {
    match load_xlsx(bytes, limits) {
        Ok(workbook) => parse(&workbook, source, options),
        Err(err) => {
            let meta = OrderMeta {
                case_id: source.case_id,
                tenant_id: source.tenant_id.clone(),
                received_at: source.received_at,
                filename: source.filename.clone(),
                sha256: source.sha256.clone(),
                language_hint: None,
                parser_version: PARSER_VERSION.to_string(),
                contains_formulas: false,
                sheets_processed: Vec::new(),
            };
            blocker_order(
                meta,
                Issue::new(IssueCode::NoSuitableSheet).with_message(err.to_string()),
            )
        }
    }
}
