// SPDX-License-Identifier: MIT OR Apache-2.0
//! Column-mapping inference.
//!
//! Each source column under the header gets ranked candidates from four
//! signals: the bilingual dictionary, edit-distance fuzzy matching on the
//! header, the type of the column body, and the column's position. The
//! best candidate becomes the mapping; runner-ups travel along so the
//! committee and the user can see what else was plausible.

use crate::lexicon::{HEADER_FIELDS, normalize_header, synonyms};
use crate::number::{is_numericish, normalize_gtin};
use crate::workbook::Sheet;
use odx_core::{CanonicalField, ColumnMapping, MappingCandidate, MappingMethod};

/// Fuzzy similarity below which a header candidate is dropped.
const FUZZY_FLOOR: f64 = 0.75;
/// Confidence for an exact dictionary hit.
const DICTIONARY_CONFIDENCE: f64 = 0.95;
/// Share of GTIN-looking body cells needed for a body-type GTIN candidate.
const GTIN_BODY_RATIO: f64 = 0.5;

#[derive(Debug, Clone)]
struct Candidate {
    field: CanonicalField,
    confidence: f64,
    method: MappingMethod,
}

/// Per-column body statistics.
#[derive(Debug, Clone, Copy, Default)]
struct BodyStats {
    numeric: usize,
    text: usize,
    gtin_like: usize,
}

fn body_stats(sheet: &Sheet, header_row: usize, col: usize) -> BodyStats {
    let mut stats = BodyStats::default();
    for row in (header_row + 1)..sheet.n_rows() {
        let Some(cell) = sheet.cell(row, col) else {
            continue;
        };
        if cell.value.is_empty() {
            continue;
        }
        if is_numericish(cell) {
            stats.numeric += 1;
        } else {
            stats.text += 1;
        }
        let digits = normalize_gtin(&cell.value.render());
        if matches!(digits.len(), 8 | 12 | 13 | 14)
            && digits.len() == cell.value.render().trim().len()
        {
            stats.gtin_like += 1;
        }
    }
    stats
}

fn candidates_for_column(
    header: &str,
    stats: BodyStats,
    col: usize,
    numeric_col_rank: Option<usize>,
    last_numeric_col: bool,
) -> Vec<Candidate> {
    let normalized = normalize_header(header);
    let mut out: Vec<Candidate> = Vec::new();

    for &field in HEADER_FIELDS {
        if synonyms(field).contains(&normalized.as_str()) {
            out.push(Candidate {
                field,
                confidence: DICTIONARY_CONFIDENCE,
                method: MappingMethod::Dictionary,
            });
        } else {
            let best = synonyms(field)
                .iter()
                .map(|syn| strsim::normalized_levenshtein(&normalized, syn))
                .fold(0.0f64, f64::max);
            if best >= FUZZY_FLOOR {
                out.push(Candidate {
                    field,
                    confidence: 0.85 * best,
                    method: MappingMethod::Fuzzy,
                });
            }
        }
    }

    // A header that reads "total" over a per-row numeric body is the line
    // total, not the order total.
    if stats.numeric >= 2 {
        if let Some(pos) = out
            .iter()
            .position(|c| c.field == CanonicalField::Total || c.field == CanonicalField::Subtotal)
        {
            let donor_confidence = out[pos].confidence;
            let donor_method = out[pos].method;
            out[pos].confidence = (donor_confidence - 0.15).max(0.0);
            out.push(Candidate {
                field: CanonicalField::LineTotal,
                confidence: donor_confidence,
                method: donor_method,
            });
        }
    }

    // Body-type candidate: a column of GTIN-length digit runs is a GTIN
    // column even under an unrecognised header.
    let body_total = stats.numeric + stats.text;
    if body_total > 0 && stats.gtin_like as f64 / body_total as f64 >= GTIN_BODY_RATIO {
        if !out.iter().any(|c| c.field == CanonicalField::Gtin) {
            out.push(Candidate {
                field: CanonicalField::Gtin,
                confidence: 0.85,
                method: MappingMethod::Fuzzy,
            });
        }
    }

    // Type agreement between the candidate field and the column body.
    // Identifier fields are exempt: GTINs (and numeric-looking SKUs) are
    // digit runs even though the field itself is textual.
    for candidate in &mut out {
        if body_total == 0 || matches!(candidate.field, CanonicalField::Gtin | CanonicalField::Sku)
        {
            continue;
        }
        let mostly_numeric = stats.numeric > stats.text;
        if candidate.field.is_numeric() == mostly_numeric {
            candidate.confidence = (candidate.confidence + 0.05).min(1.0);
        } else {
            candidate.confidence = (candidate.confidence - 0.25).max(0.0);
        }
    }

    // Positional prior.
    for candidate in &mut out {
        let bonus = match candidate.field {
            CanonicalField::Sku | CanonicalField::ProductName if col <= 1 => 0.03,
            CanonicalField::Quantity if numeric_col_rank == Some(0) => 0.03,
            CanonicalField::UnitPrice if numeric_col_rank == Some(1) => 0.03,
            CanonicalField::LineTotal if last_numeric_col => 0.03,
            _ => 0.0,
        };
        candidate.confidence = (candidate.confidence + bonus).min(1.0);
    }

    out.retain(|c| c.confidence > 0.0);
    out.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    out
}

/// Infer the column mappings for the table under the header row.
pub fn infer_mappings(sheet: &Sheet, header_row: usize) -> Vec<ColumnMapping> {
    let Some(headers) = sheet.row(header_row) else {
        return Vec::new();
    };

    // Rank numeric columns left-to-right for the positional prior.
    let numeric_cols: Vec<usize> = (0..headers.len())
        .filter(|&col| {
            let stats = body_stats(sheet, header_row, col);
            stats.numeric > stats.text
        })
        .collect();

    let mut mappings: Vec<ColumnMapping> = Vec::new();
    for (col, cell) in headers.iter().enumerate() {
        if cell.value.is_empty() {
            continue;
        }
        let header = cell.value.render();
        let stats = body_stats(sheet, header_row, col);
        let numeric_col_rank = numeric_cols.iter().position(|&c| c == col);
        let last_numeric_col = numeric_cols.last() == Some(&col) && numeric_cols.len() > 1;

        let candidates =
            candidates_for_column(&header, stats, col, numeric_col_rank, last_numeric_col);
        let Some(best) = candidates.first() else {
            continue;
        };

        mappings.push(ColumnMapping {
            field: best.field,
            source_header: header,
            source_column: col as u32,
            confidence: best.confidence,
            method: best.method,
            candidates: candidates
                .iter()
                .skip(1)
                .take(3)
                .map(|c| MappingCandidate {
                    field: c.field,
                    confidence: c.confidence,
                })
                .collect(),
        });
    }

    dedupe_by_field(mappings)
}

/// Keep the strongest column per canonical field; weaker rivals drop out
/// so extraction reads exactly one column per field.
fn dedupe_by_field(mut mappings: Vec<ColumnMapping>) -> Vec<ColumnMapping> {
    use std::collections::BTreeMap;
    let mut best: BTreeMap<String, (f64, u32)> = BTreeMap::new();
    for m in &mappings {
        let key = m.field.to_string();
        let entry = best.entry(key).or_insert((m.confidence, m.source_column));
        if m.confidence > entry.0 {
            *entry = (m.confidence, m.source_column);
        }
    }
    mappings.retain(|m| best[&m.field.to_string()].1 == m.source_column);
    mappings
}

/// Mean confidence across mappings (0 when none).
pub fn mapping_confidence(mappings: &[ColumnMapping]) -> f64 {
    if mappings.is_empty() {
        return 0.0;
    }
    mappings.iter().map(|m| m.confidence).sum::<f64>() / mappings.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::Cell;

    fn english_sheet() -> Sheet {
        Sheet::from_rows(
            "S",
            vec![
                vec![
                    Cell::text("SKU"),
                    Cell::text("Product"),
                    Cell::text("Qty"),
                    Cell::text("Unit Price"),
                    Cell::text("Total"),
                ],
                vec![
                    Cell::text("WID-01"),
                    Cell::text("Widget"),
                    Cell::number(2.0),
                    Cell::number(5.0),
                    Cell::number(10.0),
                ],
                vec![
                    Cell::text("GAD-02"),
                    Cell::text("Gadget"),
                    Cell::number(1.0),
                    Cell::number(7.0),
                    Cell::number(7.0),
                ],
            ],
        )
    }

    fn field_of(mappings: &[ColumnMapping], col: u32) -> Option<CanonicalField> {
        mappings
            .iter()
            .find(|m| m.source_column == col)
            .map(|m| m.field)
    }

    #[test]
    fn english_headers_map_by_dictionary() {
        let mappings = infer_mappings(&english_sheet(), 0);
        assert_eq!(field_of(&mappings, 0), Some(CanonicalField::Sku));
        assert_eq!(field_of(&mappings, 1), Some(CanonicalField::ProductName));
        assert_eq!(field_of(&mappings, 2), Some(CanonicalField::Quantity));
        assert_eq!(field_of(&mappings, 3), Some(CanonicalField::UnitPrice));
        for col in [0u32, 1, 2, 3] {
            let m = mappings.iter().find(|m| m.source_column == col).unwrap();
            assert!(m.confidence >= 0.8, "col {col}: {}", m.confidence);
        }
    }

    #[test]
    fn total_over_per_row_numbers_becomes_line_total() {
        let mappings = infer_mappings(&english_sheet(), 0);
        assert_eq!(field_of(&mappings, 4), Some(CanonicalField::LineTotal));
    }

    #[test]
    fn farsi_headers_map_by_dictionary() {
        let sheet = Sheet::from_rows(
            "S",
            vec![
                vec![
                    Cell::text("کد کالا"),
                    Cell::text("تعداد"),
                    Cell::text("قیمت واحد"),
                ],
                vec![Cell::text("A-1"), Cell::text("۱۲۰"), Cell::text("۲۵۰۰")],
                vec![Cell::text("B-2"), Cell::text("۵۰"), Cell::text("۳۰۰۰")],
            ],
        );
        let mappings = infer_mappings(&sheet, 0);
        assert_eq!(field_of(&mappings, 0), Some(CanonicalField::Sku));
        assert_eq!(field_of(&mappings, 1), Some(CanonicalField::Quantity));
        assert_eq!(field_of(&mappings, 2), Some(CanonicalField::UnitPrice));
        for m in &mappings {
            assert!(m.confidence >= 0.8, "{}: {}", m.source_header, m.confidence);
            assert_eq!(m.method, MappingMethod::Dictionary);
        }
    }

    #[test]
    fn fuzzy_match_catches_misspelled_header() {
        let sheet = Sheet::from_rows(
            "S",
            vec![
                vec![Cell::text("Quantiy"), Cell::text("Product")],
                vec![Cell::number(3.0), Cell::text("Widget")],
                vec![Cell::number(4.0), Cell::text("Gadget")],
            ],
        );
        let mappings = infer_mappings(&sheet, 0);
        let qty = mappings
            .iter()
            .find(|m| m.field == CanonicalField::Quantity)
            .expect("quantity mapped");
        assert_eq!(qty.method, MappingMethod::Fuzzy);
        assert!(qty.confidence > 0.6);
    }

    #[test]
    fn gtin_body_shape_maps_unlabelled_column() {
        let sheet = Sheet::from_rows(
            "S",
            vec![
                vec![Cell::text("Ref"), Cell::text("Qty")],
                vec![Cell::text("4006381333931"), Cell::number(5.0)],
                vec![Cell::text("96385074"), Cell::number(2.0)],
            ],
        );
        let mappings = infer_mappings(&sheet, 0);
        assert!(
            mappings.iter().any(|m| m.field == CanonicalField::Gtin),
            "{mappings:?}"
        );
    }

    #[test]
    fn unknown_headers_produce_no_mapping() {
        let sheet = Sheet::from_rows(
            "S",
            vec![
                vec![Cell::text("Zebra"), Cell::text("Xylophone")],
                vec![Cell::text("a"), Cell::text("b")],
            ],
        );
        let mappings = infer_mappings(&sheet, 0);
        assert!(mappings.is_empty(), "{mappings:?}");
    }

    #[test]
    fn duplicate_field_keeps_strongest_column() {
        let sheet = Sheet::from_rows(
            "S",
            vec![
                vec![Cell::text("Qty"), Cell::text("Quantity")],
                vec![Cell::number(1.0), Cell::number(2.0)],
                vec![Cell::number(3.0), Cell::number(4.0)],
            ],
        );
        let mappings = infer_mappings(&sheet, 0);
        let qty: Vec<_> = mappings
            .iter()
            .filter(|m| m.field == CanonicalField::Quantity)
            .collect();
        assert_eq!(qty.len(), 1);
    }

    #[test]
    fn runner_ups_are_recorded() {
        let mappings = infer_mappings(&english_sheet(), 0);
        let total = mappings.iter().find(|m| m.source_column == 4).unwrap();
        assert!(
            total
                .candidates
                .iter()
                .any(|c| c.field == CanonicalField::Total),
            "{total:?}"
        );
    }
}
