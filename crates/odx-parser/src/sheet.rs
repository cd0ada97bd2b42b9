// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sheet selection.
//!
//! Each non-hidden sheet is scored in `[0, 1]` on how much it looks like
//! an order table; the scores then decide between a clear selection, an
//! ambiguous suggestion, and a blocker.

use crate::number::is_numericish;
use crate::workbook::{Sheet, Workbook};
use odx_core::SheetSelectionStatus;
use serde::{Deserialize, Serialize};

/// Sweet-spot row count for an order table.
const ROW_SWEET_SPOT: std::ops::RangeInclusive<usize> = 5..=1000;
/// Sweet-spot column count for an order table.
const COL_SWEET_SPOT: std::ops::RangeInclusive<usize> = 3..=20;
/// Density below which the density component contributes nothing.
const DENSITY_GATE: f64 = 0.5;

/// Score breakdown for one sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetScore {
    /// Sheet name.
    pub name: String,
    /// Composite score in `[0, 1]`.
    pub score: f64,
}

/// Result of the sheet-selection stage.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetChoice {
    /// Outcome of the stage.
    pub status: SheetSelectionStatus,
    /// Name of the selected (or suggested) sheet.
    pub selected: Option<String>,
    /// All viable-or-not scores, best first.
    pub scores: Vec<SheetScore>,
}

/// Score one sheet in `[0, 1]`.
pub fn score_sheet(sheet: &Sheet) -> f64 {
    let populated = sheet.populated_cells();
    if populated == 0 {
        return 0.0;
    }

    let mut score = 0.1; // has data

    let grid = sheet.grid_cells().max(1);
    let density = populated as f64 / grid as f64;
    if density >= DENSITY_GATE {
        score += 0.3 * density;
    }

    if ROW_SWEET_SPOT.contains(&sheet.n_rows()) {
        score += 0.2;
    }
    if COL_SWEET_SPOT.contains(&sheet.n_cols()) {
        score += 0.1;
    }

    let (numeric_cols, text_cols) = column_kinds(sheet);
    if numeric_cols > 0 {
        score += 0.2;
    }
    if text_cols > 0 {
        score += 0.1;
    }

    score.min(1.0)
}

/// Count columns that are predominantly numeric / predominantly text.
fn column_kinds(sheet: &Sheet) -> (usize, usize) {
    let mut numeric = 0usize;
    let mut text = 0usize;
    for col in 0..sheet.n_cols() {
        let mut numeric_cells = 0usize;
        let mut text_cells = 0usize;
        for row in 0..sheet.n_rows() {
            let Some(cell) = sheet.cell(row, col) else {
                continue;
            };
            if cell.value.is_empty() {
                continue;
            }
            if is_numericish(cell) {
                numeric_cells += 1;
            } else {
                text_cells += 1;
            }
        }
        if numeric_cells > text_cells && numeric_cells > 0 {
            numeric += 1;
        } else if text_cells > 0 {
            text += 1;
        }
    }
    (numeric, text)
}

/// Select the sheet to parse.
pub fn select_sheet(workbook: &Workbook, threshold: f64, min_gap: f64) -> SheetChoice {
    let mut scores: Vec<SheetScore> = workbook
        .visible_sheets()
        .map(|s| SheetScore {
            name: s.name.clone(),
            score: score_sheet(s),
        })
        .collect();
    scores.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });

    let viable: Vec<&SheetScore> = scores.iter().filter(|s| s.score >= threshold).collect();

    match viable.len() {
        0 => SheetChoice {
            status: SheetSelectionStatus::NoViableSheet,
            selected: None,
            scores,
        },
        1 => SheetChoice {
            status: SheetSelectionStatus::Selected,
            selected: Some(viable[0].name.clone()),
            scores,
        },
        _ => {
            let gap = viable[0].score - viable[1].score;
            let status = if gap < min_gap {
                SheetSelectionStatus::Ambiguous
            } else {
                SheetSelectionStatus::Selected
            };
            SheetChoice {
                status,
                selected: Some(viable[0].name.clone()),
                scores,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::Cell;

    fn order_sheet(name: &str) -> Sheet {
        let mut sheet = Sheet::new(name);
        sheet.push_row(vec![
            Cell::text("SKU"),
            Cell::text("Product"),
            Cell::text("Qty"),
            Cell::text("Price"),
        ]);
        for i in 0..8 {
            sheet.push_row(vec![
                Cell::text(format!("SKU-{i}")),
                Cell::text(format!("Product {i}")),
                Cell::number(i as f64 + 1.0),
                Cell::number(9.99),
            ]);
        }
        sheet
    }

    #[test]
    fn order_table_scores_high() {
        assert!(score_sheet(&order_sheet("Orders")) >= 0.8);
    }

    #[test]
    fn empty_sheet_scores_zero() {
        assert_eq!(score_sheet(&Sheet::new("Empty")), 0.0);
    }

    #[test]
    fn single_viable_sheet_is_selected() {
        let wb = Workbook {
            sheets: vec![order_sheet("Orders"), Sheet::new("Notes")],
        };
        let choice = select_sheet(&wb, 0.5, 0.15);
        assert_eq!(choice.status, SheetSelectionStatus::Selected);
        assert_eq!(choice.selected.as_deref(), Some("Orders"));
    }

    #[test]
    fn hidden_sheets_are_ignored() {
        let wb = Workbook {
            sheets: vec![order_sheet("Hidden").hidden(), order_sheet("Shown")],
        };
        let choice = select_sheet(&wb, 0.5, 0.15);
        assert_eq!(choice.selected.as_deref(), Some("Shown"));
        assert_eq!(choice.scores.len(), 1);
    }

    #[test]
    fn twin_sheets_are_ambiguous() {
        let wb = Workbook {
            sheets: vec![order_sheet("March"), order_sheet("April")],
        };
        let choice = select_sheet(&wb, 0.5, 0.15);
        assert_eq!(choice.status, SheetSelectionStatus::Ambiguous);
        // Deterministic tie-break: alphabetical.
        assert_eq!(choice.selected.as_deref(), Some("April"));
    }

    #[test]
    fn no_viable_sheet() {
        let sparse = Sheet::from_rows(
            "Sparse",
            vec![
                vec![Cell::text("note"), Cell::empty()],
                vec![Cell::empty(), Cell::text("draft")],
            ],
        );
        let wb = Workbook::single(sparse);
        let choice = select_sheet(&wb, 0.5, 0.15);
        assert_eq!(choice.status, SheetSelectionStatus::NoViableSheet);
        assert!(choice.selected.is_none());
    }
}
