// SPDX-License-Identifier: MIT OR Apache-2.0
//! Formula scanning.
//!
//! Walks every cell of every sheet looking for a formula property or text
//! starting with `=`. What happens on a hit is the caller's policy.

use crate::workbook::Workbook;
use odx_core::Evidence;

/// How many offending cells are reported as evidence.
const SAMPLE_LIMIT: usize = 5;

/// Result of the formula scan.
#[derive(Debug, Clone, Default)]
pub struct FormulaScan {
    /// Number of formula cells found.
    pub count: usize,
    /// Up to the first few offending cells, as evidence.
    pub samples: Vec<Evidence>,
}

impl FormulaScan {
    /// `true` when at least one formula was found.
    pub fn found(&self) -> bool {
        self.count > 0
    }
}

/// Scan the whole workbook for formulas.
pub fn scan_formulas(workbook: &Workbook) -> FormulaScan {
    let mut scan = FormulaScan::default();
    for sheet in &workbook.sheets {
        for (row_idx, row) in sheet.rows().enumerate() {
            for (col_idx, cell) in row.iter().enumerate() {
                if !cell.has_formula() {
                    continue;
                }
                scan.count += 1;
                if scan.samples.len() < SAMPLE_LIMIT {
                    let raw = cell
                        .formula
                        .clone()
                        .unwrap_or_else(|| cell.value.render());
                    scan.samples.push(Evidence::new(
                        &sheet.name,
                        sheet.a1(row_idx, col_idx),
                        raw,
                    ));
                }
            }
        }
    }
    scan
}
