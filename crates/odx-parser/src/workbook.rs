// SPDX-License-Identifier: MIT OR Apache-2.0
//! The in-memory workbook model the parse pipeline runs over.
//!
//! The pipeline never touches `.xlsx` bytes directly: the loader in
//! [`crate::xlsx`] produces a [`Workbook`], and tests build workbooks in
//! code. Grids are ragged; out-of-range lookups read as empty.

use odx_core::a1;
use serde::{Deserialize, Serialize};

/// A single cell's content.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellValue {
    /// No content.
    #[default]
    Empty,
    /// Text content.
    Text(String),
    /// Numeric content.
    Number(f64),
    /// Boolean content.
    Bool(bool),
}

impl CellValue {
    /// `true` when the cell has no content.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(t) => t.trim().is_empty(),
            _ => false,
        }
    }

    /// Render the content the way it would appear in the sheet.
    pub fn render(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(t) => t.clone(),
            Self::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            Self::Bool(b) => b.to_string(),
        }
    }
}

/// A cell with its formula and formatting metadata.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Cell {
    /// The cell's value.
    pub value: CellValue,
    /// The cell's formula text, when the cell is formula-driven.
    pub formula: Option<String>,
    /// The cell's number-format string, when one was set.
    pub number_format: Option<String>,
}

impl Cell {
    /// A plain text cell.
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            value: CellValue::Text(value.into()),
            ..Self::default()
        }
    }

    /// A plain numeric cell.
    pub fn number(value: f64) -> Self {
        Self {
            value: CellValue::Number(value),
            ..Self::default()
        }
    }

    /// An empty cell.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A formula cell with its computed value.
    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    /// `true` when the cell carries a formula (either a formula property or
    /// text starting with `=`).
    pub fn has_formula(&self) -> bool {
        if self.formula.as_deref().is_some_and(|f| !f.trim().is_empty()) {
            return true;
        }
        matches!(&self.value, CellValue::Text(t) if t.trim_start().starts_with('='))
    }
}

/// One sheet: a named, possibly hidden, ragged grid of cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    /// Sheet name.
    pub name: String,
    /// `true` when the sheet is hidden in the workbook.
    pub hidden: bool,
    rows: Vec<Vec<Cell>>,
}

impl Sheet {
    /// An empty visible sheet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hidden: false,
            rows: Vec::new(),
        }
    }

    /// A visible sheet from a row-major grid.
    pub fn from_rows(name: impl Into<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            name: name.into(),
            hidden: false,
            rows,
        }
    }

    /// Mark the sheet hidden.
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Append a row.
    pub fn push_row(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }

    /// Replace the row at the given index, growing the grid if needed.
    pub fn replace_row(&mut self, row: usize, cells: Vec<Cell>) {
        while self.rows.len() <= row {
            self.rows.push(Vec::new());
        }
        self.rows[row] = cells;
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Widest row length.
    pub fn n_cols(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Cell at (row, col), both zero-based. Out-of-range reads are `None`.
    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// The row at the given index, if present.
    pub fn row(&self, row: usize) -> Option<&[Cell]> {
        self.rows.get(row).map(Vec::as_slice)
    }

    /// Iterate rows in order.
    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.rows.iter().map(Vec::as_slice)
    }

    /// Count of non-empty cells.
    pub fn populated_cells(&self) -> usize {
        self.rows
            .iter()
            .flat_map(|r| r.iter())
            .filter(|c| !c.value.is_empty())
            .count()
    }

    /// Total cell slots in the grid (rows × widest row).
    pub fn grid_cells(&self) -> usize {
        self.n_rows() * self.n_cols()
    }

    /// A1 reference for (row, col), both zero-based.
    pub fn a1(&self, row: usize, col: usize) -> String {
        a1(col as u32, row as u32 + 1)
    }
}

/// A loaded workbook.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Workbook {
    /// Sheets in workbook order.
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    /// A workbook holding a single sheet.
    pub fn single(sheet: Sheet) -> Self {
        Self {
            sheets: vec![sheet],
        }
    }

    /// Sheets that are not hidden, in workbook order.
    pub fn visible_sheets(&self) -> impl Iterator<Item = &Sheet> {
        self.sheets.iter().filter(|s| !s.hidden)
    }

    /// Look up a sheet by name.
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ragged_grid_reads_out_of_range_as_none() {
        let sheet = Sheet::from_rows(
            "S",
            vec![vec![Cell::text("a")], vec![Cell::text("b"), Cell::number(1.0)]],
        );
        assert_eq!(sheet.n_rows(), 2);
        assert_eq!(sheet.n_cols(), 2);
        assert!(sheet.cell(0, 1).is_none());
        assert!(sheet.cell(5, 0).is_none());
    }

    #[test]
    fn formula_detection_covers_property_and_text() {
        assert!(Cell::number(10.0).with_formula("=A2*C2").has_formula());
        assert!(Cell::text("=SUM(A1:A5)").has_formula());
        assert!(!Cell::text("net = gross - tax").has_formula());
        assert!(!Cell::number(10.0).has_formula());
    }

    #[test]
    fn whitespace_only_text_counts_as_empty() {
        assert!(CellValue::Text("   ".into()).is_empty());
        assert!(!CellValue::Text("x".into()).is_empty());
        assert!(!CellValue::Number(0.0).is_empty());
    }

    #[test]
    fn render_drops_trailing_zero_fraction() {
        assert_eq!(CellValue::Number(120.0).render(), "120");
        assert_eq!(CellValue::Number(12.5).render(), "12.5");
    }

    #[test]
    fn a1_reference_is_one_based() {
        let sheet = Sheet::new("S");
        assert_eq!(sheet.a1(0, 0), "A1");
        assert_eq!(sheet.a1(2, 1), "B3");
    }

    #[test]
    fn visible_sheets_skip_hidden() {
        let wb = Workbook {
            sheets: vec![Sheet::new("shown"), Sheet::new("secret").hidden()],
        };
        let names: Vec<_> = wb.visible_sheets().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["shown"]);
    }
}
