// SPDX-License-Identifier: MIT OR Apache-2.0
//! `.xlsx` loading at the edge.
//!
//! The only place `.xlsx` bytes are touched. Everything after this runs on
//! the in-memory [`Workbook`] model, and loading is bounded: an oversized
//! file or sheet is refused here rather than materialised.

use crate::workbook::{Cell, CellValue, Sheet, Workbook};
use calamine::{Data, Reader, Sheet as SheetMeta, SheetVisible, Xlsx};
use std::io::Cursor;

/// Bounds applied while loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadLimits {
    /// Maximum accepted file size in bytes.
    pub max_file_bytes: usize,
    /// Maximum rows materialised per sheet.
    pub max_rows_per_sheet: usize,
    /// Maximum cells materialised per sheet.
    pub max_cells_per_sheet: usize,
}

impl Default for LoadLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * 1024 * 1024,
            max_rows_per_sheet: 10_000,
            max_cells_per_sheet: 500_000,
        }
    }
}

/// Errors raised while loading a workbook.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The file exceeds the configured size cap.
    #[error("file is {size} bytes, over the {max}-byte cap")]
    FileTooLarge {
        /// Actual size.
        size: usize,
        /// Configured cap.
        max: usize,
    },

    /// One sheet exceeds the configured row or cell cap.
    #[error("sheet '{sheet}' exceeds the supported size ({detail})")]
    SheetTooLarge {
        /// Offending sheet name.
        sheet: String,
        /// Which bound was exceeded.
        detail: String,
    },

    /// The bytes are not a readable OOXML workbook.
    #[error("workbook could not be read")]
    Unreadable(#[source] calamine::XlsxError),
}

/// Load `.xlsx` bytes into the workbook model.
pub fn load_xlsx(bytes: &[u8], limits: &LoadLimits) -> Result<Workbook, LoadError> {
    if bytes.len() > limits.max_file_bytes {
        return Err(LoadError::FileTooLarge {
            size: bytes.len(),
            max: limits.max_file_bytes,
        });
    }

    let mut reader: Xlsx<_> =
        Xlsx::new(Cursor::new(bytes.to_vec())).map_err(LoadError::Unreadable)?;

    let metas: Vec<SheetMeta> = reader.sheets_metadata().to_vec();
    let mut workbook = Workbook::default();

    for meta in metas {
        let hidden = !matches!(meta.visible, SheetVisible::Visible);
        let mut sheet = Sheet::new(&meta.name);
        if hidden {
            sheet = sheet.hidden();
        }

        let range = reader
            .worksheet_range(&meta.name)
            .map_err(LoadError::Unreadable)?;

        if let Some((start_row, start_col)) = range.start() {
            let (n_rows, n_cols) = range.get_size();
            let total_rows = start_row as usize + n_rows;
            if total_rows > limits.max_rows_per_sheet {
                return Err(LoadError::SheetTooLarge {
                    sheet: meta.name.clone(),
                    detail: format!("{total_rows} rows over the {}-row cap", limits.max_rows_per_sheet),
                });
            }
            if total_rows * (start_col as usize + n_cols) > limits.max_cells_per_sheet {
                return Err(LoadError::SheetTooLarge {
                    sheet: meta.name.clone(),
                    detail: format!("over the {}-cell cap", limits.max_cells_per_sheet),
                });
            }

            // Pad up to the range origin so grid coordinates stay absolute
            // and evidence references match what the user sees.
            for _ in 0..start_row {
                sheet.push_row(Vec::new());
            }
            for row in range.rows() {
                let mut cells: Vec<Cell> = Vec::with_capacity(start_col as usize + row.len());
                cells.resize(start_col as usize, Cell::empty());
                for data in row {
                    cells.push(Cell {
                        value: convert(data),
                        formula: None,
                        number_format: None,
                    });
                }
                sheet.push_row(cells);
            }
        }

        attach_formulas(&mut reader, &mut sheet, &meta.name)?;
        workbook.sheets.push(sheet);
    }

    Ok(workbook)
}

fn attach_formulas(
    reader: &mut Xlsx<Cursor<Vec<u8>>>,
    sheet: &mut Sheet,
    name: &str,
) -> Result<(), LoadError> {
    let formulas = reader
        .worksheet_formula(name)
        .map_err(LoadError::Unreadable)?;
    let Some((start_row, start_col)) = formulas.start() else {
        return Ok(());
    };

    // Collect the non-empty formula coordinates first; the grid may need
    // growing when a formula sits outside the value range.
    let mut found: Vec<(usize, usize, String)> = Vec::new();
    for (r, row) in formulas.rows().enumerate() {
        for (c, formula) in row.iter().enumerate() {
            if formula.trim().is_empty() {
                continue;
            }
            found.push((
                start_row as usize + r,
                start_col as usize + c,
                format!("={}", formula.trim_start_matches('=')),
            ));
        }
    }

    for (row, col, formula) in found {
        while sheet.n_rows() <= row {
            sheet.push_row(Vec::new());
        }
        // Rebuild the row with enough width, then set the formula.
        let mut cells: Vec<Cell> = sheet.row(row).map(<[Cell]>::to_vec).unwrap_or_default();
        if cells.len() <= col {
            cells.resize(col + 1, Cell::empty());
        }
        cells[col].formula = Some(formula);
        sheet.replace_row(row, cells);
    }
    Ok(())
}

fn convert(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::Error(e) => CellValue::Text(format!("{e}")),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}
