// SPDX-License-Identifier: MIT OR Apache-2.0
//! Header-row detection.

use crate::lexicon::{is_header_keyword, normalize_header};
use crate::number::is_numericish;
use crate::workbook::Sheet;

/// Minimum score for a row to be accepted as the header.
const ACCEPT_THRESHOLD: f64 = 0.3;

/// A scored header candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderChoice {
    /// Zero-based row index of the header.
    pub row: usize,
    /// The candidate's score.
    pub score: f64,
    /// How many cells matched the header lexicon.
    pub keyword_hits: usize,
}

/// Score a candidate header row, also counting lexicon hits.
fn score_row(sheet: &Sheet, row: usize) -> (f64, usize) {
    let Some(cells) = sheet.row(row) else {
        return (0.0, 0);
    };
    let populated: Vec<&crate::workbook::Cell> =
        cells.iter().filter(|c| !c.value.is_empty()).collect();
    if populated.is_empty() {
        return (0.0, 0);
    }

    let texts: Vec<String> = populated
        .iter()
        .filter(|c| !is_numericish(c))
        .map(|c| normalize_header(&c.value.render()))
        .filter(|t| !t.is_empty())
        .collect();
    // A header needs words; a purely numeric row can never be one.
    if texts.is_empty() {
        return (0.0, 0);
    }

    let mut score: f64 = 0.0;
    if row == 0 {
        score += 0.3;
    } else if row == 1 || row == 2 {
        score += 0.2;
    }

    let distinct: std::collections::BTreeSet<&str> = texts.iter().map(String::as_str).collect();
    if distinct.len() as f64 / texts.len() as f64 > 0.8 {
        score += 0.3;
    }

    if texts.len() >= 3 {
        score += 0.2;
    }

    let this_row_numeric = populated.iter().any(|c| is_numericish(c));
    let next_row_numeric = sheet
        .row(row + 1)
        .is_some_and(|r| r.iter().any(|c| !c.value.is_empty() && is_numericish(c)));
    if next_row_numeric && !this_row_numeric {
        score += 0.2;
    }

    let keyword_hits = texts.iter().filter(|t| is_header_keyword(t)).count();
    if keyword_hits >= 2 {
        score += 0.2;
    } else if keyword_hits == 1 {
        score += 0.1;
    }

    (score.min(1.0), keyword_hits)
}

/// Find the header row among the first `scan_rows` rows.
///
/// Ties go to the row with more lexicon hits: a `Customer: ...` label row
/// above the table can tie the real header on raw score alone. Returns
/// `None` when nothing reaches the acceptance threshold; the caller turns
/// that into a `NO_HEADER_ROW` issue.
pub fn detect_header(sheet: &Sheet, scan_rows: usize) -> Option<HeaderChoice> {
    let mut best: Option<HeaderChoice> = None;
    for row in 0..sheet.n_rows().min(scan_rows) {
        let (score, keyword_hits) = score_row(sheet, row);
        let better = match &best {
            Some(b) => score > b.score || (score == b.score && keyword_hits > b.keyword_hits),
            None => true,
        };
        if better {
            best = Some(HeaderChoice {
                row,
                score,
                keyword_hits,
            });
        }
    }
    best.filter(|b| b.score >= ACCEPT_THRESHOLD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::Cell;

    #[test]
    fn first_row_header_is_found() {
        let sheet = Sheet::from_rows(
            "S",
            vec![
                vec![
                    Cell::text("SKU"),
                    Cell::text("Product"),
                    Cell::text("Qty"),
                    Cell::text("Price"),
                ],
                vec![
                    Cell::text("A-1"),
                    Cell::text("Widget"),
                    Cell::number(2.0),
                    Cell::number(5.0),
                ],
            ],
        );
        let choice = detect_header(&sheet, 10).unwrap();
        assert_eq!(choice.row, 0);
        assert!(choice.score >= 0.8, "score = {}", choice.score);
    }

    #[test]
    fn header_below_a_title_row_is_found() {
        let sheet = Sheet::from_rows(
            "S",
            vec![
                vec![Cell::text("March order")],
                vec![
                    Cell::text("Item Code"),
                    Cell::text("Description"),
                    Cell::text("Quantity"),
                ],
                vec![Cell::text("A-1"), Cell::text("Widget"), Cell::number(2.0)],
            ],
        );
        let choice = detect_header(&sheet, 10).unwrap();
        assert_eq!(choice.row, 1);
    }

    #[test]
    fn farsi_header_is_found() {
        let sheet = Sheet::from_rows(
            "S",
            vec![
                vec![
                    Cell::text("کد کالا"),
                    Cell::text("تعداد"),
                    Cell::text("قیمت واحد"),
                ],
                vec![Cell::text("A-1"), Cell::text("۱۲۰"), Cell::text("۲۵۰۰")],
            ],
        );
        let choice = detect_header(&sheet, 10).unwrap();
        assert_eq!(choice.row, 0);
    }

    #[test]
    fn all_numeric_sheet_has_no_header() {
        let sheet = Sheet::from_rows(
            "S",
            vec![
                vec![Cell::number(1.0), Cell::number(2.0)],
                vec![Cell::number(3.0), Cell::number(4.0)],
            ],
        );
        assert!(detect_header(&sheet, 10).is_none());
    }

    #[test]
    fn scan_window_is_respected() {
        let mut rows = vec![vec![Cell::number(9.0)]; 12];
        rows.push(vec![
            Cell::text("SKU"),
            Cell::text("Qty"),
            Cell::text("Price"),
        ]);
        let sheet = Sheet::from_rows("S", rows);
        assert!(detect_header(&sheet, 10).is_none());
    }
}
