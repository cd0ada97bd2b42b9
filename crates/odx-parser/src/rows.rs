// SPDX-License-Identifier: MIT OR Apache-2.0
//! Row classification and value extraction.
//!
//! Everything extracted here carries evidence pointing at the exact source
//! cell; a value with no cell behind it simply cannot be produced.

use crate::lexicon::{is_total_keyword, normalize_header, synonyms, total_field};
use crate::number::{
    is_numericish, is_valid_gtin, normalize_gtin, normalize_sku, normalize_text, parse_number,
};
use crate::workbook::{Cell, Sheet};
use odx_core::{
    CanonicalField, ColumnMapping, Evidence, Issue, IssueCode, LineItem, Sourced, TableRegion,
    Totals,
};

/// Everything the extraction stage produced.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Extracted data lines, in source order.
    pub line_items: Vec<LineItem>,
    /// Order-level totals, when any totals row was found.
    pub totals: Option<Totals>,
    /// Customer name, from a mapped column or a pre-header label.
    pub customer: Option<Sourced<String>>,
    /// Findings raised while extracting (GTIN validation).
    pub issues: Vec<Issue>,
    /// The region data rows were read from.
    pub region: Option<TableRegion>,
}

fn evidence_for(sheet: &Sheet, row: usize, col: usize, cell: &Cell) -> Evidence {
    let mut ev = Evidence::new(&sheet.name, sheet.a1(row, col), cell.value.render());
    if let Some(format) = &cell.number_format {
        ev = ev.with_number_format(format.clone());
    }
    ev
}

fn mapped_cell<'a>(
    sheet: &'a Sheet,
    row: usize,
    mappings: &[ColumnMapping],
    field: CanonicalField,
) -> Option<(usize, &'a Cell)> {
    let mapping = mappings.iter().find(|m| m.field == field)?;
    let col = mapping.source_column as usize;
    let cell = sheet.cell(row, col)?;
    if cell.value.is_empty() {
        return None;
    }
    Some((col, cell))
}

/// Classify one row under the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowKind {
    Empty,
    Total,
    Data,
}

fn classify_row(sheet: &Sheet, row: usize, mappings: &[ColumnMapping]) -> RowKind {
    let Some(cells) = sheet.row(row) else {
        return RowKind::Empty;
    };
    if cells.iter().all(|c| c.value.is_empty()) {
        return RowKind::Empty;
    }

    let has_total_keyword = cells.iter().any(|c| {
        !c.value.is_empty()
            && !is_numericish(c)
            && is_total_keyword(&normalize_header(&c.value.render()))
    });
    if has_total_keyword {
        return RowKind::Total;
    }

    let numeric_cells = cells
        .iter()
        .filter(|c| !c.value.is_empty() && is_numericish(c))
        .count();
    let has_identifier = mapped_cell(sheet, row, mappings, CanonicalField::Sku).is_some()
        || mapped_cell(sheet, row, mappings, CanonicalField::ProductName).is_some()
        || mapped_cell(sheet, row, mappings, CanonicalField::Gtin).is_some();
    if numeric_cells >= 2 && !has_identifier {
        return RowKind::Total;
    }

    RowKind::Data
}

fn numeric_field(
    sheet: &Sheet,
    row: usize,
    mappings: &[ColumnMapping],
    field: CanonicalField,
) -> Option<(Sourced<f64>, Option<String>, Evidence)> {
    let (col, cell) = mapped_cell(sheet, row, mappings, field)?;
    let raw = cell.value.render();
    let parsed = match &cell.value {
        crate::workbook::CellValue::Number(n) => Some(crate::number::ParsedNumber {
            value: *n,
            currency: None,
        }),
        _ => parse_number(&raw),
    }?;
    let mut ev = evidence_for(sheet, row, col, cell);
    let rendered = format!("{}", parsed.value);
    if rendered != raw {
        ev = ev.with_display(rendered);
    }
    Some((
        Sourced::new(parsed.value, ev.clone()),
        parsed.currency,
        ev,
    ))
}

fn text_field(
    sheet: &Sheet,
    row: usize,
    mappings: &[ColumnMapping],
    field: CanonicalField,
    normalise: impl Fn(&str) -> String,
) -> Option<Sourced<String>> {
    let (col, cell) = mapped_cell(sheet, row, mappings, field)?;
    let raw = cell.value.render();
    let value = normalise(&raw);
    if value.is_empty() {
        return None;
    }
    Some(Sourced::new(value, evidence_for(sheet, row, col, cell)))
}

fn extract_line(
    sheet: &Sheet,
    row: usize,
    row_index: usize,
    mappings: &[ColumnMapping],
    issues: &mut Vec<Issue>,
) -> LineItem {
    let mut line = LineItem::new(row_index, row as u32 + 1);

    line.sku = text_field(sheet, row, mappings, CanonicalField::Sku, normalize_sku);
    line.product_name = text_field(
        sheet,
        row,
        mappings,
        CanonicalField::ProductName,
        normalize_text,
    );

    if let Some((col, cell)) = mapped_cell(sheet, row, mappings, CanonicalField::Gtin) {
        let digits = normalize_gtin(&cell.value.render());
        if !digits.is_empty() {
            let ev = evidence_for(sheet, row, col, cell);
            if !is_valid_gtin(&digits) {
                issues.push(
                    Issue::new(IssueCode::GtinInvalid)
                        .with_message(format!(
                            "GTIN '{digits}' failed length or check-digit validation"
                        ))
                        .with_fields(vec![format!("line_items/{row_index}/gtin")])
                        .with_evidence(vec![ev.clone()]),
                );
            }
            // The value is retained either way.
            line.gtin = Some(Sourced::new(digits, ev));
        }
    }

    let mut currency: Option<(String, Evidence)> = None;
    if let Some((qty, cur, ev)) = numeric_field(sheet, row, mappings, CanonicalField::Quantity) {
        line.quantity = Some(qty);
        if let Some(code) = cur {
            currency.get_or_insert((code, ev));
        }
    }
    if let Some((price, cur, ev)) = numeric_field(sheet, row, mappings, CanonicalField::UnitPrice) {
        line.unit_price = Some(price);
        if let Some(code) = cur {
            currency.get_or_insert((code, ev));
        }
    }
    if let Some((total, cur, ev)) = numeric_field(sheet, row, mappings, CanonicalField::LineTotal) {
        line.line_total = Some(total);
        if let Some(code) = cur {
            currency.get_or_insert((code, ev));
        }
    }
    if let Some((code, ev)) = currency {
        line.currency = Some(Sourced::new(code, ev));
    }

    line
}

fn extract_totals_row(sheet: &Sheet, row: usize, totals: &mut Totals) {
    let Some(cells) = sheet.row(row) else {
        return;
    };

    // The label names the totals field; the rightmost number is its value.
    let label = cells.iter().enumerate().find_map(|(col, c)| {
        if c.value.is_empty() || is_numericish(c) {
            return None;
        }
        total_field(&normalize_header(&c.value.render())).map(|f| (col, c, f))
    });

    let value = cells
        .iter()
        .enumerate()
        .rev()
        .find(|(_, c)| !c.value.is_empty() && is_numericish(c));

    let (Some((label_col, label_cell, field)), Some((value_col, value_cell))) = (label, value)
    else {
        return;
    };

    let raw = value_cell.value.render();
    let parsed = match &value_cell.value {
        crate::workbook::CellValue::Number(n) => Some(crate::number::ParsedNumber {
            value: *n,
            currency: None,
        }),
        _ => parse_number(&raw),
    };
    let Some(parsed) = parsed else { return };

    let evidence = vec![
        evidence_for(sheet, row, value_col, value_cell),
        evidence_for(sheet, row, label_col, label_cell),
    ];
    let Ok(sourced) = Sourced::with_evidence(parsed.value, evidence.clone()) else {
        return;
    };

    match field {
        CanonicalField::Subtotal => totals.subtotal = Some(sourced),
        CanonicalField::Tax => totals.tax = Some(sourced),
        CanonicalField::Total => totals.grand_total = Some(sourced),
        _ => return,
    }
    if totals.currency.is_none() {
        if let Some(code) = parsed.currency {
            if let Ok(cur) = Sourced::with_evidence(code, evidence) {
                totals.currency = Some(cur);
            }
        }
    }
}

/// Find the customer on a pre-header label row (`Customer: Acme Co.`).
fn pre_header_customer(sheet: &Sheet, header_row: usize) -> Option<Sourced<String>> {
    for row in 0..header_row {
        let cells = sheet.row(row)?;
        for (col, cell) in cells.iter().enumerate() {
            if cell.value.is_empty() || is_numericish(cell) {
                continue;
            }
            let normalized = normalize_header(&cell.value.render());
            if !synonyms(CanonicalField::Customer).contains(&normalized.as_str()) {
                continue;
            }
            // Value is the next populated cell to the right.
            if let Some((vcol, vcell)) = cells
                .iter()
                .enumerate()
                .skip(col + 1)
                .find(|(_, c)| !c.value.is_empty())
            {
                let value = normalize_text(&vcell.value.render());
                if !value.is_empty() {
                    return Some(Sourced::new(value, evidence_for(sheet, row, vcol, vcell)));
                }
            }
        }
    }
    None
}

/// Extract lines, totals, and the customer from the table under the header.
pub fn extract(
    sheet: &Sheet,
    header_row: usize,
    mappings: &[ColumnMapping],
    max_rows: usize,
) -> Extraction {
    let mut out = Extraction::default();

    out.customer = pre_header_customer(sheet, header_row);

    let mut totals = Totals::default();
    let mut row_index = 0usize;
    let first_data_row = header_row + 1;
    let last_row = sheet.n_rows().min(first_data_row + max_rows);

    for row in first_data_row..last_row {
        match classify_row(sheet, row, mappings) {
            RowKind::Empty => {}
            RowKind::Total => extract_totals_row(sheet, row, &mut totals),
            RowKind::Data => {
                let line = extract_line(sheet, row, row_index, mappings, &mut out.issues);

                // A customer column contributes the order-level customer
                // from its first populated row.
                if out.customer.is_none() {
                    out.customer =
                        text_field(sheet, row, mappings, CanonicalField::Customer, normalize_text);
                }

                out.line_items.push(line);
                row_index += 1;
            }
        }
    }

    if !totals.is_empty() {
        out.totals = Some(totals);
    }

    if !out.line_items.is_empty() {
        let start_col = mappings.iter().map(|m| m.source_column).min().unwrap_or(0);
        let end_col = mappings.iter().map(|m| m.source_column).max().unwrap_or(0);
        out.region = Some(TableRegion {
            start_row: first_data_row as u32,
            end_row: out
                .line_items
                .last()
                .map(|l| l.source_row - 1)
                .unwrap_or(first_data_row as u32),
            start_col,
            end_col,
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::infer_mappings;

    fn sheet_en() -> Sheet {
        Sheet::from_rows(
            "Orders",
            vec![
                vec![Cell::text("Customer:"), Cell::text("Acme Co.")],
                vec![
                    Cell::text("SKU"),
                    Cell::text("Product"),
                    Cell::text("Qty"),
                    Cell::text("Unit Price"),
                    Cell::text("Total"),
                ],
                vec![
                    Cell::text("wid-01"),
                    Cell::text("Widget"),
                    Cell::number(2.0),
                    Cell::number(5.0),
                    Cell::number(10.0),
                ],
                vec![],
                vec![
                    Cell::text("gad-02"),
                    Cell::text("Gadget "),
                    Cell::number(1.0),
                    Cell::number(7.5),
                    Cell::number(7.5),
                ],
                vec![
                    Cell::empty(),
                    Cell::text("Subtotal"),
                    Cell::empty(),
                    Cell::empty(),
                    Cell::number(17.5),
                ],
                vec![
                    Cell::empty(),
                    Cell::text("Grand Total"),
                    Cell::empty(),
                    Cell::empty(),
                    Cell::number(17.5),
                ],
            ],
        )
    }

    #[test]
    fn extracts_lines_with_evidence() {
        let sheet = sheet_en();
        let mappings = infer_mappings(&sheet, 1);
        let ex = extract(&sheet, 1, &mappings, 10_000);

        assert_eq!(ex.line_items.len(), 2);
        let first = &ex.line_items[0];
        assert_eq!(first.source_row, 3);
        assert_eq!(first.sku.as_ref().unwrap().value(), "WID-01");
        assert_eq!(
            first.sku.as_ref().unwrap().evidence()[0].cell,
            "A3"
        );
        assert_eq!(*first.quantity.as_ref().unwrap().value(), 2.0);
        assert_eq!(*first.line_total.as_ref().unwrap().value(), 10.0);
    }

    #[test]
    fn blank_rows_are_skipped() {
        let sheet = sheet_en();
        let mappings = infer_mappings(&sheet, 1);
        let ex = extract(&sheet, 1, &mappings, 10_000);
        // Source rows 3 and 5; the blank row 4 vanished without a gap.
        assert_eq!(ex.line_items[1].source_row, 5);
        assert_eq!(ex.line_items[1].row_index, 1);
    }

    #[test]
    fn totals_rows_are_not_lines() {
        let sheet = sheet_en();
        let mappings = infer_mappings(&sheet, 1);
        let ex = extract(&sheet, 1, &mappings, 10_000);
        let totals = ex.totals.expect("totals found");
        assert_eq!(*totals.subtotal.as_ref().unwrap().value(), 17.5);
        assert_eq!(*totals.grand_total.as_ref().unwrap().value(), 17.5);
        assert!(totals.tax.is_none());
    }

    #[test]
    fn pre_header_customer_label_is_found() {
        let sheet = sheet_en();
        let mappings = infer_mappings(&sheet, 1);
        let ex = extract(&sheet, 1, &mappings, 10_000);
        let customer = ex.customer.expect("customer found");
        assert_eq!(customer.value(), "Acme Co.");
        assert_eq!(customer.evidence()[0].cell, "B1");
    }

    #[test]
    fn invalid_gtin_is_kept_with_warning() {
        let sheet = Sheet::from_rows(
            "S",
            vec![
                vec![Cell::text("Barcode"), Cell::text("Qty")],
                vec![Cell::text("4006381333932"), Cell::number(1.0)],
            ],
        );
        let mappings = infer_mappings(&sheet, 0);
        let ex = extract(&sheet, 0, &mappings, 10_000);
        assert_eq!(ex.line_items.len(), 1);
        assert_eq!(
            ex.line_items[0].gtin.as_ref().unwrap().value(),
            "4006381333932"
        );
        assert_eq!(ex.issues.len(), 1);
        assert_eq!(ex.issues[0].code, IssueCode::GtinInvalid);
    }

    #[test]
    fn persian_quantities_normalise() {
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
        let mappings = infer_mappings(&sheet, 0);
        let ex = extract(&sheet, 0, &mappings, 10_000);
        let line = &ex.line_items[0];
        assert_eq!(*line.quantity.as_ref().unwrap().value(), 120.0);
        let ev = &line.quantity.as_ref().unwrap().evidence()[0];
        assert_eq!(ev.raw_value, "۱۲۰");
        assert_eq!(ev.display_value.as_deref(), Some("120"));
    }

    #[test]
    fn row_cap_bounds_extraction() {
        let mut rows = vec![vec![
            Cell::text("SKU"),
            Cell::text("Qty"),
        ]];
        for i in 0..50 {
            rows.push(vec![Cell::text(format!("S-{i}")), Cell::number(1.0)]);
        }
        let sheet = Sheet::from_rows("S", rows);
        let mappings = infer_mappings(&sheet, 0);
        let ex = extract(&sheet, 0, &mappings, 10);
        assert_eq!(ex.line_items.len(), 10);
    }
}
