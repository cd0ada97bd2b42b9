// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property tests for the parser's evidence and determinism contracts.

use chrono::{DateTime, Utc};
use odx_parser::workbook::{Cell, Sheet, Workbook};
use odx_parser::{ParseOptions, SourceInfo, parse};
use proptest::prelude::*;
use uuid::Uuid;

fn source() -> SourceInfo {
    SourceInfo {
        case_id: Uuid::nil(),
        tenant_id: "t1".into(),
        received_at: DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc),
        filename: "order.xlsx".into(),
        sha256: "00".repeat(32),
    }
}

/// Build an order sheet from (qty, price) pairs, optionally writing the
/// quantities with Persian digits.
fn order_sheet(lines: &[(u32, u32)], persian_digits: bool) -> Sheet {
    let mut rows = vec![
        vec![Cell::text("Customer:"), Cell::text("Acme Co.")],
        vec![
            Cell::text("SKU"),
            Cell::text("Product"),
            Cell::text("Qty"),
            Cell::text("Unit Price"),
        ],
    ];
    for (i, (qty, price)) in lines.iter().enumerate() {
        let qty_cell = if persian_digits {
            Cell::text(
                qty.to_string()
                    .chars()
                    .map(|c| char::from_u32('۰' as u32 + c.to_digit(10).unwrap()).unwrap())
                    .collect::<String>(),
            )
        } else {
            Cell::number(f64::from(*qty))
        };
        rows.push(vec![
            Cell::text(format!("SKU-{i}")),
            Cell::text(format!("Product {i}")),
            qty_cell,
            Cell::number(f64::from(*price)),
        ]);
    }
    Sheet::from_rows("Orders", rows)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every extracted value is backed by evidence whose raw content
    /// normalises to the value itself.
    #[test]
    fn evidence_reflects_source(
        lines in prop::collection::vec((0u32..500, 1u32..10_000), 1..8),
        persian in any::<bool>(),
    ) {
        let wb = Workbook::single(order_sheet(&lines, persian));
        let order = parse(&wb, &source(), &ParseOptions::default());

        prop_assert_eq!(order.line_items.len(), lines.len());
        for (line, (qty, price)) in order.line_items.iter().zip(&lines) {
            let quantity = line.quantity.as_ref().expect("quantity extracted");
            prop_assert_eq!(*quantity.value(), f64::from(*qty));
            prop_assert!(!quantity.evidence().is_empty());
            let raw = &quantity.evidence()[0].raw_value;
            let reparsed = odx_parser::number::parse_number(raw).expect("raw re-parses");
            prop_assert_eq!(reparsed.value, f64::from(*qty));

            let unit = line.unit_price.as_ref().expect("price extracted");
            prop_assert_eq!(*unit.value(), f64::from(*price));
            prop_assert!(!unit.evidence().is_empty());

            let sku = line.sku.as_ref().expect("sku extracted");
            prop_assert!(!sku.evidence().is_empty());
            prop_assert_eq!(
                sku.evidence()[0].raw_value.to_uppercase(),
                sku.value().clone()
            );
        }

        let customer = order.customer.input_name.as_ref().expect("customer");
        prop_assert_eq!(customer.evidence()[0].raw_value.as_str(), "Acme Co.");
    }

    /// Same workbook, same output: byte-identical serialisation.
    #[test]
    fn parse_is_deterministic(
        lines in prop::collection::vec((0u32..500, 1u32..10_000), 1..8),
    ) {
        let wb = Workbook::single(order_sheet(&lines, false));
        let a = parse(&wb, &source(), &ParseOptions::default());
        let b = parse(&wb, &source(), &ParseOptions::default());
        prop_assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
    }

    /// The language hint follows the script of the quantities.
    #[test]
    fn persian_digits_set_the_language_hint(
        lines in prop::collection::vec((1u32..500, 1u32..10_000), 2..6),
    ) {
        let mut sheet = Sheet::from_rows(
            "S",
            vec![vec![
                Cell::text("کد کالا"),
                Cell::text("شرح کالا"),
                Cell::text("تعداد"),
                Cell::text("قیمت واحد"),
            ]],
        );
        for (i, (qty, price)) in lines.iter().enumerate() {
            sheet.push_row(vec![
                Cell::text(format!("K-{i}")),
                Cell::text(format!("کالا {i}")),
                Cell::text(
                    qty.to_string()
                        .chars()
                        .map(|c| char::from_u32('۰' as u32 + c.to_digit(10).unwrap()).unwrap())
                        .collect::<String>(),
                ),
                Cell::number(f64::from(*price)),
            ]);
        }
        let order = parse(
            &Workbook::single(sheet),
            &source(),
            &ParseOptions::default(),
        );
        prop_assert_eq!(order.meta.language_hint, Some(odx_core::LanguageHint::Fa));
        for (line, (qty, _)) in order.line_items.iter().zip(&lines) {
            prop_assert_eq!(*line.quantity.as_ref().unwrap().value(), f64::from(*qty));
        }
    }
}
