// SPDX-License-Identifier: MIT OR Apache-2.0
//! Order validation.
//!
//! Runs over a [`CanonicalOrder`], freshly parsed or later patched, and
//! returns the data-quality findings. The case store re-runs this after
//! every patch, so the rules live here once.

use odx_core::{CanonicalOrder, Evidence, Issue, IssueCode, LineItem};

/// Absolute floor of the arithmetic tolerance.
const TOLERANCE_FLOOR: f64 = 0.02;
/// Relative component of the arithmetic tolerance.
const TOLERANCE_RATE: f64 = 0.01;

fn tolerance(total: f64) -> f64 {
    TOLERANCE_FLOOR.max(TOLERANCE_RATE * total.abs())
}

fn line_evidence(line: &LineItem) -> Vec<Evidence> {
    let mut out = Vec::new();
    for sourced in [&line.quantity, &line.unit_price, &line.line_total] {
        if let Some(s) = sourced {
            out.extend_from_slice(s.evidence());
        }
    }
    out
}

/// Validate an order, returning all findings.
///
/// The caller decides what to do with them; this function only observes.
pub fn validate_order(order: &CanonicalOrder) -> Vec<Issue> {
    let mut issues = Vec::new();

    if order.customer.input_name.is_none() {
        issues.push(Issue::new(IssueCode::MissingCustomer).with_fields(vec!["customer".into()]));
    }

    let mut line_sum = 0.0f64;
    let mut has_line_sum = false;

    for line in &order.line_items {
        let path = |field: &str| vec![format!("line_items/{}/{field}", line.row_index)];

        match &line.quantity {
            None => {
                issues.push(
                    Issue::new(IssueCode::MissingQuantity)
                        .with_message(format!("row {} has no quantity", line.source_row))
                        .with_fields(path("quantity")),
                );
            }
            Some(qty) => {
                if *qty.value() < 0.0 {
                    issues.push(
                        Issue::new(IssueCode::NegativeQuantity)
                            .with_message(format!(
                                "row {} has a negative quantity ({})",
                                line.source_row,
                                qty.value()
                            ))
                            .with_fields(path("quantity"))
                            .with_evidence(qty.evidence().to_vec()),
                    );
                }
            }
        }

        if !line.has_item_identifier() {
            issues.push(
                Issue::new(IssueCode::MissingItemIdentifier)
                    .with_message(format!(
                        "row {} carries neither a SKU nor a GTIN",
                        line.source_row
                    ))
                    .with_fields(vec![format!("line_items/{}", line.row_index)]),
            );
        }

        if let (Some(qty), Some(unit), Some(total)) =
            (&line.quantity, &line.unit_price, &line.line_total)
        {
            let expected = qty.value() * unit.value();
            let delta = (expected - total.value()).abs();
            if delta > tolerance(*total.value()) {
                issues.push(
                    Issue::new(IssueCode::ArithmeticMismatch)
                        .with_message(format!(
                            "row {}: {} × {} = {expected}, but the line total reads {}",
                            line.source_row,
                            qty.value(),
                            unit.value(),
                            total.value()
                        ))
                        .with_fields(path("line_total"))
                        .with_evidence(line_evidence(line)),
                );
            }
        }

        if let Some(total) = &line.line_total {
            line_sum += total.value();
            has_line_sum = true;
        } else if let (Some(qty), Some(unit)) = (&line.quantity, &line.unit_price) {
            line_sum += qty.value() * unit.value();
            has_line_sum = true;
        }
    }

    if let Some(totals) = &order.totals {
        if let Some(subtotal) = &totals.subtotal {
            if has_line_sum {
                let delta = (line_sum - subtotal.value()).abs();
                if delta > tolerance(*subtotal.value()) {
                    issues.push(
                        Issue::new(IssueCode::SubtotalMismatch)
                            .with_message(format!(
                                "lines sum to {line_sum}, but the subtotal reads {}",
                                subtotal.value()
                            ))
                            .with_fields(vec!["totals/subtotal".into()])
                            .with_evidence(subtotal.evidence().to_vec()),
                    );
                }
            }
        }
    }

    issues
}
