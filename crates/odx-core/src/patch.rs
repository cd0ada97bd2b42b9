// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structured patches over a canonical order.
//!
//! Human corrections arrive as add/replace/remove/test operations at
//! slash-separated field paths. Only the editable regions of the order can
//! be touched: `customer`, `line_items`, and `totals`. Parser-owned regions
//! (`meta`, `schema_inference`, `confidence`, `issues`) are rejected.
//!
//! Application round-trips through the order's JSON form and then
//! re-deserializes, so structural invariants (including non-empty evidence
//! lists) survive any sequence of operations.

use crate::order::CanonicalOrder;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field-path roots a patch may touch.
const EDITABLE_ROOTS: &[&str] = &["customer", "line_items", "totals"];

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// One patch operation at a slash-separated field path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    /// Insert a value at the path. For arrays, the final token may be an
    /// index or `-` to append.
    Add {
        /// Target field path.
        path: String,
        /// Value to insert.
        value: Value,
    },
    /// Replace the value at the path. The path must exist.
    Replace {
        /// Target field path.
        path: String,
        /// Replacement value.
        value: Value,
    },
    /// Remove the value at the path. The path must exist.
    Remove {
        /// Target field path.
        path: String,
    },
    /// Assert the value at the path equals the given value.
    Test {
        /// Target field path.
        path: String,
        /// Expected value.
        value: Value,
    },
}

impl PatchOp {
    /// The path this operation targets.
    pub fn path(&self) -> &str {
        match self {
            Self::Add { path, .. }
            | Self::Replace { path, .. }
            | Self::Remove { path }
            | Self::Test { path, .. } => path,
        }
    }
}

/// Errors raised while applying a patch.
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// The path is empty or starts outside the editable regions.
    #[error("path '{path}' is not editable")]
    NotEditable {
        /// The offending path.
        path: String,
    },

    /// The path does not resolve to an existing location.
    #[error("path '{path}' does not exist")]
    NoSuchPath {
        /// The offending path.
        path: String,
    },

    /// An array segment was not a valid index.
    #[error("path '{path}' has an invalid array index '{segment}'")]
    BadIndex {
        /// The offending path.
        path: String,
        /// The segment that failed to parse.
        segment: String,
    },

    /// A `test` operation found a different value.
    #[error("test failed at '{path}'")]
    TestFailed {
        /// The offending path.
        path: String,
    },

    /// The patched document no longer deserializes as a canonical order.
    #[error("patched order is structurally invalid: {reason}")]
    InvalidResult {
        /// Serde's explanation.
        reason: String,
    },
}

/// `true` if the path starts inside an editable region.
pub fn is_editable_path(path: &str) -> bool {
    path.split('/')
        .next()
        .is_some_and(|root| EDITABLE_ROOTS.contains(&root))
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// Apply a sequence of operations to an order, returning the patched copy.
///
/// Operations apply in order; the first failure aborts the whole patch and
/// the original order is left untouched.
pub fn apply_patch(order: &CanonicalOrder, ops: &[PatchOp]) -> Result<CanonicalOrder, PatchError> {
    let mut doc = serde_json::to_value(order).map_err(|e| PatchError::InvalidResult {
        reason: e.to_string(),
    })?;

    for op in ops {
        if !is_editable_path(op.path()) {
            return Err(PatchError::NotEditable {
                path: op.path().to_string(),
            });
        }
        apply_one(&mut doc, op)?;
    }

    serde_json::from_value(doc).map_err(|e| PatchError::InvalidResult {
        reason: e.to_string(),
    })
}

fn apply_one(doc: &mut Value, op: &PatchOp) -> Result<(), PatchError> {
    match op {
        PatchOp::Add { path, value } => {
            let (parent, last) = resolve_parent(doc, path)?;
            match parent {
                Value::Object(map) => {
                    map.insert(last.to_string(), value.clone());
                    Ok(())
                }
                Value::Array(items) => {
                    if last == "-" {
                        items.push(value.clone());
                        return Ok(());
                    }
                    let idx = parse_index(path, last)?;
                    if idx > items.len() {
                        return Err(PatchError::NoSuchPath { path: path.clone() });
                    }
                    items.insert(idx, value.clone());
                    Ok(())
                }
                _ => Err(PatchError::NoSuchPath { path: path.clone() }),
            }
        }
        PatchOp::Replace { path, value } => {
            let slot = resolve_existing(doc, path)?;
            *slot = value.clone();
            Ok(())
        }
        PatchOp::Remove { path } => {
            let (parent, last) = resolve_parent(doc, path)?;
            match parent {
                Value::Object(map) => {
                    map.remove(last)
                        .ok_or_else(|| PatchError::NoSuchPath { path: path.clone() })?;
                    Ok(())
                }
                Value::Array(items) => {
                    let idx = parse_index(path, last)?;
                    if idx >= items.len() {
                        return Err(PatchError::NoSuchPath { path: path.clone() });
                    }
                    items.remove(idx);
                    Ok(())
                }
                _ => Err(PatchError::NoSuchPath { path: path.clone() }),
            }
        }
        PatchOp::Test { path, value } => {
            let slot = resolve_existing(doc, path)?;
            if slot == value {
                Ok(())
            } else {
                Err(PatchError::TestFailed { path: path.clone() })
            }
        }
    }
}

/// Navigate to the parent container of the path, returning it with the
/// final segment.
fn resolve_parent<'a>(
    doc: &'a mut Value,
    path: &'a str,
) -> Result<(&'a mut Value, &'a str), PatchError> {
    let mut segments: Vec<&str> = path.split('/').collect();
    let last = segments.pop().filter(|s| !s.is_empty()).ok_or_else(|| {
        PatchError::NoSuchPath {
            path: path.to_string(),
        }
    })?;

    let mut current = doc;
    for segment in segments {
        current = step(current, path, segment)?;
    }
    Ok((current, last))
}

/// Navigate to an existing value at the path.
fn resolve_existing<'a>(doc: &'a mut Value, path: &str) -> Result<&'a mut Value, PatchError> {
    let mut current = doc;
    for segment in path.split('/') {
        current = step(current, path, segment)?;
    }
    Ok(current)
}

fn step<'a>(current: &'a mut Value, path: &str, segment: &str) -> Result<&'a mut Value, PatchError> {
    match current {
        Value::Object(map) => map
            .get_mut(segment)
            .ok_or_else(|| PatchError::NoSuchPath {
                path: path.to_string(),
            }),
        Value::Array(items) => {
            let idx = parse_index(path, segment)?;
            items.get_mut(idx).ok_or_else(|| PatchError::NoSuchPath {
                path: path.to_string(),
            })
        }
        _ => Err(PatchError::NoSuchPath {
            path: path.to_string(),
        }),
    }
}

fn parse_index(path: &str, segment: &str) -> Result<usize, PatchError> {
    segment.parse().map_err(|_| PatchError::BadIndex {
        path: path.to_string(),
        segment: segment.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{Evidence, Sourced};
    use crate::order::{CanonicalOrder, LineItem, OrderMeta};
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use uuid::Uuid;

    fn order() -> CanonicalOrder {
        let meta = OrderMeta {
            case_id: Uuid::nil(),
            tenant_id: "t1".into(),
            received_at: DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            filename: "order.xlsx".into(),
            sha256: "00".repeat(32),
            language_hint: None,
            parser_version: "test".into(),
            contains_formulas: false,
            sheets_processed: vec!["Sheet1".into()],
        };
        let mut order = CanonicalOrder::empty(meta);
        order.customer.input_name = Some(Sourced::new(
            "Acme".to_string(),
            Evidence::new("Sheet1", "B1", "Acme"),
        ));
        let mut line = LineItem::new(0, 3);
        line.quantity = Some(Sourced::new(5.0, Evidence::new("Sheet1", "C3", "5")));
        order.line_items.push(line);
        order
    }

    #[test]
    fn replace_customer_resolution() {
        let patched = apply_patch(
            &order(),
            &[
                PatchOp::Replace {
                    path: "customer/resolution".into(),
                    value: json!("resolved"),
                },
                PatchOp::Add {
                    path: "customer/resolved_id".into(),
                    value: json!("cust-42"),
                },
            ],
        )
        .unwrap();
        assert_eq!(patched.customer.resolved_id.as_deref(), Some("cust-42"));
    }

    #[test]
    fn meta_is_not_editable() {
        let err = apply_patch(
            &order(),
            &[PatchOp::Replace {
                path: "meta/filename".into(),
                value: json!("evil.xlsx"),
            }],
        )
        .unwrap_err();
        assert!(matches!(err, PatchError::NotEditable { .. }));
    }

    #[test]
    fn issues_are_not_editable() {
        let err = apply_patch(&order(), &[PatchOp::Remove { path: "issues/0".into() }]).unwrap_err();
        assert!(matches!(err, PatchError::NotEditable { .. }));
    }

    #[test]
    fn test_op_guards_application() {
        let err = apply_patch(
            &order(),
            &[PatchOp::Test {
                path: "customer/resolution".into(),
                value: json!("resolved"),
            }],
        )
        .unwrap_err();
        assert!(matches!(err, PatchError::TestFailed { .. }));
    }

    #[test]
    fn apply_then_inverse_restores_original() {
        let original = order();
        let doc = serde_json::to_value(&original).unwrap();
        let before = doc["line_items"][0]["quantity"]["value"].clone();

        let patched = apply_patch(
            &original,
            &[PatchOp::Replace {
                path: "line_items/0/quantity/value".into(),
                value: json!(9.0),
            }],
        )
        .unwrap();
        assert_eq!(*patched.line_items[0].quantity.as_ref().unwrap().value(), 9.0);

        let restored = apply_patch(
            &patched,
            &[PatchOp::Replace {
                path: "line_items/0/quantity/value".into(),
                value: before,
            }],
        )
        .unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn add_appends_to_line_items() {
        let extra = serde_json::to_value(LineItem::new(1, 4)).unwrap();
        let patched = apply_patch(
            &order(),
            &[PatchOp::Add {
                path: "line_items/-".into(),
                value: extra,
            }],
        )
        .unwrap();
        assert_eq!(patched.line_items.len(), 2);
    }

    #[test]
    fn structurally_invalid_result_is_rejected() {
        // Stripping the evidence list from a sourced value must not survive.
        let err = apply_patch(
            &order(),
            &[PatchOp::Replace {
                path: "line_items/0/quantity/evidence".into(),
                value: json!([]),
            }],
        )
        .unwrap_err();
        assert!(matches!(err, PatchError::InvalidResult { .. }));
    }

    #[test]
    fn remove_missing_path_errors() {
        let err = apply_patch(
            &order(),
            &[PatchOp::Remove {
                path: "totals/subtotal".into(),
            }],
        )
        .unwrap_err();
        assert!(matches!(err, PatchError::NoSuchPath { .. }));
    }
}
