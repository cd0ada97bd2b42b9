// SPDX-License-Identifier: MIT OR Apache-2.0
//! Evidence cells and evidence-carrying values.
//!
//! An [`Evidence`] is a pointer back to the exact spreadsheet cell that
//! justifies an extracted value. [`Sourced<T>`] pairs a value with a
//! non-empty evidence list; the pairing is enforced at construction and at
//! deserialization, so an unevidenced value is unrepresentable.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// A1 notation
// ---------------------------------------------------------------------------

/// Render a zero-based column index as a spreadsheet column label
/// (`0 → "A"`, `25 → "Z"`, `26 → "AA"`).
pub fn column_label(col: u32) -> String {
    let mut n = col;
    let mut out = Vec::new();
    loop {
        out.push(b'A' + (n % 26) as u8);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Render a zero-based column index and a one-based row number in A1
/// notation (`a1(0, 1) → "A1"`).
pub fn a1(col: u32, row: u32) -> String {
    format!("{}{row}", column_label(col))
}

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

/// A pointer to the source cell that justifies an extracted value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Evidence {
    /// Sheet name the cell belongs to.
    pub sheet: String,
    /// Cell reference in A1 notation (e.g. `"B12"`).
    pub cell: String,
    /// The raw cell content exactly as read from the workbook.
    pub raw_value: String,
    /// The rendered value, when it differs from the raw content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_value: Option<String>,
    /// The cell's number-format string, when one was set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_format: Option<String>,
}

impl Evidence {
    /// Create evidence for a cell with no display value or number format.
    pub fn new(
        sheet: impl Into<String>,
        cell: impl Into<String>,
        raw_value: impl Into<String>,
    ) -> Self {
        Self {
            sheet: sheet.into(),
            cell: cell.into(),
            raw_value: raw_value.into(),
            display_value: None,
            number_format: None,
        }
    }

    /// Attach a display value.
    #[must_use]
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display_value = Some(display.into());
        self
    }

    /// Attach a number-format string.
    #[must_use]
    pub fn with_number_format(mut self, format: impl Into<String>) -> Self {
        self.number_format = Some(format.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Sourced values
// ---------------------------------------------------------------------------

/// Error raised when an evidence invariant would be violated.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EvidenceError {
    /// A value was presented without any evidence cell.
    #[error("value has no evidence cell")]
    Missing,
}

/// A value paired with the non-empty list of cells it was extracted from.
///
/// The constructor takes at least one [`Evidence`], and deserialization
/// rejects an empty evidence list, so every `Sourced` value in the system
/// is grounded in the source workbook.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct Sourced<T> {
    value: T,
    evidence: Vec<Evidence>,
}

impl<T> Sourced<T> {
    /// Pair a value with a single evidence cell.
    pub fn new(value: T, evidence: Evidence) -> Self {
        Self {
            value,
            evidence: vec![evidence],
        }
    }

    /// Pair a value with several evidence cells. Fails on an empty list.
    pub fn with_evidence(value: T, evidence: Vec<Evidence>) -> Result<Self, EvidenceError> {
        if evidence.is_empty() {
            return Err(EvidenceError::Missing);
        }
        Ok(Self { value, evidence })
    }

    /// The extracted value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// The cells this value was extracted from (never empty).
    pub fn evidence(&self) -> &[Evidence] {
        &self.evidence
    }

    /// Consume, returning the value.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Replace the value, keeping the evidence list.
    #[must_use]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Sourced<U> {
        Sourced {
            value: f(self.value),
            evidence: self.evidence,
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Sourced<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Wire<T> {
            value: T,
            evidence: Vec<Evidence>,
        }
        let wire = Wire::deserialize(deserializer)?;
        Sourced::with_evidence(wire.value, wire.evidence)
            .map_err(|_| serde::de::Error::custom("sourced value has an empty evidence list"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_labels() {
        assert_eq!(column_label(0), "A");
        assert_eq!(column_label(25), "Z");
        assert_eq!(column_label(26), "AA");
        assert_eq!(column_label(27), "AB");
        assert_eq!(column_label(51), "AZ");
        assert_eq!(column_label(52), "BA");
        assert_eq!(column_label(701), "ZZ");
        assert_eq!(column_label(702), "AAA");
    }

    #[test]
    fn a1_combines_label_and_row() {
        assert_eq!(a1(0, 1), "A1");
        assert_eq!(a1(1, 12), "B12");
        assert_eq!(a1(26, 3), "AA3");
    }

    #[test]
    fn sourced_requires_evidence() {
        let err = Sourced::with_evidence(42u32, vec![]).unwrap_err();
        assert_eq!(err, EvidenceError::Missing);
    }

    #[test]
    fn sourced_serde_roundtrip() {
        let v = Sourced::new(120.0f64, Evidence::new("Sheet1", "C4", "۱۲۰"));
        let json = serde_json::to_string(&v).unwrap();
        let back: Sourced<f64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn sourced_rejects_empty_evidence_on_deserialize() {
        let json = r#"{"value": 1.0, "evidence": []}"#;
        let res: Result<Sourced<f64>, _> = serde_json::from_str(json);
        assert!(res.is_err());
    }

    #[test]
    fn evidence_omits_absent_optionals() {
        let e = Evidence::new("Sheet1", "A1", "Acme Co.");
        let json = serde_json::to_value(&e).unwrap();
        assert!(json.get("display_value").is_none());
        assert!(json.get("number_format").is_none());
    }
}
