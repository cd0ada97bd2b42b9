// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deterministic order fingerprints.
//!
//! A fingerprint identifies a semantically equivalent order: the same
//! customer, the same (item, quantity, rate) multiset, and the same UTC day
//! bucket hash to the same value regardless of line order. It is the row
//! key that makes draft creation idempotent.

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// One resolved line as it enters the fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FingerprintLine {
    /// Accounting-system item id.
    pub item_id: String,
    /// Ordered quantity.
    pub quantity: f64,
    /// Rate the draft will carry.
    pub rate: f64,
}

/// Compute the fingerprint of a resolved order.
///
/// Lines are sorted canonically before hashing, so permuting them does not
/// change the result; changing any of customer, item, quantity, rate, or
/// the date bucket does.
pub fn order_fingerprint(
    customer_id: &str,
    lines: &[FingerprintLine],
    date_bucket: NaiveDate,
) -> String {
    let mut canon: Vec<String> = lines
        .iter()
        .map(|l| format!("{}|{:.4}|{:.4}", l.item_id, l.quantity, l.rate))
        .collect();
    canon.sort();

    let mut hasher = Sha256::new();
    hasher.update(customer_id.as_bytes());
    for line in &canon {
        hasher.update(b"\x1f");
        hasher.update(line.as_bytes());
    }
    hasher.update(b"\x1f");
    hasher.update(date_bucket.format("%Y-%m-%d").to_string().as_bytes());

    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

// ---------------------------------------------------------------------------
// Fingerprint records
// ---------------------------------------------------------------------------

/// Lifecycle state of a draft attempt keyed by fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum FingerprintState {
    /// A creator holds the row and the POST is (or is about to be) in flight.
    InFlight,
    /// The draft exists.
    Created {
        /// Accounting-system sales-order id.
        order_id: String,
        /// Human-facing order number.
        order_number: String,
    },
    /// The attempt failed and was handed to the retry queue.
    Failed,
}

/// The persisted fingerprint row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FingerprintRecord {
    /// The fingerprint hash (document id).
    pub fingerprint: String,
    /// The case that computed it (partition key).
    pub case_id: Uuid,
    /// Current state.
    pub state: FingerprintState,
    /// When the row was first inserted.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// When the state last changed.
    pub updated_at: chrono::DateTime<chrono::Utc>,
}
