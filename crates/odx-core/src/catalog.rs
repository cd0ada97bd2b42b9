// SPDX-License-Identifier: MIT OR Apache-2.0
//! Catalog records cached from the accounting system.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A customer as known to the accounting system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CustomerRecord {
    /// Accounting-system customer id.
    pub id: String,
    /// Display name.
    pub name: String,
}

/// A catalog item as known to the accounting system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ItemRecord {
    /// Accounting-system item id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Stock-keeping unit, when the item has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    /// GTIN, when the item has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gtin: Option<String>,
    /// List rate in the accounting system's currency.
    pub rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_record_omits_absent_identifiers() {
        let item = ItemRecord {
            id: "it-1".into(),
            name: "Widget".into(),
            sku: None,
            gtin: None,
            rate: 9.5,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert!(json.get("sku").is_none());
        assert!(json.get("gtin").is_none());
    }
}
