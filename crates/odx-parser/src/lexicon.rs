// SPDX-License-Identifier: MIT OR Apache-2.0
//! The bilingual (English/Farsi) header and keyword lexicon.
//!
//! Dictionary entries are matched against normalised header text. The
//! tables are intentionally small and closed; growing them is a code
//! change, not configuration.

use odx_core::CanonicalField;

/// Synonyms per canonical field, lower-cased and whitespace-normalised.
pub fn synonyms(field: CanonicalField) -> &'static [&'static str] {
    match field {
        CanonicalField::Sku => &[
            "sku",
            "item code",
            "item no",
            "item number",
            "product code",
            "code",
            "کد کالا",
            "کد محصول",
            "کد",
        ],
        CanonicalField::Gtin => &[
            "gtin",
            "ean",
            "upc",
            "barcode",
            "بارکد",
            "شماره جهانی کالا",
        ],
        CanonicalField::ProductName => &[
            "product",
            "product name",
            "item",
            "item name",
            "description",
            "نام کالا",
            "شرح کالا",
            "کالا",
            "شرح",
        ],
        CanonicalField::Quantity => &[
            "qty",
            "quantity",
            "amount ordered",
            "count",
            "units",
            "تعداد",
            "مقدار",
        ],
        CanonicalField::UnitPrice => &[
            "unit price",
            "price",
            "rate",
            "price per unit",
            "قیمت واحد",
            "قیمت",
            "فی",
            "نرخ",
        ],
        CanonicalField::LineTotal => &[
            "line total",
            "total price",
            "amount",
            "extended price",
            "جمع",
            "مبلغ",
            "جمع ردیف",
        ],
        CanonicalField::Customer => &[
            "customer",
            "customer name",
            "client",
            "buyer",
            "sold to",
            "مشتری",
            "نام مشتری",
            "خریدار",
        ],
        CanonicalField::Subtotal => &["subtotal", "sub total", "جمع کل", "جمع جزء"],
        CanonicalField::Tax => &["tax", "vat", "sales tax", "مالیات", "ارزش افزوده"],
        CanonicalField::Total => &[
            "total",
            "grand total",
            "total due",
            "مبلغ کل",
            "جمع نهایی",
            "قابل پرداخت",
        ],
    }
}

/// All fields a header cell is matched against, in priority order.
///
/// Longer, more specific fields come before generic ones so that
/// "unit price" wins over "total price"'s shared tokens.
pub const HEADER_FIELDS: &[CanonicalField] = &[
    CanonicalField::Gtin,
    CanonicalField::Sku,
    CanonicalField::Quantity,
    CanonicalField::UnitPrice,
    CanonicalField::LineTotal,
    CanonicalField::ProductName,
    CanonicalField::Customer,
    CanonicalField::Subtotal,
    CanonicalField::Tax,
    CanonicalField::Total,
];

/// Keywords that mark a row as a totals row rather than a data row.
pub const TOTAL_ROW_KEYWORDS: &[&str] = &[
    "total",
    "subtotal",
    "sub total",
    "grand total",
    "tax",
    "vat",
    "جمع",
    "جمع کل",
    "مالیات",
    "مبلغ کل",
    "جمع نهایی",
];

/// Normalise header text for dictionary lookup: trim, collapse whitespace,
/// lower-case, and strip trailing colons.
pub fn normalize_header(text: &str) -> String {
    let collapsed = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed
        .trim_end_matches(':')
        .trim_end_matches('：')
        .trim()
        .to_string()
}

/// `true` when the normalised text appears in the header lexicon of any
/// field.
pub fn is_header_keyword(normalized: &str) -> bool {
    HEADER_FIELDS
        .iter()
        .any(|f| synonyms(*f).contains(&normalized))
}

/// `true` when the normalised text marks a totals row.
pub fn is_total_keyword(normalized: &str) -> bool {
    TOTAL_ROW_KEYWORDS
        .iter()
        .any(|k| normalized == *k || normalized.starts_with(&format!("{k}:")))
}

/// Which totals field a label names, if any.
pub fn total_field(normalized: &str) -> Option<CanonicalField> {
    for field in [
        CanonicalField::Subtotal,
        CanonicalField::Tax,
        CanonicalField::Total,
    ] {
        if synonyms(field).contains(&normalized) {
            return Some(field);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn farsi_headers_are_in_the_dictionary() {
        assert!(synonyms(CanonicalField::Sku).contains(&"کد کالا"));
        assert!(synonyms(CanonicalField::Quantity).contains(&"تعداد"));
        assert!(synonyms(CanonicalField::UnitPrice).contains(&"قیمت واحد"));
    }

    #[test]
    fn header_normalisation() {
        assert_eq!(normalize_header("  Unit   Price: "), "unit price");
        assert_eq!(normalize_header("کد کالا"), "کد کالا");
    }

    #[test]
    fn keyword_checks() {
        assert!(is_header_keyword("qty"));
        assert!(is_header_keyword("مشتری"));
        assert!(!is_header_keyword("zebra"));
        assert!(is_total_keyword("grand total"));
        assert!(!is_total_keyword("widget"));
    }

    #[test]
    fn total_labels_map_to_fields() {
        assert_eq!(total_field("subtotal"), Some(CanonicalField::Subtotal));
        assert_eq!(total_field("مالیات"), Some(CanonicalField::Tax));
        assert_eq!(total_field("grand total"), Some(CanonicalField::Total));
        assert_eq!(total_field("qty"), None);
    }
}
