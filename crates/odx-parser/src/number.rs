// SPDX-License-Identifier: MIT OR Apache-2.0
//! Value normalisation: numbers, digits, identifiers, and language.
//!
//! All normalisation is lossless in intent: the raw cell text always
//! travels alongside the normalised value as evidence.

use odx_core::LanguageHint;

/// Currency markers recognised and stripped from numeric cells.
const CURRENCY_MARKERS: &[(&str, &str)] = &[
    ("$", "USD"),
    ("€", "EUR"),
    ("£", "GBP"),
    ("¥", "JPY"),
    ("USD", "USD"),
    ("EUR", "EUR"),
    ("GBP", "GBP"),
    ("IRR", "IRR"),
    ("ریال", "IRR"),
    ("تومان", "IRT"),
];

/// A numeric cell after normalisation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNumber {
    /// The numeric value.
    pub value: f64,
    /// ISO-ish currency code when a marker was stripped.
    pub currency: Option<String>,
}

/// Fold Persian (U+06F0..U+06F9) and Arabic-Indic (U+0660..U+0669) digits
/// to ASCII, together with their decimal and thousands separators.
pub fn fold_digits(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '۰'..='۹' => char::from(b'0' + (c as u32 - '۰' as u32) as u8),
            '٠'..='٩' => char::from(b'0' + (c as u32 - '٠' as u32) as u8),
            '٫' => '.',
            '٬' => ',',
            other => other,
        })
        .collect()
}

/// Parse a numeric cell: strip currency markers, fold digits, and resolve
/// the decimal separator by locale heuristics (`1,234.56` vs `1.234,56`).
///
/// Returns `None` when the text holds no parseable number.
pub fn parse_number(raw: &str) -> Option<ParsedNumber> {
    let folded = fold_digits(raw.trim());
    if folded.is_empty() {
        return None;
    }

    let mut text = folded;
    let mut currency = None;
    for (marker, code) in CURRENCY_MARKERS {
        if let Some(stripped) = strip_marker(&text, marker) {
            text = stripped;
            currency = Some((*code).to_string());
            break;
        }
    }

    let text = text.trim().replace(' ', "");
    if text.is_empty() || !text.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    // Anything beyond digits, separators, and a sign is not a number;
    // "A-1" and "WID-01" must stay text.
    if !text
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-' | '+'))
    {
        return None;
    }
    if text.rfind('-').is_some_and(|i| i > 0) || text.contains('+') && !text.starts_with('+') {
        return None;
    }

    let normalised = resolve_separators(&text)?;
    normalised
        .parse::<f64>()
        .ok()
        .map(|value| ParsedNumber { value, currency })
}

fn strip_marker(text: &str, marker: &str) -> Option<String> {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix(marker) {
        return Some(rest.to_string());
    }
    if let Some(rest) = trimmed.strip_suffix(marker) {
        return Some(rest.to_string());
    }
    None
}

/// Reduce a digit string with `.`/`,` separators to plain `1234.56` form.
fn resolve_separators(text: &str) -> Option<String> {
    let negative = text.starts_with('-');
    let body: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if body.is_empty() {
        return None;
    }

    let dots = body.matches('.').count();
    let commas = body.matches(',').count();

    let decimal_sep = if dots > 0 && commas > 0 {
        // Both present: the rightmost separator is the decimal one.
        let last_dot = body.rfind('.').unwrap_or(0);
        let last_comma = body.rfind(',').unwrap_or(0);
        if last_dot > last_comma { Some('.') } else { Some(',') }
    } else if commas == 1 {
        // A single comma with a non-3-digit tail reads as a decimal comma.
        let tail = body.rsplit(',').next().unwrap_or("");
        if tail.len() == 3 { None } else { Some(',') }
    } else if commas > 1 {
        None
    } else if dots == 1 {
        // A lone dot reads as a decimal point, including `1.234`.
        Some('.')
    } else if dots > 1 {
        None
    } else {
        None
    };

    let mut out = String::with_capacity(body.len() + 1);
    if negative {
        out.push('-');
    }
    for c in body.chars() {
        match c {
            '.' | ',' => {
                if Some(c) == decimal_sep {
                    out.push('.');
                }
            }
            digit => out.push(digit),
        }
    }
    Some(out)
}

/// `true` when a cell reads as a number once normalised: native numeric
/// content, or text (possibly Persian digits / currency-marked) that
/// parses.
pub(crate) fn is_numericish(cell: &crate::workbook::Cell) -> bool {
    match &cell.value {
        crate::workbook::CellValue::Number(_) => true,
        crate::workbook::CellValue::Text(t) => parse_number(t).is_some(),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Normalise a SKU: upper-case and trim.
pub fn normalize_sku(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Normalise free text: trim and collapse internal whitespace, preserving
/// Unicode content.
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract the digits of a GTIN cell (after digit folding).
pub fn normalize_gtin(raw: &str) -> String {
    fold_digits(raw)
        .chars()
        .filter(char::is_ascii_digit)
        .collect()
}

/// Validate a GTIN: length ∈ {8, 12, 13, 14} and a Mod-10 check digit.
pub fn is_valid_gtin(digits: &str) -> bool {
    if !matches!(digits.len(), 8 | 12 | 13 | 14) {
        return false;
    }
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let mut sum = 0u32;
    // Weights 3/1 alternating from the digit next to the check digit.
    for (i, c) in digits.chars().rev().skip(1).enumerate() {
        let d = c.to_digit(10).unwrap_or(0);
        sum += if i % 2 == 0 { d * 3 } else { d };
    }
    let check = (10 - (sum % 10)) % 10;
    digits
        .chars()
        .next_back()
        .and_then(|c| c.to_digit(10))
        .is_some_and(|d| d == check)
}

// ---------------------------------------------------------------------------
// Language sniffing
// ---------------------------------------------------------------------------

/// Sniff the dominant script across the collected strings.
pub fn sniff_language<'a>(texts: impl Iterator<Item = &'a str>) -> Option<LanguageHint> {
    let mut arabic = 0usize;
    let mut latin = 0usize;
    for text in texts {
        for c in text.chars() {
            let cp = c as u32;
            if (0x0600..=0x06FF).contains(&cp)
                || (0x0750..=0x077F).contains(&cp)
                || (0xFB50..=0xFDFF).contains(&cp)
                || (0xFE70..=0xFEFF).contains(&cp)
            {
                arabic += 1;
            } else if c.is_ascii_alphabetic() {
                latin += 1;
            }
        }
    }
    let letters = arabic + latin;
    if letters == 0 {
        return None;
    }
    if arabic as f64 / letters as f64 >= 0.25 {
        Some(LanguageHint::Fa)
    } else {
        Some(LanguageHint::En)
    }
}
