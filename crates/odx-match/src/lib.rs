// SPDX-License-Identifier: MIT OR Apache-2.0
//! odx-match
//!
//! Deterministic fuzzy matching of extracted strings against the cached
//! accounting catalogs.
//!
//! Matching never auto-selects inside the ambiguous band: anything short
//! of a clear winner is reported as `ambiguous` with ranked candidates,
//! and a human picks. The scoring is pure: same inputs, same answer.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use odx_core::{CustomerRecord, ItemRecord, ResolutionStatus};
use serde::{Deserialize, Serialize};

/// Score at or above which a clear winner is auto-resolved.
const RESOLVE_THRESHOLD: f64 = 0.90;
/// Minimum gap to the runner-up for auto-resolution.
const RESOLVE_GAP: f64 = 0.10;
/// Score at or above which candidates are worth showing to a human.
const CANDIDATE_THRESHOLD: f64 = 0.60;
/// Runner-ups within this distance of the best are considered rivals.
const RIVAL_BAND: f64 = 0.10;
/// Candidates surfaced per ambiguous match.
const MAX_CANDIDATES: usize = 5;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// One ranked match candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    /// Accounting-system record id.
    pub id: String,
    /// Display name of the record.
    pub name: String,
    /// Score in `[0, 1]`.
    pub score: f64,
}

/// Outcome of matching the order's customer name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerMatch {
    /// Resolution status for the customer block.
    pub resolution: ResolutionStatus,
    /// Ranked candidates, best first.
    pub candidates: Vec<MatchCandidate>,
    /// The winning id, only when `resolution` is `Resolved`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_id: Option<String>,
    /// Score of the best candidate (0 when there are none).
    pub confidence: f64,
    /// Short explanation of the decision.
    pub reason: String,
}

/// Outcome of matching one line against the item catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resolution", rename_all = "kebab-case")]
pub enum ItemMatch {
    /// Exactly one catalog item fits.
    Resolved {
        /// The matched item id.
        id: String,
        /// How the item was found.
        matched_on: ItemMatchKey,
    },
    /// Conflicting or several close candidates; a human must choose.
    Ambiguous {
        /// Ranked candidates, best first.
        candidates: Vec<MatchCandidate>,
    },
    /// Nothing in the catalog fits.
    NotFound,
}

/// Which identifier resolved an item match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemMatchKey {
    /// Exact GTIN equality.
    Gtin,
    /// Exact SKU equality (case-insensitive).
    Sku,
    /// Fuzzy product-name match (opt-in).
    Name,
}

/// Tuning knobs for item matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMatchOptions {
    /// Allow fuzzy matching on product names when identifiers fail.
    pub name_fuzzy: bool,
}

impl Default for ItemMatchOptions {
    fn default() -> Self {
        Self { name_fuzzy: false }
    }
}

// ---------------------------------------------------------------------------
// Normalisation and scoring
// ---------------------------------------------------------------------------

/// Normalise a name for comparison: collapse whitespace, strip punctuation,
/// preserve case and Unicode letters and digits.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_space = false;
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        } else if c.is_whitespace() || c == '.' || c == ',' || c == '-' || c == '&' {
            pending_space = true;
        }
        // Other punctuation is dropped without acting as a separator.
    }
    out
}

fn token_sets<'a>(
    a: &'a str,
    b: &'a str,
) -> (
    std::collections::BTreeSet<&'a str>,
    std::collections::BTreeSet<&'a str>,
) {
    (
        a.split_whitespace().collect(),
        b.split_whitespace().collect(),
    )
}

fn token_jaccard(a: &str, b: &str) -> f64 {
    let (ta, tb) = token_sets(a, b);
    if ta.is_empty() && tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count() as f64;
    let union = ta.union(&tb).count() as f64;
    intersection / union
}

/// Share of the smaller token set covered by the intersection. Catches a
/// short input naming a longer registered entity ("Acme" vs "Acme Co.").
fn token_containment(a: &str, b: &str) -> f64 {
    let (ta, tb) = token_sets(a, b);
    let smaller = ta.len().min(tb.len());
    if smaller == 0 {
        return 0.0;
    }
    ta.intersection(&tb).count() as f64 / smaller as f64
}

/// Score a pair of names in `[0, 1]`.
///
/// Exact normalised equality scores 1.0; case-insensitive normalised
/// equality 0.95; everything else is a token-overlap / edit-distance blend
/// capped at 0.9, so fuzzy matches can never outrank an exact one.
pub fn name_score(input: &str, candidate: &str) -> f64 {
    let ni = normalize_name(input);
    let nc = normalize_name(candidate);
    if !ni.is_empty() && ni == nc {
        return 1.0;
    }
    let fi = ni.to_lowercase();
    let fc = nc.to_lowercase();
    if !fi.is_empty() && fi == fc {
        return 0.95;
    }
    let jaccard = token_jaccard(&fi, &fc);
    let containment = token_containment(&fi, &fc);
    let edit = strsim::normalized_levenshtein(&fi, &fc);
    0.9 * (0.3 * jaccard + 0.3 * edit + 0.4 * containment)
}

// ---------------------------------------------------------------------------
// Customer matching
// ---------------------------------------------------------------------------

/// Match the extracted customer name against the customer catalog.
pub fn match_customer(input_name: &str, customers: &[CustomerRecord]) -> CustomerMatch {
    let mut ranked: Vec<MatchCandidate> = customers
        .iter()
        .map(|c| MatchCandidate {
            id: c.id.clone(),
            name: c.name.clone(),
            score: name_score(input_name, &c.name),
        })
        .filter(|c| c.score >= CANDIDATE_THRESHOLD)
        .collect();
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    ranked.truncate(MAX_CANDIDATES);

    let Some(best) = ranked.first().cloned() else {
        return CustomerMatch {
            resolution: ResolutionStatus::NotFound,
            candidates: Vec::new(),
            selected_id: None,
            confidence: 0.0,
            reason: "no candidate scored above the threshold".into(),
        };
    };

    let runner_up = ranked.get(1).map(|c| c.score).unwrap_or(0.0);
    let gap = best.score - runner_up;

    if best.score >= RESOLVE_THRESHOLD && gap >= RESOLVE_GAP {
        return CustomerMatch {
            resolution: ResolutionStatus::Resolved,
            selected_id: Some(best.id.clone()),
            confidence: best.score,
            reason: format!("clear winner at {:.2} with gap {:.2}", best.score, gap),
            candidates: ranked,
        };
    }

    // Anything below the auto-resolve bar stays with the user: either the
    // score sits in the ambiguous band, or rivals are too close.
    CustomerMatch {
        resolution: ResolutionStatus::Ambiguous,
        selected_id: None,
        confidence: best.score,
        reason: if gap < RIVAL_BAND && ranked.len() > 1 {
            format!("{} candidates within {:.2} of the best", ranked.len(), RIVAL_BAND)
        } else {
            format!("best score {:.2} is below the auto-resolve bar", best.score)
        },
        candidates: ranked,
    }
}

// ---------------------------------------------------------------------------
// Item matching
// ---------------------------------------------------------------------------

/// Match one line's identifiers against the item catalog.
///
/// Priority: exact GTIN, then exact SKU, then (opt-in) fuzzy name. A
/// conflicting identifier (the same GTIN or SKU on several catalog items)
/// is reported as ambiguous, never silently picked.
pub fn match_item(
    sku: Option<&str>,
    gtin: Option<&str>,
    name: Option<&str>,
    items: &[ItemRecord],
    options: ItemMatchOptions,
) -> ItemMatch {
    if let Some(gtin) = gtin.map(str::trim).filter(|g| !g.is_empty()) {
        let hits: Vec<&ItemRecord> = items
            .iter()
            .filter(|i| i.gtin.as_deref() == Some(gtin))
            .collect();
        match hits.len() {
            0 => {}
            1 => {
                return ItemMatch::Resolved {
                    id: hits[0].id.clone(),
                    matched_on: ItemMatchKey::Gtin,
                };
            }
            _ => return ambiguous_from(&hits),
        }
    }

    if let Some(sku) = sku.map(str::trim).filter(|s| !s.is_empty()) {
        let hits: Vec<&ItemRecord> = items
            .iter()
            .filter(|i| {
                i.sku
                    .as_deref()
                    .is_some_and(|s| s.eq_ignore_ascii_case(sku))
            })
            .collect();
        match hits.len() {
            0 => {}
            1 => {
                return ItemMatch::Resolved {
                    id: hits[0].id.clone(),
                    matched_on: ItemMatchKey::Sku,
                };
            }
            _ => return ambiguous_from(&hits),
        }
    }

    if options.name_fuzzy {
        if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            let mut ranked: Vec<MatchCandidate> = items
                .iter()
                .map(|i| MatchCandidate {
                    id: i.id.clone(),
                    name: i.name.clone(),
                    score: name_score(name, &i.name),
                })
                .filter(|c| c.score >= CANDIDATE_THRESHOLD)
                .collect();
            ranked.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.id.cmp(&b.id))
            });
            ranked.truncate(MAX_CANDIDATES);
            if let Some(best) = ranked.first() {
                let runner_up = ranked.get(1).map(|c| c.score).unwrap_or(0.0);
                if best.score >= RESOLVE_THRESHOLD && best.score - runner_up >= RESOLVE_GAP {
                    return ItemMatch::Resolved {
                        id: best.id.clone(),
                        matched_on: ItemMatchKey::Name,
                    };
                }
                return ItemMatch::Ambiguous { candidates: ranked };
            }
        }
    }

    ItemMatch::NotFound
}

fn ambiguous_from(hits: &[&ItemRecord]) -> ItemMatch {
    ItemMatch::Ambiguous {
        candidates: hits
            .iter()
            .map(|i| MatchCandidate {
                id: i.id.clone(),
                name: i.name.clone(),
                score: 1.0,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customers() -> Vec<CustomerRecord> {
        vec![
            CustomerRecord {
                id: "c-acme".into(),
                name: "Acme Co.".into(),
            },
            CustomerRecord {
                id: "c-acme-llc".into(),
                name: "Acme LLC".into(),
            },
            CustomerRecord {
                id: "c-globex".into(),
                name: "Globex Corporation".into(),
            },
        ]
    }

    fn items() -> Vec<ItemRecord> {
        vec![
            ItemRecord {
                id: "it-1".into(),
                name: "Widget".into(),
                sku: Some("WID-01".into()),
                gtin: Some("4006381333931".into()),
                rate: 2.5,
            },
            ItemRecord {
                id: "it-2".into(),
                name: "Gadget".into(),
                sku: Some("GAD-01".into()),
                gtin: None,
                rate: 7.0,
            },
        ]
    }

    #[test]
    fn exact_normalized_name_scores_one() {
        assert_eq!(name_score("Acme Co.", "Acme   Co"), 1.0);
    }

    #[test]
    fn case_insensitive_equality_scores_095() {
        assert_eq!(name_score("ACME CO", "Acme Co."), 0.95);
    }

    #[test]
    fn fuzzy_scores_stay_below_exact() {
        let fuzzy = name_score("Acme", "Acme Co.");
        assert!(fuzzy > 0.0 && fuzzy <= 0.9, "{fuzzy}");
    }

    #[test]
    fn exact_customer_resolves() {
        let result = match_customer("Globex Corporation", &customers());
        assert_eq!(result.resolution, ResolutionStatus::Resolved);
        assert_eq!(result.selected_id.as_deref(), Some("c-globex"));
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn close_rivals_are_ambiguous() {
        let result = match_customer("Acme", &customers());
        assert_eq!(result.resolution, ResolutionStatus::Ambiguous);
        assert!(result.selected_id.is_none());
        assert!(result.candidates.len() >= 2);
    }

    #[test]
    fn garbage_is_not_found() {
        let result = match_customer("Zzyzx Trading House", &customers());
        assert_eq!(result.resolution, ResolutionStatus::NotFound);
        assert!(result.candidates.is_empty());
    }

    #[test]
    fn matching_is_deterministic() {
        let a = match_customer("Acme", &customers());
        let b = match_customer("Acme", &customers());
        assert_eq!(a, b);
    }

    #[test]
    fn gtin_beats_sku() {
        // The GTIN belongs to it-1 even though the SKU points at it-2.
        let result = match_item(
            Some("GAD-01"),
            Some("4006381333931"),
            None,
            &items(),
            ItemMatchOptions::default(),
        );
        assert_eq!(
            result,
            ItemMatch::Resolved {
                id: "it-1".into(),
                matched_on: ItemMatchKey::Gtin
            }
        );
    }

    #[test]
    fn sku_match_is_case_insensitive() {
        let result = match_item(Some("wid-01"), None, None, &items(), ItemMatchOptions::default());
        assert_eq!(
            result,
            ItemMatch::Resolved {
                id: "it-1".into(),
                matched_on: ItemMatchKey::Sku
            }
        );
    }

    #[test]
    fn duplicate_sku_is_ambiguous() {
        let mut catalog = items();
        catalog.push(ItemRecord {
            id: "it-3".into(),
            name: "Widget (old)".into(),
            sku: Some("WID-01".into()),
            gtin: None,
            rate: 2.0,
        });
        let result = match_item(Some("WID-01"), None, None, &catalog, ItemMatchOptions::default());
        match result {
            ItemMatch::Ambiguous { candidates } => assert_eq!(candidates.len(), 2),
            other => panic!("expected ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn name_fuzzy_is_off_by_default() {
        let result = match_item(None, None, Some("Widget"), &items(), ItemMatchOptions::default());
        assert_eq!(result, ItemMatch::NotFound);
    }

    #[test]
    fn name_fuzzy_opt_in_resolves_exact_name() {
        let result = match_item(
            None,
            None,
            Some("Widget"),
            &items(),
            ItemMatchOptions { name_fuzzy: true },
        );
        assert_eq!(
            result,
            ItemMatch::Resolved {
                id: "it-1".into(),
                matched_on: ItemMatchKey::Name
            }
        );
    }

    #[test]
    fn unknown_identifiers_are_not_found() {
        let result = match_item(
            Some("NOPE-99"),
            Some("96385074"),
            None,
            &items(),
            ItemMatchOptions::default(),
        );
        assert_eq!(result, ItemMatch::NotFound);
    }
}
