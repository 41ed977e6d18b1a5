//! Company-name normalization and similarity.

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// Swedish legal forms recognized in company names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LegalForm {
    Ab,
    Hb,
    Kb,
    Ef,
}

impl LegalForm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ab => "AB",
            Self::Hb => "HB",
            Self::Kb => "KB",
            Self::Ef => "EF",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "AB" => Some(Self::Ab),
            "HB" => Some(Self::Hb),
            "KB" => Some(Self::Kb),
            "EF" => Some(Self::Ef),
            _ => None,
        }
    }
}

/// Long-form legal tokens normalized to their abbreviations
const LEGAL_TOKENS: &[(&str, &str)] = &[
    ("AKTIEBOLAGET", "AB"),
    ("AKTIEBOLAG", "AB"),
    ("HANDELSBOLAGET", "HB"),
    ("HANDELSBOLAG", "HB"),
    ("KOMMANDITBOLAGET", "KB"),
    ("KOMMANDITBOLAG", "KB"),
    ("EKONOMISK FÖRENING", "EF"),
];

/// Status markers removed from names before matching
const STATUS_MARKERS: &[&str] = &[
    "I LIKVIDATION",
    "I KONKURS",
    "UNDER REKONSTRUKTION",
    "(PUBL)",
];

/// Result of company-name normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedName {
    /// Uppercased, punctuation-free, legal form and status markers removed
    pub normalized: String,
    pub legal_form: Option<LegalForm>,
}

/// Normalize a raw company name
pub fn normalize_company_name(raw: &str) -> NormalizedName {
    let mut s = raw.to_uppercase();

    for marker in STATUS_MARKERS {
        s = s.replace(marker, " ");
    }
    for (long, short) in LEGAL_TOKENS {
        s = s.replace(long, short);
    }

    // Drop punctuation except '&', collapse whitespace
    let cleaned: String = s
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '&' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();

    let mut legal_form = None;
    if let Some(last) = tokens.last() {
        if let Some(form) = LegalForm::from_token(last) {
            legal_form = Some(form);
            tokens.pop();
        }
    }

    NormalizedName {
        normalized: tokens.join(" "),
        legal_form,
    }
}

/// Accent-stripped uppercase key used for phonetic/blocking comparisons
pub fn match_key(normalized: &str) -> String {
    normalized
        .nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect()
}

/// Jaccard similarity over whitespace tokens
pub fn token_jaccard(a: &str, b: &str) -> f64 {
    let set_a: std::collections::HashSet<&str> = a.split_whitespace().collect();
    let set_b: std::collections::HashSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count() as f64;
    let union = set_a.union(&set_b).count() as f64;
    intersection / union
}

/// Company-name similarity: `0.6·jaro_winkler + 0.4·token_jaccard`
/// over normalized match keys.
pub fn company_name_similarity(a: &str, b: &str) -> f64 {
    let key_a = match_key(&normalize_company_name(a).normalized);
    let key_b = match_key(&normalize_company_name(b).normalized);
    if key_a.is_empty() || key_b.is_empty() {
        return 0.0;
    }
    0.6 * strsim::jaro_winkler(&key_a, &key_b) + 0.4 * token_jaccard(&key_a, &key_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_legal_form_and_publ_marker() {
        let n = normalize_company_name("Volvo Aktiebolag (publ)");
        assert_eq!(n.normalized, "VOLVO");
        assert_eq!(n.legal_form, Some(LegalForm::Ab));
    }

    #[test]
    fn short_form_detected() {
        let n = normalize_company_name("Volvo AB");
        assert_eq!(n.normalized, "VOLVO");
        assert_eq!(n.legal_form, Some(LegalForm::Ab));
    }

    #[test]
    fn handelsbolag_and_kommanditbolag() {
        assert_eq!(
            normalize_company_name("Svenssons Handelsbolag").legal_form,
            Some(LegalForm::Hb)
        );
        assert_eq!(
            normalize_company_name("Nordisk Kommanditbolag").legal_form,
            Some(LegalForm::Kb)
        );
    }

    #[test]
    fn status_markers_removed() {
        let n = normalize_company_name("Byggbolaget AB i konkurs");
        assert_eq!(n.normalized, "BYGGBOLAGET");
        assert_eq!(n.legal_form, Some(LegalForm::Ab));
    }

    #[test]
    fn ampersand_kept_other_punctuation_dropped() {
        let n = normalize_company_name("Larsson & Söner, Bygg AB");
        assert_eq!(n.normalized, "LARSSON & SÖNER BYGG");
    }

    #[test]
    fn match_key_strips_accents() {
        assert_eq!(match_key("SÖNER ÅKERI"), "SONER AKERI");
    }

    #[test]
    fn identical_after_normalization_scores_one() {
        let s = company_name_similarity("Volvo Aktiebolag (publ)", "Volvo AB");
        assert!((s - 1.0).abs() < 1e-9, "expected 1.0, got {s}");
    }

    #[test]
    fn unrelated_names_score_low() {
        let s = company_name_similarity("Volvo AB", "Skanska Bygg HB");
        assert!(s < 0.6, "expected low similarity, got {s}");
    }

    #[test]
    fn empty_name_scores_zero() {
        assert_eq!(company_name_similarity("AB", "Volvo AB"), 0.0);
    }
}
