//! Swedish address parsing and similarity.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::name::match_key;

static POSTAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{3})\s?(\d{2})\b").expect("postal regex"));

static STREET_RE: Lazy<Regex> = Lazy::new(|| {
    // Entrance letters only ever follow a street number
    Regex::new(r"^(?P<street>[^\d,]+?)(?:[\s,]*(?P<num>\d{1,4})\s*(?P<ent>[A-ZÅÄÖ])?)?\s*(,|$)")
        .expect("street regex")
});

/// Street-type suffixes and their registry abbreviations
const STREET_SUFFIXES: &[(&str, &str)] = &[
    ("GATAN", "G"),
    ("VÄGEN", "V"),
    ("ALLÉN", "A"),
    ("STIGEN", "ST"),
    ("PLAN", "PL"),
    ("TORG", "T"),
    ("BACKE", "B"),
];

/// Best-effort structured form of a Swedish street address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedAddress {
    pub street: Option<String>,
    pub street_number: Option<String>,
    pub entrance: Option<String>,
    /// Five digits, no interior space
    pub postal_code: Option<String>,
    pub city: Option<String>,
}

/// Parse a free-form address line. Never fails; absent components are `None`.
pub fn parse_address(raw: &str) -> ParsedAddress {
    let upper = raw.trim().to_uppercase();
    if upper.is_empty() {
        return ParsedAddress::default();
    }

    let mut parsed = ParsedAddress::default();
    let mut remainder = upper.clone();

    if let Some(caps) = POSTAL_RE.captures(&upper) {
        parsed.postal_code = Some(format!("{}{}", &caps[1], &caps[2]));
        let m = caps.get(0).expect("whole match");
        let after = upper[m.end()..]
            .trim_matches(|c: char| c.is_whitespace() || c == ',')
            .to_string();
        if !after.is_empty() {
            parsed.city = Some(after);
        }
        remainder = upper[..m.start()]
            .trim_matches(|c: char| c.is_whitespace() || c == ',')
            .to_string();
    }

    if let Some(caps) = STREET_RE.captures(&remainder) {
        let street = caps
            .name("street")
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty());
        parsed.street = street;
        parsed.street_number = caps.name("num").map(|m| m.as_str().to_string());
        parsed.entrance = caps.name("ent").map(|m| m.as_str().to_string());
    } else if !remainder.is_empty() {
        parsed.street = Some(remainder);
    }

    parsed
}

/// Abbreviated, accent-stripped street key used for comparisons
pub fn street_match_key(street: &str) -> String {
    let abbreviated: Vec<String> = street
        .to_uppercase()
        .split_whitespace()
        .map(|word| {
            for (suffix, abbr) in STREET_SUFFIXES {
                if let Some(stem) = word.strip_suffix(suffix) {
                    return format!("{stem}{abbr}");
                }
            }
            word.to_string()
        })
        .collect();
    match_key(&abbreviated.join(" "))
}

/// Address similarity: `0.3·exact(postal) + 0.5·jaro_winkler(street) +
/// 0.2·exact(number)`, renormalized over components present on both sides.
pub fn address_similarity(a: &ParsedAddress, b: &ParsedAddress) -> f64 {
    let mut score = 0.0;
    let mut weight = 0.0;

    if let (Some(pa), Some(pb)) = (&a.postal_code, &b.postal_code) {
        score += 0.3 * f64::from(u8::from(pa == pb));
        weight += 0.3;
    }
    if let (Some(sa), Some(sb)) = (&a.street, &b.street) {
        score += 0.5 * strsim::jaro_winkler(&street_match_key(sa), &street_match_key(sb));
        weight += 0.5;
    }
    if let (Some(na), Some(nb)) = (&a.street_number, &b.street_number) {
        score += 0.2 * f64::from(u8::from(na == nb));
        weight += 0.2;
    }

    if weight == 0.0 {
        0.0
    } else {
        score / weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_address_parses() {
        let a = parse_address("Storgatan 12A, 114 55 Stockholm");
        assert_eq!(a.street.as_deref(), Some("STORGATAN"));
        assert_eq!(a.street_number.as_deref(), Some("12"));
        assert_eq!(a.entrance.as_deref(), Some("A"));
        assert_eq!(a.postal_code.as_deref(), Some("11455"));
        assert_eq!(a.city.as_deref(), Some("STOCKHOLM"));
    }

    #[test]
    fn postal_without_space() {
        let a = parse_address("Kungsvägen 3, 41319 Göteborg");
        assert_eq!(a.postal_code.as_deref(), Some("41319"));
        assert_eq!(a.city.as_deref(), Some("GÖTEBORG"));
    }

    #[test]
    fn street_only() {
        let a = parse_address("Lilla Torg");
        assert_eq!(a.street.as_deref(), Some("LILLA TORG"));
        assert_eq!(a.street_number, None);
        assert_eq!(a.postal_code, None);
    }

    #[test]
    fn street_suffixes_abbreviate() {
        assert_eq!(street_match_key("Storgatan"), "STORG");
        assert_eq!(street_match_key("Ringvägen"), "RINGV");
        assert_eq!(street_match_key("Karlaallén"), "KARLAA");
        assert_eq!(street_match_key("Kyrkstigen"), "KYRKST");
        assert_eq!(street_match_key("Södra Torg"), "SODRA T");
    }

    #[test]
    fn identical_addresses_score_one() {
        let a = parse_address("Storgatan 12, 114 55 Stockholm");
        let b = parse_address("Storgatan 12, 11455 STOCKHOLM");
        let s = address_similarity(&a, &b);
        assert!((s - 1.0).abs() < 1e-9, "expected 1.0, got {s}");
    }

    #[test]
    fn abbreviated_street_matches_long_form() {
        // Registry data often carries "STORG 12" for "Storgatan 12"
        let a = parse_address("Storg 12, 114 55 Stockholm");
        let b = parse_address("Storgatan 12, 114 55 Stockholm");
        let s = address_similarity(&a, &b);
        assert!(s > 0.95, "expected near-exact match, got {s}");
    }

    #[test]
    fn different_numbers_reduce_score() {
        let a = parse_address("Storgatan 12, 114 55 Stockholm");
        let b = parse_address("Storgatan 14, 114 55 Stockholm");
        let s = address_similarity(&a, &b);
        assert!(s < 1.0 && s > 0.6);
    }

    #[test]
    fn missing_components_renormalize() {
        let a = parse_address("Storgatan 12");
        let b = parse_address("Storgatan");
        // Only street present on both sides
        let s = address_similarity(&a, &b);
        assert!((s - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_input_yields_default() {
        assert_eq!(parse_address("   "), ParsedAddress::default());
    }
}
