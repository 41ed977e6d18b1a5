//! Pairwise feature scoring for (mention, candidate) comparisons.
//!
//! Pure CPU code: both sides are pre-fetched into context records, and the
//! combined score is the weighted mean over features whose inputs are
//! present. A definitive identifier match fixes the score at 0.99.

use std::collections::BTreeSet;

use granska_core::{
    config::FeatureWeights, EntityId, EntityType, FeatureScore, IdentifierType,
};
use granska_ident::{
    address_similarity, company_name_similarity, match_key, street_match_key, token_jaccard,
    ParsedAddress,
};

/// Score fixed when a definitive identifier matches
pub const IDENTIFIER_MATCH_SCORE: f64 = 0.99;

/// Everything feature scoring needs to know about one comparison side
#[derive(Debug, Clone, Default)]
pub struct CompareContext {
    pub name: String,
    /// Definitive identifier (personnummer/orgnummer), normalized
    pub definitive_identifier: Option<(IdentifierType, String)>,
    pub birth_year: Option<i32>,
    pub address: Option<ParsedAddress>,
    /// Persons: companies they direct/own. Companies: their directors.
    pub network: BTreeSet<EntityId>,
}

/// Jaccard over entity-id sets; `None` when either side is unknown (empty)
fn id_jaccard(a: &BTreeSet<EntityId>, b: &BTreeSet<EntityId>) -> Option<f64> {
    if a.is_empty() || b.is_empty() {
        return None;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    Some(intersection / union)
}

fn push(features: &mut Vec<FeatureScore>, name: &str, value: f64, weight: f64) {
    features.push(FeatureScore {
        name: name.to_string(),
        value,
        weight,
    });
}

/// Identifier feature: `Some(1.0)` definitive match, `Some(0.0)` definitive
/// mismatch on the same identifier type, `None` when either side lacks one.
fn identifier_feature(mention: &CompareContext, candidate: &CompareContext) -> Option<f64> {
    let (m_type, m_value) = mention.definitive_identifier.as_ref()?;
    let (c_type, c_value) = candidate.definitive_identifier.as_ref()?;
    if m_type != c_type {
        return None;
    }
    Some(if m_value == c_value { 1.0 } else { 0.0 })
}

/// Compare a mention against a candidate of the given entity type
pub fn compare(
    entity_type: EntityType,
    mention: &CompareContext,
    candidate: &CompareContext,
    weights: &FeatureWeights,
) -> (f64, Vec<FeatureScore>) {
    let mut features = Vec::new();

    match entity_type {
        EntityType::Person | EntityType::Event => {
            let w = &weights.person;
            if let Some(value) = identifier_feature(mention, candidate) {
                push(&mut features, "identifier_match", value, w.identifier_match);
            }
            let key_m = match_key(&mention.name);
            let key_c = match_key(&candidate.name);
            if !key_m.is_empty() && !key_c.is_empty() {
                push(
                    &mut features,
                    "name_jaro_winkler",
                    strsim::jaro_winkler(&key_m, &key_c),
                    w.name_jaro_winkler,
                );
                push(
                    &mut features,
                    "name_token_jaccard",
                    token_jaccard(&key_m, &key_c),
                    w.name_token_jaccard,
                );
            }
            if let (Some(my), Some(cy)) = (mention.birth_year, candidate.birth_year) {
                push(
                    &mut features,
                    "birth_year_match",
                    f64::from(u8::from(my == cy)),
                    w.birth_year_match,
                );
            }
            if let (Some(ma), Some(ca)) = (&mention.address, &candidate.address) {
                push(
                    &mut features,
                    "address_similarity",
                    address_similarity(ma, ca),
                    w.address_similarity,
                );
            }
            if let Some(overlap) = id_jaccard(&mention.network, &candidate.network) {
                push(&mut features, "network_overlap", overlap, w.network_overlap);
            }
        }
        EntityType::Company => {
            let w = &weights.company;
            if let Some(value) = identifier_feature(mention, candidate) {
                push(&mut features, "identifier_match", value, w.identifier_match);
            }
            if !mention.name.is_empty() && !candidate.name.is_empty() {
                push(
                    &mut features,
                    "name_jaro_winkler",
                    company_name_similarity(&mention.name, &candidate.name),
                    w.name_jaro_winkler,
                );
            }
            if let (Some(ma), Some(ca)) = (&mention.address, &candidate.address) {
                push(
                    &mut features,
                    "address_similarity",
                    address_similarity(ma, ca),
                    w.address_similarity,
                );
            }
            if let Some(overlap) = id_jaccard(&mention.network, &candidate.network) {
                push(&mut features, "director_overlap", overlap, w.director_overlap);
            }
        }
        EntityType::Address => {
            let w = &weights.address;
            let empty = ParsedAddress::default();
            let ma = mention.address.as_ref().unwrap_or(&empty);
            let ca = candidate.address.as_ref().unwrap_or(&empty);
            if let (Some(mp), Some(cp)) = (&ma.postal_code, &ca.postal_code) {
                push(
                    &mut features,
                    "postal_exact",
                    f64::from(u8::from(mp == cp)),
                    w.postal_exact,
                );
            }
            if let (Some(ms), Some(cs)) = (&ma.street, &ca.street) {
                push(
                    &mut features,
                    "street_jaro_winkler",
                    strsim::jaro_winkler(&street_match_key(ms), &street_match_key(cs)),
                    w.street_jaro_winkler,
                );
            }
            if let (Some(mn), Some(cn)) = (&ma.street_number, &ca.street_number) {
                push(
                    &mut features,
                    "number_exact",
                    f64::from(u8::from(mn == cn)),
                    w.number_exact,
                );
            }
        }
    }

    (combine(&features), features)
}

/// Weighted mean over present features; a definitive identifier match
/// short-circuits to [`IDENTIFIER_MATCH_SCORE`].
pub fn combine(features: &[FeatureScore]) -> f64 {
    if features
        .iter()
        .any(|f| f.name == "identifier_match" && f.value >= 1.0)
    {
        return IDENTIFIER_MATCH_SCORE;
    }
    let total_weight: f64 = features.iter().map(|f| f.weight).sum();
    if total_weight == 0.0 {
        return 0.0;
    }
    features.iter().map(|f| f.value * f.weight).sum::<f64>() / total_weight
}
