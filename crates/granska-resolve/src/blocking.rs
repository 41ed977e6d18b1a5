//! Blocking index: candidate generation for mentions.
//!
//! Four keyed strategies, applied in order with an early exit on a
//! definitive identifier hit:
//!
//! 1. exact identifier (`id:`)
//! 2. double-metaphone phonetic codes on the normalized name (`dm:`)
//! 3. name prefix + birth year, persons only (`np:`)
//! 4. postal-code prefix, addresses only (`pc:`)
//!
//! Shared-read, single-writer: updates are applied after the store commit
//! that makes them visible.

use rphonetic::DoubleMetaphone;
use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use granska_core::{
    CoreResult, Entity, EntityId, EntityType, IdentifierRecord, IdentifierType, Mention,
};
use granska_ident::{match_key, parse_address, Personnummer};
use granska_persist::Store;

/// Candidates yielded for one mention
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    pub ids: BTreeSet<EntityId>,
    /// True when a definitive identifier key produced the set
    pub exact_identifier: bool,
}

#[derive(Default)]
struct IndexState {
    by_key: HashMap<String, BTreeSet<EntityId>>,
    keys_of: HashMap<EntityId, Vec<String>>,
}

/// In-memory blocking index over ACTIVE entities
pub struct BlockingIndex {
    state: RwLock<IndexState>,
    metaphone: DoubleMetaphone,
}

impl std::fmt::Debug for BlockingIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read().expect("blocking index lock poisoned");
        f.debug_struct("BlockingIndex")
            .field("keys", &state.by_key.len())
            .field("entities", &state.keys_of.len())
            .finish()
    }
}

impl Default for BlockingIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockingIndex {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(IndexState::default()),
            metaphone: DoubleMetaphone::default(),
        }
    }

    /// Rebuild from the full store (startup or after bulk loads)
    pub async fn rebuild(store: &Store) -> CoreResult<Self> {
        let index = Self::new();
        let page = 1000;
        let mut offset = 0;
        loop {
            let entities = store.list_entities(None, offset, page).await?;
            if entities.is_empty() {
                break;
            }
            for entity in &entities {
                if entity.is_active() {
                    let identifiers = store.identifiers_for_entity(entity.id).await?;
                    index.index_entity(entity, &identifiers);
                }
            }
            offset += page;
        }
        Ok(index)
    }

    /// Phonetic codes (primary and alternate) for each word of a name
    fn phonetic_codes(&self, name: &str) -> Vec<String> {
        let key = match_key(name);
        let mut codes = Vec::new();
        for word in key.split_whitespace() {
            let result = self.metaphone.double_metaphone(&word.to_lowercase());
            let primary = result.primary();
            if !primary.is_empty() {
                codes.push(primary.to_string());
            }
            let alternate = result.alternate();
            if !alternate.is_empty() && alternate != primary {
                codes.push(alternate.to_string());
            }
        }
        codes
    }

    fn keys_for(
        &self,
        entity_type: EntityType,
        name: &str,
        identifiers: &[IdentifierRecord],
        birth_year: Option<i32>,
    ) -> Vec<String> {
        let mut keys = Vec::new();

        for record in identifiers {
            keys.push(format!(
                "id:{}:{}",
                record.id_type.as_str(),
                record.value
            ));
        }

        for code in self.phonetic_codes(name) {
            keys.push(format!("dm:{}:{code}", entity_type.as_str()));
        }

        if entity_type == EntityType::Person {
            if let Some(year) = birth_year {
                let key = match_key(name);
                let prefix: String = key.chars().filter(|c| c.is_alphanumeric()).take(4).collect();
                if !prefix.is_empty() {
                    keys.push(format!("np:{prefix}:{year}"));
                }
            }
        }

        if entity_type == EntityType::Address {
            let postal = identifiers
                .iter()
                .find(|r| r.id_type == IdentifierType::PostalCode)
                .map(|r| r.value.clone())
                .or_else(|| parse_address(name).postal_code);
            if let Some(postal) = postal {
                if postal.len() >= 3 {
                    keys.push(format!("pc:{}", &postal[..3]));
                }
            }
        }

        keys.sort();
        keys.dedup();
        keys
    }

    fn birth_year_of(identifiers: &[IdentifierRecord]) -> Option<i32> {
        identifiers
            .iter()
            .filter(|r| {
                matches!(
                    r.id_type,
                    IdentifierType::Personnummer | IdentifierType::Samordningsnummer
                )
            })
            .find_map(|r| Personnummer::parse(&r.value).ok())
            .map(|p| p.birth_year())
    }

    /// Add or refresh an entity's keys
    pub fn index_entity(&self, entity: &Entity, identifiers: &[IdentifierRecord]) {
        let birth_year = Self::birth_year_of(identifiers);
        let keys = self.keys_for(
            entity.entity_type,
            &entity.canonical_name,
            identifiers,
            birth_year,
        );
        let mut state = self.state.write().expect("blocking index lock poisoned");
        remove_locked(&mut state, entity.id);
        for key in &keys {
            state.by_key.entry(key.clone()).or_default().insert(entity.id);
        }
        state.keys_of.insert(entity.id, keys);
    }

    /// Drop an entity from every key (merge secondary, anonymization)
    pub fn remove_entity(&self, id: EntityId) {
        let mut state = self.state.write().expect("blocking index lock poisoned");
        remove_locked(&mut state, id);
    }

    /// Candidate entity ids for a mention. A definitive identifier hit
    /// short-circuits the remaining strategies.
    pub fn candidates_for(&self, mention: &Mention) -> CandidateSet {
        let state = self.state.read().expect("blocking index lock poisoned");

        if let Some(extracted) = mention.definitive_identifier() {
            if let Some(value) =
                crate::resolver::normalize_identifier(extracted.id_type, &extracted.value)
            {
                let key = format!("id:{}:{value}", extracted.id_type.as_str());
                if let Some(ids) = state.by_key.get(&key) {
                    if !ids.is_empty() {
                        return CandidateSet {
                            ids: ids.clone(),
                            exact_identifier: true,
                        };
                    }
                }
            }
        }

        let mut ids: BTreeSet<EntityId> = BTreeSet::new();

        for code in self.phonetic_codes(&mention.normalized_form) {
            let key = format!("dm:{}:{code}", mention.mention_type.as_str());
            if let Some(hit) = state.by_key.get(&key) {
                ids.extend(hit.iter().copied());
            }
        }

        if mention.mention_type == EntityType::Person {
            let birth_year = mention
                .identifier(IdentifierType::Personnummer)
                .or_else(|| mention.identifier(IdentifierType::Samordningsnummer))
                .and_then(|v| Personnummer::parse(v).ok())
                .map(|p| p.birth_year())
                .or_else(|| {
                    mention
                        .extracted_attributes
                        .get("BIRTH_YEAR")
                        .and_then(|v| v.as_i64())
                        .map(|y| y as i32)
                });
            if let Some(year) = birth_year {
                let key = match_key(&mention.normalized_form);
                let prefix: String =
                    key.chars().filter(|c| c.is_alphanumeric()).take(4).collect();
                if !prefix.is_empty() {
                    if let Some(hit) = state.by_key.get(&format!("np:{prefix}:{year}")) {
                        ids.extend(hit.iter().copied());
                    }
                }
            }
        }

        if mention.mention_type == EntityType::Address {
            let postal = mention
                .identifier(IdentifierType::PostalCode)
                .map(str::to_string)
                .or_else(|| parse_address(&mention.normalized_form).postal_code);
            if let Some(postal) = postal {
                if postal.len() >= 3 {
                    if let Some(hit) = state.by_key.get(&format!("pc:{}", &postal[..3])) {
                        ids.extend(hit.iter().copied());
                    }
                }
            }
        }

        CandidateSet {
            ids,
            exact_identifier: false,
        }
    }
}

fn remove_locked(state: &mut IndexState, id: EntityId) {
    if let Some(keys) = state.keys_of.remove(&id) {
        for key in keys {
            if let Some(bucket) = state.by_key.get_mut(&key) {
                bucket.remove(&id);
                if bucket.is_empty() {
                    state.by_key.remove(&key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use granska_core::ProvenanceId;

    fn entity(entity_type: EntityType, name: &str) -> Entity {
        Entity::new(entity_type, name, 0.9)
    }

    fn orgnummer_record(e: &Entity, value: &str) -> IdentifierRecord {
        IdentifierRecord::new(
            e.id,
            IdentifierType::Organisationsnummer,
            value,
            1.0,
            ProvenanceId::new(),
        )
    }

    #[test]
    fn exact_identifier_short_circuits() {
        let index = BlockingIndex::new();
        let company = entity(EntityType::Company, "EXAMPLE AB");
        index.index_entity(&company, &[orgnummer_record(&company, "5561234567")]);

        let noise = entity(EntityType::Company, "EXAMPLE BYGG AB");
        index.index_entity(&noise, &[]);

        let mention = Mention::new(
            EntityType::Company,
            "Example AB",
            "EXAMPLE",
            ProvenanceId::new(),
        )
        .with_identifier(IdentifierType::Organisationsnummer, "5561234567");

        let set = index.candidates_for(&mention);
        assert!(set.exact_identifier);
        assert_eq!(set.ids.len(), 1);
        assert!(set.ids.contains(&company.id));
    }

    #[test]
    fn phonetic_key_matches_misspelled_name() {
        let index = BlockingIndex::new();
        let company = entity(EntityType::Company, "NORDISK BYGG");
        index.index_entity(&company, &[]);

        let mention = Mention::new(
            EntityType::Company,
            "Nordisc Byg",
            "NORDISC BYG",
            ProvenanceId::new(),
        );
        let set = index.candidates_for(&mention);
        assert!(!set.exact_identifier);
        assert!(set.ids.contains(&company.id));
    }

    #[test]
    fn phonetic_key_is_type_scoped() {
        let index = BlockingIndex::new();
        let person = entity(EntityType::Person, "NORDISK");
        index.index_entity(&person, &[]);

        let mention = Mention::new(
            EntityType::Company,
            "Nordisk",
            "NORDISK",
            ProvenanceId::new(),
        );
        let set = index.candidates_for(&mention);
        assert!(set.ids.is_empty());
    }

    #[test]
    fn person_prefix_year_key() {
        let index = BlockingIndex::new();
        let person = entity(EntityType::Person, "ANNA SVENSSON");
        let pnr = IdentifierRecord::new(
            person.id,
            IdentifierType::Personnummer,
            "198501011236",
            1.0,
            ProvenanceId::new(),
        );
        index.index_entity(&person, &[pnr]);

        let mut mention = Mention::new(
            EntityType::Person,
            "Anna Swensson",
            "ANNA SVENSSON",
            ProvenanceId::new(),
        );
        mention
            .extracted_attributes
            .insert("BIRTH_YEAR".into(), serde_json::json!(1985));
        let set = index.candidates_for(&mention);
        assert!(set.ids.contains(&person.id));
    }

    #[test]
    fn postal_prefix_key_for_addresses() {
        let index = BlockingIndex::new();
        let address = entity(EntityType::Address, "STORGATAN 12, 114 55 STOCKHOLM");
        index.index_entity(&address, &[]);

        let mention = Mention::new(
            EntityType::Address,
            "Storgatan 14, 114 56 Stockholm",
            "STORGATAN 14, 114 56 STOCKHOLM",
            ProvenanceId::new(),
        );
        let set = index.candidates_for(&mention);
        assert!(set.ids.contains(&address.id));
    }

    #[test]
    fn removal_clears_all_keys() {
        let index = BlockingIndex::new();
        let company = entity(EntityType::Company, "EXAMPLE AB");
        index.index_entity(&company, &[orgnummer_record(&company, "5561234567")]);
        index.remove_entity(company.id);

        let mention = Mention::new(
            EntityType::Company,
            "Example AB",
            "EXAMPLE",
            ProvenanceId::new(),
        )
        .with_identifier(IdentifierType::Organisationsnummer, "5561234567");
        let set = index.candidates_for(&mention);
        assert!(set.ids.is_empty());
    }
}
