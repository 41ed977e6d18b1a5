//! Mentions: observed surface forms prior to resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityType;
use crate::identifier::IdentifierType;
use crate::ids::{EntityId, MentionId, ProvenanceId};

/// Terminal and pending states of mention resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStatus {
    Pending,
    AutoMatched,
    HumanMatched,
    AutoRejected,
    HumanRejected,
}

impl ResolutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// How a resolution was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    ExactIdentifier,
    FeatureScore,
    HumanReview,
    NewEntity,
}

/// Resolution record carried on every mention; written exactly once
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionRecord {
    pub status: ResolutionStatus,
    pub entity: Option<EntityId>,
    pub confidence: Option<f64>,
    pub method: Option<ResolutionMethod>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub reviewer: Option<String>,
}

impl ResolutionRecord {
    pub fn pending() -> Self {
        Self {
            status: ResolutionStatus::Pending,
            entity: None,
            confidence: None,
            method: None,
            resolved_at: None,
            reviewer: None,
        }
    }
}

/// An identifier string extracted from the source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedIdentifier {
    pub id_type: IdentifierType,
    /// Normalized value
    pub value: String,
}

/// An observed surface form delivered by an ingestion adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mention {
    pub id: MentionId,
    pub mention_type: EntityType,
    pub surface_form: String,
    pub normalized_form: String,
    #[serde(default)]
    pub extracted_identifiers: Vec<ExtractedIdentifier>,
    /// Free-form attributes keyed by predicate name
    #[serde(default)]
    pub extracted_attributes: serde_json::Map<String, serde_json::Value>,
    pub provenance: ProvenanceId,
    /// Location within the source document, adapter-defined
    pub document_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolution: ResolutionRecord,
}

impl Mention {
    pub fn new(
        mention_type: EntityType,
        surface_form: impl Into<String>,
        normalized_form: impl Into<String>,
        provenance: ProvenanceId,
    ) -> Self {
        Self {
            id: MentionId::new(),
            mention_type,
            surface_form: surface_form.into(),
            normalized_form: normalized_form.into(),
            extracted_identifiers: Vec::new(),
            extracted_attributes: serde_json::Map::new(),
            provenance,
            document_ref: None,
            created_at: Utc::now(),
            resolution: ResolutionRecord::pending(),
        }
    }

    pub fn with_identifier(mut self, id_type: IdentifierType, value: impl Into<String>) -> Self {
        self.extracted_identifiers.push(ExtractedIdentifier {
            id_type,
            value: value.into(),
        });
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extracted_attributes.insert(key.into(), value);
        self
    }

    pub fn identifier(&self, id_type: IdentifierType) -> Option<&str> {
        self.extracted_identifiers
            .iter()
            .find(|e| e.id_type == id_type)
            .map(|e| e.value.as_str())
    }

    /// First definitive identifier carried by this mention, if any
    pub fn definitive_identifier(&self) -> Option<&ExtractedIdentifier> {
        self.extracted_identifiers
            .iter()
            .find(|e| e.id_type.is_definitive())
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_mention_is_pending() {
        let m = Mention::new(EntityType::Person, "Anna Svensson", "ANNA SVENSSON", ProvenanceId::new());
        assert_eq!(m.resolution.status, ResolutionStatus::Pending);
        assert!(!m.is_resolved());
    }

    #[test]
    fn definitive_identifier_prefers_national_ids() {
        let m = Mention::new(EntityType::Person, "Anna", "ANNA", ProvenanceId::new())
            .with_identifier(IdentifierType::PostalCode, "11122")
            .with_identifier(IdentifierType::Personnummer, "198501011239");
        let d = m.definitive_identifier().unwrap();
        assert_eq!(d.id_type, IdentifierType::Personnummer);
    }
}
