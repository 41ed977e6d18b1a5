//! National identifier records attached to entities.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{EntityId, ProvenanceId};

/// Kinds of identifiers the store indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentifierType {
    Personnummer,
    Samordningsnummer,
    Organisationsnummer,
    PostalCode,
    PropertyId,
}

impl IdentifierType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Personnummer => "PERSONNUMMER",
            Self::Samordningsnummer => "SAMORDNINGSNUMMER",
            Self::Organisationsnummer => "ORGANISATIONSNUMMER",
            Self::PostalCode => "POSTAL_CODE",
            Self::PropertyId => "PROPERTY_ID",
        }
    }

    /// Identifier types that uniquely pin a real-world identity.
    /// A match on one of these short-circuits feature scoring.
    pub fn is_definitive(&self) -> bool {
        matches!(
            self,
            Self::Personnummer | Self::Samordningsnummer | Self::Organisationsnummer
        )
    }
}

impl std::fmt::Display for IdentifierType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An identifier row: `(entity, type, value)` is unique store-wide
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifierRecord {
    pub id: Uuid,
    pub entity: EntityId,
    pub id_type: IdentifierType,
    /// Normalized value (12-digit personnummer, 10-digit orgnummer, ...)
    pub value: String,
    pub confidence: f64,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
    pub provenance: ProvenanceId,
    pub created_at: DateTime<Utc>,
}

impl IdentifierRecord {
    pub fn new(
        entity: EntityId,
        id_type: IdentifierType,
        value: impl Into<String>,
        confidence: f64,
        provenance: ProvenanceId,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity,
            id_type,
            value: value.into(),
            confidence: confidence.clamp(0.0, 1.0),
            valid_from: None,
            valid_to: None,
            provenance,
            created_at: Utc::now(),
        }
    }

    pub fn with_validity(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.valid_from = from;
        self.valid_to = to;
        self
    }
}
