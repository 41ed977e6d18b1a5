//! Entity records and lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::EntityId;

/// The four entity kinds known to the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Person,
    Company,
    Address,
    Event,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "PERSON",
            Self::Company => "COMPANY",
            Self::Address => "ADDRESS",
            Self::Event => "EVENT",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an entity.
///
/// Exactly one entity per identity cluster is `Active`; the rest point at it
/// through `merged_into`. `Anonymized` is terminal and irreversible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityStatus {
    Active,
    Merged,
    Split,
    Anonymized,
}

/// An entity in the resolved graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub entity_type: EntityType,
    /// Display string; replaced with an opaque token on anonymization
    pub canonical_name: String,
    /// Confidence that this entity is correctly resolved, in [0, 1]
    pub resolution_confidence: f64,
    pub status: EntityStatus,
    pub merged_into: Option<EntityId>,
    pub split_from: Option<EntityId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub anonymized_at: Option<DateTime<Utc>>,
}

impl Entity {
    /// Create a fresh ACTIVE entity
    pub fn new(entity_type: EntityType, canonical_name: impl Into<String>, confidence: f64) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            entity_type,
            canonical_name: canonical_name.into(),
            resolution_confidence: confidence.clamp(0.0, 1.0),
            status: EntityStatus::Active,
            merged_into: None,
            split_from: None,
            created_at: now,
            updated_at: now,
            anonymized_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == EntityStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entity_is_active() {
        let e = Entity::new(EntityType::Company, "EXAMPLE AB", 0.9);
        assert!(e.is_active());
        assert!(e.merged_into.is_none());
        assert_eq!(e.resolution_confidence, 0.9);
    }

    #[test]
    fn confidence_is_clamped() {
        let e = Entity::new(EntityType::Person, "A", 1.7);
        assert_eq!(e.resolution_confidence, 1.0);
    }
}
