//! Typed identifiers for the main collections.
//!
//! Plain `Uuid` newtypes so a fact id can never be passed where an entity id
//! is expected. Serialized transparently as the inner UUID.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(u: Uuid) -> Self {
                Self(u)
            }
        }
    };
}

id_type!(
    /// Stable opaque identifier of an entity
    EntityId
);
id_type!(
    /// Identifier of a fact (attribute or relationship)
    FactId
);
id_type!(
    /// Identifier of an observed mention
    MentionId
);
id_type!(
    /// Identifier of a provenance record
    ProvenanceId
);
id_type!(
    /// Identifier of an audit log entry
    AuditEntryId
);
id_type!(
    /// Identifier of an alert
    AlertId
);
id_type!(
    /// Identifier of a resolution decision
    DecisionId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_round_trip() {
        let id = EntityId::new();
        let parsed: EntityId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn ordering_is_lexicographic_on_uuid() {
        let a = EntityId(Uuid::nil());
        let b = EntityId::new();
        assert!(a < b || a == b);
    }
}
