//! Facts: temporal, provenance-tracked, supersedable assertions.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, FactId, ProvenanceId};

/// Closed vocabulary of relationship predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipPredicate {
    DirectorOf,
    ShareholderOf,
    RegisteredAt,
    SameAs,
}

impl RelationshipPredicate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectorOf => "DIRECTOR_OF",
            Self::ShareholderOf => "SHAREHOLDER_OF",
            Self::RegisteredAt => "REGISTERED_AT",
            Self::SameAs => "SAME_AS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DIRECTOR_OF" => Some(Self::DirectorOf),
            "SHAREHOLDER_OF" => Some(Self::ShareholderOf),
            "REGISTERED_AT" => Some(Self::RegisteredAt),
            "SAME_AS" => Some(Self::SameAs),
            _ => None,
        }
    }

    /// The structural predicates traversed by network clustering
    pub const NETWORK: [RelationshipPredicate; 3] =
        [Self::DirectorOf, Self::ShareholderOf, Self::RegisteredAt];
}

impl std::fmt::Display for RelationshipPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived attribute predicates written by the derivation engine
pub mod derived {
    pub const RISK_SCORE: &str = "RISK_SCORE";
    pub const SHELL_INDICATOR: &str = "SHELL_INDICATOR";
    pub const DIRECTOR_VELOCITY: &str = "DIRECTOR_VELOCITY";
    pub const NETWORK_CLUSTER: &str = "NETWORK_CLUSTER";
    pub const REGISTRATION_HUB: &str = "IS_REGISTRATION_HUB";

    pub const ALL: [&str; 5] = [
        RISK_SCORE,
        SHELL_INDICATOR,
        DIRECTOR_VELOCITY,
        NETWORK_CLUSTER,
        REGISTRATION_HUB,
    ];
}

/// Attribute predicates whose values are cleared on anonymization
const PII_PREDICATES: &[&str] = &[
    "NAME",
    "BIRTH_DATE",
    "ADDRESS",
    "PHONE",
    "EMAIL",
    "NATIONALITY",
];

/// Whether an attribute predicate carries personally identifying values
pub fn is_pii_predicate(predicate: &str) -> bool {
    PII_PREDICATES.contains(&predicate)
}

/// Typed attribute values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FactValue {
    Text(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    Date(NaiveDate),
    Tags(Vec<String>),
    Json(serde_json::Value),
}

impl FactValue {
    /// Render for logs and decision payloads
    pub fn summary(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Decimal(d) => format!("{d:.4}"),
            Self::Boolean(b) => b.to_string(),
            Self::Date(d) => d.to_string(),
            Self::Tags(t) => t.join(","),
            Self::Json(v) => v.to_string(),
        }
    }
}

/// A fact is either a typed attribute or a directed relationship
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "fact_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FactBody {
    Attribute {
        predicate: String,
        value: FactValue,
    },
    Relationship {
        predicate: RelationshipPredicate,
        object: EntityId,
    },
}

impl FactBody {
    pub fn predicate(&self) -> &str {
        match self {
            Self::Attribute { predicate, .. } => predicate,
            Self::Relationship { predicate, .. } => predicate.as_str(),
        }
    }

    pub fn object(&self) -> Option<EntityId> {
        match self {
            Self::Relationship { object, .. } => Some(*object),
            Self::Attribute { .. } => None,
        }
    }

    pub fn value(&self) -> Option<&FactValue> {
        match self {
            Self::Attribute { value, .. } => Some(value),
            Self::Relationship { .. } => None,
        }
    }
}

/// Lineage metadata on derived facts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Derivation {
    /// `rule_name@version` tag of the producing run
    pub rule_name: String,
    /// Base facts this value was computed from; never empty
    pub derived_from: Vec<FactId>,
}

/// A single assertion about a subject entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub id: FactId,
    pub subject: EntityId,
    #[serde(flatten)]
    pub body: FactBody,
    /// Day-granularity start of validity
    pub valid_from: NaiveDate,
    pub valid_to: Option<NaiveDate>,
    pub confidence: f64,
    pub provenance: ProvenanceId,
    pub created_at: DateTime<Utc>,
    pub superseded_by: Option<FactId>,
    pub superseded_at: Option<DateTime<Utc>>,
    pub derivation: Option<Derivation>,
}

impl Fact {
    pub fn attribute(
        subject: EntityId,
        predicate: impl Into<String>,
        value: FactValue,
        valid_from: NaiveDate,
        confidence: f64,
        provenance: ProvenanceId,
    ) -> Self {
        Self {
            id: FactId::new(),
            subject,
            body: FactBody::Attribute {
                predicate: predicate.into(),
                value,
            },
            valid_from,
            valid_to: None,
            confidence: confidence.clamp(0.0, 1.0),
            provenance,
            created_at: Utc::now(),
            superseded_by: None,
            superseded_at: None,
            derivation: None,
        }
    }

    pub fn relationship(
        subject: EntityId,
        predicate: RelationshipPredicate,
        object: EntityId,
        valid_from: NaiveDate,
        confidence: f64,
        provenance: ProvenanceId,
    ) -> Self {
        Self {
            id: FactId::new(),
            subject,
            body: FactBody::Relationship { predicate, object },
            valid_from,
            valid_to: None,
            confidence: confidence.clamp(0.0, 1.0),
            provenance,
            created_at: Utc::now(),
            superseded_by: None,
            superseded_at: None,
            derivation: None,
        }
    }

    pub fn with_valid_to(mut self, valid_to: Option<NaiveDate>) -> Self {
        self.valid_to = valid_to;
        self
    }

    pub fn with_derivation(mut self, rule_name: impl Into<String>, derived_from: Vec<FactId>) -> Self {
        self.derivation = Some(Derivation {
            rule_name: rule_name.into(),
            derived_from,
        });
        self
    }

    pub fn is_derived(&self) -> bool {
        self.derivation.is_some()
    }

    /// A fact is current iff it is unsuperseded and its validity covers `as_of`
    pub fn is_current(&self, as_of: NaiveDate) -> bool {
        self.superseded_by.is_none() && self.valid_to.map_or(true, |end| end >= as_of)
    }

    pub fn predicate(&self) -> &str {
        self.body.predicate()
    }

    pub fn object(&self) -> Option<EntityId> {
        self.body.object()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ProvenanceId;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn currency_requires_open_or_future_valid_to() {
        let subject = EntityId::new();
        let f = Fact::attribute(
            subject,
            "EMPLOYEE_COUNT",
            FactValue::Integer(0),
            day(2024, 1, 1),
            1.0,
            ProvenanceId::new(),
        );
        assert!(f.is_current(day(2025, 6, 1)));

        let ended = f.clone().with_valid_to(Some(day(2025, 1, 1)));
        assert!(!ended.is_current(day(2025, 6, 1)));
        assert!(ended.is_current(day(2025, 1, 1)));
    }

    #[test]
    fn superseded_fact_is_never_current() {
        let subject = EntityId::new();
        let mut f = Fact::attribute(
            subject,
            "REVENUE",
            FactValue::Integer(100),
            day(2024, 1, 1),
            1.0,
            ProvenanceId::new(),
        );
        f.superseded_by = Some(FactId::new());
        assert!(!f.is_current(day(2024, 2, 1)));
    }

    #[test]
    fn relationship_predicate_parse_round_trip() {
        for p in [
            RelationshipPredicate::DirectorOf,
            RelationshipPredicate::ShareholderOf,
            RelationshipPredicate::RegisteredAt,
            RelationshipPredicate::SameAs,
        ] {
            assert_eq!(RelationshipPredicate::parse(p.as_str()), Some(p));
        }
        assert_eq!(RelationshipPredicate::parse("OWNS"), None);
    }
}
