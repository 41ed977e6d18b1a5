//! Storage backend trait.
//!
//! Backends implement typed per-collection operations; the [`crate::Store`]
//! facade layers the graph semantics (SAME_AS closure, predicate validation,
//! audit chaining) on top. Both backends must pass the shared conformance
//! suite in `tests/`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use uuid::Uuid;

use granska_core::{
    Alert, AlertId, AuditEntry, CoreResult, DecisionId, Entity, EntityId, EntityType, Fact,
    FactId, GroundTruthPair, IdentifierRecord, IdentifierType, Mention, MentionId, Provenance,
    ProvenanceId, ResolutionDecision,
};

/// Object-safe storage contract for all core collections
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Check if the backend can serve requests
    async fn is_healthy(&self) -> bool;

    // --- entities ---

    async fn insert_entity(&self, entity: &Entity) -> CoreResult<()>;
    async fn get_entity(&self, id: EntityId) -> CoreResult<Option<Entity>>;
    async fn update_entity(&self, entity: &Entity) -> CoreResult<()>;
    /// Stable id-ordered page of entities, optionally filtered by type
    async fn list_entities(
        &self,
        entity_type: Option<EntityType>,
        offset: usize,
        limit: usize,
    ) -> CoreResult<Vec<Entity>>;
    async fn count_entities(&self, entity_type: Option<EntityType>) -> CoreResult<u64>;
    /// Case-insensitive substring match on canonical_name, id-ordered
    async fn search_entities_by_name(
        &self,
        needle: &str,
        entity_type: Option<EntityType>,
        limit: usize,
    ) -> CoreResult<Vec<Entity>>;

    // --- identifiers ---

    /// Fails with `DuplicateIdentifier` on an existing `(entity, type, value)` row
    async fn insert_identifier(&self, record: &IdentifierRecord) -> CoreResult<()>;
    async fn identifiers_for_entity(&self, entity: EntityId) -> CoreResult<Vec<IdentifierRecord>>;
    /// All rows carrying `(type, value)`, across entities
    async fn identifiers_by_value(
        &self,
        id_type: IdentifierType,
        value: &str,
    ) -> CoreResult<Vec<IdentifierRecord>>;
    /// Rows whose value starts with `prefix` (identifier search)
    async fn identifiers_by_prefix(
        &self,
        prefix: &str,
        limit: usize,
    ) -> CoreResult<Vec<IdentifierRecord>>;
    /// Remove every identifier of an entity; returns the removed count
    async fn delete_identifiers(&self, entity: EntityId) -> CoreResult<u64>;

    // --- facts ---

    async fn insert_fact(&self, fact: &Fact) -> CoreResult<()>;
    async fn get_fact(&self, id: FactId) -> CoreResult<Option<Fact>>;
    async fn facts_by_subject(&self, subject: EntityId) -> CoreResult<Vec<Fact>>;
    async fn facts_by_object(&self, object: EntityId) -> CoreResult<Vec<Fact>>;
    /// All facts with the given predicate (current filtering is the caller's)
    async fn facts_by_predicate(&self, predicate: &str) -> CoreResult<Vec<Fact>>;
    /// Atomic compare-and-supersede: inserts `new_fact` and stamps
    /// `old.superseded_by = new_fact.id` in one transaction. Fails with
    /// `Conflict` when `old` is already superseded, `NotFound` when absent.
    async fn supersede_fact(
        &self,
        old: FactId,
        new_fact: &Fact,
        at: DateTime<Utc>,
    ) -> CoreResult<()>;
    /// Rewrite a fact in place. Reserved for anonymization value clearing.
    async fn update_fact(&self, fact: &Fact) -> CoreResult<()>;

    // --- mentions ---

    async fn insert_mention(&self, mention: &Mention) -> CoreResult<()>;
    async fn get_mention(&self, id: MentionId) -> CoreResult<Option<Mention>>;
    async fn update_mention(&self, mention: &Mention) -> CoreResult<()>;
    /// Oldest-first page of unresolved mentions
    async fn pending_mentions(&self, limit: usize) -> CoreResult<Vec<Mention>>;

    // --- provenance ---

    async fn insert_provenance(&self, provenance: &Provenance) -> CoreResult<()>;
    async fn get_provenance(&self, id: ProvenanceId) -> CoreResult<Option<Provenance>>;

    // --- resolution decisions ---

    async fn insert_decision(&self, decision: &ResolutionDecision) -> CoreResult<()>;
    async fn get_decision(&self, id: DecisionId) -> CoreResult<Option<ResolutionDecision>>;
    async fn update_decision(&self, decision: &ResolutionDecision) -> CoreResult<()>;
    /// Review queue: pending decisions, priority desc then created_at asc
    async fn pending_decisions(
        &self,
        mention_type: Option<EntityType>,
        limit: usize,
    ) -> CoreResult<Vec<ResolutionDecision>>;

    // --- audit log ---

    async fn append_audit(&self, entry: &AuditEntry) -> CoreResult<()>;
    async fn audit_entries(&self) -> CoreResult<Vec<AuditEntry>>;
    async fn last_audit(&self) -> CoreResult<Option<AuditEntry>>;

    // --- alerts ---

    async fn insert_alert(&self, alert: &Alert) -> CoreResult<()>;
    async fn get_alert(&self, id: AlertId) -> CoreResult<Option<Alert>>;
    async fn update_alert(&self, alert: &Alert) -> CoreResult<()>;
    async fn list_alerts(
        &self,
        acknowledged: Option<bool>,
        limit: usize,
    ) -> CoreResult<Vec<Alert>>;

    // --- validation ground truth ---

    async fn insert_ground_truth(&self, pair: &GroundTruthPair) -> CoreResult<()>;
    async fn ground_truth(&self) -> CoreResult<Vec<GroundTruthPair>>;
}

/// Key used by backends to order identifier rows deterministically
pub(crate) fn identifier_sort_key(r: &IdentifierRecord) -> (DateTime<Utc>, Uuid) {
    (r.created_at, r.id)
}
