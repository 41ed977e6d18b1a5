//! In-memory backend.
//!
//! Reference implementation of the storage semantics: a single `RwLock`
//! around indexed maps, so every backend operation is atomic by
//! construction. Used by tests and small batch runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use granska_core::{
    Alert, AlertId, AuditEntry, CoreError, CoreResult, DecisionId, Entity, EntityId, EntityType,
    Fact, FactId, GroundTruthPair, IdentifierRecord, IdentifierType, Mention, MentionId,
    Provenance, ProvenanceId, ResolutionDecision, ResolutionStatus,
};

use crate::backend::{identifier_sort_key, StoreBackend};

#[derive(Debug, Default)]
struct Inner {
    entities: BTreeMap<EntityId, Entity>,
    identifiers: HashMap<Uuid, IdentifierRecord>,
    ident_by_value: BTreeMap<(IdentifierType, String), Vec<Uuid>>,
    ident_by_entity: HashMap<EntityId, Vec<Uuid>>,
    facts: HashMap<FactId, Fact>,
    facts_by_subject: HashMap<EntityId, Vec<FactId>>,
    facts_by_object: HashMap<EntityId, Vec<FactId>>,
    mentions: BTreeMap<MentionId, Mention>,
    provenances: HashMap<ProvenanceId, Provenance>,
    decisions: HashMap<DecisionId, ResolutionDecision>,
    audit: Vec<AuditEntry>,
    alerts: BTreeMap<AlertId, Alert>,
    ground_truth: Vec<GroundTruthPair>,
}

/// In-memory storage backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: RwLock<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn is_healthy(&self) -> bool {
        true
    }

    async fn insert_entity(&self, entity: &Entity) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.entities.contains_key(&entity.id) {
            return Err(CoreError::Invariant(format!(
                "entity {} already exists",
                entity.id
            )));
        }
        inner.entities.insert(entity.id, entity.clone());
        Ok(())
    }

    async fn get_entity(&self, id: EntityId) -> CoreResult<Option<Entity>> {
        Ok(self.inner.read().await.entities.get(&id).cloned())
    }

    async fn update_entity(&self, entity: &Entity) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        match inner.entities.get_mut(&entity.id) {
            Some(slot) => {
                *slot = entity.clone();
                Ok(())
            }
            None => Err(CoreError::NotFound(format!("entity {}", entity.id))),
        }
    }

    async fn list_entities(
        &self,
        entity_type: Option<EntityType>,
        offset: usize,
        limit: usize,
    ) -> CoreResult<Vec<Entity>> {
        let inner = self.inner.read().await;
        Ok(inner
            .entities
            .values()
            .filter(|e| entity_type.map_or(true, |t| e.entity_type == t))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_entities(&self, entity_type: Option<EntityType>) -> CoreResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner
            .entities
            .values()
            .filter(|e| entity_type.map_or(true, |t| e.entity_type == t))
            .count() as u64)
    }

    async fn search_entities_by_name(
        &self,
        needle: &str,
        entity_type: Option<EntityType>,
        limit: usize,
    ) -> CoreResult<Vec<Entity>> {
        let needle = needle.to_uppercase();
        let inner = self.inner.read().await;
        Ok(inner
            .entities
            .values()
            .filter(|e| entity_type.map_or(true, |t| e.entity_type == t))
            .filter(|e| e.canonical_name.to_uppercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert_identifier(&self, record: &IdentifierRecord) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        let key = (record.id_type, record.value.clone());
        let existing = inner.ident_by_value.get(&key);
        if let Some(ids) = existing {
            let dup = ids.iter().any(|id| {
                inner
                    .identifiers
                    .get(id)
                    .map_or(false, |r| r.entity == record.entity)
            });
            if dup {
                return Err(CoreError::DuplicateIdentifier {
                    id_type: record.id_type.as_str().to_string(),
                    value: record.value.clone(),
                });
            }
        }
        inner.identifiers.insert(record.id, record.clone());
        inner.ident_by_value.entry(key).or_default().push(record.id);
        inner
            .ident_by_entity
            .entry(record.entity)
            .or_default()
            .push(record.id);
        Ok(())
    }

    async fn identifiers_for_entity(&self, entity: EntityId) -> CoreResult<Vec<IdentifierRecord>> {
        let inner = self.inner.read().await;
        let mut records: Vec<IdentifierRecord> = inner
            .ident_by_entity
            .get(&entity)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.identifiers.get(id).cloned())
            .collect();
        records.sort_by_key(identifier_sort_key);
        Ok(records)
    }

    async fn identifiers_by_value(
        &self,
        id_type: IdentifierType,
        value: &str,
    ) -> CoreResult<Vec<IdentifierRecord>> {
        let inner = self.inner.read().await;
        let mut records: Vec<IdentifierRecord> = inner
            .ident_by_value
            .get(&(id_type, value.to_string()))
            .into_iter()
            .flatten()
            .filter_map(|id| inner.identifiers.get(id).cloned())
            .collect();
        records.sort_by_key(identifier_sort_key);
        Ok(records)
    }

    async fn identifiers_by_prefix(
        &self,
        prefix: &str,
        limit: usize,
    ) -> CoreResult<Vec<IdentifierRecord>> {
        let inner = self.inner.read().await;
        let mut records: Vec<IdentifierRecord> = inner
            .identifiers
            .values()
            .filter(|r| r.value.starts_with(prefix))
            .cloned()
            .collect();
        records.sort_by_key(identifier_sort_key);
        records.truncate(limit);
        Ok(records)
    }

    async fn delete_identifiers(&self, entity: EntityId) -> CoreResult<u64> {
        let mut inner = self.inner.write().await;
        let ids = inner.ident_by_entity.remove(&entity).unwrap_or_default();
        let mut removed = 0u64;
        for id in ids {
            if let Some(record) = inner.identifiers.remove(&id) {
                let key = (record.id_type, record.value.clone());
                if let Some(bucket) = inner.ident_by_value.get_mut(&key) {
                    bucket.retain(|x| *x != id);
                    if bucket.is_empty() {
                        inner.ident_by_value.remove(&key);
                    }
                }
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn insert_fact(&self, fact: &Fact) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        insert_fact_locked(&mut inner, fact);
        Ok(())
    }

    async fn get_fact(&self, id: FactId) -> CoreResult<Option<Fact>> {
        Ok(self.inner.read().await.facts.get(&id).cloned())
    }

    async fn facts_by_subject(&self, subject: EntityId) -> CoreResult<Vec<Fact>> {
        let inner = self.inner.read().await;
        Ok(collect_facts(
            &inner,
            inner.facts_by_subject.get(&subject),
        ))
    }

    async fn facts_by_object(&self, object: EntityId) -> CoreResult<Vec<Fact>> {
        let inner = self.inner.read().await;
        Ok(collect_facts(&inner, inner.facts_by_object.get(&object)))
    }

    async fn facts_by_predicate(&self, predicate: &str) -> CoreResult<Vec<Fact>> {
        let inner = self.inner.read().await;
        let mut facts: Vec<Fact> = inner
            .facts
            .values()
            .filter(|f| f.predicate() == predicate)
            .cloned()
            .collect();
        facts.sort_by_key(|f| (f.created_at, f.id));
        Ok(facts)
    }

    async fn supersede_fact(
        &self,
        old: FactId,
        new_fact: &Fact,
        at: DateTime<Utc>,
    ) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        let old_fact = inner
            .facts
            .get_mut(&old)
            .ok_or_else(|| CoreError::NotFound(format!("fact {old}")))?;
        if old_fact.superseded_by.is_some() {
            return Err(CoreError::Conflict(format!(
                "fact {old} already superseded"
            )));
        }
        old_fact.superseded_by = Some(new_fact.id);
        old_fact.superseded_at = Some(at);
        insert_fact_locked(&mut inner, new_fact);
        Ok(())
    }

    async fn update_fact(&self, fact: &Fact) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        match inner.facts.get_mut(&fact.id) {
            Some(slot) => {
                *slot = fact.clone();
                Ok(())
            }
            None => Err(CoreError::NotFound(format!("fact {}", fact.id))),
        }
    }

    async fn insert_mention(&self, mention: &Mention) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.mentions.insert(mention.id, mention.clone());
        Ok(())
    }

    async fn get_mention(&self, id: MentionId) -> CoreResult<Option<Mention>> {
        Ok(self.inner.read().await.mentions.get(&id).cloned())
    }

    async fn update_mention(&self, mention: &Mention) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        match inner.mentions.get_mut(&mention.id) {
            Some(slot) => {
                *slot = mention.clone();
                Ok(())
            }
            None => Err(CoreError::NotFound(format!("mention {}", mention.id))),
        }
    }

    async fn pending_mentions(&self, limit: usize) -> CoreResult<Vec<Mention>> {
        let inner = self.inner.read().await;
        let mut pending: Vec<Mention> = inner
            .mentions
            .values()
            .filter(|m| m.resolution.status == ResolutionStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|m| (m.created_at, m.id));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn insert_provenance(&self, provenance: &Provenance) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.provenances.insert(provenance.id, provenance.clone());
        Ok(())
    }

    async fn get_provenance(&self, id: ProvenanceId) -> CoreResult<Option<Provenance>> {
        Ok(self.inner.read().await.provenances.get(&id).cloned())
    }

    async fn insert_decision(&self, decision: &ResolutionDecision) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.decisions.insert(decision.id, decision.clone());
        Ok(())
    }

    async fn get_decision(&self, id: DecisionId) -> CoreResult<Option<ResolutionDecision>> {
        Ok(self.inner.read().await.decisions.get(&id).cloned())
    }

    async fn update_decision(&self, decision: &ResolutionDecision) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        match inner.decisions.get_mut(&decision.id) {
            Some(slot) => {
                *slot = decision.clone();
                Ok(())
            }
            None => Err(CoreError::NotFound(format!("decision {}", decision.id))),
        }
    }

    async fn pending_decisions(
        &self,
        mention_type: Option<EntityType>,
        limit: usize,
    ) -> CoreResult<Vec<ResolutionDecision>> {
        let inner = self.inner.read().await;
        let mut pending: Vec<ResolutionDecision> = inner
            .decisions
            .values()
            .filter(|d| d.is_pending_review())
            .filter(|d| mention_type.map_or(true, |t| d.mention_type == t))
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        pending.truncate(limit);
        Ok(pending)
    }

    async fn append_audit(&self, entry: &AuditEntry) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(last) = inner.audit.last() {
            if entry.sequence_number <= last.sequence_number {
                return Err(CoreError::Invariant(
                    "audit sequence must be strictly increasing".to_string(),
                ));
            }
        }
        inner.audit.push(entry.clone());
        Ok(())
    }

    async fn audit_entries(&self) -> CoreResult<Vec<AuditEntry>> {
        Ok(self.inner.read().await.audit.clone())
    }

    async fn last_audit(&self) -> CoreResult<Option<AuditEntry>> {
        Ok(self.inner.read().await.audit.last().cloned())
    }

    async fn insert_alert(&self, alert: &Alert) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.alerts.insert(alert.id, alert.clone());
        Ok(())
    }

    async fn get_alert(&self, id: AlertId) -> CoreResult<Option<Alert>> {
        Ok(self.inner.read().await.alerts.get(&id).cloned())
    }

    async fn update_alert(&self, alert: &Alert) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        match inner.alerts.get_mut(&alert.id) {
            Some(slot) => {
                *slot = alert.clone();
                Ok(())
            }
            None => Err(CoreError::NotFound(format!("alert {}", alert.id))),
        }
    }

    async fn list_alerts(
        &self,
        acknowledged: Option<bool>,
        limit: usize,
    ) -> CoreResult<Vec<Alert>> {
        let inner = self.inner.read().await;
        let mut alerts: Vec<Alert> = inner
            .alerts
            .values()
            .filter(|a| acknowledged.map_or(true, |ack| a.acknowledged == ack))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        alerts.truncate(limit);
        Ok(alerts)
    }

    async fn insert_ground_truth(&self, pair: &GroundTruthPair) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.ground_truth.push(pair.clone());
        Ok(())
    }

    async fn ground_truth(&self) -> CoreResult<Vec<GroundTruthPair>> {
        Ok(self.inner.read().await.ground_truth.clone())
    }
}

fn insert_fact_locked(inner: &mut Inner, fact: &Fact) {
    inner.facts.insert(fact.id, fact.clone());
    inner
        .facts_by_subject
        .entry(fact.subject)
        .or_default()
        .push(fact.id);
    if let Some(object) = fact.object() {
        inner.facts_by_object.entry(object).or_default().push(fact.id);
    }
}

fn collect_facts(inner: &Inner, ids: Option<&Vec<FactId>>) -> Vec<Fact> {
    let mut facts: Vec<Fact> = ids
        .into_iter()
        .flatten()
        .filter_map(|id| inner.facts.get(id).cloned())
        .collect();
    facts.sort_by_key(|f| (f.created_at, f.id));
    facts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use granska_core::{FactValue, ProvenanceId};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn duplicate_identifier_rejected_per_entity() {
        let backend = MemoryBackend::new();
        let entity = Entity::new(EntityType::Company, "EXAMPLE AB", 0.9);
        backend.insert_entity(&entity).await.unwrap();

        let rec = IdentifierRecord::new(
            entity.id,
            IdentifierType::Organisationsnummer,
            "5561234567",
            1.0,
            ProvenanceId::new(),
        );
        backend.insert_identifier(&rec).await.unwrap();

        let again = IdentifierRecord::new(
            entity.id,
            IdentifierType::Organisationsnummer,
            "5561234567",
            1.0,
            ProvenanceId::new(),
        );
        let err = backend.insert_identifier(&again).await.unwrap_err();
        assert!(matches!(err, CoreError::DuplicateIdentifier { .. }));
    }

    #[tokio::test]
    async fn supersede_is_a_cas() {
        let backend = MemoryBackend::new();
        let subject = EntityId::new();
        let old = Fact::attribute(
            subject,
            "REVENUE",
            FactValue::Integer(100),
            day(2024, 1, 1),
            1.0,
            ProvenanceId::new(),
        );
        backend.insert_fact(&old).await.unwrap();

        let new_a = Fact::attribute(
            subject,
            "REVENUE",
            FactValue::Integer(200),
            day(2024, 6, 1),
            1.0,
            ProvenanceId::new(),
        );
        backend
            .supersede_fact(old.id, &new_a, Utc::now())
            .await
            .unwrap();

        let new_b = Fact::attribute(
            subject,
            "REVENUE",
            FactValue::Integer(300),
            day(2024, 6, 1),
            1.0,
            ProvenanceId::new(),
        );
        let err = backend
            .supersede_fact(old.id, &new_b, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        // Loser's fact was not inserted
        assert!(backend.get_fact(new_b.id).await.unwrap().is_none());
        let stored = backend.get_fact(old.id).await.unwrap().unwrap();
        assert_eq!(stored.superseded_by, Some(new_a.id));
    }

    #[tokio::test]
    async fn pending_decisions_order_by_priority_then_age() {
        let backend = MemoryBackend::new();
        let mk = |priority| {
            ResolutionDecision::new(
                MentionId::new(),
                EntityType::Person,
                vec![],
                granska_core::DecisionOutcome::PendingReview,
                "ambiguous",
            )
            .with_priority(priority)
        };
        let low = mk(0);
        let high = mk(5);
        backend.insert_decision(&low).await.unwrap();
        backend.insert_decision(&high).await.unwrap();

        let queue = backend.pending_decisions(None, 10).await.unwrap();
        assert_eq!(queue[0].id, high.id);
        assert_eq!(queue[1].id, low.id);
    }
}
