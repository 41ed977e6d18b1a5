//! The `Store` facade.
//!
//! Layers the graph semantics over a [`StoreBackend`]: predicate validation,
//! SAME_AS closure with the eldest-representative rule, identifier
//! uniqueness across clusters, current-fact views, and audit chaining.
//! Every public mutation appends its audit entry before returning.

use chrono::{NaiveDate, Utc};
use serde_json::json;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use granska_core::{
    verify_chain, Actor, Alert, AlertId, AuditEntry, AuditEventType, AuditTarget, ChainStatus,
    CoreError, CoreResult, Entity, EntityId, EntityStatus, EntityType, Fact, FactId,
    GroundTruthPair, Hash, IdentifierRecord, IdentifierType, Mention, MentionId, Provenance,
    ProvenanceId, RelationshipPredicate, ResolutionDecision, ResolutionRecord, TargetKind,
};

use crate::backend::StoreBackend;

/// Traversal direction for [`Store::neighbors`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

/// One adjacent edge in the relationship graph
#[derive(Debug, Clone)]
pub struct NeighborEdge {
    pub predicate: RelationshipPredicate,
    pub neighbor: EntityId,
    pub fact: FactId,
    /// True when `neighbor` is the fact's subject (incoming edge)
    pub incoming: bool,
}

#[derive(Debug)]
struct ChainState {
    next_seq: u64,
    last_hash: Hash,
}

/// Transactional operations over the entity-fact data model
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn StoreBackend>,
    chain: Arc<Mutex<Option<ChainState>>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl Store {
    pub fn new(backend: Arc<dyn StoreBackend>) -> Self {
        Self {
            backend,
            chain: Arc::new(Mutex::new(None)),
        }
    }

    pub fn backend(&self) -> &Arc<dyn StoreBackend> {
        &self.backend
    }

    /// Validity reference date for current-fact views
    pub fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    // --- entities ---

    pub async fn create_entity(
        &self,
        entity_type: EntityType,
        canonical_name: impl Into<String>,
        confidence: f64,
        provenance: Provenance,
        actor: Actor,
    ) -> CoreResult<Entity> {
        let entity = Entity::new(entity_type, canonical_name, confidence);
        self.backend.insert_provenance(&provenance).await?;
        self.backend.insert_entity(&entity).await?;
        self.append_audit(
            AuditEventType::EntityCreate,
            actor,
            AuditTarget::new(TargetKind::Entity, entity.id),
            json!({
                "entity_type": entity.entity_type.as_str(),
                "name": entity.canonical_name,
                "provenance": provenance.id.to_string(),
            }),
        )
        .await?;
        Ok(entity)
    }

    /// Create an entity against an already-stored provenance record
    pub async fn create_entity_linked(
        &self,
        entity_type: EntityType,
        canonical_name: impl Into<String>,
        confidence: f64,
        provenance: ProvenanceId,
        actor: Actor,
    ) -> CoreResult<Entity> {
        let entity = Entity::new(entity_type, canonical_name, confidence);
        self.backend.insert_entity(&entity).await?;
        self.append_audit(
            AuditEventType::EntityCreate,
            actor,
            AuditTarget::new(TargetKind::Entity, entity.id),
            json!({
                "entity_type": entity.entity_type.as_str(),
                "name": entity.canonical_name,
                "provenance": provenance.to_string(),
            }),
        )
        .await?;
        Ok(entity)
    }

    pub async fn entity(&self, id: EntityId) -> CoreResult<Entity> {
        self.backend
            .get_entity(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("entity {id}")))
    }

    pub(crate) async fn update_entity(&self, entity: &Entity) -> CoreResult<()> {
        self.backend.update_entity(entity).await
    }

    pub async fn list_entities(
        &self,
        entity_type: Option<EntityType>,
        offset: usize,
        limit: usize,
    ) -> CoreResult<Vec<Entity>> {
        self.backend.list_entities(entity_type, offset, limit).await
    }

    pub async fn count_entities(&self, entity_type: Option<EntityType>) -> CoreResult<u64> {
        self.backend.count_entities(entity_type).await
    }

    pub async fn search_entities_by_name(
        &self,
        needle: &str,
        entity_type: Option<EntityType>,
        limit: usize,
    ) -> CoreResult<Vec<Entity>> {
        self.backend
            .search_entities_by_name(needle, entity_type, limit)
            .await
    }

    /// All entity ids joined to `id` by the SAME_AS equivalence (closure over
    /// current SAME_AS facts in both directions plus merge links), sorted.
    pub async fn same_as_cluster(&self, id: EntityId) -> CoreResult<Vec<EntityId>> {
        let mut seen: BTreeSet<EntityId> = BTreeSet::new();
        let mut queue: VecDeque<EntityId> = VecDeque::new();
        seen.insert(id);
        queue.push_back(id);

        while let Some(current) = queue.pop_front() {
            let mut linked: Vec<EntityId> = Vec::new();

            if let Some(entity) = self.backend.get_entity(current).await? {
                if let Some(target) = entity.merged_into {
                    linked.push(target);
                }
            }
            for fact in self.backend.facts_by_subject(current).await? {
                if fact.superseded_by.is_none() {
                    if let granska_core::FactBody::Relationship {
                        predicate: RelationshipPredicate::SameAs,
                        object,
                    } = fact.body
                    {
                        linked.push(object);
                    }
                }
            }
            for fact in self.backend.facts_by_object(current).await? {
                if fact.superseded_by.is_none()
                    && fact.predicate() == RelationshipPredicate::SameAs.as_str()
                {
                    linked.push(fact.subject);
                }
            }

            for next in linked {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        Ok(seen.into_iter().collect())
    }

    /// The canonical representative of `id`'s identity cluster: the eldest
    /// ACTIVE member by `created_at`, tiebroken on id. Falls back to the
    /// eldest member when the cluster holds no ACTIVE entity.
    pub async fn canonical_entity(&self, id: EntityId) -> CoreResult<Entity> {
        let cluster = self.same_as_cluster(id).await?;
        let mut members = Vec::with_capacity(cluster.len());
        for member in cluster {
            if let Some(entity) = self.backend.get_entity(member).await? {
                members.push(entity);
            }
        }
        if members.is_empty() {
            return Err(CoreError::NotFound(format!("entity {id}")));
        }
        members.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let canonical = members
            .iter()
            .find(|e| e.status == EntityStatus::Active)
            .or(members.first())
            .cloned()
            .expect("members is non-empty");
        Ok(canonical)
    }

    // --- identifiers ---

    /// Attach an identifier. Fails with `DuplicateIdentifier` when another
    /// identity cluster already carries `(type, value)`.
    pub async fn add_identifier(
        &self,
        entity: EntityId,
        id_type: IdentifierType,
        value: impl Into<String>,
        confidence: f64,
        validity: (Option<NaiveDate>, Option<NaiveDate>),
        provenance: Provenance,
    ) -> CoreResult<IdentifierRecord> {
        let value = value.into();
        self.entity(entity).await?;

        let holders = self.backend.identifiers_by_value(id_type, &value).await?;
        if !holders.is_empty() {
            let own_cluster = self.same_as_cluster(entity).await?;
            for holder in &holders {
                if !own_cluster.contains(&holder.entity) {
                    return Err(CoreError::DuplicateIdentifier {
                        id_type: id_type.as_str().to_string(),
                        value,
                    });
                }
            }
        }

        let record = IdentifierRecord::new(entity, id_type, value, confidence, provenance.id)
            .with_validity(validity.0, validity.1);
        self.backend.insert_provenance(&provenance).await?;
        self.backend.insert_identifier(&record).await?;
        Ok(record)
    }

    /// Like [`Store::add_identifier`], against an already-stored provenance
    pub async fn add_identifier_linked(
        &self,
        entity: EntityId,
        id_type: IdentifierType,
        value: impl Into<String>,
        confidence: f64,
        provenance: ProvenanceId,
    ) -> CoreResult<IdentifierRecord> {
        let value = value.into();
        self.entity(entity).await?;

        let holders = self.backend.identifiers_by_value(id_type, &value).await?;
        if !holders.is_empty() {
            let own_cluster = self.same_as_cluster(entity).await?;
            for holder in &holders {
                if !own_cluster.contains(&holder.entity) {
                    return Err(CoreError::DuplicateIdentifier {
                        id_type: id_type.as_str().to_string(),
                        value,
                    });
                }
            }
        }

        let record = IdentifierRecord::new(entity, id_type, value, confidence, provenance);
        self.backend.insert_identifier(&record).await?;
        Ok(record)
    }

    /// Canonical ACTIVE representative holding `(type, value)`, through the
    /// SAME_AS closure.
    pub async fn lookup_by_identifier(
        &self,
        id_type: IdentifierType,
        value: &str,
    ) -> CoreResult<Option<Entity>> {
        let holders = self.backend.identifiers_by_value(id_type, value).await?;
        let Some(first) = holders.first() else {
            return Ok(None);
        };
        Ok(Some(self.canonical_entity(first.entity).await?))
    }

    pub async fn identifiers_for_entity(
        &self,
        entity: EntityId,
    ) -> CoreResult<Vec<IdentifierRecord>> {
        self.backend.identifiers_for_entity(entity).await
    }

    pub async fn identifiers_by_prefix(
        &self,
        prefix: &str,
        limit: usize,
    ) -> CoreResult<Vec<IdentifierRecord>> {
        self.backend.identifiers_by_prefix(prefix, limit).await
    }

    // --- facts ---

    async fn validate_fact(&self, fact: &Fact) -> CoreResult<()> {
        if self.backend.get_entity(fact.subject).await?.is_none() {
            return Err(CoreError::NotFound(format!(
                "fact subject {}",
                fact.subject
            )));
        }
        match &fact.body {
            granska_core::FactBody::Relationship { object, .. } => {
                if self.backend.get_entity(*object).await?.is_none() {
                    return Err(CoreError::NotFound(format!("fact object {object}")));
                }
            }
            granska_core::FactBody::Attribute { predicate, .. } => {
                if predicate.is_empty()
                    || !predicate
                        .chars()
                        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
                {
                    return Err(CoreError::Validation(format!(
                        "attribute predicate must be UPPER_SNAKE: {predicate:?}"
                    )));
                }
            }
        }
        if let Some(derivation) = &fact.derivation {
            if derivation.derived_from.is_empty() {
                return Err(CoreError::Invariant(
                    "derived fact must list at least one source fact".to_string(),
                ));
            }
            for source in &derivation.derived_from {
                match self.backend.get_fact(*source).await? {
                    None => {
                        return Err(CoreError::NotFound(format!("derivation source {source}")))
                    }
                    Some(f) if f.superseded_by.is_some() => {
                        return Err(CoreError::Invariant(format!(
                            "derivation source {source} is superseded"
                        )))
                    }
                    Some(_) => {}
                }
            }
        }
        if !(0.0..=1.0).contains(&fact.confidence) {
            return Err(CoreError::Validation(format!(
                "confidence out of range: {}",
                fact.confidence
            )));
        }
        Ok(())
    }

    pub async fn add_fact(&self, fact: Fact, actor: Actor) -> CoreResult<Fact> {
        self.validate_fact(&fact).await?;
        self.backend.insert_fact(&fact).await?;
        self.append_audit(
            AuditEventType::FactCreate,
            actor,
            AuditTarget::new(TargetKind::Fact, fact.id),
            json!({
                "subject": fact.subject.to_string(),
                "predicate": fact.predicate(),
                "derived": fact.is_derived(),
            }),
        )
        .await?;
        Ok(fact)
    }

    /// Atomic supersession: the old fact is never deleted, only stamped.
    pub async fn supersede_fact(
        &self,
        old_id: FactId,
        new_fact: Fact,
        actor: Actor,
    ) -> CoreResult<Fact> {
        if old_id == new_fact.id {
            return Err(CoreError::Invariant(
                "a fact cannot supersede itself".to_string(),
            ));
        }
        // Old fact must exist before validation touches the new one
        self.backend
            .get_fact(old_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("fact {old_id}")))?;
        self.validate_fact(&new_fact).await?;

        let now = Utc::now();
        self.backend.supersede_fact(old_id, &new_fact, now).await?;
        self.append_audit(
            AuditEventType::FactSupersede,
            actor,
            AuditTarget::new(TargetKind::Fact, new_fact.id),
            json!({
                "superseded": old_id.to_string(),
                "superseding": new_fact.id.to_string(),
                "predicate": new_fact.predicate(),
            }),
        )
        .await?;
        Ok(new_fact)
    }

    pub async fn fact(&self, id: FactId) -> CoreResult<Fact> {
        self.backend
            .get_fact(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("fact {id}")))
    }

    /// Unsuperseded facts of `subject` with active validity, optionally
    /// restricted to one predicate.
    pub async fn current_facts(
        &self,
        subject: EntityId,
        predicate: Option<&str>,
    ) -> CoreResult<Vec<Fact>> {
        let today = Self::today();
        Ok(self
            .backend
            .facts_by_subject(subject)
            .await?
            .into_iter()
            .filter(|f| f.is_current(today))
            .filter(|f| predicate.map_or(true, |p| f.predicate() == p))
            .collect())
    }

    /// Unsuperseded facts of `subject` regardless of validity window; the
    /// view history-based derivations (dissolved companies, velocities) use.
    pub async fn unsuperseded_facts(
        &self,
        subject: EntityId,
        predicate: Option<&str>,
    ) -> CoreResult<Vec<Fact>> {
        Ok(self
            .backend
            .facts_by_subject(subject)
            .await?
            .into_iter()
            .filter(|f| f.superseded_by.is_none())
            .filter(|f| predicate.map_or(true, |p| f.predicate() == p))
            .collect())
    }

    /// Current facts with the given predicate, store-wide
    pub async fn current_facts_by_predicate(&self, predicate: &str) -> CoreResult<Vec<Fact>> {
        let today = Self::today();
        Ok(self
            .backend
            .facts_by_predicate(predicate)
            .await?
            .into_iter()
            .filter(|f| f.is_current(today))
            .collect())
    }

    /// Adjacent entities over current relationship facts
    pub async fn neighbors(
        &self,
        entity: EntityId,
        predicates: Option<&[RelationshipPredicate]>,
        direction: Direction,
        limit: Option<usize>,
    ) -> CoreResult<Vec<NeighborEdge>> {
        let today = Self::today();
        let wanted = |p: RelationshipPredicate| predicates.map_or(true, |ps| ps.contains(&p));
        let mut edges = Vec::new();

        if matches!(direction, Direction::Outgoing | Direction::Both) {
            for fact in self.backend.facts_by_subject(entity).await? {
                if !fact.is_current(today) {
                    continue;
                }
                if let granska_core::FactBody::Relationship { predicate, object } = fact.body {
                    if wanted(predicate) {
                        edges.push(NeighborEdge {
                            predicate,
                            neighbor: object,
                            fact: fact.id,
                            incoming: false,
                        });
                    }
                }
            }
        }
        if matches!(direction, Direction::Incoming | Direction::Both) {
            for fact in self.backend.facts_by_object(entity).await? {
                if !fact.is_current(today) {
                    continue;
                }
                if let granska_core::FactBody::Relationship { predicate, .. } = fact.body {
                    if wanted(predicate) {
                        edges.push(NeighborEdge {
                            predicate,
                            neighbor: fact.subject,
                            fact: fact.id,
                            incoming: true,
                        });
                    }
                }
            }
        }

        edges.sort_by_key(|e| (e.neighbor, e.fact));
        if let Some(limit) = limit {
            edges.truncate(limit);
        }
        Ok(edges)
    }

    // --- mentions ---

    pub async fn create_mention(
        &self,
        mut mention: Mention,
        provenance: Provenance,
    ) -> CoreResult<Mention> {
        mention.provenance = provenance.id;
        self.backend.insert_provenance(&provenance).await?;
        self.backend.insert_mention(&mention).await?;
        debug!(mention = %mention.id, mention_type = %mention.mention_type, "mention created");
        Ok(mention)
    }

    pub async fn mention(&self, id: MentionId) -> CoreResult<Mention> {
        self.backend
            .get_mention(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("mention {id}")))
    }

    /// Bind a mention to its terminal resolution. A mention resolves exactly
    /// once; a second call is an invariant violation.
    pub async fn resolve_mention(
        &self,
        id: MentionId,
        resolution: ResolutionRecord,
    ) -> CoreResult<Mention> {
        if !resolution.status.is_terminal() {
            return Err(CoreError::Validation(
                "resolution status must be terminal".to_string(),
            ));
        }
        let mut mention = self.mention(id).await?;
        if mention.is_resolved() {
            return Err(CoreError::Invariant(format!(
                "mention {id} already resolved"
            )));
        }
        mention.resolution = resolution;
        self.backend.update_mention(&mention).await?;
        Ok(mention)
    }

    pub async fn pending_mentions(&self, limit: usize) -> CoreResult<Vec<Mention>> {
        self.backend.pending_mentions(limit).await
    }

    // --- provenance ---

    pub async fn add_provenance(&self, provenance: Provenance) -> CoreResult<ProvenanceId> {
        let id = provenance.id;
        self.backend.insert_provenance(&provenance).await?;
        Ok(id)
    }

    pub async fn provenance(&self, id: ProvenanceId) -> CoreResult<Provenance> {
        self.backend
            .get_provenance(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("provenance {id}")))
    }

    // --- decisions ---

    pub async fn record_decision(
        &self,
        decision: &ResolutionDecision,
        actor: Actor,
    ) -> CoreResult<()> {
        self.backend.insert_decision(decision).await?;
        self.append_audit(
            AuditEventType::ResolutionDecision,
            actor,
            AuditTarget::new(TargetKind::Decision, decision.id),
            json!({
                "mention": decision.mention.to_string(),
                "best_score": decision.best_score,
                "outcome": serde_json::to_value(&decision.outcome)?,
                "reason": decision.reason,
            }),
        )
        .await?;
        Ok(())
    }

    pub async fn record_review(
        &self,
        decision: &ResolutionDecision,
        actor: Actor,
    ) -> CoreResult<()> {
        self.backend.update_decision(decision).await?;
        self.append_audit(
            AuditEventType::HumanReview,
            actor,
            AuditTarget::new(TargetKind::Decision, decision.id),
            json!({
                "mention": decision.mention.to_string(),
                "outcome": serde_json::to_value(&decision.outcome)?,
                "reviewer": decision.reviewer,
            }),
        )
        .await?;
        Ok(())
    }

    pub async fn decision(&self, id: granska_core::DecisionId) -> CoreResult<ResolutionDecision> {
        self.backend
            .get_decision(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("decision {id}")))
    }

    pub async fn pending_decisions(
        &self,
        mention_type: Option<EntityType>,
        limit: usize,
    ) -> CoreResult<Vec<ResolutionDecision>> {
        self.backend.pending_decisions(mention_type, limit).await
    }

    // --- alerts ---

    pub async fn create_alert(&self, alert: Alert, actor: Actor) -> CoreResult<Alert> {
        self.backend.insert_alert(&alert).await?;
        self.append_audit(
            AuditEventType::AlertCreate,
            actor,
            AuditTarget::new(TargetKind::Alert, alert.id),
            json!({
                "entity": alert.entity.to_string(),
                "alert_type": alert.alert_type,
                "risk_score": alert.risk_score,
                "signals": alert.signals.iter().map(|s| s.name()).collect::<Vec<_>>(),
            }),
        )
        .await?;
        Ok(alert)
    }

    pub async fn acknowledge_alert(&self, id: AlertId, by: &str) -> CoreResult<Alert> {
        let mut alert = self
            .backend
            .get_alert(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("alert {id}")))?;
        if alert.acknowledged {
            return Err(CoreError::Invariant(format!(
                "alert {id} already acknowledged"
            )));
        }
        alert.acknowledged = true;
        alert.acknowledged_by = Some(by.to_string());
        alert.acknowledged_at = Some(Utc::now());
        self.backend.update_alert(&alert).await?;
        Ok(alert)
    }

    pub async fn alerts(
        &self,
        acknowledged: Option<bool>,
        limit: usize,
    ) -> CoreResult<Vec<Alert>> {
        self.backend.list_alerts(acknowledged, limit).await
    }

    // --- ground truth ---

    pub async fn add_ground_truth(&self, pair: GroundTruthPair) -> CoreResult<()> {
        self.backend.insert_ground_truth(&pair).await
    }

    pub async fn ground_truth(&self) -> CoreResult<Vec<GroundTruthPair>> {
        self.backend.ground_truth().await
    }

    // --- audit ---

    /// Append a chained audit entry. Serialized under the chain lock so
    /// entries appear in commit order.
    pub async fn append_audit(
        &self,
        event_type: AuditEventType,
        actor: Actor,
        target: AuditTarget,
        payload: serde_json::Value,
    ) -> CoreResult<AuditEntry> {
        let mut chain = self.chain.lock().await;
        if chain.is_none() {
            *chain = Some(match self.backend.last_audit().await? {
                Some(last) => ChainState {
                    next_seq: last.sequence_number + 1,
                    last_hash: last.entry_hash,
                },
                None => ChainState {
                    next_seq: 0,
                    last_hash: Hash::ZERO,
                },
            });
        }
        let state = chain.as_mut().expect("chain state initialized above");

        let entry = AuditEntry::build(
            event_type,
            actor,
            target,
            payload,
            &state.last_hash,
            state.next_seq,
        );
        self.backend.append_audit(&entry).await?;
        state.next_seq += 1;
        state.last_hash = entry.entry_hash.clone();
        Ok(entry)
    }

    pub async fn audit_entries(&self) -> CoreResult<Vec<AuditEntry>> {
        self.backend.audit_entries().await
    }

    /// Walk the whole log and recompute every hash
    pub async fn verify_audit(&self) -> CoreResult<ChainStatus> {
        let entries = self.backend.audit_entries().await?;
        Ok(verify_chain(&entries))
    }

    /// JSON Lines export for downstream SIEM handoff
    pub async fn export_audit_jsonl(&self) -> CoreResult<String> {
        let entries = self.backend.audit_entries().await?;
        let lines: Vec<String> = entries
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<_, _>>()?;
        Ok(lines.join("\n"))
    }
}
