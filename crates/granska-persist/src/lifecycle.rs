//! Entity lifecycle operations: merge, split, anonymize.
//!
//! All three preserve history. Merge and split work through SAME_AS facts
//! and supersession; anonymize clears PII while keeping structural edges.

use chrono::Utc;
use serde_json::json;
use tracing::info;

use granska_core::{
    is_pii_predicate, Actor, AuditEventType, AuditTarget, CoreError, CoreResult, Entity,
    EntityId, EntityStatus, Fact, FactBody, FactId, FactValue, Hash, Provenance,
    RelationshipPredicate, TargetKind,
};

use crate::store::Store;

impl Store {
    /// Merge two ACTIVE entities. The elder (by `created_at`, tiebreak on id)
    /// becomes canonical; the other transitions to MERGED with a SAME_AS fact
    /// pointing at the canonical. Returns the canonical entity.
    pub async fn merge(
        &self,
        a: EntityId,
        b: EntityId,
        reason: &str,
        confidence: f64,
        actor: Actor,
    ) -> CoreResult<Entity> {
        if a == b {
            return Err(CoreError::Invariant(
                "cannot merge an entity with itself".to_string(),
            ));
        }
        let entity_a = self.entity(a).await?;
        let entity_b = self.entity(b).await?;
        for e in [&entity_a, &entity_b] {
            if e.status != EntityStatus::Active {
                return Err(CoreError::Invariant(format!(
                    "merge requires ACTIVE entities, {} is {:?}",
                    e.id, e.status
                )));
            }
        }
        if entity_a.entity_type != entity_b.entity_type {
            return Err(CoreError::Invariant(format!(
                "cannot merge {} with {}",
                entity_a.entity_type, entity_b.entity_type
            )));
        }

        let (canonical, mut secondary) =
            if (entity_a.created_at, entity_a.id) <= (entity_b.created_at, entity_b.id) {
                (entity_a, entity_b)
            } else {
                (entity_b, entity_a)
            };

        let provenance = Provenance::derived("entity_merge", vec![]);
        let provenance_id = provenance.id;
        self.add_provenance(provenance).await?;

        let same_as = Fact::relationship(
            secondary.id,
            RelationshipPredicate::SameAs,
            canonical.id,
            Store::today(),
            confidence,
            provenance_id,
        );
        self.backend().insert_fact(&same_as).await?;

        secondary.status = EntityStatus::Merged;
        secondary.merged_into = Some(canonical.id);
        secondary.updated_at = Utc::now();
        self.update_entity(&secondary).await?;

        self.append_audit(
            AuditEventType::EntityMerge,
            actor,
            AuditTarget::new(TargetKind::Entity, canonical.id),
            json!({
                "canonical": canonical.id.to_string(),
                "merged": secondary.id.to_string(),
                "same_as_fact": same_as.id.to_string(),
                "reason": reason,
                "confidence": confidence,
            }),
        )
        .await?;

        info!(canonical = %canonical.id, merged = %secondary.id, "entities merged");
        Ok(canonical)
    }

    /// Split selected facts off `original` onto a fresh ACTIVE entity.
    /// Each named fact is superseded by a copy with the new subject; the
    /// originals stay in the timeline.
    pub async fn split(
        &self,
        original: EntityId,
        fact_ids: &[FactId],
        reason: &str,
        actor: Actor,
    ) -> CoreResult<Entity> {
        let source = self.entity(original).await?;
        if source.status != EntityStatus::Active {
            return Err(CoreError::Invariant(format!(
                "split requires an ACTIVE entity, {} is {:?}",
                source.id, source.status
            )));
        }
        if fact_ids.is_empty() {
            return Err(CoreError::Validation(
                "split requires at least one fact to move".to_string(),
            ));
        }

        // Validate the whole set before mutating anything
        let today = Store::today();
        let mut to_move = Vec::with_capacity(fact_ids.len());
        for id in fact_ids {
            let fact = self.fact(*id).await?;
            if fact.subject != original {
                return Err(CoreError::Invariant(format!(
                    "fact {id} does not belong to {original}"
                )));
            }
            if !fact.is_current(today) {
                return Err(CoreError::Invariant(format!("fact {id} is not current")));
            }
            to_move.push(fact);
        }

        let mut child = Entity::new(
            source.entity_type,
            source.canonical_name.clone(),
            source.resolution_confidence,
        );
        child.split_from = Some(original);
        self.backend().insert_entity(&child).await?;

        let mut moved = Vec::with_capacity(to_move.len());
        for fact in to_move {
            let provenance = Provenance::derived("entity_split", vec![fact.id]);
            let provenance_id = provenance.id;
            self.add_provenance(provenance).await?;

            let mut replacement = fact.clone();
            replacement.id = FactId::new();
            replacement.subject = child.id;
            replacement.provenance = provenance_id;
            replacement.created_at = Utc::now();
            replacement.superseded_by = None;
            replacement.superseded_at = None;

            self.backend()
                .supersede_fact(fact.id, &replacement, Utc::now())
                .await?;
            moved.push((fact.id, replacement.id));
        }

        self.append_audit(
            AuditEventType::EntitySplit,
            actor,
            AuditTarget::new(TargetKind::Entity, child.id),
            json!({
                "original": original.to_string(),
                "child": child.id.to_string(),
                "moved_facts": moved
                    .iter()
                    .map(|(old, new)| json!({ "from": old.to_string(), "to": new.to_string() }))
                    .collect::<Vec<_>>(),
                "reason": reason,
            }),
        )
        .await?;

        info!(original = %original, child = %child.id, facts = moved.len(), "entity split");
        Ok(child)
    }

    /// Irreversibly anonymize an entity: opaque name, identifiers removed,
    /// PII attribute values cleared, relationship facts retained. The audit
    /// payload carries only the request reference.
    pub async fn anonymize(
        &self,
        entity_id: EntityId,
        request_ref: &str,
        actor: Actor,
    ) -> CoreResult<Entity> {
        let mut entity = self.entity(entity_id).await?;
        if entity.status == EntityStatus::Anonymized {
            return Err(CoreError::Invariant(format!(
                "entity {entity_id} is already anonymized"
            )));
        }

        let token = Hash::digest(entity_id.as_uuid().as_bytes()).to_hex();
        entity.canonical_name = format!("ANONYMIZED_{}", &token[..16]);
        entity.status = EntityStatus::Anonymized;
        entity.anonymized_at = Some(Utc::now());
        entity.updated_at = Utc::now();
        self.update_entity(&entity).await?;

        let removed = self.backend().delete_identifiers(entity_id).await?;

        let mut cleared = 0usize;
        for fact in self.backend().facts_by_subject(entity_id).await? {
            if let FactBody::Attribute { predicate, value } = &fact.body {
                if is_pii_predicate(predicate) && *value != FactValue::Json(serde_json::Value::Null)
                {
                    let mut blanked = fact.clone();
                    blanked.body = FactBody::Attribute {
                        predicate: predicate.clone(),
                        value: FactValue::Json(serde_json::Value::Null),
                    };
                    self.backend().update_fact(&blanked).await?;
                    cleared += 1;
                }
            }
        }

        self.append_audit(
            AuditEventType::EntityAnonymize,
            actor,
            AuditTarget::new(TargetKind::Entity, entity_id),
            json!({
                "request_ref": request_ref,
                "identifiers_removed": removed,
                "attributes_cleared": cleared,
            }),
        )
        .await?;

        info!(entity = %entity_id, identifiers = removed, "entity anonymized");
        Ok(entity)
    }
}
