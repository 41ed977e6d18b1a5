//! The resolver: blocking → scoring → decision → attach.
//!
//! Per-mention pipeline with deterministic candidate ordering, threshold
//! routing into auto-match / review queue / new entity, source-authority
//! conflict resolution for attached facts, and bounded CAS retries.

use chrono::NaiveDate;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use granska_core::{
    Actor, CoreConfig, CoreError, CoreResult, DecisionOutcome, Entity, EntityId, EntityType,
    Fact, FactBody, FactValue, IdentifierType, Mention, Provenance, ResolutionDecision,
    ResolutionMethod, ResolutionRecord, ResolutionStatus, ScoredCandidate,
};
use granska_ident::{parse_address, Orgnummer, Personnummer};
use granska_persist::{Direction, Store};

use crate::blocking::BlockingIndex;
use crate::features::{compare, CompareContext, IDENTIFIER_MATCH_SCORE};

/// Attribute keys that are resolver hints, not facts
const HINT_KEYS: &[&str] = &["BIRTH_YEAR", "DIRECTOR_OF", "DIRECTORS"];

/// Outcome of resolving one mention
#[derive(Debug, Clone)]
pub struct ResolveOutcome {
    pub decision: ResolutionDecision,
    /// Entity the mention was bound to (None while pending review)
    pub entity: Option<EntityId>,
    pub created_new_entity: bool,
}

/// Counts for one batch pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub auto_matched: usize,
    pub queued_for_review: usize,
    pub new_entities: usize,
    pub failed: usize,
}

/// Drives the resolution pipeline over the store
#[derive(Clone, Debug)]
pub struct Resolver {
    store: Store,
    index: Arc<BlockingIndex>,
    config: Arc<CoreConfig>,
}

impl Resolver {
    pub fn new(store: Store, index: Arc<BlockingIndex>, config: Arc<CoreConfig>) -> Self {
        Self {
            store,
            index,
            config,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn index(&self) -> &Arc<BlockingIndex> {
        &self.index
    }

    /// Resolve up to `limit` pending mentions; failures are counted, logged,
    /// and do not abort the batch.
    pub async fn resolve_pending(&self, limit: usize) -> CoreResult<BatchSummary> {
        let (summary, _) = self.resolve_pending_outcomes(limit).await?;
        Ok(summary)
    }

    /// Like [`Resolver::resolve_pending`], returning the per-mention
    /// outcomes so the driver can fan out alert scans on touched entities.
    pub async fn resolve_pending_outcomes(
        &self,
        limit: usize,
    ) -> CoreResult<(BatchSummary, Vec<ResolveOutcome>)> {
        let mut summary = BatchSummary::default();
        let mut outcomes = Vec::new();
        for mention in self.store.pending_mentions(limit).await? {
            summary.processed += 1;
            match self.resolve_mention(&mention).await {
                Ok(outcome) => {
                    match outcome.decision.outcome {
                        DecisionOutcome::AutoMatched { .. } => summary.auto_matched += 1,
                        DecisionOutcome::PendingReview => summary.queued_for_review += 1,
                        DecisionOutcome::NewEntity { .. } => summary.new_entities += 1,
                        _ => {}
                    }
                    outcomes.push(outcome);
                }
                Err(e) => {
                    warn!(mention = %mention.id, error = %e, "mention resolution failed");
                    summary.failed += 1;
                }
            }
        }
        info!(
            processed = summary.processed,
            auto_matched = summary.auto_matched,
            queued = summary.queued_for_review,
            new_entities = summary.new_entities,
            failed = summary.failed,
            "resolution batch complete"
        );
        Ok((summary, outcomes))
    }

    /// Run the full pipeline for one mention
    pub async fn resolve_mention(&self, mention: &Mention) -> CoreResult<ResolveOutcome> {
        let candidate_set = self.index.candidates_for(mention);

        // Canonicalize, keep ACTIVE only, dedupe; BTreeMap gives stable id order
        let mut canonical: BTreeMap<EntityId, Entity> = BTreeMap::new();
        for id in &candidate_set.ids {
            let entity = self.store.canonical_entity(*id).await?;
            if entity.is_active() {
                canonical.insert(entity.id, entity);
            }
        }
        let candidates: Vec<Entity> = canonical.into_values().collect();

        if candidates.is_empty() {
            return self
                .bind_new_entity(mention, Vec::new(), "no candidates from blocking")
                .await;
        }

        let mention_ctx = self.mention_context(mention).await?;
        let mut scored = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            let ctx = self.candidate_context(candidate).await?;
            let (score, features) =
                compare(mention.mention_type, &mention_ctx, &ctx, &self.config.weights);
            scored.push(ScoredCandidate {
                entity: candidate.id,
                score,
                features,
            });
        }
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.entity.cmp(&b.entity))
        });

        let thresholds = self.config.thresholds.for_type(mention.mention_type);
        let best = scored.first().expect("candidates is non-empty").clone();
        debug!(
            mention = %mention.id,
            best = %best.entity,
            score = best.score,
            exact = candidate_set.exact_identifier,
            "scored candidates"
        );

        if best.score >= thresholds.auto {
            let method = if candidate_set.exact_identifier
                && (best.score - IDENTIFIER_MATCH_SCORE).abs() < f64::EPSILON
            {
                ResolutionMethod::ExactIdentifier
            } else {
                ResolutionMethod::FeatureScore
            };
            self.bind_match(mention, best, scored, method).await
        } else if best.score >= thresholds.review_min {
            let decision = ResolutionDecision::new(
                mention.id,
                mention.mention_type,
                scored,
                DecisionOutcome::PendingReview,
                format!(
                    "best score {:.3} in review band [{:.2}, {:.2})",
                    best.score, thresholds.review_min, thresholds.auto
                ),
            )
            .with_priority((best.score * 100.0) as i64);
            self.store.record_decision(&decision, Actor::System).await?;
            Ok(ResolveOutcome {
                decision,
                entity: None,
                created_new_entity: false,
            })
        } else {
            let reason = format!(
                "best score {:.3} below review floor {:.2}",
                best.score, thresholds.review_min
            );
            self.bind_new_entity(mention, scored, &reason).await
        }
    }

    async fn bind_match(
        &self,
        mention: &Mention,
        best: ScoredCandidate,
        scored: Vec<ScoredCandidate>,
        method: ResolutionMethod,
    ) -> CoreResult<ResolveOutcome> {
        self.attach_mention(mention, best.entity).await?;
        self.store
            .resolve_mention(
                mention.id,
                ResolutionRecord {
                    status: ResolutionStatus::AutoMatched,
                    entity: Some(best.entity),
                    confidence: Some(best.score),
                    method: Some(method),
                    resolved_at: Some(chrono::Utc::now()),
                    reviewer: None,
                },
            )
            .await?;

        let decision = ResolutionDecision::new(
            mention.id,
            mention.mention_type,
            scored,
            DecisionOutcome::AutoMatched {
                entity: best.entity,
            },
            format!("score {:.3} cleared auto threshold", best.score),
        );
        self.store.record_decision(&decision, Actor::System).await?;
        Ok(ResolveOutcome {
            decision,
            entity: Some(best.entity),
            created_new_entity: false,
        })
    }

    async fn bind_new_entity(
        &self,
        mention: &Mention,
        scored: Vec<ScoredCandidate>,
        reason: &str,
    ) -> CoreResult<ResolveOutcome> {
        let entity = match self.create_entity_from_mention(mention).await {
            Ok(entity) => entity,
            Err(CoreError::DuplicateIdentifier { id_type, value }) => {
                // A concurrent writer seeded the identifier first; the holder
                // is now the match.
                let id_type = parse_identifier_type(&id_type)?;
                let holder = self
                    .store
                    .lookup_by_identifier(id_type, &value)
                    .await?
                    .ok_or_else(|| {
                        CoreError::Contract(format!(
                            "identifier {value} vanished between conflict and lookup"
                        ))
                    })?;
                info!(mention = %mention.id, entity = %holder.id, "lost identifier race, matching holder");
                let best = ScoredCandidate {
                    entity: holder.id,
                    score: IDENTIFIER_MATCH_SCORE,
                    features: Vec::new(),
                };
                return self
                    .bind_match(mention, best, scored, ResolutionMethod::ExactIdentifier)
                    .await;
            }
            Err(e) => return Err(e),
        };

        self.store
            .resolve_mention(
                mention.id,
                ResolutionRecord {
                    status: ResolutionStatus::AutoRejected,
                    entity: Some(entity.id),
                    confidence: scored.first().map(|c| c.score),
                    method: Some(ResolutionMethod::NewEntity),
                    resolved_at: Some(chrono::Utc::now()),
                    reviewer: None,
                },
            )
            .await?;

        let decision = ResolutionDecision::new(
            mention.id,
            mention.mention_type,
            scored,
            DecisionOutcome::NewEntity { entity: entity.id },
            reason,
        );
        self.store.record_decision(&decision, Actor::System).await?;
        Ok(ResolveOutcome {
            decision,
            entity: Some(entity.id),
            created_new_entity: true,
        })
    }

    /// Create a fresh entity seeded from the mention's identifiers and
    /// attributes. Fails with `DuplicateIdentifier` if another cluster
    /// claimed a definitive identifier concurrently.
    pub async fn create_entity_from_mention(&self, mention: &Mention) -> CoreResult<Entity> {
        // Claim definitive identifiers up-front so a lost race creates no entity
        for extracted in &mention.extracted_identifiers {
            if !extracted.id_type.is_definitive() {
                continue;
            }
            let Some(value) = normalize_identifier(extracted.id_type, &extracted.value) else {
                continue;
            };
            if let Some(holder) = self
                .store
                .lookup_by_identifier(extracted.id_type, &value)
                .await?
            {
                if holder.is_active() {
                    return Err(CoreError::DuplicateIdentifier {
                        id_type: extracted.id_type.as_str().to_string(),
                        value,
                    });
                }
            }
        }

        let confidence = if mention.definitive_identifier().is_some() {
            1.0
        } else {
            0.8
        };
        let entity = self
            .store
            .create_entity_linked(
                mention.mention_type,
                mention.normalized_form.clone(),
                confidence,
                mention.provenance,
                Actor::System,
            )
            .await?;

        self.attach_mention(mention, entity.id).await?;
        Ok(entity)
    }

    /// Attach a mention's identifiers and attributes to an entity, resolving
    /// fact conflicts through the source-authority table.
    pub async fn attach_mention(&self, mention: &Mention, entity: EntityId) -> CoreResult<()> {
        for extracted in &mention.extracted_identifiers {
            let Some(value) = normalize_identifier(extracted.id_type, &extracted.value) else {
                warn!(
                    mention = %mention.id,
                    id_type = extracted.id_type.as_str(),
                    "malformed extracted identifier skipped"
                );
                continue;
            };
            match self
                .store
                .add_identifier_linked(entity, extracted.id_type, value, 1.0, mention.provenance)
                .await
            {
                Ok(_) => {}
                Err(CoreError::DuplicateIdentifier { .. }) => {
                    // Already carried by this cluster or contested; the
                    // uniqueness invariant stays with the first writer.
                    debug!(mention = %mention.id, "identifier already present");
                }
                Err(e) => return Err(e),
            }
        }

        let mention_provenance = self.store.provenance(mention.provenance).await?;
        for (key, value) in &mention.extracted_attributes {
            if HINT_KEYS.contains(&key.as_str()) {
                continue;
            }
            let fact_value = json_to_fact_value(value);
            let fact = Fact::attribute(
                entity,
                key.to_uppercase(),
                fact_value,
                valid_from_of(&mention_provenance),
                1.0,
                mention.provenance,
            );
            self.attach_fact(fact, &mention_provenance).await?;
        }

        self.relate_from_hints(mention, entity, &mention_provenance)
            .await?;

        // Refresh blocking keys now that the entity carries new data
        let refreshed = self.store.entity(entity).await?;
        let identifiers = self.store.identifiers_for_entity(entity).await?;
        self.index.index_entity(&refreshed, &identifiers);
        Ok(())
    }

    /// Relationship hints: `DIRECTOR_OF` (orgnummer list on person mentions)
    /// and `DIRECTORS` (personnummer list on company mentions).
    async fn relate_from_hints(
        &self,
        mention: &Mention,
        entity: EntityId,
        provenance: &Provenance,
    ) -> CoreResult<()> {
        let valid_from = valid_from_of(provenance);

        if let Some(values) = mention.extracted_attributes.get("DIRECTOR_OF") {
            for value in string_items(values) {
                let Ok(org) = Orgnummer::parse(&value) else {
                    warn!(mention = %mention.id, "malformed orgnummer in DIRECTOR_OF hint");
                    continue;
                };
                match self
                    .store
                    .lookup_by_identifier(IdentifierType::Organisationsnummer, &org.normalized)
                    .await?
                {
                    Some(company) => {
                        let fact = Fact::relationship(
                            entity,
                            granska_core::RelationshipPredicate::DirectorOf,
                            company.id,
                            valid_from,
                            1.0,
                            mention.provenance,
                        );
                        self.attach_fact(fact, provenance).await?;
                    }
                    None => {
                        debug!(mention = %mention.id, orgnummer = %org.normalized, "hinted company not yet known");
                    }
                }
            }
        }

        if let Some(values) = mention.extracted_attributes.get("DIRECTORS") {
            for value in string_items(values) {
                let Ok(pnr) = Personnummer::parse(&value) else {
                    warn!(mention = %mention.id, "malformed personnummer in DIRECTORS hint");
                    continue;
                };
                match self
                    .store
                    .lookup_by_identifier(IdentifierType::Personnummer, &pnr.normalized)
                    .await?
                {
                    Some(person) => {
                        let fact = Fact::relationship(
                            person.id,
                            granska_core::RelationshipPredicate::DirectorOf,
                            entity,
                            valid_from,
                            1.0,
                            mention.provenance,
                        );
                        self.attach_fact(fact, provenance).await?;
                    }
                    None => {
                        debug!(mention = %mention.id, "hinted director not yet known");
                    }
                }
            }
        }
        Ok(())
    }

    /// Add a fact, applying the §conflict rules against the existing current
    /// fact for `(subject, predicate, [object])` and retrying lost CAS races.
    async fn attach_fact(&self, incoming: Fact, incoming_prov: &Provenance) -> CoreResult<()> {
        let mut attempt = 0u32;
        loop {
            match self.try_attach_fact(&incoming, incoming_prov).await {
                Err(e) if e.is_retryable() && attempt + 1 < self.config.retry.max_attempts => {
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay(attempt)).await;
                }
                other => return other,
            }
        }
    }

    async fn try_attach_fact(&self, incoming: &Fact, incoming_prov: &Provenance) -> CoreResult<()> {
        let existing = self
            .store
            .current_facts(incoming.subject, Some(incoming.predicate()))
            .await?
            .into_iter()
            .find(|f| f.object() == incoming.object());

        let Some(existing) = existing else {
            self.store.add_fact(incoming.clone(), Actor::System).await?;
            return Ok(());
        };

        let existing_prov = self.store.provenance(existing.provenance).await?;
        let incoming_level = self
            .config
            .authority
            .level(incoming_prov.source_type, incoming.predicate());
        let existing_level = self
            .config
            .authority
            .level(existing_prov.source_type, existing.predicate());

        let incoming_wins = incoming_level < existing_level
            || (incoming_level == existing_level
                && incoming_prov.extracted_at > existing_prov.extracted_at);

        if same_content(&existing, incoming) {
            // Same assertion: only act when the incoming validity extends it
            if extends_validity(&existing, incoming) {
                let mut extended = existing.clone();
                extended.id = granska_core::FactId::new();
                extended.valid_to = incoming.valid_to;
                extended.provenance = incoming.provenance;
                extended.created_at = chrono::Utc::now();
                self.store
                    .supersede_fact(existing.id, extended, Actor::System)
                    .await?;
            }
            return Ok(());
        }

        if incoming_wins {
            self.store
                .supersede_fact(existing.id, incoming.clone(), Actor::System)
                .await?;
        } else {
            debug!(
                subject = %incoming.subject,
                predicate = incoming.predicate(),
                "incoming fact outranked by existing source, dropped"
            );
        }
        Ok(())
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let retry = &self.config.retry;
        let base = retry.backoff_initial_ms as f64 * retry.backoff_multiplier.powi(attempt as i32);
        let jitter = if retry.backoff_initial_ms > 0 {
            rand::rng().random_range(0.0..retry.backoff_initial_ms as f64)
        } else {
            0.0
        };
        Duration::from_millis((base + jitter) as u64)
    }

    /// Build the comparison context for a mention
    async fn mention_context(&self, mention: &Mention) -> CoreResult<CompareContext> {
        let mut ctx = CompareContext {
            name: mention.normalized_form.clone(),
            ..Default::default()
        };

        for extracted in &mention.extracted_identifiers {
            if extracted.id_type.is_definitive() {
                if let Some(value) = normalize_identifier(extracted.id_type, &extracted.value) {
                    if matches!(
                        extracted.id_type,
                        IdentifierType::Personnummer | IdentifierType::Samordningsnummer
                    ) {
                        if let Ok(pnr) = Personnummer::parse(&value) {
                            ctx.birth_year = Some(pnr.birth_year());
                        }
                    }
                    ctx.definitive_identifier = Some((extracted.id_type, value));
                    break;
                }
            }
        }

        if ctx.birth_year.is_none() {
            ctx.birth_year = mention
                .extracted_attributes
                .get("BIRTH_YEAR")
                .and_then(|v| v.as_i64())
                .map(|y| y as i32);
        }

        ctx.address = match mention.mention_type {
            EntityType::Address => Some(parse_address(&mention.normalized_form)),
            _ => mention
                .extracted_attributes
                .get("ADDRESS")
                .and_then(|v| v.as_str())
                .map(parse_address),
        };

        // Network hints resolve through identifiers already in the store
        let hint_key = match mention.mention_type {
            EntityType::Person => Some(("DIRECTOR_OF", IdentifierType::Organisationsnummer)),
            EntityType::Company => Some(("DIRECTORS", IdentifierType::Personnummer)),
            _ => None,
        };
        if let Some((key, id_type)) = hint_key {
            if let Some(values) = mention.extracted_attributes.get(key) {
                for value in string_items(values) {
                    let Some(normalized) = normalize_identifier(id_type, &value) else {
                        continue;
                    };
                    if let Some(entity) =
                        self.store.lookup_by_identifier(id_type, &normalized).await?
                    {
                        ctx.network.insert(entity.id);
                    }
                }
            }
        }

        Ok(ctx)
    }

    /// Build the comparison context for a candidate entity
    async fn candidate_context(&self, entity: &Entity) -> CoreResult<CompareContext> {
        let mut ctx = CompareContext {
            name: entity.canonical_name.clone(),
            ..Default::default()
        };

        let identifiers = self.store.identifiers_for_entity(entity.id).await?;
        for record in &identifiers {
            if record.id_type.is_definitive() {
                if matches!(
                    record.id_type,
                    IdentifierType::Personnummer | IdentifierType::Samordningsnummer
                ) {
                    if let Ok(pnr) = Personnummer::parse(&record.value) {
                        ctx.birth_year = Some(pnr.birth_year());
                    }
                }
                ctx.definitive_identifier = Some((record.id_type, record.value.clone()));
                break;
            }
        }

        ctx.address = match entity.entity_type {
            EntityType::Address => Some(parse_address(&entity.canonical_name)),
            _ => {
                let facts = self.store.current_facts(entity.id, Some("ADDRESS")).await?;
                facts.first().and_then(|f| match &f.body {
                    FactBody::Attribute {
                        value: FactValue::Text(s),
                        ..
                    } => Some(parse_address(s)),
                    _ => None,
                })
            }
        };

        ctx.network = match entity.entity_type {
            EntityType::Person => self
                .store
                .neighbors(
                    entity.id,
                    Some(&[
                        granska_core::RelationshipPredicate::DirectorOf,
                        granska_core::RelationshipPredicate::ShareholderOf,
                    ]),
                    Direction::Outgoing,
                    None,
                )
                .await?
                .into_iter()
                .map(|e| e.neighbor)
                .collect(),
            EntityType::Company => self
                .store
                .neighbors(
                    entity.id,
                    Some(&[granska_core::RelationshipPredicate::DirectorOf]),
                    Direction::Incoming,
                    None,
                )
                .await?
                .into_iter()
                .map(|e| e.neighbor)
                .collect(),
            _ => BTreeSet::new(),
        };

        Ok(ctx)
    }
}

fn parse_identifier_type(s: &str) -> CoreResult<IdentifierType> {
    match s {
        "PERSONNUMMER" => Ok(IdentifierType::Personnummer),
        "SAMORDNINGSNUMMER" => Ok(IdentifierType::Samordningsnummer),
        "ORGANISATIONSNUMMER" => Ok(IdentifierType::Organisationsnummer),
        "POSTAL_CODE" => Ok(IdentifierType::PostalCode),
        "PROPERTY_ID" => Ok(IdentifierType::PropertyId),
        other => Err(CoreError::Validation(format!(
            "unknown identifier type {other}"
        ))),
    }
}

/// Validate and normalize an extracted identifier; `None` when malformed
pub(crate) fn normalize_identifier(id_type: IdentifierType, value: &str) -> Option<String> {
    match id_type {
        IdentifierType::Personnummer | IdentifierType::Samordningsnummer => {
            Personnummer::parse(value).ok().map(|p| p.normalized)
        }
        IdentifierType::Organisationsnummer => {
            Orgnummer::parse(value).ok().map(|o| o.normalized)
        }
        IdentifierType::PostalCode => {
            let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
            (digits.len() == 5).then_some(digits)
        }
        IdentifierType::PropertyId => {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_uppercase())
        }
    }
}

fn string_items(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        serde_json::Value::String(s) => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn json_to_fact_value(value: &serde_json::Value) -> FactValue {
    match value {
        serde_json::Value::String(s) => match s.parse::<NaiveDate>() {
            Ok(date) => FactValue::Date(date),
            Err(_) => FactValue::Text(s.clone()),
        },
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                FactValue::Integer(i)
            } else {
                FactValue::Decimal(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::Bool(b) => FactValue::Boolean(*b),
        serde_json::Value::Array(items) if items.iter().all(|v| v.is_string()) => FactValue::Tags(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        ),
        other => FactValue::Json(other.clone()),
    }
}

fn same_content(a: &Fact, b: &Fact) -> bool {
    a.body == b.body
}

/// Does `incoming` extend the validity window of `existing`?
fn extends_validity(existing: &Fact, incoming: &Fact) -> bool {
    match (existing.valid_to, incoming.valid_to) {
        (Some(_), None) => true,
        (Some(old_end), Some(new_end)) => new_end > old_end,
        (None, _) => false,
    }
}

fn valid_from_of(provenance: &Provenance) -> NaiveDate {
    provenance.extracted_at.date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_values_map_to_typed_fact_values() {
        assert_eq!(
            json_to_fact_value(&serde_json::json!("2024-05-01")),
            FactValue::Date(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap())
        );
        assert_eq!(
            json_to_fact_value(&serde_json::json!("hello")),
            FactValue::Text("hello".into())
        );
        assert_eq!(json_to_fact_value(&serde_json::json!(7)), FactValue::Integer(7));
        assert_eq!(
            json_to_fact_value(&serde_json::json!(["a", "b"])),
            FactValue::Tags(vec!["a".into(), "b".into()])
        );
        assert_eq!(
            json_to_fact_value(&serde_json::json!(true)),
            FactValue::Boolean(true)
        );
    }

    #[test]
    fn malformed_identifiers_normalize_to_none() {
        assert!(normalize_identifier(IdentifierType::Personnummer, "198501011235").is_none());
        assert_eq!(
            normalize_identifier(IdentifierType::Personnummer, "850101-1236").as_deref(),
            Some("198501011236")
        );
        assert_eq!(
            normalize_identifier(IdentifierType::Organisationsnummer, "556123-4567").as_deref(),
            Some("5561234567")
        );
        assert_eq!(
            normalize_identifier(IdentifierType::PostalCode, "114 55").as_deref(),
            Some("11455")
        );
    }

    #[test]
    fn validity_extension_rules() {
        let subject = EntityId::new();
        let p = granska_core::ProvenanceId::new();
        let base = Fact::attribute(
            subject,
            "EMPLOYEE_COUNT",
            FactValue::Integer(1),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            1.0,
            p,
        );
        let closed = base
            .clone()
            .with_valid_to(NaiveDate::from_ymd_opt(2024, 6, 1));
        let open = base.clone();
        let later = base
            .clone()
            .with_valid_to(NaiveDate::from_ymd_opt(2025, 1, 1));

        assert!(extends_validity(&closed, &open));
        assert!(extends_validity(&closed, &later));
        assert!(!extends_validity(&open, &closed));
    }
}
