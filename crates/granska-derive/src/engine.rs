//! The derivation engine.
//!
//! A run takes a snapshot of the relationship graph, then walks entities in
//! disjoint partitions: companies and addresses first (their derived facts
//! feed person factors), persons second. Each derived predicate per subject
//! is equality-checked against the current derived fact, so re-running an
//! unchanged store writes nothing and cancellation resumes cleanly.

use chrono::{Datelike, NaiveDate};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use granska_core::{
    derived, Actor, AuditEventType, AuditTarget, CoreConfig, CoreError, CoreResult, Entity,
    EntityId, EntityType, Fact, FactBody, FactId, FactValue, Provenance, TargetKind,
};
use granska_persist::Store;

use crate::clusters;
use crate::risk::{person_assessment, PersonRiskInputs, RiskAssessment, RiskFactor};
use crate::shell;
use crate::velocity;

/// Cooperative cancellation for long-running jobs
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters for one run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub rule_version: String,
    pub entities_processed: usize,
    pub facts_written: usize,
    pub facts_unchanged: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl RunReport {
    fn absorb(&mut self, other: PartitionReport) {
        self.entities_processed += other.processed;
        self.facts_written += other.written;
        self.facts_unchanged += other.unchanged;
        self.cancelled |= other.cancelled;
    }
}

#[derive(Debug, Default)]
struct PartitionReport {
    processed: usize,
    written: usize,
    unchanged: usize,
    cancelled: bool,
}

/// Immutable view of the relationship graph taken at run start
struct Snapshot {
    /// Current DIRECTOR_OF facts keyed by company (object)
    directors_of_company: HashMap<EntityId, Vec<Fact>>,
    /// Current DIRECTOR_OF facts keyed by person (subject)
    directorships_of_person: HashMap<EntityId, Vec<Fact>>,
    /// Current REGISTERED_AT facts keyed by company (subject)
    registrations_of_company: HashMap<EntityId, Vec<Fact>>,
    /// Current REGISTERED_AT facts keyed by address (object)
    registrations_at_address: HashMap<EntityId, Vec<Fact>>,
    /// Entity -> network cluster id (smallest member)
    cluster_of: HashMap<EntityId, EntityId>,
    /// Entity -> relationship fact ids incident to it
    incident_facts: HashMap<EntityId, Vec<FactId>>,
}

enum Applied {
    Written,
    Unchanged,
}

/// Nightly recomputation of derived facts with lineage
#[derive(Clone, Debug)]
pub struct DerivationEngine {
    store: Store,
    config: Arc<CoreConfig>,
}

impl DerivationEngine {
    pub fn new(store: Store, config: Arc<CoreConfig>) -> Self {
        Self { store, config }
    }

    /// Run a full pass. Deterministic given the store snapshot; partial
    /// progress is committed per subject, so a cancelled run resumes as a
    /// no-op for already-derived subjects.
    pub async fn run(&self, cancel: &CancelFlag) -> CoreResult<RunReport> {
        let started = Instant::now();
        let deadline = started + Duration::from_secs(self.config.derivation.deadline_secs);
        let rule = self.config.derivation.rule_version.clone();
        info!(rule = %rule, "derivation run starting");

        let snapshot = Arc::new(self.take_snapshot().await?);

        let mut report = RunReport {
            rule_version: rule.clone(),
            ..Default::default()
        };

        // Companies and addresses first: person factors read their output
        for phase in [
            vec![EntityType::Company, EntityType::Address],
            vec![EntityType::Person],
        ] {
            if report.cancelled {
                break;
            }
            let mut entities = Vec::new();
            for entity_type in phase {
                entities.extend(self.load_entities(entity_type).await?);
            }
            report.absorb(
                self.run_phase(entities, snapshot.clone(), cancel, deadline)
                    .await?,
            );
        }

        report.elapsed = started.elapsed();
        self.store
            .append_audit(
                AuditEventType::DerivationJob,
                Actor::System,
                AuditTarget::new(TargetKind::Job, &rule),
                json!({
                    "rule_version": rule,
                    "entities_processed": report.entities_processed,
                    "facts_written": report.facts_written,
                    "facts_unchanged": report.facts_unchanged,
                    "cancelled": report.cancelled,
                    "elapsed_ms": report.elapsed.as_millis() as u64,
                }),
            )
            .await?;

        info!(
            processed = report.entities_processed,
            written = report.facts_written,
            unchanged = report.facts_unchanged,
            cancelled = report.cancelled,
            "derivation run finished"
        );
        Ok(report)
    }

    async fn load_entities(&self, entity_type: EntityType) -> CoreResult<Vec<Entity>> {
        let mut entities = Vec::new();
        let page = 1000;
        let mut offset = 0;
        loop {
            let batch = self
                .store
                .list_entities(Some(entity_type), offset, page)
                .await?;
            if batch.is_empty() {
                break;
            }
            offset += page;
            entities.extend(batch.into_iter().filter(Entity::is_active));
        }
        Ok(entities)
    }

    /// Fan a phase out over disjoint id-hash partitions
    async fn run_phase(
        &self,
        entities: Vec<Entity>,
        snapshot: Arc<Snapshot>,
        cancel: &CancelFlag,
        deadline: Instant,
    ) -> CoreResult<PartitionReport> {
        let partitions = self.config.derivation.partitions.max(1);
        let mut buckets: Vec<Vec<Entity>> = (0..partitions).map(|_| Vec::new()).collect();
        for entity in entities {
            buckets[partition_of(entity.id, partitions)].push(entity);
        }

        let mut tasks = tokio::task::JoinSet::new();
        for bucket in buckets.into_iter().filter(|b| !b.is_empty()) {
            let engine = self.clone();
            let snapshot = snapshot.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                engine
                    .process_partition(bucket, snapshot, cancel, deadline)
                    .await
            });
        }

        let mut merged = PartitionReport::default();
        while let Some(joined) = tasks.join_next().await {
            let partial = joined
                .map_err(|e| CoreError::Storage(format!("derivation task panicked: {e}")))??;
            merged.processed += partial.processed;
            merged.written += partial.written;
            merged.unchanged += partial.unchanged;
            merged.cancelled |= partial.cancelled;
        }
        Ok(merged)
    }

    async fn process_partition(
        self,
        entities: Vec<Entity>,
        snapshot: Arc<Snapshot>,
        cancel: CancelFlag,
        deadline: Instant,
    ) -> CoreResult<PartitionReport> {
        let mut report = PartitionReport::default();
        for entity in entities {
            if cancel.is_cancelled() || Instant::now() >= deadline {
                warn!("derivation partition stopping at checkpoint");
                report.cancelled = true;
                break;
            }
            let result = match entity.entity_type {
                EntityType::Company => self.process_company(&entity, &snapshot).await,
                EntityType::Address => self.process_address(&entity, &snapshot).await,
                EntityType::Person => self.process_person(&entity, &snapshot).await,
                EntityType::Event => Ok((0, 0)),
            };
            match result {
                Ok((written, unchanged)) => {
                    report.processed += 1;
                    report.written += written;
                    report.unchanged += unchanged;
                }
                Err(e) => {
                    warn!(entity = %entity.id, error = %e, "derivation failed for subject");
                }
            }
        }
        Ok(report)
    }

    async fn process_company(
        &self,
        company: &Entity,
        snapshot: &Snapshot,
    ) -> CoreResult<(usize, usize)> {
        let mut written = 0;
        let mut unchanged = 0;

        let facts = self.store.current_facts(company.id, None).await?;
        let attribute_facts: Vec<Fact> = facts
            .iter()
            .filter(|f| matches!(f.body, FactBody::Attribute { .. }) && !f.is_derived())
            .cloned()
            .collect();
        let directors = snapshot
            .directors_of_company
            .get(&company.id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let director_ids: Vec<FactId> = directors.iter().map(|f| f.id).collect();

        let scan = shell::scan(
            &attribute_facts,
            directors.len(),
            &director_ids,
            &self.config.company_risk,
            Store::today(),
        );

        if !scan.sources.is_empty() {
            match self
                .apply_derived(
                    company.id,
                    derived::SHELL_INDICATOR,
                    FactValue::Tags(scan.tags()),
                    scan.sources.clone(),
                )
                .await?
            {
                Applied::Written => written += 1,
                Applied::Unchanged => unchanged += 1,
            }

            let assessment = RiskAssessment::new(
                scan.indicators
                    .iter()
                    .map(|i| RiskFactor {
                        name: i.tag.to_lowercase(),
                        weight: i.weight,
                    })
                    .collect(),
                &self.config.severity,
            );
            match self
                .apply_derived(
                    company.id,
                    derived::RISK_SCORE,
                    assessment.to_fact_value(),
                    scan.sources.clone(),
                )
                .await?
            {
                Applied::Written => written += 1,
                Applied::Unchanged => unchanged += 1,
            }
        }

        let (w, u) = self.apply_cluster(company.id, snapshot).await?;
        Ok((written + w, unchanged + u))
    }

    async fn process_address(
        &self,
        address: &Entity,
        snapshot: &Snapshot,
    ) -> CoreResult<(usize, usize)> {
        let mut written = 0;
        let mut unchanged = 0;

        if let Some(registrations) = snapshot.registrations_at_address.get(&address.id) {
            let is_hub =
                registrations.len() >= self.config.derivation.registration_hub_min_companies;
            let sources: Vec<FactId> = registrations.iter().map(|f| f.id).collect();
            match self
                .apply_derived(
                    address.id,
                    derived::REGISTRATION_HUB,
                    FactValue::Boolean(is_hub),
                    sources,
                )
                .await?
            {
                Applied::Written => written += 1,
                Applied::Unchanged => unchanged += 1,
            }
        }

        let (w, u) = self.apply_cluster(address.id, snapshot).await?;
        Ok((written + w, unchanged + u))
    }

    async fn process_person(
        &self,
        person: &Entity,
        snapshot: &Snapshot,
    ) -> CoreResult<(usize, usize)> {
        let mut written = 0;
        let mut unchanged = 0;
        let today = Store::today();
        let window = self.config.derivation.velocity_window_months;

        let current_directorships = snapshot
            .directorships_of_person
            .get(&person.id)
            .map(Vec::as_slice)
            .unwrap_or_default();

        // History view for velocity and dissolved-company counting
        let all_directorships = self
            .store
            .unsuperseded_facts(person.id, Some("DIRECTOR_OF"))
            .await?;

        let mut inputs = PersonRiskInputs {
            active_directorships: current_directorships.len(),
            ..Default::default()
        };
        inputs
            .sources
            .extend(all_directorships.iter().map(|f| f.id));

        // Own velocity: the person's appointment/termination events
        let refs: Vec<&Fact> = all_directorships.iter().collect();
        let own_events = velocity::change_events(&refs, window, today);
        let own_velocity = velocity::per_year(own_events, window);

        // Network velocity: average change rate across their companies
        let mut company_velocities = Vec::new();
        for directorship in &all_directorships {
            let Some(company) = directorship.object() else {
                continue;
            };
            if let Some(board) = snapshot.directors_of_company.get(&company) {
                let board_refs: Vec<&Fact> = board.iter().collect();
                let events = velocity::change_events(&board_refs, window, today);
                company_velocities.push(velocity::per_year(events, window));
            }

            // Shell and vulnerable-area exposure through this company
            let shell_tags = self
                .store
                .current_facts(company, Some(derived::SHELL_INDICATOR))
                .await?;
            if shell_tags.iter().any(|f| {
                matches!(f.body.value(), Some(FactValue::Tags(tags)) if !tags.is_empty())
            }) {
                inputs.shell_company_count += 1;
                inputs.sources.extend(shell_tags.iter().map(|f| f.id));
            }

            let status = self
                .store
                .unsuperseded_facts(company, Some("COMPANY_STATUS"))
                .await?;
            if status.iter().any(|f| {
                matches!(f.body.value(), Some(FactValue::Text(s)) if s == "DISSOLVED")
            }) {
                inputs.dissolved_company_count += 1;
                inputs.sources.extend(status.iter().map(|f| f.id));
            }

            if let Some(registrations) = snapshot.registrations_of_company.get(&company) {
                for registration in registrations {
                    let Some(address) = registration.object() else {
                        continue;
                    };
                    let levels = self
                        .store
                        .current_facts(address, Some("VULNERABLE_AREA_LEVEL"))
                        .await?;
                    if levels.iter().any(|f| {
                        matches!(f.body.value(), Some(FactValue::Integer(level)) if *level >= 1)
                    }) {
                        inputs.vulnerable_area_companies += 1;
                        inputs.sources.extend(levels.iter().map(|f| f.id));
                        break;
                    }
                }
            }
        }
        if !company_velocities.is_empty() {
            inputs.network_velocity_per_year =
                company_velocities.iter().sum::<f64>() / company_velocities.len() as f64;
        }

        let birth_facts = self.store.current_facts(person.id, Some("BIRTH_DATE")).await?;
        if let Some(fact) = birth_facts.first() {
            if let Some(FactValue::Date(birth)) = fact.body.value() {
                inputs.age_years = Some(age_years(*birth, today));
                inputs.sources.push(fact.id);
            }
        }

        inputs.sources.sort();
        inputs.sources.dedup();

        if !all_directorships.is_empty() {
            let velocity_sources: Vec<FactId> =
                all_directorships.iter().map(|f| f.id).collect();
            match self
                .apply_derived(
                    person.id,
                    derived::DIRECTOR_VELOCITY,
                    FactValue::Decimal(own_velocity),
                    velocity_sources,
                )
                .await?
            {
                Applied::Written => written += 1,
                Applied::Unchanged => unchanged += 1,
            }
        }

        if !inputs.sources.is_empty() {
            let assessment =
                person_assessment(&inputs, &self.config.person_risk, &self.config.severity);
            match self
                .apply_derived(
                    person.id,
                    derived::RISK_SCORE,
                    assessment.to_fact_value(),
                    inputs.sources.clone(),
                )
                .await?
            {
                Applied::Written => written += 1,
                Applied::Unchanged => unchanged += 1,
            }
        }

        let (w, u) = self.apply_cluster(person.id, snapshot).await?;
        Ok((written + w, unchanged + u))
    }

    async fn apply_cluster(
        &self,
        entity: EntityId,
        snapshot: &Snapshot,
    ) -> CoreResult<(usize, usize)> {
        let Some(cluster) = snapshot.cluster_of.get(&entity) else {
            return Ok((0, 0));
        };
        let sources = snapshot
            .incident_facts
            .get(&entity)
            .cloned()
            .unwrap_or_default();
        if sources.is_empty() {
            return Ok((0, 0));
        }
        match self
            .apply_derived(
                entity,
                derived::NETWORK_CLUSTER,
                FactValue::Text(cluster.to_string()),
                sources,
            )
            .await?
        {
            Applied::Written => Ok((1, 0)),
            Applied::Unchanged => Ok((0, 1)),
        }
    }

    /// Supersession rule: write only when the value differs from the current
    /// derived fact; trivial values are not materialized for new subjects.
    async fn apply_derived(
        &self,
        subject: EntityId,
        predicate: &str,
        value: FactValue,
        sources: Vec<FactId>,
    ) -> CoreResult<Applied> {
        let existing = self
            .store
            .current_facts(subject, Some(predicate))
            .await?
            .into_iter()
            .find(|f| f.is_derived());

        match existing {
            Some(current) if current.body.value() == Some(&value) => Ok(Applied::Unchanged),
            None if is_trivial(&value) => Ok(Applied::Unchanged),
            existing => {
                let rule = &self.config.derivation.rule_version;
                let provenance = Provenance::derived(rule.clone(), sources.clone());
                let provenance_id = provenance.id;
                self.store.add_provenance(provenance).await?;

                let fact = Fact::attribute(
                    subject,
                    predicate,
                    value,
                    Store::today(),
                    1.0,
                    provenance_id,
                )
                .with_derivation(rule.clone(), sources);

                match existing {
                    Some(current) => {
                        // Lost CAS races mean another worker derived this
                        // subject concurrently; the equality check makes the
                        // retry a no-op.
                        match self.store.supersede_fact(current.id, fact, Actor::System).await {
                            Ok(_) => {}
                            Err(CoreError::Conflict(_)) => return Ok(Applied::Unchanged),
                            Err(e) => return Err(e),
                        }
                    }
                    None => {
                        self.store.add_fact(fact, Actor::System).await?;
                    }
                }
                Ok(Applied::Written)
            }
        }
    }

    async fn take_snapshot(&self) -> CoreResult<Snapshot> {
        let director_of = self.store.current_facts_by_predicate("DIRECTOR_OF").await?;
        let shareholder_of = self
            .store
            .current_facts_by_predicate("SHAREHOLDER_OF")
            .await?;
        let registered_at = self
            .store
            .current_facts_by_predicate("REGISTERED_AT")
            .await?;

        let mut snapshot = Snapshot {
            directors_of_company: HashMap::new(),
            directorships_of_person: HashMap::new(),
            registrations_of_company: HashMap::new(),
            registrations_at_address: HashMap::new(),
            cluster_of: HashMap::new(),
            incident_facts: HashMap::new(),
        };

        let mut edges = Vec::new();
        for fact in director_of
            .iter()
            .chain(shareholder_of.iter())
            .chain(registered_at.iter())
        {
            if let Some(object) = fact.object() {
                edges.push((fact.subject, object));
                snapshot
                    .incident_facts
                    .entry(fact.subject)
                    .or_default()
                    .push(fact.id);
                snapshot
                    .incident_facts
                    .entry(object)
                    .or_default()
                    .push(fact.id);
            }
        }
        snapshot.cluster_of = clusters::components(&edges);

        for fact in director_of {
            if let Some(company) = fact.object() {
                snapshot
                    .directors_of_company
                    .entry(company)
                    .or_default()
                    .push(fact.clone());
                snapshot
                    .directorships_of_person
                    .entry(fact.subject)
                    .or_default()
                    .push(fact);
            }
        }
        for fact in registered_at {
            if let Some(address) = fact.object() {
                snapshot
                    .registrations_of_company
                    .entry(fact.subject)
                    .or_default()
                    .push(fact.clone());
                snapshot
                    .registrations_at_address
                    .entry(address)
                    .or_default()
                    .push(fact);
            }
        }

        Ok(snapshot)
    }
}

fn partition_of(id: EntityId, partitions: usize) -> usize {
    let bytes = id.as_uuid().as_bytes();
    let mut hash = [0u8; 8];
    hash.copy_from_slice(&bytes[..8]);
    (u64::from_le_bytes(hash) % partitions as u64) as usize
}

fn age_years(birth: NaiveDate, today: NaiveDate) -> u32 {
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age.max(0) as u32
}

/// Values not worth materializing for subjects that never had the predicate
fn is_trivial(value: &FactValue) -> bool {
    match value {
        FactValue::Tags(tags) => tags.is_empty(),
        FactValue::Boolean(b) => !b,
        FactValue::Decimal(d) => *d == 0.0,
        FactValue::Json(v) => v
            .get("score")
            .and_then(serde_json::Value::as_f64)
            .map_or(false, |s| s == 0.0),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_assignment_is_stable_and_in_range() {
        for _ in 0..100 {
            let id = EntityId::new();
            let p = partition_of(id, 8);
            assert!(p < 8);
            assert_eq!(p, partition_of(id, 8));
        }
    }

    #[test]
    fn age_computation_respects_birthdays() {
        let birth = NaiveDate::from_ymd_opt(2000, 6, 15).unwrap();
        assert_eq!(age_years(birth, NaiveDate::from_ymd_opt(2026, 6, 14).unwrap()), 25);
        assert_eq!(age_years(birth, NaiveDate::from_ymd_opt(2026, 6, 15).unwrap()), 26);
    }

    #[test]
    fn trivial_values() {
        assert!(is_trivial(&FactValue::Tags(vec![])));
        assert!(!is_trivial(&FactValue::Tags(vec!["NO_REVENUE".into()])));
        assert!(is_trivial(&FactValue::Boolean(false)));
        assert!(is_trivial(&FactValue::Decimal(0.0)));
        assert!(!is_trivial(&FactValue::Text(String::new())));
        assert!(is_trivial(&FactValue::Json(serde_json::json!({"score": 0.0}))));
        assert!(!is_trivial(&FactValue::Json(serde_json::json!({"score": 0.4}))));
    }
}
