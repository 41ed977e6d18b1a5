//! Conformance suite: every test runs against both backends.

use std::sync::Arc;

use chrono::NaiveDate;
use granska_core::{
    Actor, ChainStatus, CoreError, EntityType, Fact, FactValue, IdentifierType, Mention,
    Provenance, RelationshipPredicate, ResolutionMethod, ResolutionRecord, ResolutionStatus,
    SourceType,
};
use granska_persist::{Direction, MemoryBackend, SqliteBackend, SqliteConfig, Store, StoreBackend};

async fn backends() -> Vec<Arc<dyn StoreBackend>> {
    let sqlite = SqliteBackend::new_with_config(SqliteConfig::memory())
        .await
        .expect("sqlite in-memory backend");
    vec![Arc::new(MemoryBackend::new()), Arc::new(sqlite)]
}

fn registry_provenance() -> Provenance {
    Provenance::new(
        SourceType::AuthoritativeRegistry,
        "bolagsverket:batch-1",
        "registry_feed",
        "1.0",
    )
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn entity_round_trip() {
    for backend in backends().await {
        let store = Store::new(backend);
        let entity = store
            .create_entity(
                EntityType::Company,
                "EXAMPLE AB",
                0.9,
                registry_provenance(),
                Actor::System,
            )
            .await
            .unwrap();

        let loaded = store.entity(entity.id).await.unwrap();
        assert_eq!(loaded.canonical_name, "EXAMPLE AB");
        assert_eq!(loaded.entity_type, EntityType::Company);
        assert!(loaded.is_active());

        assert_eq!(store.count_entities(None).await.unwrap(), 1);
        assert_eq!(
            store
                .count_entities(Some(EntityType::Person))
                .await
                .unwrap(),
            0
        );
    }
}

#[tokio::test]
async fn identifier_uniqueness_across_clusters() {
    for backend in backends().await {
        let store = Store::new(backend);
        let a = store
            .create_entity(
                EntityType::Company,
                "FIRST AB",
                0.9,
                registry_provenance(),
                Actor::System,
            )
            .await
            .unwrap();
        let b = store
            .create_entity(
                EntityType::Company,
                "SECOND AB",
                0.9,
                registry_provenance(),
                Actor::System,
            )
            .await
            .unwrap();

        store
            .add_identifier(
                a.id,
                IdentifierType::Organisationsnummer,
                "5561234567",
                1.0,
                (None, None),
                registry_provenance(),
            )
            .await
            .unwrap();

        // Another cluster may not claim the same organisationsnummer
        let err = store
            .add_identifier(
                b.id,
                IdentifierType::Organisationsnummer,
                "5561234567",
                1.0,
                (None, None),
                registry_provenance(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateIdentifier { .. }));
    }
}

#[tokio::test]
async fn lookup_resolves_through_merge() {
    for backend in backends().await {
        let store = Store::new(backend);
        let elder = store
            .create_entity(
                EntityType::Company,
                "ELDER AB",
                0.9,
                registry_provenance(),
                Actor::System,
            )
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let younger = store
            .create_entity(
                EntityType::Company,
                "YOUNGER AB",
                0.9,
                registry_provenance(),
                Actor::System,
            )
            .await
            .unwrap();

        store
            .add_identifier(
                younger.id,
                IdentifierType::Organisationsnummer,
                "5561234567",
                1.0,
                (None, None),
                registry_provenance(),
            )
            .await
            .unwrap();

        let canonical = store
            .merge(elder.id, younger.id, "duplicate registration", 0.98, Actor::System)
            .await
            .unwrap();
        assert_eq!(canonical.id, elder.id);

        // Identifier held by the merged entity resolves to the canonical one
        let found = store
            .lookup_by_identifier(IdentifierType::Organisationsnummer, "5561234567")
            .await
            .unwrap()
            .expect("lookup hits");
        assert_eq!(found.id, elder.id);

        let cluster = store.same_as_cluster(younger.id).await.unwrap();
        assert!(cluster.contains(&elder.id) && cluster.contains(&younger.id));
    }
}

#[tokio::test]
async fn relationship_fact_requires_object() {
    for backend in backends().await {
        let store = Store::new(backend);
        let subject = store
            .create_entity(
                EntityType::Person,
                "ANNA SVENSSON",
                0.9,
                registry_provenance(),
                Actor::System,
            )
            .await
            .unwrap();

        let provenance = registry_provenance();
        let provenance_id = provenance.id;
        store.add_provenance(provenance).await.unwrap();

        let dangling = Fact::relationship(
            subject.id,
            RelationshipPredicate::DirectorOf,
            granska_core::EntityId::new(),
            day(2024, 1, 1),
            1.0,
            provenance_id,
        );
        let err = store.add_fact(dangling, Actor::System).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}

#[tokio::test]
async fn attribute_predicate_vocabulary_enforced() {
    for backend in backends().await {
        let store = Store::new(backend);
        let subject = store
            .create_entity(
                EntityType::Company,
                "EXAMPLE AB",
                0.9,
                registry_provenance(),
                Actor::System,
            )
            .await
            .unwrap();

        let provenance = registry_provenance();
        let provenance_id = provenance.id;
        store.add_provenance(provenance).await.unwrap();

        let bad = Fact::attribute(
            subject.id,
            "employee count",
            FactValue::Integer(3),
            day(2024, 1, 1),
            1.0,
            provenance_id,
        );
        let err = store.add_fact(bad, Actor::System).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}

#[tokio::test]
async fn supersession_keeps_history_and_detects_conflicts() {
    for backend in backends().await {
        let store = Store::new(backend);
        let subject = store
            .create_entity(
                EntityType::Company,
                "EXAMPLE AB",
                0.9,
                registry_provenance(),
                Actor::System,
            )
            .await
            .unwrap();

        let provenance = registry_provenance();
        let provenance_id = provenance.id;
        store.add_provenance(provenance).await.unwrap();

        let old = store
            .add_fact(
                Fact::attribute(
                    subject.id,
                    "EMPLOYEE_COUNT",
                    FactValue::Integer(3),
                    day(2024, 1, 1),
                    1.0,
                    provenance_id,
                ),
                Actor::System,
            )
            .await
            .unwrap();

        let replacement = Fact::attribute(
            subject.id,
            "EMPLOYEE_COUNT",
            FactValue::Integer(5),
            day(2024, 6, 1),
            1.0,
            provenance_id,
        );
        let new = store
            .supersede_fact(old.id, replacement, Actor::System)
            .await
            .unwrap();

        // History retained, currency moved
        let stored_old = store.fact(old.id).await.unwrap();
        assert_eq!(stored_old.superseded_by, Some(new.id));
        assert!(stored_old.superseded_at.is_some());

        let current = store
            .current_facts(subject.id, Some("EMPLOYEE_COUNT"))
            .await
            .unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].id, new.id);

        // Second supersede of the same fact loses the CAS
        let loser = Fact::attribute(
            subject.id,
            "EMPLOYEE_COUNT",
            FactValue::Integer(9),
            day(2024, 7, 1),
            1.0,
            provenance_id,
        );
        let err = store
            .supersede_fact(old.id, loser, Actor::System)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }
}

#[tokio::test]
async fn neighbors_traverse_current_relationships() {
    for backend in backends().await {
        let store = Store::new(backend);
        let person = store
            .create_entity(
                EntityType::Person,
                "ANNA SVENSSON",
                0.9,
                registry_provenance(),
                Actor::System,
            )
            .await
            .unwrap();
        let company = store
            .create_entity(
                EntityType::Company,
                "EXAMPLE AB",
                0.9,
                registry_provenance(),
                Actor::System,
            )
            .await
            .unwrap();

        let provenance = registry_provenance();
        let provenance_id = provenance.id;
        store.add_provenance(provenance).await.unwrap();

        store
            .add_fact(
                Fact::relationship(
                    person.id,
                    RelationshipPredicate::DirectorOf,
                    company.id,
                    day(2024, 1, 1),
                    1.0,
                    provenance_id,
                ),
                Actor::System,
            )
            .await
            .unwrap();

        let out = store
            .neighbors(person.id, None, Direction::Outgoing, None)
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].neighbor, company.id);
        assert!(!out[0].incoming);

        let inbound = store
            .neighbors(company.id, Some(&[RelationshipPredicate::DirectorOf]), Direction::Incoming, None)
            .await
            .unwrap();
        assert_eq!(inbound.len(), 1);
        assert_eq!(inbound[0].neighbor, person.id);
    }
}

#[tokio::test]
async fn mention_resolves_exactly_once() {
    for backend in backends().await {
        let store = Store::new(backend);
        let entity = store
            .create_entity(
                EntityType::Person,
                "ANNA SVENSSON",
                0.9,
                registry_provenance(),
                Actor::System,
            )
            .await
            .unwrap();

        let mention = store
            .create_mention(
                Mention::new(
                    EntityType::Person,
                    "Anna Svensson",
                    "ANNA SVENSSON",
                    granska_core::ProvenanceId::new(),
                ),
                registry_provenance(),
            )
            .await
            .unwrap();

        let pending = store.pending_mentions(10).await.unwrap();
        assert_eq!(pending.len(), 1);

        let resolution = ResolutionRecord {
            status: ResolutionStatus::AutoMatched,
            entity: Some(entity.id),
            confidence: Some(0.99),
            method: Some(ResolutionMethod::ExactIdentifier),
            resolved_at: Some(chrono::Utc::now()),
            reviewer: None,
        };
        store
            .resolve_mention(mention.id, resolution.clone())
            .await
            .unwrap();

        assert!(store.pending_mentions(10).await.unwrap().is_empty());

        let err = store
            .resolve_mention(mention.id, resolution)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Invariant(_)));
    }
}

#[tokio::test]
async fn audit_chain_verifies_after_mutations() {
    for backend in backends().await {
        let store = Store::new(backend);
        for i in 0..10 {
            store
                .create_entity(
                    EntityType::Company,
                    format!("BOLAG {i} AB"),
                    0.9,
                    registry_provenance(),
                    Actor::System,
                )
                .await
                .unwrap();
        }

        let entries = store.audit_entries().await.unwrap();
        assert_eq!(entries.len(), 10);
        assert_eq!(
            store.verify_audit().await.unwrap(),
            ChainStatus::Intact { length: 10 }
        );

        // Sequence numbers are dense and ordered
        for (i, e) in entries.iter().enumerate() {
            assert_eq!(e.sequence_number, i as u64);
        }

        let jsonl = store.export_audit_jsonl().await.unwrap();
        assert_eq!(jsonl.lines().count(), 10);
    }
}
