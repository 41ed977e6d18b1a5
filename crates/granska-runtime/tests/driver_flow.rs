//! Driver and query-service flows over the in-memory store and queue.

use std::sync::Arc;

use granska_core::{
    Actor, ChainStatus, CoreConfig, EntityType, IdentifierType, Mention, Provenance,
    RelationshipPredicate, SourceType,
};
use granska_persist::{MemoryBackend, Store};
use granska_queue::{MemoryQueue, WorkerConfig};
use granska_runtime::{Driver, QueryService};

fn provenance() -> Provenance {
    Provenance::new(
        SourceType::AuthoritativeRegistry,
        "bolagsverket:feed",
        "registry_feed",
        "1.0",
    )
}

fn driver() -> Driver {
    let store = Store::new(Arc::new(MemoryBackend::new()));
    Driver::new(
        store,
        Arc::new(CoreConfig::default()),
        Arc::new(MemoryQueue::new()),
        WorkerConfig::default(),
    )
}

fn company_mention(name: &str, orgnummer: &str) -> (Mention, Provenance) {
    let p = provenance();
    let mention = Mention::new(
        EntityType::Company,
        name,
        name.to_uppercase(),
        p.id,
    )
    .with_identifier(IdentifierType::Organisationsnummer, orgnummer);
    (mention, p)
}

fn person_mention(name: &str, personnummer: &str, directs: &[&str]) -> (Mention, Provenance) {
    let p = provenance();
    let mut mention = Mention::new(EntityType::Person, name, name.to_uppercase(), p.id)
        .with_identifier(IdentifierType::Personnummer, personnummer);
    if !directs.is_empty() {
        mention = mention.with_attribute("DIRECTOR_OF", serde_json::json!(directs));
    }
    (mention, p)
}

#[tokio::test]
async fn ingest_resolve_derive_through_the_queue() {
    let driver = driver();
    driver.init().await.unwrap();

    driver
        .ingest(vec![
            company_mention("Example AB", "5561234567"),
            company_mention("Annat Bolag AB", "5560000415"),
            person_mention("Anna Svensson", "198501011236", &["5561234567"]),
        ])
        .await
        .unwrap();

    driver.enqueue_resolution(100).await.unwrap();
    driver.drain().await;

    let store = driver.store();
    assert!(store.pending_mentions(10).await.unwrap().is_empty());
    assert_eq!(store.count_entities(None).await.unwrap(), 3);

    // Person-company edge created from the DIRECTOR_OF hint
    let person = store
        .lookup_by_identifier(IdentifierType::Personnummer, "198501011236")
        .await
        .unwrap()
        .unwrap();
    let directorships = store
        .current_facts(person.id, Some("DIRECTOR_OF"))
        .await
        .unwrap();
    assert_eq!(directorships.len(), 1);

    // Nightly derivation through the queue
    driver.enqueue_derivation(None).await.unwrap();
    driver.drain().await;
    let clusters = store
        .current_facts(person.id, Some("NETWORK_CLUSTER"))
        .await
        .unwrap();
    assert_eq!(clusters.len(), 1);

    // Every mutation was audited and the chain holds
    let status = store.verify_audit().await.unwrap();
    assert!(matches!(status, ChainStatus::Intact { length } if length > 0));

    let counts = driver.queue_counts().await.unwrap();
    assert_eq!(counts.completed, 2);
    assert_eq!(counts.dead_letter, 0);
}

#[tokio::test]
async fn repeated_resolution_batches_are_idempotent() {
    let driver = driver();
    driver.init().await.unwrap();

    driver
        .ingest(vec![company_mention("Example AB", "5561234567")])
        .await
        .unwrap();
    driver.enqueue_resolution(10).await.unwrap();
    driver.drain().await;
    assert_eq!(driver.store().count_entities(None).await.unwrap(), 1);

    // Same mention content ingested again auto-matches, creating nothing
    driver
        .ingest(vec![company_mention("Example AB", "5561234567")])
        .await
        .unwrap();
    driver.enqueue_resolution(10).await.unwrap();
    driver.drain().await;
    assert_eq!(driver.store().count_entities(None).await.unwrap(), 1);
}

#[tokio::test]
async fn query_service_snapshot_and_search() {
    let driver = driver();
    driver.init().await.unwrap();
    driver
        .ingest(vec![
            company_mention("Example AB", "5561234567"),
            person_mention("Anna Svensson", "198501011236", &["5561234567"]),
        ])
        .await
        .unwrap();
    driver.enqueue_resolution(10).await.unwrap();
    driver.drain().await;

    let store = driver.store().clone();
    let service = QueryService::new(
        store.clone(),
        driver.config().clone(),
        driver.resolver().clone(),
    );

    let company = service
        .lookup_by_identifier(IdentifierType::Organisationsnummer, "5561234567")
        .await
        .unwrap()
        .unwrap();

    let snapshot = service
        .get_entity(company.id, true, true, Actor::Api("test".into()))
        .await
        .unwrap();
    assert_eq!(snapshot.identifiers.len(), 1);
    assert!(snapshot.facts.is_some());
    assert_eq!(snapshot.same_as.as_ref().unwrap().len(), 1);

    // Person reads write a PII_QUERY audit entry
    let person = service
        .lookup_by_identifier(IdentifierType::Personnummer, "198501011236")
        .await
        .unwrap()
        .unwrap();
    let audits_before = store.audit_entries().await.unwrap().len();
    service
        .get_entity(person.id, false, false, Actor::User("analyst".into()))
        .await
        .unwrap();
    let audits_after = store.audit_entries().await.unwrap().len();
    assert_eq!(audits_after, audits_before + 1);

    // Depth-1 neighborhood around the person reaches the company
    let graph = service
        .get_relationships(
            person.id,
            1,
            Some(&[RelationshipPredicate::DirectorOf]),
            None,
        )
        .await
        .unwrap();
    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.edges.len(), 1);
    assert!(!graph.truncated);

    // Name search and identifier-prefix search both hit
    let by_name = service
        .search_entities("example", Some(EntityType::Company), 10, 0)
        .await
        .unwrap();
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name[0].entity.id, company.id);

    let by_prefix = service.search_entities("55612", None, 10, 0).await.unwrap();
    assert!(by_prefix.iter().any(|h| h.entity.id == company.id));
}

#[tokio::test]
async fn accuracy_metrics_empty_store_is_perfect() {
    let driver = driver();
    let service = QueryService::new(
        driver.store().clone(),
        driver.config().clone(),
        driver.resolver().clone(),
    );
    let report = service.accuracy_metrics().await.unwrap();
    assert_eq!(report.specificity(), 1.0);
    assert_eq!(report.sensitivity(), 1.0);
}
