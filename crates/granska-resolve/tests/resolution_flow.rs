//! End-to-end resolution flows against the in-memory store.

use std::sync::Arc;

use granska_core::{
    CoreConfig, DecisionOutcome, EntityType, GroundTruthPair, IdentifierType, Mention,
    Provenance, ResolutionStatus, ReviewVerdict, SourceType,
};
use granska_persist::{MemoryBackend, Store};
use granska_resolve::{BlockingIndex, Resolver, ReviewQueue, ValidationHarness};

fn setup() -> Resolver {
    let store = Store::new(Arc::new(MemoryBackend::new()));
    let index = Arc::new(BlockingIndex::new());
    let config = Arc::new(CoreConfig::default());
    Resolver::new(store, index, config)
}

fn provenance() -> Provenance {
    Provenance::new(
        SourceType::AuthoritativeRegistry,
        "bolagsverket:feed",
        "registry_feed",
        "1.0",
    )
}

async fn ingest(resolver: &Resolver, mention: Mention) -> Mention {
    resolver
        .store()
        .create_mention(mention, provenance())
        .await
        .unwrap()
}

fn company_mention(name: &str, orgnummer: &str) -> Mention {
    Mention::new(
        EntityType::Company,
        name,
        name.to_uppercase(),
        granska_core::ProvenanceId::new(),
    )
    .with_identifier(IdentifierType::Organisationsnummer, orgnummer)
}

#[tokio::test]
async fn exact_identifier_resolution_creates_then_matches() {
    let resolver = setup();
    let store = resolver.store().clone();

    // First mention on an empty store: no candidates, new entity
    let first = ingest(&resolver, company_mention("Example AB", "5561234567")).await;
    let outcome = resolver.resolve_mention(&first).await.unwrap();
    assert!(outcome.created_new_entity);
    let entity_id = outcome.entity.unwrap();

    let resolved = store.mention(first.id).await.unwrap();
    assert_eq!(resolved.resolution.status, ResolutionStatus::AutoRejected);
    assert_eq!(resolved.resolution.entity, Some(entity_id));

    // Second mention with the same orgnummer: exact match at 0.99
    let second = ingest(&resolver, company_mention("EXAMPLE AB", "556123-4567")).await;
    let outcome = resolver.resolve_mention(&second).await.unwrap();
    assert!(!outcome.created_new_entity);
    assert_eq!(outcome.entity, Some(entity_id));
    assert!((outcome.decision.best_score - 0.99).abs() < 1e-9);

    let resolved = store.mention(second.id).await.unwrap();
    assert_eq!(resolved.resolution.status, ResolutionStatus::AutoMatched);

    // Two resolved mentions, one entity
    assert_eq!(store.count_entities(None).await.unwrap(), 1);
    assert!(store.pending_mentions(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn ambiguous_name_lands_in_review_queue() {
    let resolver = setup();

    let seed = ingest(&resolver, company_mention("Nordisk Bygg AB", "5561234567")).await;
    resolver.resolve_mention(&seed).await.unwrap();

    // Phonetically similar name, no identifier: review band, stays pending
    let fuzzy = Mention::new(
        EntityType::Company,
        "Nordisk Byg",
        "NORDISK BYG",
        granska_core::ProvenanceId::new(),
    );
    let fuzzy = ingest(&resolver, fuzzy).await;
    let outcome = resolver.resolve_mention(&fuzzy).await.unwrap();
    assert_eq!(outcome.decision.outcome, DecisionOutcome::PendingReview);
    assert!(outcome.entity.is_none());

    let still_pending = resolver.store().mention(fuzzy.id).await.unwrap();
    assert_eq!(still_pending.resolution.status, ResolutionStatus::Pending);

    let queue = ReviewQueue::new(resolver.clone());
    let next = queue.next().await.unwrap().expect("queued decision");
    assert_eq!(next.mention, fuzzy.id);
}

#[tokio::test]
async fn human_match_binds_and_audits() {
    let resolver = setup();

    let seed = ingest(&resolver, company_mention("Nordisk Bygg AB", "5561234567")).await;
    let seeded = resolver.resolve_mention(&seed).await.unwrap();
    let target = seeded.entity.unwrap();

    let fuzzy = ingest(
        &resolver,
        Mention::new(
            EntityType::Company,
            "Nordisk Byg",
            "NORDISK BYG",
            granska_core::ProvenanceId::new(),
        ),
    )
    .await;
    resolver.resolve_mention(&fuzzy).await.unwrap();

    let queue = ReviewQueue::new(resolver.clone());
    let decision = queue.next().await.unwrap().unwrap();
    let reviewed = queue
        .submit(
            decision.id,
            ReviewVerdict::HumanMatch { entity: target },
            "analyst-7",
        )
        .await
        .unwrap();
    assert_eq!(reviewed.outcome, DecisionOutcome::HumanMatched { entity: target });

    let mention = resolver.store().mention(fuzzy.id).await.unwrap();
    assert_eq!(mention.resolution.status, ResolutionStatus::HumanMatched);
    assert_eq!(mention.resolution.entity, Some(target));
    assert_eq!(mention.resolution.reviewer.as_deref(), Some("analyst-7"));

    // Queue drained
    assert!(queue.next().await.unwrap().is_none());
}

#[tokio::test]
async fn human_reject_creates_new_entity() {
    let resolver = setup();

    let seed = ingest(&resolver, company_mention("Nordisk Bygg AB", "5561234567")).await;
    resolver.resolve_mention(&seed).await.unwrap();

    let fuzzy = ingest(
        &resolver,
        Mention::new(
            EntityType::Company,
            "Nordisk Byg",
            "NORDISK BYG",
            granska_core::ProvenanceId::new(),
        ),
    )
    .await;
    resolver.resolve_mention(&fuzzy).await.unwrap();

    let queue = ReviewQueue::new(resolver.clone());
    let decision = queue.next().await.unwrap().unwrap();
    let reviewed = queue
        .submit(decision.id, ReviewVerdict::HumanReject, "analyst-7")
        .await
        .unwrap();

    let DecisionOutcome::HumanRejected { entity } = reviewed.outcome else {
        panic!("expected HumanRejected, got {:?}", reviewed.outcome);
    };
    let mention = resolver.store().mention(fuzzy.id).await.unwrap();
    assert_eq!(mention.resolution.status, ResolutionStatus::HumanRejected);
    assert_eq!(mention.resolution.entity, Some(entity));
    assert_eq!(resolver.store().count_entities(None).await.unwrap(), 2);
}

#[tokio::test]
async fn batch_resolution_reports_summary() {
    let resolver = setup();
    let orgnummers = ["5561234567", "5560000415", "5565554457"];
    for (i, orgnummer) in orgnummers.iter().enumerate() {
        ingest(
            &resolver,
            company_mention(&format!("Bolag {i} AB"), orgnummer),
        )
        .await;
    }
    let summary = resolver.resolve_pending(10).await.unwrap();
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.new_entities, 3);
    assert_eq!(summary.failed, 0);
}

#[tokio::test]
async fn ground_truth_metrics_over_resolved_mentions() {
    let resolver = setup();
    let store = resolver.store().clone();

    let a1 = ingest(&resolver, company_mention("Example AB", "5561234567")).await;
    let a2 = ingest(&resolver, company_mention("EXAMPLE AKTIEBOLAG", "5561234567")).await;
    let b = ingest(&resolver, company_mention("Annat Bolag AB", "5560000415")).await;
    resolver.resolve_pending(10).await.unwrap();

    store
        .add_ground_truth(GroundTruthPair::new(a1.id, a2.id, true, "annotation"))
        .await
        .unwrap();
    store
        .add_ground_truth(GroundTruthPair::new(a1.id, b.id, false, "annotation"))
        .await
        .unwrap();

    let report = ValidationHarness::new(store).evaluate().await.unwrap();
    assert_eq!(report.true_positives, 1);
    assert_eq!(report.true_negatives, 1);
    assert_eq!(report.false_positives, 0);
    assert_eq!(report.false_negatives, 0);
    assert!(report.meets_targets(0.995, 0.90));
}
