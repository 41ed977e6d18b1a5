//! Derivation engine runs against the in-memory store.

use std::sync::Arc;

use chrono::NaiveDate;
use granska_core::{
    derived, Actor, CoreConfig, EntityType, Fact, FactValue, Provenance, RelationshipPredicate,
    SourceType,
};
use granska_derive::{CancelFlag, DerivationEngine};
use granska_persist::{MemoryBackend, Store};

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn provenance() -> Provenance {
    Provenance::new(SourceType::AuthoritativeRegistry, "skv:feed", "registry_feed", "1.0")
}

struct Fixture {
    store: Store,
    engine: DerivationEngine,
    person: granska_core::EntityId,
    companies: Vec<granska_core::EntityId>,
}

/// One director with three zero-employee, zero-revenue companies
async fn shell_mill() -> Fixture {
    let store = Store::new(Arc::new(MemoryBackend::new()));
    let config = Arc::new(CoreConfig::default());
    let engine = DerivationEngine::new(store.clone(), config);

    let person = store
        .create_entity(EntityType::Person, "PELLE PETTERSSON", 0.9, provenance(), Actor::System)
        .await
        .unwrap()
        .id;

    let p = provenance();
    let p_id = p.id;
    store.add_provenance(p).await.unwrap();

    let mut companies = Vec::new();
    for i in 0..3 {
        let company = store
            .create_entity(
                EntityType::Company,
                format!("SKAL {i} AB"),
                0.9,
                provenance(),
                Actor::System,
            )
            .await
            .unwrap()
            .id;
        companies.push(company);

        for (predicate, value) in [
            ("EMPLOYEE_COUNT", FactValue::Integer(0)),
            ("REVENUE", FactValue::Integer(0)),
            ("SNI_CODE", FactValue::Text("64190".into())),
        ] {
            store
                .add_fact(
                    Fact::attribute(company, predicate, value, day(2024, 1, 1), 1.0, p_id),
                    Actor::System,
                )
                .await
                .unwrap();
        }
        store
            .add_fact(
                Fact::relationship(
                    person,
                    RelationshipPredicate::DirectorOf,
                    company,
                    day(2024, 6, 1),
                    1.0,
                    p_id,
                ),
                Actor::System,
            )
            .await
            .unwrap();
    }

    Fixture {
        store,
        engine,
        person,
        companies,
    }
}

#[tokio::test]
async fn shell_indicators_and_risk_scores_derived() {
    let fx = shell_mill().await;
    let report = fx.engine.run(&CancelFlag::new()).await.unwrap();
    assert!(!report.cancelled);
    assert!(report.facts_written > 0);

    for company in &fx.companies {
        let shell = fx
            .store
            .current_facts(*company, Some(derived::SHELL_INDICATOR))
            .await
            .unwrap();
        assert_eq!(shell.len(), 1);
        assert!(shell[0].is_derived());
        let Some(FactValue::Tags(tags)) = shell[0].body.value() else {
            panic!("expected tags value");
        };
        assert!(tags.contains(&"NO_EMPLOYEES".to_string()));
        assert!(tags.contains(&"NO_REVENUE".to_string()));
        assert!(tags.contains(&"GENERIC_SNI".to_string()));
        assert!(tags.contains(&"SINGLE_DIRECTOR".to_string()));

        // Lineage: derived_from references live facts
        let derivation = shell[0].derivation.as_ref().unwrap();
        assert!(!derivation.derived_from.is_empty());

        let risk = fx
            .store
            .current_facts(*company, Some(derived::RISK_SCORE))
            .await
            .unwrap();
        assert_eq!(risk.len(), 1);
    }

    // The person directs three shell companies: risk fact present
    let person_risk = fx
        .store
        .current_facts(fx.person, Some(derived::RISK_SCORE))
        .await
        .unwrap();
    assert_eq!(person_risk.len(), 1);
    let Some(FactValue::Json(value)) = person_risk[0].body.value() else {
        panic!("expected json risk value");
    };
    let factors: Vec<String> = value["risk_factors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap().to_string())
        .collect();
    assert!(factors.contains(&"shell_company_director".to_string()));
}

#[tokio::test]
async fn network_clusters_share_smallest_member_id() {
    let fx = shell_mill().await;
    fx.engine.run(&CancelFlag::new()).await.unwrap();

    let mut cluster_ids = std::collections::BTreeSet::new();
    for entity in fx.companies.iter().chain([&fx.person]) {
        let facts = fx
            .store
            .current_facts(*entity, Some(derived::NETWORK_CLUSTER))
            .await
            .unwrap();
        assert_eq!(facts.len(), 1, "entity {entity} missing cluster fact");
        if let Some(FactValue::Text(id)) = facts[0].body.value() {
            cluster_ids.insert(id.clone());
        }
    }
    assert_eq!(cluster_ids.len(), 1, "all members share one cluster id");

    let smallest = fx
        .companies
        .iter()
        .chain([&fx.person])
        .min()
        .unwrap()
        .to_string();
    assert_eq!(cluster_ids.into_iter().next().unwrap(), smallest);
}

#[tokio::test]
async fn rerun_over_unchanged_store_writes_nothing() {
    let fx = shell_mill().await;
    let first = fx.engine.run(&CancelFlag::new()).await.unwrap();
    assert!(first.facts_written > 0);

    let second = fx.engine.run(&CancelFlag::new()).await.unwrap();
    assert_eq!(second.facts_written, 0, "idempotent re-run");
    assert!(second.facts_unchanged > 0);
}

#[tokio::test]
async fn changed_input_supersedes_derived_fact() {
    let fx = shell_mill().await;
    fx.engine.run(&CancelFlag::new()).await.unwrap();

    let company = fx.companies[0];
    let old_shell = fx
        .store
        .current_facts(company, Some(derived::SHELL_INDICATOR))
        .await
        .unwrap()
        .remove(0);

    // Company hires: EMPLOYEE_COUNT 0 -> 12
    let employees = fx
        .store
        .current_facts(company, Some("EMPLOYEE_COUNT"))
        .await
        .unwrap()
        .remove(0);
    let p = provenance();
    let p_id = p.id;
    fx.store.add_provenance(p).await.unwrap();
    fx.store
        .supersede_fact(
            employees.id,
            Fact::attribute(
                company,
                "EMPLOYEE_COUNT",
                FactValue::Integer(12),
                day(2025, 1, 1),
                1.0,
                p_id,
            ),
            Actor::System,
        )
        .await
        .unwrap();

    fx.engine.run(&CancelFlag::new()).await.unwrap();

    let shell = fx
        .store
        .current_facts(company, Some(derived::SHELL_INDICATOR))
        .await
        .unwrap();
    assert_eq!(shell.len(), 1);
    assert_ne!(shell[0].id, old_shell.id, "old derived fact superseded");
    let Some(FactValue::Tags(tags)) = shell[0].body.value() else {
        panic!("expected tags");
    };
    assert!(!tags.contains(&"NO_EMPLOYEES".to_string()));

    // The superseded derived fact is retained in history
    let old = fx.store.fact(old_shell.id).await.unwrap();
    assert!(old.superseded_by.is_some());
}

#[tokio::test]
async fn cancelled_run_commits_partial_results_and_resumes() {
    let fx = shell_mill().await;
    let cancel = CancelFlag::new();
    cancel.cancel();
    let report = fx.engine.run(&cancel).await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.facts_written, 0);

    // Resuming with a fresh flag completes the work
    let resumed = fx.engine.run(&CancelFlag::new()).await.unwrap();
    assert!(!resumed.cancelled);
    assert!(resumed.facts_written > 0);
}

#[tokio::test]
async fn registration_hub_flag_derived_for_addresses() {
    let store = Store::new(Arc::new(MemoryBackend::new()));
    let mut config = CoreConfig::default();
    config.derivation.registration_hub_min_companies = 3;
    let engine = DerivationEngine::new(store.clone(), Arc::new(config));

    let address = store
        .create_entity(
            EntityType::Address,
            "STORGATAN 1, 111 22 STOCKHOLM",
            0.9,
            provenance(),
            Actor::System,
        )
        .await
        .unwrap()
        .id;

    let p = provenance();
    let p_id = p.id;
    store.add_provenance(p).await.unwrap();
    for i in 0..3 {
        let company = store
            .create_entity(
                EntityType::Company,
                format!("BREVLÅDEBOLAG {i} AB"),
                0.9,
                provenance(),
                Actor::System,
            )
            .await
            .unwrap()
            .id;
        store
            .add_fact(
                Fact::relationship(
                    company,
                    RelationshipPredicate::RegisteredAt,
                    address,
                    day(2025, 1, 1),
                    1.0,
                    p_id,
                ),
                Actor::System,
            )
            .await
            .unwrap();
    }

    engine.run(&CancelFlag::new()).await.unwrap();

    let hub = store
        .current_facts(address, Some(derived::REGISTRATION_HUB))
        .await
        .unwrap();
    assert_eq!(hub.len(), 1);
    assert_eq!(hub[0].body.value(), Some(&FactValue::Boolean(true)));
}
