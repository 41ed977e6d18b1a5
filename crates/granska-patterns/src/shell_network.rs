//! Parameterized shell-network detection over the resolved graph.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::info;

use granska_core::{
    config::ShellNetworkDefaults, derived, Actor, AuditEventType, AuditTarget, CoreResult,
    EntityId, FactValue, TargetKind,
};
use granska_persist::Store;

/// Query parameters; defaults come from configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ShellNetworkParams {
    pub min_companies: usize,
    pub max_employees: i64,
    pub max_revenue: i64,
    pub include_dissolved: bool,
}

impl From<&ShellNetworkDefaults> for ShellNetworkParams {
    fn from(d: &ShellNetworkDefaults) -> Self {
        Self {
            min_companies: d.min_companies,
            max_employees: d.max_employees,
            max_revenue: d.max_revenue,
            include_dissolved: d.include_dissolved,
        }
    }
}

/// One director controlling a qualifying set of companies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellNetworkMatch {
    pub director: EntityId,
    pub director_name: String,
    pub companies: Vec<EntityId>,
    pub match_size: usize,
    pub director_risk: f64,
}

/// Current derived risk score of an entity, 0.0 when absent
pub(crate) async fn risk_score_of(store: &Store, entity: EntityId) -> CoreResult<f64> {
    let facts = store.current_facts(entity, Some(derived::RISK_SCORE)).await?;
    Ok(facts
        .first()
        .and_then(|f| f.body.value())
        .and_then(|v| match v {
            FactValue::Json(json) => json.get("score").and_then(serde_json::Value::as_f64),
            FactValue::Decimal(d) => Some(*d),
            _ => None,
        })
        .unwrap_or(0.0))
}

async fn company_qualifies(
    store: &Store,
    company: EntityId,
    params: &ShellNetworkParams,
) -> CoreResult<bool> {
    let facts = store.current_facts(company, None).await?;

    let mut employees = 0i64;
    let mut revenue = 0i64;
    let mut dissolved = false;
    for fact in &facts {
        match (fact.predicate(), fact.body.value()) {
            ("EMPLOYEE_COUNT", Some(FactValue::Integer(n))) => employees = *n,
            ("REVENUE", Some(FactValue::Integer(n))) => revenue = *n,
            ("COMPANY_STATUS", Some(FactValue::Text(s))) => dissolved = s == "DISSOLVED",
            _ => {}
        }
    }

    Ok(employees <= params.max_employees
        && revenue <= params.max_revenue
        && (params.include_dissolved || !dissolved))
}

/// Group current DIRECTOR_OF facts by director, filter companies by the
/// parameters, retain directors with enough qualifying companies, and order
/// by `(match_size desc, director_risk desc)`.
pub async fn detect(
    store: &Store,
    params: ShellNetworkParams,
) -> CoreResult<Vec<ShellNetworkMatch>> {
    let director_of = store.current_facts_by_predicate("DIRECTOR_OF").await?;

    let mut by_director: BTreeMap<EntityId, Vec<EntityId>> = BTreeMap::new();
    for fact in director_of {
        if let Some(company) = fact.object() {
            by_director.entry(fact.subject).or_default().push(company);
        }
    }

    let mut matches = Vec::new();
    for (director, companies) in by_director {
        let mut qualifying = Vec::new();
        for company in companies {
            if company_qualifies(store, company, &params).await? {
                qualifying.push(company);
            }
        }
        qualifying.sort();
        qualifying.dedup();
        if qualifying.len() < params.min_companies {
            continue;
        }

        let entity = store.entity(director).await?;
        let director_risk = risk_score_of(store, director).await?;
        matches.push(ShellNetworkMatch {
            director,
            director_name: entity.canonical_name,
            match_size: qualifying.len(),
            companies: qualifying,
            director_risk,
        });
    }

    matches.sort_by(|a, b| {
        b.match_size
            .cmp(&a.match_size)
            .then(
                b.director_risk
                    .partial_cmp(&a.director_risk)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(a.director.cmp(&b.director))
    });

    store
        .append_audit(
            AuditEventType::PatternMatch,
            Actor::System,
            AuditTarget::new(TargetKind::Log, "shell_network"),
            json!({
                "params": serde_json::to_value(params)?,
                "matches": matches.len(),
            }),
        )
        .await?;

    info!(matches = matches.len(), "shell-network detection complete");
    Ok(matches)
}
