//! Query boundary: the operations the HTTP layer calls into.
//!
//! HTTP framing lives outside this workspace; these methods are the
//! contract. Errors carry a machine-readable kind and a correlation id
//! tied to the audit log.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

use granska_core::{
    AccuracyReport, Actor, Alert, AlertId, AuditEventType, AuditTarget, CoreConfig, CoreError,
    CoreResult, DecisionId, Entity, EntityId, EntityType, Fact, FactId, IdentifierRecord,
    IdentifierType, RelationshipPredicate, ResolutionDecision, ReviewVerdict, TargetKind,
};
use granska_persist::{Direction, Store};
use granska_patterns::{detect, ShellNetworkMatch, ShellNetworkParams};
use granska_resolve::{Resolver, ReviewQueue, ValidationHarness};

/// Structured error envelope for the external API layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub kind: String,
    pub message: String,
    /// Ties the failure to audit log entries
    pub correlation_id: Uuid,
}

impl ErrorEnvelope {
    pub fn from_error(error: &CoreError) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
            correlation_id: Uuid::new_v4(),
        }
    }
}

/// Full entity view returned by `get_entity`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity: Entity,
    pub identifiers: Vec<IdentifierRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facts: Option<Vec<Fact>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub same_as: Option<Vec<EntityId>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubgraphEdge {
    pub from: EntityId,
    pub to: EntityId,
    pub predicate: RelationshipPredicate,
    pub fact: FactId,
}

/// Bounded neighborhood returned by `get_relationships`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subgraph {
    pub root: EntityId,
    pub nodes: Vec<Entity>,
    pub edges: Vec<SubgraphEdge>,
    /// True when the `max_nodes` cap cut the expansion short
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub entity: Entity,
    pub score: f64,
}

/// The §outbound operations, exposed as plain async methods
#[derive(Clone)]
pub struct QueryService {
    store: Store,
    config: Arc<CoreConfig>,
    resolver: Resolver,
}

impl QueryService {
    pub fn new(store: Store, config: Arc<CoreConfig>, resolver: Resolver) -> Self {
        Self {
            store,
            config,
            resolver,
        }
    }

    /// Entity snapshot with optional current facts and SAME_AS cluster.
    /// Person reads are audited as PII queries.
    pub async fn get_entity(
        &self,
        id: EntityId,
        include_facts: bool,
        include_same_as: bool,
        actor: Actor,
    ) -> CoreResult<EntitySnapshot> {
        let entity = self.store.entity(id).await?;

        if entity.entity_type == EntityType::Person {
            self.store
                .append_audit(
                    AuditEventType::PiiQuery,
                    actor,
                    AuditTarget::new(TargetKind::Entity, id),
                    json!({ "operation": "get_entity" }),
                )
                .await?;
        }

        let identifiers = self.store.identifiers_for_entity(id).await?;
        let facts = if include_facts {
            Some(self.store.current_facts(id, None).await?)
        } else {
            None
        };
        let same_as = if include_same_as {
            Some(self.store.same_as_cluster(id).await?)
        } else {
            None
        };

        Ok(EntitySnapshot {
            entity,
            identifiers,
            facts,
            same_as,
        })
    }

    /// BFS neighborhood to `depth`, capped at `max_nodes`
    pub async fn get_relationships(
        &self,
        id: EntityId,
        depth: u32,
        predicates: Option<&[RelationshipPredicate]>,
        max_nodes: Option<usize>,
    ) -> CoreResult<Subgraph> {
        let max_nodes = max_nodes
            .unwrap_or(self.config.query.max_nodes)
            .min(self.config.query.max_nodes);
        let root = self.store.entity(id).await?;

        let mut nodes: BTreeMap<EntityId, Entity> = BTreeMap::new();
        nodes.insert(root.id, root);
        let mut edges = Vec::new();
        let mut seen_edges: BTreeSet<FactId> = BTreeSet::new();
        let mut truncated = false;

        let mut frontier: VecDeque<(EntityId, u32)> = VecDeque::new();
        frontier.push_back((id, 0));
        let mut visited: BTreeSet<EntityId> = BTreeSet::new();
        visited.insert(id);

        while let Some((current, level)) = frontier.pop_front() {
            if level >= depth {
                continue;
            }
            let neighbors = self
                .store
                .neighbors(current, predicates, Direction::Both, None)
                .await?;
            for edge in neighbors {
                if nodes.len() >= max_nodes && !nodes.contains_key(&edge.neighbor) {
                    truncated = true;
                    continue;
                }
                if seen_edges.insert(edge.fact) {
                    let (from, to) = if edge.incoming {
                        (edge.neighbor, current)
                    } else {
                        (current, edge.neighbor)
                    };
                    edges.push(SubgraphEdge {
                        from,
                        to,
                        predicate: edge.predicate,
                        fact: edge.fact,
                    });
                }
                if !nodes.contains_key(&edge.neighbor) {
                    nodes.insert(edge.neighbor, self.store.entity(edge.neighbor).await?);
                }
                if visited.insert(edge.neighbor) {
                    frontier.push_back((edge.neighbor, level + 1));
                }
            }
        }

        Ok(Subgraph {
            root: id,
            nodes: nodes.into_values().collect(),
            edges,
            truncated,
        })
    }

    /// Ranked full-text search on canonical names plus identifier prefixes
    pub async fn search_entities(
        &self,
        query: &str,
        entity_type: Option<EntityType>,
        limit: usize,
        offset: usize,
    ) -> CoreResult<Vec<SearchHit>> {
        let limit = limit.min(self.config.query.search_limit).max(1);
        let needle = query.trim();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: BTreeMap<EntityId, Entity> = BTreeMap::new();
        for entity in self
            .store
            .search_entities_by_name(needle, entity_type, limit + offset)
            .await?
        {
            hits.insert(entity.id, entity);
        }

        // Identifier prefix search for digit-looking queries
        let digits: String = needle.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() >= 3 {
            for record in self
                .store
                .identifiers_by_prefix(&digits, limit + offset)
                .await?
            {
                let canonical = self.store.canonical_entity(record.entity).await?;
                if entity_type.map_or(true, |t| canonical.entity_type == t) {
                    hits.entry(canonical.id).or_insert(canonical);
                }
            }
        }

        let upper = needle.to_uppercase();
        let mut ranked: Vec<SearchHit> = hits
            .into_values()
            .map(|entity| {
                let score =
                    strsim::jaro_winkler(&upper, &entity.canonical_name.to_uppercase());
                SearchHit { entity, score }
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.entity.id.cmp(&b.entity.id))
        });
        Ok(ranked.into_iter().skip(offset).take(limit).collect())
    }

    pub async fn lookup_by_identifier(
        &self,
        id_type: IdentifierType,
        value: &str,
    ) -> CoreResult<Option<Entity>> {
        self.store.lookup_by_identifier(id_type, value).await
    }

    /// Shell-network detection; `None` uses the configured defaults
    pub async fn shell_network_detect(
        &self,
        params: Option<ShellNetworkParams>,
    ) -> CoreResult<Vec<ShellNetworkMatch>> {
        let params = params.unwrap_or_else(|| (&self.config.shell_network).into());
        detect(&self.store, params).await
    }

    pub async fn alerts_list(
        &self,
        acknowledged: Option<bool>,
        limit: usize,
    ) -> CoreResult<Vec<Alert>> {
        self.store.alerts(acknowledged, limit).await
    }

    pub async fn alerts_acknowledge(&self, id: AlertId, actor: &str) -> CoreResult<Alert> {
        self.store.acknowledge_alert(id, actor).await
    }

    pub async fn resolution_queue(&self, limit: usize) -> CoreResult<Vec<ResolutionDecision>> {
        ReviewQueue::new(self.resolver.clone()).list(limit).await
    }

    pub async fn resolution_submit_decision(
        &self,
        decision: DecisionId,
        verdict: ReviewVerdict,
        reviewer: &str,
    ) -> CoreResult<ResolutionDecision> {
        ReviewQueue::new(self.resolver.clone())
            .submit(decision, verdict, reviewer)
            .await
    }

    pub async fn accuracy_metrics(&self) -> CoreResult<AccuracyReport> {
        ValidationHarness::new(self.store.clone()).evaluate().await
    }
}
