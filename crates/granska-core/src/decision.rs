//! Resolution decisions logged by the resolver and worked by reviewers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityType;
use crate::ids::{DecisionId, EntityId, MentionId};

/// One scored feature in a comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScore {
    pub name: String,
    /// Feature value in [0, 1]
    pub value: f64,
    pub weight: f64,
}

/// A candidate entity with its combined score and feature breakdown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub entity: EntityId,
    pub score: f64,
    pub features: Vec<FeatureScore>,
}

/// What the resolver decided for a mention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionOutcome {
    /// Best score cleared the auto threshold
    AutoMatched { entity: EntityId },
    /// Ambiguous; queued for human review
    PendingReview,
    /// All candidates rejected; a fresh entity was created
    NewEntity { entity: EntityId },
    /// Reviewer confirmed a candidate
    HumanMatched { entity: EntityId },
    /// Reviewer rejected all candidates; a fresh entity was created
    HumanRejected { entity: EntityId },
}

/// Logged outcome of one resolution pass over one mention.
/// Entries with outcome `PendingReview` form the review queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionDecision {
    pub id: DecisionId,
    pub mention: MentionId,
    pub mention_type: EntityType,
    /// Candidates in descending score order, ties broken by entity id
    pub candidates: Vec<ScoredCandidate>,
    pub best_score: f64,
    pub outcome: DecisionOutcome,
    pub reason: String,
    /// Review ordering: higher first, FIFO within equal priority
    pub priority: i64,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewer: Option<String>,
}

impl ResolutionDecision {
    pub fn new(
        mention: MentionId,
        mention_type: EntityType,
        candidates: Vec<ScoredCandidate>,
        outcome: DecisionOutcome,
        reason: impl Into<String>,
    ) -> Self {
        let best_score = candidates.first().map(|c| c.score).unwrap_or(0.0);
        Self {
            id: DecisionId::new(),
            mention,
            mention_type,
            candidates,
            best_score,
            outcome,
            reason: reason.into(),
            priority: 0,
            created_at: Utc::now(),
            reviewed_at: None,
            reviewer: None,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn is_pending_review(&self) -> bool {
        matches!(self.outcome, DecisionOutcome::PendingReview)
    }
}

/// Verdict submitted by a reviewer for a queued decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewVerdict {
    HumanMatch { entity: EntityId },
    HumanReject,
}
