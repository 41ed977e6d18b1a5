//! Human review queue over pending resolution decisions.

use tracing::info;

use granska_core::{
    Actor, CoreError, CoreResult, DecisionId, DecisionOutcome, EntityType, ResolutionDecision,
    ResolutionMethod, ResolutionRecord, ResolutionStatus, ReviewVerdict,
};

use crate::resolver::Resolver;

/// Ordered queue of ambiguous resolutions awaiting a verdict
#[derive(Clone, Debug)]
pub struct ReviewQueue {
    resolver: Resolver,
}

impl ReviewQueue {
    pub fn new(resolver: Resolver) -> Self {
        Self { resolver }
    }

    /// Next decision to review, highest priority first, FIFO within priority
    pub async fn next(&self) -> CoreResult<Option<ResolutionDecision>> {
        Ok(self
            .resolver
            .store()
            .pending_decisions(None, 1)
            .await?
            .into_iter()
            .next())
    }

    /// Next decision restricted to one mention type
    pub async fn next_of_type(
        &self,
        mention_type: EntityType,
    ) -> CoreResult<Option<ResolutionDecision>> {
        Ok(self
            .resolver
            .store()
            .pending_decisions(Some(mention_type), 1)
            .await?
            .into_iter()
            .next())
    }

    pub async fn list(&self, limit: usize) -> CoreResult<Vec<ResolutionDecision>> {
        self.resolver.store().pending_decisions(None, limit).await
    }

    /// Apply a reviewer verdict: bind the mention, update the decision, and
    /// write the HUMAN_REVIEW audit event. Rejecting all candidates creates
    /// a fresh entity from the mention.
    pub async fn submit(
        &self,
        decision_id: DecisionId,
        verdict: ReviewVerdict,
        reviewer: &str,
    ) -> CoreResult<ResolutionDecision> {
        let store = self.resolver.store();
        let mut decision = store.decision(decision_id).await?;
        if !decision.is_pending_review() {
            return Err(CoreError::Invariant(format!(
                "decision {decision_id} is not pending review"
            )));
        }
        let mention = store.mention(decision.mention).await?;

        match verdict {
            ReviewVerdict::HumanMatch { entity } => {
                if !decision.candidates.iter().any(|c| c.entity == entity) {
                    return Err(CoreError::Validation(format!(
                        "entity {entity} is not a candidate of decision {decision_id}"
                    )));
                }
                self.resolver.attach_mention(&mention, entity).await?;
                store
                    .resolve_mention(
                        mention.id,
                        ResolutionRecord {
                            status: ResolutionStatus::HumanMatched,
                            entity: Some(entity),
                            confidence: decision
                                .candidates
                                .iter()
                                .find(|c| c.entity == entity)
                                .map(|c| c.score),
                            method: Some(ResolutionMethod::HumanReview),
                            resolved_at: Some(chrono::Utc::now()),
                            reviewer: Some(reviewer.to_string()),
                        },
                    )
                    .await?;
                decision.outcome = DecisionOutcome::HumanMatched { entity };
            }
            ReviewVerdict::HumanReject => {
                let entity = self.resolver.create_entity_from_mention(&mention).await?;
                store
                    .resolve_mention(
                        mention.id,
                        ResolutionRecord {
                            status: ResolutionStatus::HumanRejected,
                            entity: Some(entity.id),
                            confidence: None,
                            method: Some(ResolutionMethod::HumanReview),
                            resolved_at: Some(chrono::Utc::now()),
                            reviewer: Some(reviewer.to_string()),
                        },
                    )
                    .await?;
                decision.outcome = DecisionOutcome::HumanRejected { entity: entity.id };
            }
        }

        decision.reviewed_at = Some(chrono::Utc::now());
        decision.reviewer = Some(reviewer.to_string());
        store
            .record_review(&decision, Actor::User(reviewer.to_string()))
            .await?;
        info!(decision = %decision.id, reviewer, "review verdict applied");
        Ok(decision)
    }
}
