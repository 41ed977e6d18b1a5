//! The three recurring platform jobs.
//!
//! Jobs are rebuilt from their queue payloads through factories that inject
//! engine handles, so payloads stay plain JSON and jobs stay idempotent.

use serde::{Deserialize, Serialize};
use serde_json::json;

use granska_core::{EntityId, EntityType};
use granska_derive::{CancelFlag, DerivationEngine};
use granska_patterns::AlertEngine;
use granska_queue::{Job, JobResult};
use granska_resolve::Resolver;

pub const RESOLVE_BATCH: &str = "resolve_batch";
pub const DERIVATION_RUN: &str = "derivation_run";
pub const ALERT_SCAN: &str = "alert_scan";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveBatchPayload {
    pub limit: usize,
}

/// Batch resolution of pending mentions, followed by alert scans over the
/// companies the batch created or touched.
#[derive(Debug)]
pub struct ResolveBatchJob {
    pub resolver: Resolver,
    pub alerts: AlertEngine,
    pub payload: ResolveBatchPayload,
}

#[async_trait::async_trait]
impl Job for ResolveBatchJob {
    fn name(&self) -> &str {
        RESOLVE_BATCH
    }

    async fn execute(&mut self) -> JobResult {
        let (summary, outcomes) = match self
            .resolver
            .resolve_pending_outcomes(self.payload.limit)
            .await
        {
            Ok(result) => result,
            Err(e) if e.is_retryable() => return JobResult::Retry(e.to_string()),
            Err(e) => return JobResult::Fatal(e.to_string()),
        };

        // Streaming alerts: every company bound in this batch gets scanned
        let companies: Vec<EntityId> = outcomes
            .iter()
            .filter(|o| o.decision.mention_type == EntityType::Company)
            .filter_map(|o| o.entity)
            .collect();
        let alerts = match self.alerts.scan_companies(&companies).await {
            Ok(alerts) => alerts.len(),
            Err(e) if e.is_retryable() => return JobResult::Retry(e.to_string()),
            Err(e) => return JobResult::Fatal(e.to_string()),
        };

        JobResult::Success(Some(json!({
            "processed": summary.processed,
            "auto_matched": summary.auto_matched,
            "queued_for_review": summary.queued_for_review,
            "new_entities": summary.new_entities,
            "failed": summary.failed,
            "alerts_emitted": alerts,
        })))
    }
}

/// Nightly derivation run
#[derive(Debug)]
pub struct DerivationJob {
    pub engine: DerivationEngine,
    pub cancel: CancelFlag,
}

#[async_trait::async_trait]
impl Job for DerivationJob {
    fn name(&self) -> &str {
        DERIVATION_RUN
    }

    async fn execute(&mut self) -> JobResult {
        match self.engine.run(&self.cancel).await {
            Ok(report) => JobResult::Success(Some(json!({
                "rule_version": report.rule_version,
                "entities_processed": report.entities_processed,
                "facts_written": report.facts_written,
                "facts_unchanged": report.facts_unchanged,
                "cancelled": report.cancelled,
                "elapsed_ms": report.elapsed.as_millis() as u64,
            }))),
            Err(e) if e.is_retryable() => JobResult::Retry(e.to_string()),
            Err(e) => JobResult::Fatal(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertScanPayload {
    pub entities: Vec<EntityId>,
}

/// On-demand alert scan over specific companies
#[derive(Debug)]
pub struct AlertScanJob {
    pub engine: AlertEngine,
    pub payload: AlertScanPayload,
}

#[async_trait::async_trait]
impl Job for AlertScanJob {
    fn name(&self) -> &str {
        ALERT_SCAN
    }

    async fn execute(&mut self) -> JobResult {
        match self.engine.scan_companies(&self.payload.entities).await {
            Ok(alerts) => JobResult::Success(Some(json!({ "alerts_emitted": alerts.len() }))),
            Err(e) if e.is_retryable() => JobResult::Retry(e.to_string()),
            Err(e) => JobResult::Fatal(e.to_string()),
        }
    }
}
