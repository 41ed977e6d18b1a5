//! The driver: wires engines to the job queue and runs the worker pool.

use std::sync::Arc;
use tracing::info;

use granska_core::{CoreConfig, CoreError, CoreResult, Mention, Provenance};
use granska_derive::{CancelFlag, DerivationEngine};
use granska_patterns::AlertEngine;
use granska_persist::Store;
use granska_queue::{JobId, QueueBackend, QueueCounts, WorkerConfig, WorkerPool};
use granska_resolve::{BlockingIndex, Resolver, ReviewQueue};

use crate::jobs::{
    AlertScanJob, AlertScanPayload, DerivationJob, ResolveBatchJob, ResolveBatchPayload,
    ALERT_SCAN, DERIVATION_RUN, RESOLVE_BATCH,
};

/// Ingestion backlog size that triggers an automatic resolution batch
const BACKLOG_TRIGGER: usize = 500;

/// Orchestrates ingestion, resolution passes, derivation, and alert scans
pub struct Driver {
    store: Store,
    config: Arc<CoreConfig>,
    resolver: Resolver,
    derivation: DerivationEngine,
    alerts: AlertEngine,
    pool: WorkerPool<dyn QueueBackend>,
    cancel: CancelFlag,
}

impl Driver {
    pub fn new(
        store: Store,
        config: Arc<CoreConfig>,
        queue: Arc<dyn QueueBackend>,
        worker_config: WorkerConfig,
    ) -> Self {
        let index = Arc::new(BlockingIndex::new());
        let resolver = Resolver::new(store.clone(), index, config.clone());
        let derivation = DerivationEngine::new(store.clone(), config.clone());
        let alerts = AlertEngine::new(store.clone(), config.clone());
        let pool = WorkerPool::new_with_arc(queue, worker_config);
        let cancel = CancelFlag::new();

        let driver = Self {
            store,
            config,
            resolver,
            derivation,
            alerts,
            pool,
            cancel,
        };
        driver.register_jobs();
        driver
    }

    fn register_jobs(&self) {
        let resolver = self.resolver.clone();
        let alerts = self.alerts.clone();
        self.pool.register_job_factory(RESOLVE_BATCH, move |payload| {
            let payload: ResolveBatchPayload =
                serde_json::from_value(payload).unwrap_or(ResolveBatchPayload { limit: 1000 });
            Box::new(ResolveBatchJob {
                resolver: resolver.clone(),
                alerts: alerts.clone(),
                payload,
            })
        });

        let derivation = self.derivation.clone();
        let cancel = self.cancel.clone();
        self.pool.register_job_factory(DERIVATION_RUN, move |_payload| {
            Box::new(DerivationJob {
                engine: derivation.clone(),
                cancel: cancel.clone(),
            })
        });

        let alerts = self.alerts.clone();
        self.pool.register_job_factory(ALERT_SCAN, move |payload| {
            let payload: AlertScanPayload = serde_json::from_value(payload)
                .unwrap_or(AlertScanPayload { entities: vec![] });
            Box::new(AlertScanJob {
                engine: alerts.clone(),
                payload,
            })
        });
    }

    /// Populate the blocking index from the store. Call once at startup.
    pub async fn init(&self) -> CoreResult<()> {
        let page = 1000;
        let mut offset = 0;
        loop {
            let entities = self.store.list_entities(None, offset, page).await?;
            if entities.is_empty() {
                break;
            }
            for entity in &entities {
                if entity.is_active() {
                    let identifiers = self.store.identifiers_for_entity(entity.id).await?;
                    self.resolver.index().index_entity(entity, &identifiers);
                }
            }
            offset += page;
        }
        info!("driver initialized, blocking index rebuilt");
        Ok(())
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn review_queue(&self) -> ReviewQueue {
        ReviewQueue::new(self.resolver.clone())
    }

    pub fn config(&self) -> &Arc<CoreConfig> {
        &self.config
    }

    /// Ingestion boundary: persist adapter-delivered mentions. Triggers a
    /// resolution batch when the pending backlog grows large enough.
    pub async fn ingest(&self, batch: Vec<(Mention, Provenance)>) -> CoreResult<usize> {
        let count = batch.len();
        for (mention, provenance) in batch {
            self.store.create_mention(mention, provenance).await?;
        }
        let backlog = self.store.pending_mentions(BACKLOG_TRIGGER).await?.len();
        if backlog >= BACKLOG_TRIGGER {
            info!(backlog, "backlog trigger reached, enqueueing resolution");
            self.enqueue_resolution(backlog).await?;
        }
        Ok(count)
    }

    pub async fn enqueue_resolution(&self, limit: usize) -> CoreResult<JobId> {
        self.pool
            .backend
            .enqueue(
                RESOLVE_BATCH,
                serde_json::to_value(ResolveBatchPayload { limit })?,
                None,
            )
            .await
            .map_err(queue_err)
    }

    pub async fn enqueue_derivation(&self, delay_secs: Option<u64>) -> CoreResult<JobId> {
        self.pool
            .backend
            .enqueue(DERIVATION_RUN, serde_json::json!({}), delay_secs)
            .await
            .map_err(queue_err)
    }

    pub async fn enqueue_alert_scan(
        &self,
        entities: Vec<granska_core::EntityId>,
    ) -> CoreResult<JobId> {
        self.pool
            .backend
            .enqueue(
                ALERT_SCAN,
                serde_json::to_value(AlertScanPayload { entities })?,
                None,
            )
            .await
            .map_err(queue_err)
    }

    pub async fn queue_counts(&self) -> CoreResult<QueueCounts> {
        self.pool.backend.counts().await.map_err(queue_err)
    }

    /// Run the worker loop until [`Driver::shutdown`] is called
    pub async fn run_worker(&self) {
        self.pool.start().await;
    }

    /// Process queued jobs until the queue is empty (batch mode)
    pub async fn drain(&self) {
        self.pool.drain().await;
    }

    /// Stop the worker loop and signal long-running jobs to checkpoint
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.pool.stop();
    }
}

fn queue_err(e: granska_queue::QueueError) -> CoreError {
    CoreError::Storage(e.to_string())
}
