//! Queue backend trait.

use async_trait::async_trait;
use serde_json::Value;

use crate::job::{JobEntry, JobId, JobStatus};

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("job not found: {0}")]
    NotFound(JobId),
}

/// Queue depth summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub dead_letter: usize,
}

/// Storage contract for the durable job queue
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Enqueue a job, optionally delayed
    async fn enqueue(
        &self,
        job_type: &str,
        payload: Value,
        delay_secs: Option<u64>,
    ) -> Result<JobId, QueueError>;

    /// Claim the next due pending job, marking it Running
    async fn dequeue(&self) -> Result<Option<JobEntry>, QueueError>;

    /// Update status after execution. `Failed` with a retry delay reschedules
    /// the job; everything else is terminal for this attempt.
    async fn update_status(
        &self,
        id: JobId,
        status: JobStatus,
        error: Option<String>,
        retry_delay_secs: Option<u64>,
    ) -> Result<(), QueueError>;

    /// Attach a result payload to a job
    async fn set_result(&self, id: JobId, result: Value) -> Result<(), QueueError>;

    async fn get(&self, id: JobId) -> Result<Option<JobEntry>, QueueError>;

    async fn counts(&self) -> Result<QueueCounts, QueueError>;
}
