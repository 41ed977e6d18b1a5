//! In-memory queue backend for tests and single-process runs.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::backend::{QueueBackend, QueueCounts, QueueError};
use crate::job::{JobEntry, JobId, JobStatus};

#[derive(Default)]
pub struct MemoryQueue {
    jobs: Mutex<HashMap<JobId, JobEntry>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueBackend for MemoryQueue {
    async fn enqueue(
        &self,
        job_type: &str,
        payload: Value,
        delay_secs: Option<u64>,
    ) -> Result<JobId, QueueError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let run_at = match delay_secs {
            Some(delay) => now + chrono::Duration::seconds(delay as i64),
            None => now,
        };
        let entry = JobEntry {
            id,
            job_type: job_type.to_string(),
            payload,
            status: JobStatus::Pending,
            created_at: now,
            run_at,
            attempts: 0,
            last_error: None,
            result: None,
        };
        self.jobs.lock().await.insert(id, entry);
        Ok(id)
    }

    async fn dequeue(&self) -> Result<Option<JobEntry>, QueueError> {
        let mut jobs = self.jobs.lock().await;
        let now = Utc::now();
        let next = jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending && j.run_at <= now)
            .min_by_key(|j| (j.run_at, j.created_at, j.id))
            .map(|j| j.id);
        let Some(id) = next else {
            return Ok(None);
        };
        let entry = jobs.get_mut(&id).expect("job present under lock");
        entry.status = JobStatus::Running;
        Ok(Some(entry.clone()))
    }

    async fn update_status(
        &self,
        id: JobId,
        status: JobStatus,
        error: Option<String>,
        retry_delay_secs: Option<u64>,
    ) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().await;
        let entry = jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        entry.last_error = error;
        match (status, retry_delay_secs) {
            (JobStatus::Failed(attempts), Some(delay)) => {
                // Reschedule with backoff
                entry.status = JobStatus::Pending;
                entry.attempts = attempts;
                entry.run_at = Utc::now() + chrono::Duration::seconds(delay as i64);
            }
            (status, _) => entry.status = status,
        }
        Ok(())
    }

    async fn set_result(&self, id: JobId, result: Value) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().await;
        let entry = jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        entry.result = Some(result);
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<JobEntry>, QueueError> {
        Ok(self.jobs.lock().await.get(&id).cloned())
    }

    async fn counts(&self) -> Result<QueueCounts, QueueError> {
        let jobs = self.jobs.lock().await;
        let mut counts = QueueCounts::default();
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Running => counts.running += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed(_) => counts.pending += 1,
                JobStatus::DeadLetter => counts.dead_letter += 1,
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_dequeue_complete() {
        let queue = MemoryQueue::new();
        let id = queue
            .enqueue("noop", serde_json::json!({}), None)
            .await
            .unwrap();

        let entry = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(entry.id, id);
        assert_eq!(entry.status, JobStatus::Running);

        // Running jobs are not handed out twice
        assert!(queue.dequeue().await.unwrap().is_none());

        queue
            .update_status(id, JobStatus::Completed, None, None)
            .await
            .unwrap();
        assert_eq!(queue.counts().await.unwrap().completed, 1);
    }

    #[tokio::test]
    async fn delayed_jobs_wait_for_run_at() {
        let queue = MemoryQueue::new();
        queue
            .enqueue("later", serde_json::json!({}), Some(3600))
            .await
            .unwrap();
        assert!(queue.dequeue().await.unwrap().is_none());
        assert_eq!(queue.counts().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn failed_with_delay_reschedules() {
        let queue = MemoryQueue::new();
        let id = queue
            .enqueue("flaky", serde_json::json!({}), None)
            .await
            .unwrap();
        queue.dequeue().await.unwrap().unwrap();
        queue
            .update_status(id, JobStatus::Failed(1), Some("boom".into()), Some(0))
            .await
            .unwrap();

        let retried = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(retried.id, id);
        assert_eq!(retried.attempts, 1);
        assert_eq!(retried.last_error.as_deref(), Some("boom"));
    }
}
