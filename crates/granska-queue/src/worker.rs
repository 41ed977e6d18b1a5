//! Worker pool for processing queued jobs.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use crate::backend::QueueBackend;
use crate::job::{Job, JobResult, JobStatus};

#[derive(Clone, Copy)]
pub struct WorkerConfig {
    pub max_concurrency: usize,
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            poll_interval: Duration::from_millis(100),
        }
    }
}

type JobFactory =
    Box<dyn Fn(serde_json::Value) -> Result<Box<dyn Job>, serde_json::Error> + Send + Sync>;

struct JobRegistry {
    factories: RwLock<std::collections::HashMap<String, JobFactory>>,
}

/// Polls the queue backend and executes registered job types
pub struct WorkerPool<B: QueueBackend + ?Sized> {
    pub backend: Arc<B>,
    config: WorkerConfig,
    registry: Arc<JobRegistry>,
    stopping: Arc<AtomicBool>,
}

impl<B: QueueBackend + 'static> WorkerPool<B> {
    pub fn new(backend: B, config: WorkerConfig) -> Self {
        Self::new_with_arc(Arc::new(backend), config)
    }
}

impl<B: QueueBackend + ?Sized + 'static> WorkerPool<B> {
    /// Create a pool over an existing Arc backend (supports dyn dispatch)
    pub fn new_with_arc(backend: Arc<B>, config: WorkerConfig) -> Self {
        Self {
            backend,
            config,
            registry: Arc::new(JobRegistry {
                factories: RwLock::new(std::collections::HashMap::new()),
            }),
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register a plain deserializable job type
    pub fn register_job_type<J: Job + DeserializeOwned + 'static>(&self, name: &str) {
        let factory = Box::new(|payload: serde_json::Value| {
            let job: J = serde_json::from_value(payload)?;
            Ok(Box::new(job) as Box<dyn Job>)
        });
        self.registry
            .factories
            .write()
            .expect("job registry lock poisoned")
            .insert(name.to_string(), factory);
    }

    /// Register a factory for jobs needing injected dependencies
    pub fn register_job_factory<F>(&self, name: &str, factory: F)
    where
        F: Fn(serde_json::Value) -> Box<dyn Job> + Send + Sync + 'static,
    {
        self.registry
            .factories
            .write()
            .expect("job registry lock poisoned")
            .insert(
                name.to_string(),
                Box::new(move |payload| Ok(factory(payload))),
            );
    }

    /// Signal the polling loop to stop after in-flight jobs complete
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    /// Run the polling loop until [`WorkerPool::stop`] is called
    pub async fn start(&self) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        info!(
            concurrency = self.config.max_concurrency,
            "worker pool started"
        );

        while !self.stopping.load(Ordering::SeqCst) {
            if semaphore.available_permits() == 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
                continue;
            }
            match self.backend.dequeue().await {
                Ok(Some(entry)) => {
                    let permit = semaphore
                        .clone()
                        .acquire_owned()
                        .await
                        .expect("worker semaphore closed unexpectedly");
                    let backend = self.backend.clone();
                    let registry = self.registry.clone();
                    tokio::spawn(async move {
                        process_entry(backend, registry, entry).await;
                        drop(permit);
                    });
                }
                Ok(None) => tokio::time::sleep(self.config.poll_interval).await,
                Err(e) => {
                    error!(error = %e, "queue error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        // Wait for in-flight jobs before returning
        let _ = semaphore
            .acquire_many(self.config.max_concurrency as u32)
            .await;
        info!("worker pool stopped");
    }

    /// Process jobs until the queue has nothing due. Used by batch drivers
    /// and tests; processes sequentially.
    pub async fn drain(&self) {
        while let Ok(Some(entry)) = self.backend.dequeue().await {
            process_entry(self.backend.clone(), self.registry.clone(), entry).await;
        }
    }
}

async fn process_entry<B: QueueBackend + ?Sized>(
    backend: Arc<B>,
    registry: Arc<JobRegistry>,
    entry: crate::job::JobEntry,
) {
    let job_result = {
        let factories = registry.factories.read().expect("job registry lock poisoned");
        factories
            .get(&entry.job_type)
            .map(|f| f(entry.payload.clone()))
    };

    match job_result {
        Some(Ok(mut job)) => {
            info!(job = %entry.id, job_type = %entry.job_type, attempt = entry.attempts, "processing job");
            match job.execute().await {
                JobResult::Success(value) => {
                    if let Some(value) = value {
                        let _ = backend.set_result(entry.id, value).await;
                    }
                    let _ = backend
                        .update_status(entry.id, JobStatus::Completed, None, None)
                        .await;
                }
                JobResult::Retry(e) => {
                    if entry.attempts + 1 >= job.max_retries() {
                        warn!(job = %entry.id, error = %e, "retries exhausted, dead-lettering");
                        let _ = backend
                            .update_status(entry.id, JobStatus::DeadLetter, Some(e), None)
                            .await;
                    } else {
                        let delay = job.backoff_strategy().delay(entry.attempts);
                        info!(
                            job = %entry.id,
                            attempt = entry.attempts + 1,
                            delay_secs = delay.as_secs(),
                            "job failed, rescheduling with backoff"
                        );
                        let _ = backend
                            .update_status(
                                entry.id,
                                JobStatus::Failed(entry.attempts + 1),
                                Some(e),
                                Some(delay.as_secs()),
                            )
                            .await;
                    }
                }
                JobResult::Fatal(e) => {
                    let _ = backend
                        .update_status(entry.id, JobStatus::DeadLetter, Some(e), None)
                        .await;
                }
            }
        }
        Some(Err(e)) => {
            error!(job = %entry.id, error = %e, "job payload deserialization failed");
            let _ = backend
                .update_status(entry.id, JobStatus::DeadLetter, Some(e.to_string()), None)
                .await;
        }
        None => {
            warn!(job_type = %entry.job_type, "no handler registered for job type");
            let _ = backend
                .update_status(
                    entry.id,
                    JobStatus::DeadLetter,
                    Some(format!("no handler for {}", entry.job_type)),
                    None,
                )
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryQueue;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct CountdownJob {
        fail_times: u32,
    }

    #[async_trait::async_trait]
    impl Job for CountdownJob {
        fn name(&self) -> &str {
            "countdown"
        }

        async fn execute(&mut self) -> JobResult {
            if self.fail_times > 0 {
                JobResult::Retry("not yet".into())
            } else {
                JobResult::Success(Some(serde_json::json!({ "done": true })))
            }
        }

        fn backoff_strategy(&self) -> crate::job::BackoffStrategy {
            crate::job::BackoffStrategy::Constant { secs: 0 }
        }
    }

    #[tokio::test]
    async fn successful_job_completes_with_result() {
        let pool = WorkerPool::new(MemoryQueue::new(), WorkerConfig::default());
        pool.register_job_type::<CountdownJob>("countdown");
        let id = pool
            .backend
            .enqueue("countdown", serde_json::json!({ "fail_times": 0 }), None)
            .await
            .unwrap();
        pool.drain().await;

        let entry = pool.backend.get(id).await.unwrap().unwrap();
        assert_eq!(entry.status, JobStatus::Completed);
        assert_eq!(entry.result, Some(serde_json::json!({ "done": true })));
    }

    #[tokio::test]
    async fn retrying_job_dead_letters_after_max_attempts() {
        let pool = WorkerPool::new(MemoryQueue::new(), WorkerConfig::default());
        pool.register_job_type::<CountdownJob>("countdown");
        // Always fails; max_retries default 3
        let id = pool
            .backend
            .enqueue("countdown", serde_json::json!({ "fail_times": 99 }), None)
            .await
            .unwrap();
        pool.drain().await;

        let entry = pool.backend.get(id).await.unwrap().unwrap();
        assert_eq!(entry.status, JobStatus::DeadLetter);
        assert_eq!(entry.attempts, 2, "two reschedules before the third strike");
    }

    #[tokio::test]
    async fn unknown_job_type_dead_letters() {
        let pool = WorkerPool::new(MemoryQueue::new(), WorkerConfig::default());
        let id = pool
            .backend
            .enqueue("mystery", serde_json::json!({}), None)
            .await
            .unwrap();
        pool.drain().await;
        let entry = pool.backend.get(id).await.unwrap().unwrap();
        assert_eq!(entry.status, JobStatus::DeadLetter);
    }
}
