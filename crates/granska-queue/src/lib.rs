//! # Granska Queue
//!
//! Background job queue driving the recurring platform tasks:
//!
//! - [`Job`] — executable unit with retry/backoff policy
//! - [`QueueBackend`] — memory and SQLite implementations
//! - [`WorkerPool`] — semaphore-bounded polling executor

pub mod backend;
pub mod job;
pub mod memory;
pub mod sqlite;
pub mod worker;

pub use backend::{QueueBackend, QueueCounts, QueueError};
pub use job::{BackoffStrategy, Job, JobEntry, JobId, JobResult, JobStatus};
pub use memory::MemoryQueue;
pub use sqlite::SqliteQueue;
pub use worker::{WorkerConfig, WorkerPool};
