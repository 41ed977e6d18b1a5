//! Durable queue backend on SQLite.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::backend::{QueueBackend, QueueCounts, QueueError};
use crate::job::{JobEntry, JobId, JobStatus};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    job_type TEXT NOT NULL,
    payload TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    run_at TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    result TEXT
);
CREATE INDEX IF NOT EXISTS idx_jobs_due ON jobs(status, run_at);
"#;

/// Durable queue backend using SQLite
pub struct SqliteQueue {
    pool: SqlitePool,
}

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn backend_err(e: sqlx::Error) -> QueueError {
    QueueError::Backend(e.to_string())
}

fn status_str(status: JobStatus) -> String {
    match status {
        JobStatus::Pending => "pending".to_string(),
        JobStatus::Running => "running".to_string(),
        JobStatus::Completed => "completed".to_string(),
        JobStatus::Failed(n) => format!("failed:{n}"),
        JobStatus::DeadLetter => "dead_letter".to_string(),
    }
}

fn parse_status(s: &str) -> JobStatus {
    match s {
        "pending" => JobStatus::Pending,
        "running" => JobStatus::Running,
        "completed" => JobStatus::Completed,
        "dead_letter" => JobStatus::DeadLetter,
        other => other
            .strip_prefix("failed:")
            .and_then(|n| n.parse().ok())
            .map(JobStatus::Failed)
            .unwrap_or(JobStatus::DeadLetter),
    }
}

impl SqliteQueue {
    pub async fn new(pool: SqlitePool) -> Result<Self, QueueError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(backend_err)?;
        Ok(Self { pool })
    }

    fn decode(row: &sqlx::sqlite::SqliteRow) -> Result<JobEntry, QueueError> {
        let parse_ts = |s: String| {
            DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| QueueError::Serialization(e.to_string()))
        };
        let payload: String = row.get("payload");
        let result: Option<String> = row.get("result");
        Ok(JobEntry {
            id: Uuid::parse_str(&row.get::<String, _>("id"))
                .map_err(|e| QueueError::Serialization(e.to_string()))?,
            job_type: row.get("job_type"),
            payload: serde_json::from_str(&payload)
                .map_err(|e| QueueError::Serialization(e.to_string()))?,
            status: parse_status(&row.get::<String, _>("status")),
            created_at: parse_ts(row.get("created_at"))?,
            run_at: parse_ts(row.get("run_at"))?,
            attempts: row.get::<i64, _>("attempts") as u32,
            last_error: row.get("last_error"),
            result: result
                .map(|r| serde_json::from_str(&r))
                .transpose()
                .map_err(|e| QueueError::Serialization(e.to_string()))?,
        })
    }
}

#[async_trait]
impl QueueBackend for SqliteQueue {
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
        sqlx::query(
            "INSERT INTO jobs (id, job_type, payload, status, created_at, run_at)
             VALUES (?, ?, ?, 'pending', ?, ?)",
        )
        .bind(id.to_string())
        .bind(job_type)
        .bind(payload.to_string())
        .bind(ts(now))
        .bind(ts(run_at))
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        Ok(id)
    }

    async fn dequeue(&self) -> Result<Option<JobEntry>, QueueError> {
        // Claim-by-update so concurrent workers never share a job
        let claimed = sqlx::query(
            r#"
            UPDATE jobs SET status = 'running'
            WHERE id = (
                SELECT id FROM jobs
                WHERE status = 'pending' AND run_at <= ?
                ORDER BY run_at, created_at, id
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(ts(Utc::now()))
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?;

        claimed.as_ref().map(Self::decode).transpose()
    }

    async fn update_status(
        &self,
        id: JobId,
        status: JobStatus,
        error: Option<String>,
        retry_delay_secs: Option<u64>,
    ) -> Result<(), QueueError> {
        let result = match (status, retry_delay_secs) {
            (JobStatus::Failed(attempts), Some(delay)) => {
                let run_at = Utc::now() + chrono::Duration::seconds(delay as i64);
                sqlx::query(
                    "UPDATE jobs SET status = 'pending', attempts = ?, last_error = ?, run_at = ?
                     WHERE id = ?",
                )
                .bind(attempts as i64)
                .bind(error)
                .bind(ts(run_at))
                .bind(id.to_string())
                .execute(&self.pool)
                .await
            }
            (status, _) => {
                sqlx::query("UPDATE jobs SET status = ?, last_error = ? WHERE id = ?")
                    .bind(status_str(status))
                    .bind(error)
                    .bind(id.to_string())
                    .execute(&self.pool)
                    .await
            }
        }
        .map_err(backend_err)?;

        if result.rows_affected() == 0 {
            return Err(QueueError::NotFound(id));
        }
        Ok(())
    }

    async fn set_result(&self, id: JobId, result: Value) -> Result<(), QueueError> {
        let updated = sqlx::query("UPDATE jobs SET result = ? WHERE id = ?")
            .bind(result.to_string())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        if updated.rows_affected() == 0 {
            return Err(QueueError::NotFound(id));
        }
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<JobEntry>, QueueError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_err)?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn counts(&self) -> Result<QueueCounts, QueueError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(backend_err)?;
        let mut counts = QueueCounts::default();
        for row in rows {
            let n = row.get::<i64, _>("n") as usize;
            match parse_status(&row.get::<String, _>("status")) {
                JobStatus::Pending | JobStatus::Failed(_) => counts.pending += n,
                JobStatus::Running => counts.running += n,
                JobStatus::Completed => counts.completed += n,
                JobStatus::DeadLetter => counts.dead_letter += n,
            }
        }
        Ok(counts)
    }
}
