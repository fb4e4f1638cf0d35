use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use trackeame_types::timestamp_text;

use super::{SqliteStore, parse_optional_timestamp, parse_timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    /// Only stored when completed jobs are retained.
    Completed,
    Failed,
}

/// A row in the `jobs` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub id: String,
    pub job_key: String,
    pub name: String,
    pub payload: String,
    pub status: JobStatus,
    /// Deliveries so far, including the current one while running.
    pub attempts: u32,
    pub max_attempts: u32,
    pub error_msg: Option<String>,
    pub available_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: String,
    pub job_key: String,
    pub name: String,
    pub payload: String,
    pub max_attempts: u32,
    pub available_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued { id: String },
    /// A queued or running job already holds the key.
    Deduplicated,
}

const JOB_COLUMNS: &str = "id, job_key, name, payload, status, attempts, max_attempts, error_msg, \
     available_at, locked_at, created_at, updated_at";

type JobRow = (
    String,
    String,
    String,
    String,
    String,
    i64,
    i64,
    Option<String>,
    String,
    Option<String>,
    String,
    String,
);

fn job_from_row(row: JobRow) -> Result<JobRecord, sqlx::Error> {
    let (
        id,
        job_key,
        name,
        payload,
        status,
        attempts,
        max_attempts,
        error_msg,
        available_at,
        locked_at,
        created_at,
        updated_at,
    ) = row;
    Ok(JobRecord {
        status: status.parse().unwrap_or_else(|_| {
            tracing::warn!(job_id = %id, raw = %status, "unknown job status; treating as failed");
            JobStatus::Failed
        }),
        id,
        job_key,
        name,
        payload,
        attempts: u32::try_from(attempts).unwrap_or(0),
        max_attempts: u32::try_from(max_attempts).unwrap_or(1),
        error_msg,
        available_at: parse_timestamp(&available_at, "jobs.available_at")?,
        locked_at: parse_optional_timestamp(locked_at, "jobs.locked_at")?,
        created_at: parse_timestamp(&created_at, "jobs.created_at")?,
        updated_at: parse_timestamp(&updated_at, "jobs.updated_at")?,
    })
}

pub trait JobStore: Send + Sync + 'static {
    /// Insert a queued job unless a live job already holds its key.
    fn enqueue_job(&self, job: NewJob) -> impl Future<Output = Result<EnqueueOutcome, sqlx::Error>> + Send;

    /// Atomically move the oldest due job to `running` and count the delivery.
    fn claim_next_job(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<JobRecord>, sqlx::Error>> + Send;

    /// Finish a job. Without `retain` the row is deleted, freeing its key.
    fn complete_job(&self, id: &str, retain: bool) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Put a running job back in the queue for another delivery.
    fn retry_job(
        &self,
        id: &str,
        error: &str,
        available_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Retain a job as failed for inspection.
    fn fail_job(&self, id: &str, error: &str) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Re-queue jobs left `running` since before `locked_before`, e.g. by a
    /// process that died mid-job. Returns how many were re-queued.
    fn requeue_stale_jobs(
        &self,
        locked_before: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, sqlx::Error>> + Send;

    fn get_job(&self, id: &str) -> impl Future<Output = Result<Option<JobRecord>, sqlx::Error>> + Send;

    /// Most recently updated first.
    fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<JobRecord>, sqlx::Error>> + Send;
}

impl JobStore for SqliteStore {
    async fn enqueue_job(&self, job: NewJob) -> Result<EnqueueOutcome, sqlx::Error> {
        let now = timestamp_text(&Utc::now());
        let result = sqlx::query(
            "INSERT OR IGNORE INTO jobs (id, job_key, name, payload, status, attempts, max_attempts, \
             available_at, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, 'queued', 0, ?5, ?6, ?7, ?7)",
        )
        .bind(&job.id)
        .bind(&job.job_key)
        .bind(&job.name)
        .bind(&job.payload)
        .bind(i64::from(job.max_attempts.max(1)))
        .bind(timestamp_text(&job.available_at))
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() == 0 {
            EnqueueOutcome::Deduplicated
        } else {
            EnqueueOutcome::Enqueued { id: job.id }
        })
    }

    async fn claim_next_job(&self, now: DateTime<Utc>) -> Result<Option<JobRecord>, sqlx::Error> {
        let now = timestamp_text(&now);
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "UPDATE jobs SET status = 'running', attempts = attempts + 1, locked_at = ?1, updated_at = ?1 \
             WHERE id = (SELECT id FROM jobs WHERE status = 'queued' AND available_at <= ?1 \
                         ORDER BY available_at, created_at LIMIT 1) \
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(&now)
        .fetch_optional(&self.pool)
        .await?;
        row.map(job_from_row).transpose()
    }

    async fn complete_job(&self, id: &str, retain: bool) -> Result<(), sqlx::Error> {
        if retain {
            let now = timestamp_text(&Utc::now());
            sqlx::query(
                "UPDATE jobs SET status = 'completed', error_msg = NULL, locked_at = NULL, updated_at = ?1 \
                 WHERE id = ?2",
            )
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query("DELETE FROM jobs WHERE id = ?1")
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn retry_job(&self, id: &str, error: &str, available_at: DateTime<Utc>) -> Result<(), sqlx::Error> {
        let now = timestamp_text(&Utc::now());
        sqlx::query(
            "UPDATE jobs SET status = 'queued', error_msg = ?1, available_at = ?2, locked_at = NULL, \
             updated_at = ?3 WHERE id = ?4",
        )
        .bind(error)
        .bind(timestamp_text(&available_at))
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail_job(&self, id: &str, error: &str) -> Result<(), sqlx::Error> {
        let now = timestamp_text(&Utc::now());
        sqlx::query(
            "UPDATE jobs SET status = 'failed', error_msg = ?1, locked_at = NULL, updated_at = ?2 WHERE id = ?3",
        )
        .bind(error)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn requeue_stale_jobs(&self, locked_before: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let now = timestamp_text(&Utc::now());
        let result = sqlx::query(
            "UPDATE jobs SET status = 'queued', locked_at = NULL, available_at = ?1, updated_at = ?1, \
             error_msg = COALESCE(error_msg, 'interrupted while running') \
             WHERE status = 'running' AND (locked_at IS NULL OR locked_at < ?2)",
        )
        .bind(&now)
        .bind(timestamp_text(&locked_before))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn get_job(&self, id: &str) -> Result<Option<JobRecord>, sqlx::Error> {
        let row: Option<JobRow> = sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(job_from_row).transpose()
    }

    async fn list_jobs(&self, status: Option<JobStatus>, limit: u32) -> Result<Vec<JobRecord>, sqlx::Error> {
        let rows: Vec<JobRow> = if let Some(status) = status {
            sqlx::query_as(&format!(
                "SELECT {JOB_COLUMNS} FROM jobs WHERE status = ?1 ORDER BY updated_at DESC LIMIT ?2"
            ))
            .bind(status.as_ref())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY updated_at DESC LIMIT ?1"))
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
        };
        rows.into_iter().map(job_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn new_job(key: &str) -> NewJob {
        NewJob {
            id: trackeame_types::new_id(),
            job_key: key.to_owned(),
            name: "fetch-events".to_owned(),
            payload: "{}".to_owned(),
            max_attempts: 3,
            available_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn live_key_collapses_duplicates_until_finished() {
        let store = SqliteStore::in_memory().await.unwrap();
        let first = store.enqueue_job(new_job("andreani-X")).await.unwrap();
        assert!(matches!(first, EnqueueOutcome::Enqueued { .. }));
        assert_eq!(
            store.enqueue_job(new_job("andreani-X")).await.unwrap(),
            EnqueueOutcome::Deduplicated
        );

        // Still deduplicated while running.
        let claimed = store.claim_next_job(Utc::now()).await.unwrap().unwrap();
        assert_eq!(claimed.status, JobStatus::Running);
        assert_eq!(claimed.attempts, 1);
        assert_eq!(
            store.enqueue_job(new_job("andreani-X")).await.unwrap(),
            EnqueueOutcome::Deduplicated
        );

        // A failed job is retained but no longer blocks its key.
        store.fail_job(&claimed.id, "boom").await.unwrap();
        assert!(matches!(
            store.enqueue_job(new_job("andreani-X")).await.unwrap(),
            EnqueueOutcome::Enqueued { .. }
        ));
        let failed = store.list_jobs(Some(JobStatus::Failed), 10).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].error_msg.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn claims_only_due_jobs_and_deletes_completed() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut later = new_job("later");
        later.available_at = Utc::now() + Duration::minutes(5);
        store.enqueue_job(later).await.unwrap();
        assert!(store.claim_next_job(Utc::now()).await.unwrap().is_none());

        store.enqueue_job(new_job("now")).await.unwrap();
        let job = store.claim_next_job(Utc::now()).await.unwrap().unwrap();
        assert_eq!(job.job_key, "now");
        store.complete_job(&job.id, false).await.unwrap();
        assert!(store.get_job(&job.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn retry_and_stale_requeue_return_jobs_to_the_queue() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.enqueue_job(new_job("k")).await.unwrap();
        let job = store.claim_next_job(Utc::now()).await.unwrap().unwrap();

        store.retry_job(&job.id, "timeout", Utc::now()).await.unwrap();
        let job = store.claim_next_job(Utc::now()).await.unwrap().unwrap();
        assert_eq!(job.attempts, 2);
        assert_eq!(job.error_msg.as_deref(), Some("timeout"));

        let requeued = store
            .requeue_stale_jobs(Utc::now() + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(requeued, 1);
        let job = store.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.locked_at.is_none());
    }
}
