//! Durable job queue on top of a [`JobStore`].
//!
//! Delivery is at-least-once. A job identity (`job_key`) has at most one live
//! job: enqueueing a key that is already queued or running is a no-op. Failed
//! jobs are retained for inspection; completed ones are purged unless
//! configured otherwise.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use trackeame_types::new_id;

use crate::error::SyncError;
use crate::store::{EnqueueOutcome, JobRecord, JobStore, NewJob};

/// Identity of the periodic trigger.
pub const SCHEDULER_KEY: &str = "shipments-scheduler";

pub const SYNC_ALL_PENDING: &str = "sync-all-pending";
pub const FETCH_EVENTS: &str = "fetch-events";

/// Key of the steady-state resync of one parcel.
pub fn resync_key(carrier_slug: &str, tracking_code: &str) -> String {
    format!("{carrier_slug}-{tracking_code}")
}

/// Key of the one-shot fetch that follows registration.
pub fn initial_fetch_key(carrier_slug: &str, tracking_code: &str) -> String {
    format!("{carrier_slug}-{tracking_code}-initial-fetch")
}

/// `FetchEvents` payload. Carrier slug and tracking code are hints only; the
/// worker re-reads the shipment before using them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchEvents {
    pub shipment_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    SyncAllPending,
    FetchEvents(FetchEvents),
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::SyncAllPending => SYNC_ALL_PENDING,
            Job::FetchEvents(_) => FETCH_EVENTS,
        }
    }

    pub fn payload(&self) -> Result<String, serde_json::Error> {
        match self {
            Job::SyncAllPending => Ok("{}".to_owned()),
            Job::FetchEvents(fetch) => serde_json::to_string(fetch),
        }
    }

    /// Rebuild a job from its stored name and payload.
    pub fn decode(name: &str, payload: &str) -> Result<Self, SyncError> {
        match name {
            SYNC_ALL_PENDING => Ok(Job::SyncAllPending),
            FETCH_EVENTS => Ok(Job::FetchEvents(serde_json::from_str(payload)?)),
            other => Err(SyncError::UnknownJob(other.to_owned())),
        }
    }
}

/// Exponential retry delay: `min(300, 10 * 2^attempts)` seconds.
pub fn backoff(attempts: u32) -> Duration {
    let secs = 10u64.saturating_mul(2u64.saturating_pow(attempts)).min(300);
    Duration::from_secs(secs)
}

#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// Deliveries per job before a retryable failure is retained as failed.
    pub max_attempts: u32,
    pub retain_completed: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retain_completed: false,
        }
    }
}

/// What happened to a job whose run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Retried { after: Duration },
    Failed,
}

#[derive(Debug, Clone)]
pub struct JobQueue<S> {
    store: S,
    config: QueueConfig,
    wakeup: Arc<Notify>,
}

impl<S: JobStore> JobQueue<S> {
    pub fn new(store: S, config: QueueConfig) -> Self {
        Self {
            store,
            config,
            wakeup: Arc::new(Notify::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> QueueConfig {
        self.config
    }

    /// Resolves when new work may be available.
    pub async fn wait_for_work(&self) {
        self.wakeup.notified().await;
    }

    pub async fn enqueue(&self, key: &str, job: &Job) -> Result<EnqueueOutcome, SyncError> {
        let outcome = self
            .store
            .enqueue_job(NewJob {
                id: new_id(),
                job_key: key.to_owned(),
                name: job.name().to_owned(),
                payload: job.payload()?,
                max_attempts: self.config.max_attempts,
                available_at: Utc::now(),
            })
            .await?;

        match &outcome {
            EnqueueOutcome::Enqueued { id } => {
                debug!(job_id = %id, job_key = key, job = job.name(), "job enqueued");
                self.wakeup.notify_one();
            }
            EnqueueOutcome::Deduplicated => {
                debug!(job_key = key, job = job.name(), "job already live; skipped");
            }
        }
        Ok(outcome)
    }

    pub async fn claim(&self) -> Result<Option<JobRecord>, sqlx::Error> {
        self.store.claim_next_job(Utc::now()).await
    }

    pub async fn complete(&self, job: &JobRecord) -> Result<(), sqlx::Error> {
        self.store.complete_job(&job.id, self.config.retain_completed).await
    }

    /// Retry a retryable failure with backoff while attempts remain; retain
    /// everything else as failed.
    pub async fn fail(&self, job: &JobRecord, err: &SyncError) -> Result<Disposition, sqlx::Error> {
        let message = err.to_string();
        if err.is_retryable() && job.attempts < job.max_attempts {
            let after = backoff(job.attempts);
            let available_at = Utc::now() + chrono::Duration::from_std(after).unwrap_or_default();
            self.store.retry_job(&job.id, &message, available_at).await?;
            Ok(Disposition::Retried { after })
        } else {
            self.store.fail_job(&job.id, &message).await?;
            Ok(Disposition::Failed)
        }
    }

    /// Re-queue jobs that have been running longer than `older_than`.
    pub async fn requeue_stale(&self, older_than: Duration) -> Result<u64, sqlx::Error> {
        let cutoff = Utc::now() - chrono::Duration::from_std(older_than).unwrap_or_default();
        let requeued = self.store.requeue_stale_jobs(cutoff).await?;
        if requeued > 0 {
            warn!(requeued, "re-queued jobs abandoned while running");
            self.wakeup.notify_one();
        } else {
            info!("no abandoned jobs to re-queue");
        }
        Ok(requeued)
    }
}

#[cfg(test)]
mod tests {
    use trackeame_carriers::AdapterError;

    use super::*;
    use crate::store::{JobStatus, SqliteStore};

    fn fetch(shipment_id: &str) -> Job {
        Job::FetchEvents(FetchEvents {
            shipment_id: shipment_id.to_owned(),
            carrier_slug: Some("andreani".into()),
            tracking_code: Some("360002423941550".into()),
        })
    }

    #[test]
    fn keys_follow_carrier_and_code() {
        assert_eq!(resync_key("andreani", "360002423941550"), "andreani-360002423941550");
        assert_eq!(
            initial_fetch_key("andreani", "360002423941550"),
            "andreani-360002423941550-initial-fetch"
        );
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff(0), Duration::from_secs(10));
        assert_eq!(backoff(1), Duration::from_secs(20));
        assert_eq!(backoff(4), Duration::from_secs(160));
        assert_eq!(backoff(5), Duration::from_secs(300));
        assert_eq!(backoff(40), Duration::from_secs(300));
    }

    #[test]
    fn payload_accepts_identifier_only() {
        let job = Job::decode(FETCH_EVENTS, r#"{"shipmentId":"shp-1"}"#).unwrap();
        assert_eq!(
            job,
            Job::FetchEvents(FetchEvents {
                shipment_id: "shp-1".into(),
                carrier_slug: None,
                tracking_code: None,
            })
        );
        let encoded = fetch("shp-2").payload().unwrap();
        assert!(encoded.contains("\"carrierSlug\":\"andreani\""));
        assert!(matches!(Job::decode("reindex", "{}"), Err(SyncError::UnknownJob(_))));
    }

    #[tokio::test]
    async fn periodic_and_initial_identities_coexist() {
        let queue = JobQueue::new(SqliteStore::in_memory().await.unwrap(), QueueConfig::default());
        let job = fetch("shp-1");
        let periodic = resync_key("andreani", "360002423941550");
        let initial = initial_fetch_key("andreani", "360002423941550");

        assert!(matches!(queue.enqueue(&periodic, &job).await.unwrap(), EnqueueOutcome::Enqueued { .. }));
        assert!(matches!(queue.enqueue(&initial, &job).await.unwrap(), EnqueueOutcome::Enqueued { .. }));
        assert_eq!(queue.enqueue(&periodic, &job).await.unwrap(), EnqueueOutcome::Deduplicated);
    }

    #[tokio::test]
    async fn retryable_failures_back_off_until_exhausted() {
        let queue = JobQueue::new(
            SqliteStore::in_memory().await.unwrap(),
            QueueConfig {
                max_attempts: 2,
                retain_completed: false,
            },
        );
        queue.enqueue("k", &fetch("shp-1")).await.unwrap();
        let timeout = SyncError::from(AdapterError::FetchTimeout {
            url: "https://www.andreani.com/envio/360002423941550".into(),
            after: Duration::from_secs(60),
        });

        let job = queue.claim().await.unwrap().unwrap();
        assert_eq!(
            queue.fail(&job, &timeout).await.unwrap(),
            Disposition::Retried { after: backoff(1) }
        );
        // Not due yet.
        assert!(queue.claim().await.unwrap().is_none());

        let stored = queue.store().get_job(&job.id).await.unwrap().unwrap();
        queue.store().retry_job(&stored.id, "timeout", Utc::now()).await.unwrap();
        let job = queue.claim().await.unwrap().unwrap();
        assert_eq!(job.attempts, 2);
        assert_eq!(queue.fail(&job, &timeout).await.unwrap(), Disposition::Failed);

        let job = queue.store().get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn final_failures_are_retained_immediately() {
        let queue = JobQueue::new(SqliteStore::in_memory().await.unwrap(), QueueConfig::default());
        queue.enqueue("k", &fetch("shp-1")).await.unwrap();
        let job = queue.claim().await.unwrap().unwrap();
        let disposition = queue
            .fail(&job, &SyncError::ShipmentNotFound("shp-1".into()))
            .await
            .unwrap();
        assert_eq!(disposition, Disposition::Failed);
        assert_eq!(
            queue.store().list_jobs(Some(JobStatus::Failed), 10).await.unwrap().len(),
            1
        );
    }
}
