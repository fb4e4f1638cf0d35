//! Worker pool draining the job queue.
//!
//! Up to `concurrency` jobs run at once, each in its own task holding a
//! semaphore permit. The pool stops claiming when the shutdown channel flips
//! and waits for in-flight jobs before returning.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::error::SyncError;
use crate::pipeline::{Pipeline, PipelineStore};
use crate::queue::{Disposition, Job};
use crate::store::JobRecord;
use trackeame_carriers::AdapterError;

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub concurrency: usize,
    /// Fallback poll when no enqueue wakes the pool (other processes, delayed retries).
    pub poll_interval: Duration,
    /// A running job older than this is presumed abandoned and re-queued.
    pub stale_after: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval: Duration::from_secs(1),
            stale_after: Duration::from_secs(300),
        }
    }
}

#[derive(Debug)]
pub struct WorkerPool<S> {
    pipeline: Arc<Pipeline<S>>,
    config: WorkerConfig,
}

impl<S: PipelineStore> WorkerPool<S> {
    pub fn new(pipeline: Arc<Pipeline<S>>, config: WorkerConfig) -> Self {
        Self {
            pipeline,
            config: WorkerConfig {
                concurrency: config.concurrency.max(1),
                ..config
            },
        }
    }

    /// Claim and run jobs until `shutdown` becomes `true` (or its sender is
    /// dropped), then drain in-flight jobs.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let queue = self.pipeline.queue().clone();
        let permits = Arc::new(Semaphore::new(self.config.concurrency));
        let mut tasks = JoinSet::new();
        let mut last_sweep: Option<Instant> = None;

        info!(concurrency = self.config.concurrency, "worker pool started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    error!(error = %e, "job task panicked");
                }
            }

            let permit = tokio::select! {
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown.changed() => break,
            };

            // The first pass recovers jobs a dead process left running.
            if last_sweep.is_none_or(|at| at.elapsed() >= self.config.stale_after) {
                if let Err(e) = queue.requeue_stale(self.config.stale_after).await {
                    error!(error = %e, "stale job sweep failed");
                }
                last_sweep = Some(Instant::now());
            }

            match queue.claim().await {
                Ok(Some(job)) => {
                    let pipeline = Arc::clone(&self.pipeline);
                    tasks.spawn(async move {
                        process(&pipeline, job).await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = queue.wait_for_work() => {}
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown.changed() => break,
                    }
                }
                Err(e) => {
                    drop(permit);
                    error!(error = %e, "failed to claim job");
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }

        info!(in_flight = tasks.len(), "worker pool draining");
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "job task panicked");
            }
        }
        info!("worker pool stopped");
    }
}

/// Run one claimed job and record its outcome.
pub async fn process<S: PipelineStore>(pipeline: &Pipeline<S>, job: JobRecord) {
    let span = info_span!(
        "job",
        job_id = %job.id,
        job_key = %job.job_key,
        job = %job.name,
        attempt = job.attempts,
    );
    async {
        let started = Instant::now();
        let result = match Job::decode(&job.name, &job.payload) {
            Ok(decoded) => pipeline.run(&decoded).await,
            Err(e) => Err(e),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                if let Err(e) = pipeline.queue().complete(&job).await {
                    error!(error = %e, "failed to mark job completed");
                    return;
                }
                info!(elapsed_ms, "job completed");
            }
            Err(err) => {
                log_failure(&err, elapsed_ms);
                match pipeline.queue().fail(&job, &err).await {
                    Ok(Disposition::Retried { after }) => {
                        info!(retry_in_secs = after.as_secs(), "job scheduled for retry");
                    }
                    Ok(Disposition::Failed) => {
                        warn!(kind = err.kind(), "job failed permanently");
                    }
                    Err(e) => error!(error = %e, "failed to record job failure"),
                }
            }
        }
    }
    .instrument(span)
    .await
}

/// Markup drift is the failure operators must act on, so it logs at error.
fn log_failure(err: &SyncError, elapsed_ms: u64) {
    match err {
        SyncError::Adapter(AdapterError::ParseFailure { .. }) => {
            error!(kind = err.kind(), error = %err, elapsed_ms, "carrier page could not be parsed");
        }
        SyncError::Adapter(AdapterError::NotFound { .. }) => {
            debug!(kind = err.kind(), error = %err, elapsed_ms, "carrier has no data yet");
        }
        _ => warn!(kind = err.kind(), error = %err, elapsed_ms, "job failed"),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use tracing_test::traced_test;
    use trackeame_carriers::AdapterRegistry;
    use trackeame_types::{EventCandidate, Status};

    use super::*;
    use crate::notify::testing::RecordingNotifier;
    use crate::pipeline::testing::ScriptedAdapter;
    use crate::queue::{FetchEvents, JobQueue, QueueConfig, resync_key};
    use crate::store::{EventStore, JobStatus, JobStore, SqliteStore, testing};

    fn pipeline(store: &SqliteStore) -> Arc<Pipeline<SqliteStore>> {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(ScriptedAdapter::returning(
            "andreani",
            15,
            vec![EventCandidate {
                occurred_at: Utc.with_ymd_and_hms(2025, 3, 7, 14, 30, 0).unwrap(),
                status: Some(Status::InTransit),
                raw_status: None,
                description: None,
                location: None,
            }],
        )));
        Arc::new(Pipeline::new(
            JobQueue::new(store.clone(), QueueConfig::default()),
            Arc::new(registry),
            Arc::new(RecordingNotifier::default()),
            Duration::from_secs(5),
        ))
    }

    fn fetch(shipment_id: &str) -> Job {
        Job::FetchEvents(FetchEvents {
            shipment_id: shipment_id.to_owned(),
            carrier_slug: None,
            tracking_code: None,
        })
    }

    #[tokio::test]
    async fn pool_runs_queued_jobs_and_drains_on_shutdown() {
        let store = testing::store().await;
        let pipeline = pipeline(&store);
        let shipment = testing::shipment(&store, "ana@example.com", "andreani", "360002423941550").await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pool = WorkerPool::new(
            Arc::clone(&pipeline),
            WorkerConfig {
                concurrency: 2,
                poll_interval: Duration::from_millis(10),
                stale_after: Duration::from_secs(300),
            },
        );
        let handle = tokio::spawn(pool.run(shutdown_rx));

        pipeline
            .queue()
            .enqueue(&resync_key("andreani", "360002423941550"), &fetch(&shipment.id))
            .await
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while store.count_events(&shipment.id).await.unwrap() == 0 {
            assert!(Instant::now() < deadline, "job never ran");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("pool did not stop")
            .unwrap();
    }

    #[tokio::test]
    #[traced_test]
    async fn final_failure_is_retained_with_its_error() {
        let store = testing::store().await;
        let pipeline = pipeline(&store);
        pipeline.queue().enqueue("k", &fetch("missing")).await.unwrap();

        let job = pipeline.queue().claim().await.unwrap().unwrap();
        process(&pipeline, job.clone()).await;

        let failed = store.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error_msg.as_deref(), Some("shipment missing not found"));
        assert!(logs_contain("job failed permanently"));
    }

    #[tokio::test]
    async fn unknown_job_name_fails_without_retry() {
        let store = testing::store().await;
        let pipeline = pipeline(&store);
        store
            .enqueue_job(crate::store::NewJob {
                id: "j1".into(),
                job_key: "legacy".into(),
                name: "reindex".into(),
                payload: "{}".into(),
                max_attempts: 3,
                available_at: Utc::now(),
            })
            .await
            .unwrap();

        let job = pipeline.queue().claim().await.unwrap().unwrap();
        process(&pipeline, job).await;
        assert_eq!(store.get_job("j1").await.unwrap().unwrap().status, JobStatus::Failed);
    }
}
