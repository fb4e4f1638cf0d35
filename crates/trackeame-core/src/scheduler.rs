//! Periodic trigger for the pending-shipment resync.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::sync::watch;
use tracing::{error, info};

use crate::error::SyncError;
use crate::queue::{Job, JobQueue, SCHEDULER_KEY};
use crate::store::{EnqueueOutcome, JobStore};

pub const DEFAULT_SYNC_CRON: &str = "*/30 * * * *";

/// Parse a cron expression. The `cron` crate wants a seconds field, so
/// classic five-field expressions fire at second zero.
pub fn parse_schedule(expression: &str) -> Result<Schedule, cron::error::Error> {
    let normalized = if expression.split_whitespace().count() == 5 {
        format!("0 {expression}")
    } else {
        expression.to_owned()
    };
    Schedule::from_str(&normalized)
}

#[derive(Debug, Clone)]
pub struct Scheduler<S> {
    queue: JobQueue<S>,
    schedule: Schedule,
}

impl<S: JobStore> Scheduler<S> {
    pub fn new(queue: JobQueue<S>, expression: &str) -> Result<Self, cron::error::Error> {
        Ok(Self {
            queue,
            schedule: parse_schedule(expression)?,
        })
    }

    pub fn next_fire(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// Enqueue a `SyncAllPending` run. A no-op while a previous one is live.
    pub async fn trigger(&self) -> Result<EnqueueOutcome, SyncError> {
        self.queue.enqueue(SCHEDULER_KEY, &Job::SyncAllPending).await
    }

    /// Fire on schedule until `shutdown` becomes `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let now = Utc::now();
            let Some(next) = self.next_fire(now) else {
                error!("sync schedule has no upcoming fire time; scheduler stopped");
                return;
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            info!(next_run = %next, "next pending-shipment sync scheduled");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => {
                    info!("scheduler stopped");
                    return;
                }
            }
            if *shutdown.borrow() {
                return;
            }

            match self.trigger().await {
                Ok(EnqueueOutcome::Enqueued { id }) => info!(job_id = %id, "pending-shipment sync triggered"),
                Ok(EnqueueOutcome::Deduplicated) => info!("previous pending-shipment sync still live; skipped"),
                Err(e) => error!(error = %e, "failed to trigger pending-shipment sync"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::queue::QueueConfig;
    use crate::store::SqliteStore;

    #[test]
    fn five_field_expressions_fire_on_the_minute() {
        let schedule = parse_schedule(DEFAULT_SYNC_CRON).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 3, 7, 10, 5, 12).unwrap();
        let next: Vec<_> = schedule.after(&after).take(2).collect();
        assert_eq!(next[0], Utc.with_ymd_and_hms(2025, 3, 7, 10, 30, 0).unwrap());
        assert_eq!(next[1], Utc.with_ymd_and_hms(2025, 3, 7, 11, 0, 0).unwrap());
    }

    #[test]
    fn malformed_expression_is_rejected() {
        assert!(parse_schedule("every half hour").is_err());
    }

    #[tokio::test]
    async fn overlapping_triggers_collapse() {
        let queue = JobQueue::new(SqliteStore::in_memory().await.unwrap(), QueueConfig::default());
        let scheduler = Scheduler::new(queue.clone(), DEFAULT_SYNC_CRON).unwrap();

        assert!(matches!(scheduler.trigger().await.unwrap(), EnqueueOutcome::Enqueued { .. }));
        assert_eq!(scheduler.trigger().await.unwrap(), EnqueueOutcome::Deduplicated);

        // Once the run finishes the next trigger goes through.
        let job = queue.claim().await.unwrap().unwrap();
        assert_eq!(job.job_key, SCHEDULER_KEY);
        queue.complete(&job).await.unwrap();
        assert!(matches!(scheduler.trigger().await.unwrap(), EnqueueOutcome::Enqueued { .. }));
    }

    #[tokio::test]
    async fn stops_on_shutdown() {
        let queue = JobQueue::new(SqliteStore::in_memory().await.unwrap(), QueueConfig::default());
        let scheduler = Scheduler::new(queue, "0 0 1 1 *").unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(scheduler.run(rx));
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
    }
}
