//! Tracking sync pipeline.
//!
//! Registration persists a shipment and queues its first fetch. Workers drain
//! the queue: a `fetch-events` job runs the carrier adapter, ingests the
//! timeline idempotently and notifies owners whose shipment changed. A cron
//! scheduler periodically fans a resync out to every non-terminal shipment.

pub mod detect;
pub mod error;
pub mod ingest;
pub mod notify;
pub mod pipeline;
pub mod queue;
pub mod registration;
pub mod scheduler;
pub mod store;
pub mod worker;

pub use detect::{Change, detect};
pub use error::{RegistrationError, SyncError};
pub use ingest::{IngestError, ingest_batch};
pub use notify::{LogNotifier, Notification, Notifier, NotifyError, ResendNotifier};
pub use pipeline::{FanOut, FetchOutcome, Pipeline, PipelineStore};
pub use queue::{FetchEvents, Job, JobQueue, QueueConfig};
pub use scheduler::Scheduler;
pub use store::SqliteStore;
pub use worker::{WorkerConfig, WorkerPool};
