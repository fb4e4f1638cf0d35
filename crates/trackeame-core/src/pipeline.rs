//! Job handlers: fan-out of the periodic resync and the per-shipment fetch.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use trackeame_carriers::{AdapterError, AdapterRegistry, CarrierAdapter, TrackRequest};
use trackeame_types::{EventCandidate, ShipmentSnapshot};

use crate::detect::detect;
use crate::error::SyncError;
use crate::ingest::ingest_batch;
use crate::notify::{Notification, Notifier};
use crate::queue::{FetchEvents, Job, JobQueue, resync_key};
use crate::store::{
    CarrierStore, EnqueueOutcome, EventStore, JobStore, ShipmentStore, TrackedShipment, UserStore,
};

/// Everything the pipeline needs from persistence.
pub trait PipelineStore:
    ShipmentStore + EventStore + JobStore + UserStore + CarrierStore + Clone + Send + Sync + 'static
{
}

impl<T> PipelineStore for T where
    T: ShipmentStore + EventStore + JobStore + UserStore + CarrierStore + Clone + Send + Sync + 'static
{
}

/// Outcome of a `SyncAllPending` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    pub pending: usize,
    pub enqueued: usize,
    pub deduplicated: usize,
}

/// Outcome of a `FetchEvents` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    pub events: usize,
    /// Shipments (across owners) the events were ingested into.
    pub shipments: usize,
    pub notified: usize,
}

/// Process-wide pipeline context, built once at startup.
#[derive(Debug, Clone)]
pub struct Pipeline<S> {
    store: S,
    queue: JobQueue<S>,
    adapters: Arc<AdapterRegistry>,
    notifier: Arc<dyn Notifier>,
    fetch_timeout: Duration,
}

impl<S: PipelineStore> Pipeline<S> {
    pub fn new(
        queue: JobQueue<S>,
        adapters: Arc<AdapterRegistry>,
        notifier: Arc<dyn Notifier>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            store: queue.store().clone(),
            queue,
            adapters,
            notifier,
            fetch_timeout,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn queue(&self) -> &JobQueue<S> {
        &self.queue
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    pub async fn run(&self, job: &Job) -> Result<(), SyncError> {
        match job {
            Job::SyncAllPending => self.sync_all_pending().await.map(drop),
            Job::FetchEvents(fetch) => self.fetch_events(fetch).await.map(drop),
        }
    }

    /// Enqueue one resync per non-terminal shipment.
    pub async fn sync_all_pending(&self) -> Result<FanOut, SyncError> {
        let pending = self.store.find_pending_shipments().await?;
        let mut fan_out = FanOut {
            pending: pending.len(),
            ..Default::default()
        };
        if pending.is_empty() {
            info!("no pending shipments to sync");
            return Ok(fan_out);
        }

        for TrackedShipment { shipment, carrier } in &pending {
            let job = Job::FetchEvents(FetchEvents {
                shipment_id: shipment.id.clone(),
                carrier_slug: Some(carrier.slug.clone()),
                tracking_code: Some(shipment.tracking_code.clone()),
            });
            match self
                .queue
                .enqueue(&resync_key(&carrier.slug, &shipment.tracking_code), &job)
                .await?
            {
                EnqueueOutcome::Enqueued { .. } => fan_out.enqueued += 1,
                EnqueueOutcome::Deduplicated => fan_out.deduplicated += 1,
            }
        }

        info!(
            pending = fan_out.pending,
            enqueued = fan_out.enqueued,
            deduplicated = fan_out.deduplicated,
            "pending shipments fanned out"
        );
        Ok(fan_out)
    }

    /// Fetch a shipment's timeline, ingest it and notify owners of changes.
    ///
    /// One fetch serves every shipment tracking the same parcel with the same
    /// carrier, since they share the job identity.
    pub async fn fetch_events(&self, fetch: &FetchEvents) -> Result<FetchOutcome, SyncError> {
        let TrackedShipment { shipment, carrier } = self
            .store
            .get_shipment(&fetch.shipment_id)
            .await?
            .ok_or_else(|| SyncError::ShipmentNotFound(fetch.shipment_id.clone()))?;

        let hint_is_stale = fetch.carrier_slug.as_deref().is_some_and(|s| s != carrier.slug)
            || fetch
                .tracking_code
                .as_deref()
                .is_some_and(|c| c != shipment.tracking_code);
        if hint_is_stale {
            debug!(shipment_id = %shipment.id, "job payload hints are stale; using stored shipment");
        }

        let adapter = self
            .adapters
            .get(&carrier.slug)
            .ok_or_else(|| SyncError::UnknownCarrier(carrier.slug.clone()))?;

        let owners = self
            .store
            .find_shipments_by_code(&carrier.id, &shipment.tracking_code)
            .await?;
        let mut before = Vec::with_capacity(owners.len());
        for owner in &owners {
            before.push(self.store.snapshot(&owner.shipment.id).await?);
        }

        let request = TrackRequest {
            shipment_id: shipment.id.clone(),
            carrier_slug: carrier.slug.clone(),
            tracking_code: shipment.tracking_code.clone(),
        };
        let events = self.track(adapter.as_ref(), &request).await?;

        let mut outcome = FetchOutcome {
            events: events.len(),
            shipments: owners.len(),
            notified: 0,
        };
        for (owner, before) in owners.iter().zip(&before) {
            if self.ingest_and_detect(owner, before, &events).await? {
                outcome.notified += 1;
            }
        }

        info!(
            shipment_id = %shipment.id,
            carrier = %carrier.slug,
            events = outcome.events,
            shipments = outcome.shipments,
            notified = outcome.notified,
            "shipment synced"
        );
        Ok(outcome)
    }

    /// Run the adapter under the fetch deadline. Dropping the adapter future
    /// on timeout releases whatever page it held.
    async fn track(
        &self,
        adapter: &dyn CarrierAdapter,
        request: &TrackRequest,
    ) -> Result<Vec<EventCandidate>, AdapterError> {
        match tokio::time::timeout(self.fetch_timeout, adapter.track(request)).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::FetchTimeout {
                url: format!("{}:{}", request.carrier_slug, request.tracking_code),
                after: self.fetch_timeout,
            }),
        }
    }

    /// Returns whether the owner was notified.
    async fn ingest_and_detect(
        &self,
        owner: &TrackedShipment,
        before: &ShipmentSnapshot,
        events: &[EventCandidate],
    ) -> Result<bool, SyncError> {
        let shipment_id = &owner.shipment.id;
        if events.is_empty() {
            self.store.touch_checked(shipment_id, Utc::now()).await?;
        } else {
            ingest_batch(&self.store, shipment_id, events).await?;
        }

        let after = self.store.snapshot(shipment_id).await?;
        let Some(change) = detect(before, &after) else {
            return Ok(false);
        };
        debug!(shipment_id = %shipment_id, ?change, "shipment changed");
        Ok(self.notify_owner(shipment_id).await)
    }

    /// Best-effort: failures are logged, never returned.
    async fn notify_owner(&self, shipment_id: &str) -> bool {
        let loaded = async {
            let Some(tracked) = self.store.get_shipment(shipment_id).await? else {
                return Ok(None);
            };
            let user = self.store.get_user(&tracked.shipment.user_id).await?;
            Ok::<_, sqlx::Error>(user.map(|user| Notification {
                user,
                shipment: tracked.shipment,
                carrier: tracked.carrier,
            }))
        };

        let notification = match loaded.await {
            Ok(Some(notification)) => notification,
            Ok(None) => {
                warn!(shipment_id, "shipment owner not found; skipping notification");
                return false;
            }
            Err(e) => {
                warn!(shipment_id, error = %e, "failed to load notification data");
                return false;
            }
        };

        match self.notifier.notify(&notification).await {
            Ok(()) => true,
            Err(e) => {
                warn!(shipment_id, error = %e, "failed to notify shipment owner");
                false
            }
        }
    }
}
