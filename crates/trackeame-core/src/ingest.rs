//! Event ingestion: merge adapter output into persisted state.

use thiserror::Error;
use tracing::debug;
use trackeame_types::{EventCandidate, TrackingEvent};

use crate::store::EventStore;

/// A batch stopped partway. Events before the failing one stay persisted.
#[derive(Debug, Error)]
#[error("ingested {ingested} of {total} events before failing: {source}")]
pub struct IngestError {
    pub ingested: usize,
    pub total: usize,
    #[source]
    pub source: sqlx::Error,
}

/// Upsert one event and advance the shipment summary.
pub async fn upsert<S: EventStore>(
    store: &S,
    shipment_id: &str,
    event: &EventCandidate,
) -> Result<TrackingEvent, sqlx::Error> {
    store.upsert_event(shipment_id, event).await
}

/// Ingest an adapter's events one by one, in the order given.
///
/// Callers pass events sorted by `occurred_at` ascending so the summary ends on
/// the latest event. Returns how many events were ingested.
pub async fn ingest_batch<S: EventStore>(
    store: &S,
    shipment_id: &str,
    events: &[EventCandidate],
) -> Result<usize, IngestError> {
    for (ingested, event) in events.iter().enumerate() {
        if let Err(source) = upsert(store, shipment_id, event).await {
            return Err(IngestError {
                ingested,
                total: events.len(),
                source,
            });
        }
    }
    debug!(shipment_id, events = events.len(), "events ingested");
    Ok(events.len())
}
