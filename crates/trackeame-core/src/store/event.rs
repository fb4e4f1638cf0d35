use std::future::Future;

use chrono::Utc;
use trackeame_types::{EventCandidate, Status, TrackingEvent, new_id, timestamp_text};

use super::shipment::SUMMARY_UPDATE;
use super::{SqliteStore, parse_status, parse_timestamp};

type EventRow = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    String,
);

fn event_from_row(row: EventRow) -> Result<TrackingEvent, sqlx::Error> {
    let (id, shipment_id, occurred_at, status, raw_status, description, location, created_at, updated_at) = row;
    Ok(TrackingEvent {
        id,
        shipment_id,
        occurred_at: parse_timestamp(&occurred_at, "tracking_events.occurred_at")?,
        status: parse_status(status),
        raw_status,
        description,
        location,
        created_at: parse_timestamp(&created_at, "tracking_events.created_at")?,
        updated_at: parse_timestamp(&updated_at, "tracking_events.updated_at")?,
    })
}

pub trait EventStore: Send + Sync + 'static {
    /// Insert or refresh the event at `(shipment_id, event.occurred_at)` and
    /// advance the shipment summary, atomically.
    ///
    /// Fails with [`sqlx::Error::RowNotFound`] when the shipment does not
    /// exist; nothing is written in that case.
    fn upsert_event(
        &self,
        shipment_id: &str,
        event: &EventCandidate,
    ) -> impl Future<Output = Result<TrackingEvent, sqlx::Error>> + Send;

    /// Newest first.
    fn list_events(
        &self,
        shipment_id: &str,
    ) -> impl Future<Output = Result<Vec<TrackingEvent>, sqlx::Error>> + Send;

    fn count_events(&self, shipment_id: &str) -> impl Future<Output = Result<u64, sqlx::Error>> + Send;
}

impl EventStore for SqliteStore {
    async fn upsert_event(&self, shipment_id: &str, event: &EventCandidate) -> Result<TrackingEvent, sqlx::Error> {
        let now = timestamp_text(&Utc::now());
        let occurred_at = timestamp_text(&event.occurred_at);
        let status = event.status.map(Status::as_str);

        let mut tx = self.pool.begin().await?;

        let summary = sqlx::query(SUMMARY_UPDATE)
            .bind(status)
            .bind(&occurred_at)
            .bind(&now)
            .bind(shipment_id)
            .execute(&mut *tx)
            .await?;
        if summary.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        let row: EventRow = sqlx::query_as(
            "INSERT INTO tracking_events (id, shipment_id, occurred_at, status, raw_status, description, \
             location, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8) \
             ON CONFLICT (shipment_id, occurred_at) DO UPDATE SET \
             status = excluded.status, raw_status = excluded.raw_status, \
             description = excluded.description, location = excluded.location, \
             updated_at = excluded.updated_at \
             RETURNING id, shipment_id, occurred_at, status, raw_status, description, location, \
             created_at, updated_at",
        )
        .bind(new_id())
        .bind(shipment_id)
        .bind(&occurred_at)
        .bind(status)
        .bind(&event.raw_status)
        .bind(&event.description)
        .bind(&event.location)
        .bind(&now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        event_from_row(row)
    }

    async fn list_events(&self, shipment_id: &str) -> Result<Vec<TrackingEvent>, sqlx::Error> {
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT id, shipment_id, occurred_at, status, raw_status, description, location, \
             created_at, updated_at FROM tracking_events WHERE shipment_id = ?1 \
             ORDER BY occurred_at DESC",
        )
        .bind(shipment_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(event_from_row).collect()
    }

    async fn count_events(&self, shipment_id: &str) -> Result<u64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tracking_events WHERE shipment_id = ?1")
            .bind(shipment_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::store::{ShipmentStore, testing};

    fn candidate(day: u32, status: Status, description: &str) -> EventCandidate {
        EventCandidate {
            occurred_at: Utc.with_ymd_and_hms(2025, 3, day, 12, 0, 0).unwrap(),
            status: Some(status),
            raw_status: None,
            description: Some(description.to_owned()),
            location: None,
        }
    }

    #[tokio::test]
    async fn same_timestamp_updates_in_place() {
        let store = testing::store().await;
        let shipment = testing::shipment(&store, "ana@example.com", "andreani", "360002423941550").await;

        let first = store
            .upsert_event(&shipment.id, &candidate(7, Status::InTransit, "En camino"))
            .await
            .unwrap();
        let mut refined = candidate(7, Status::InTransit, "En camino a Córdoba");
        refined.location = Some("Córdoba".into());
        let second = store.upsert_event(&shipment.id, &refined).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.description.as_deref(), Some("En camino a Córdoba"));
        assert_eq!(second.location.as_deref(), Some("Córdoba"));
        assert_eq!(store.count_events(&shipment.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_shipment_writes_nothing() {
        let store = testing::store().await;
        let err = store
            .upsert_event("missing", &candidate(7, Status::Pending, "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, sqlx::Error::RowNotFound));
        assert_eq!(store.count_events("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn events_are_listed_newest_first_and_summary_follows_latest() {
        let store = testing::store().await;
        let shipment = testing::shipment(&store, "ana@example.com", "andreani", "360002423941550").await;
        for event in [
            candidate(7, Status::Pending, "Pendiente de ingreso"),
            candidate(8, Status::InTransit, "En camino"),
        ] {
            store.upsert_event(&shipment.id, &event).await.unwrap();
        }

        let events = store.list_events(&shipment.id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].occurred_at > events[1].occurred_at);

        let snapshot = store.snapshot(&shipment.id).await.unwrap();
        assert_eq!(snapshot.last_status, Some(Status::InTransit));
        assert_eq!(snapshot.event_count, 2);
    }
}
