use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Serialize;
use trackeame_types::{Carrier, Shipment, ShipmentSnapshot, Status, timestamp_text};

use super::{SqliteStore, parse_optional_timestamp, parse_status, parse_timestamp};

/// A shipment together with the carrier it is tracked with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedShipment {
    pub shipment: Shipment,
    pub carrier: Carrier,
}

const TRACKED_COLUMNS: &str = "s.id, s.user_id, s.carrier_id, s.tracking_code, s.last_status, \
     s.last_event_at, s.last_checked_at, s.created_at, s.updated_at, \
     c.name, c.slug, c.website";

type TrackedRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
);

fn tracked_from_row(row: TrackedRow) -> Result<TrackedShipment, sqlx::Error> {
    let (
        id,
        user_id,
        carrier_id,
        tracking_code,
        last_status,
        last_event_at,
        last_checked_at,
        created_at,
        updated_at,
        name,
        slug,
        website,
    ) = row;
    Ok(TrackedShipment {
        carrier: Carrier {
            id: carrier_id.clone(),
            name,
            slug,
            website,
        },
        shipment: Shipment {
            id,
            user_id,
            carrier_id,
            tracking_code,
            last_status: parse_status(last_status),
            last_event_at: parse_optional_timestamp(last_event_at, "shipments.last_event_at")?,
            last_checked_at: parse_timestamp(&last_checked_at, "shipments.last_checked_at")?,
            created_at: parse_timestamp(&created_at, "shipments.created_at")?,
            updated_at: parse_timestamp(&updated_at, "shipments.updated_at")?,
        },
    })
}

/// Advance the summary only when the event is not older than the one it
/// already reflects; `last_checked_at` always moves.
pub(crate) const SUMMARY_UPDATE: &str = "UPDATE shipments SET \
     last_status = CASE WHEN last_event_at IS NULL OR last_event_at <= ?2 THEN ?1 ELSE last_status END, \
     last_event_at = CASE WHEN last_event_at IS NULL OR last_event_at <= ?2 THEN ?2 ELSE last_event_at END, \
     last_checked_at = ?3, updated_at = ?3 \
     WHERE id = ?4";

pub trait ShipmentStore: Send + Sync + 'static {
    /// Insert a new shipment. Fails with a unique violation when the owner
    /// already tracks this code with this carrier.
    fn insert_shipment(&self, shipment: &Shipment) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn get_shipment(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<TrackedShipment>, sqlx::Error>> + Send;

    /// Like [`Self::get_shipment`], restricted to one owner.
    fn get_user_shipment(
        &self,
        user_id: &str,
        id: &str,
    ) -> impl Future<Output = Result<Option<TrackedShipment>, sqlx::Error>> + Send;

    /// Newest first.
    fn list_user_shipments(
        &self,
        user_id: &str,
        limit: u32,
        offset: u64,
    ) -> impl Future<Output = Result<Vec<TrackedShipment>, sqlx::Error>> + Send;

    fn count_user_shipments(&self, user_id: &str) -> impl Future<Output = Result<u64, sqlx::Error>> + Send;

    /// Shipments whose status is unknown or not terminal.
    fn find_pending_shipments(&self) -> impl Future<Output = Result<Vec<TrackedShipment>, sqlx::Error>> + Send;

    /// Every shipment, across owners, tracking `tracking_code` with `carrier_id`.
    fn find_shipments_by_code(
        &self,
        carrier_id: &str,
        tracking_code: &str,
    ) -> impl Future<Output = Result<Vec<TrackedShipment>, sqlx::Error>> + Send;

    fn update_shipment_summary(
        &self,
        id: &str,
        status: Option<Status>,
        event_at: DateTime<Utc>,
        checked_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Record a sync attempt that produced no events.
    fn touch_checked(
        &self,
        id: &str,
        checked_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Summary status and event count, as compared by the change detector.
    fn snapshot(&self, id: &str) -> impl Future<Output = Result<ShipmentSnapshot, sqlx::Error>> + Send;
}

impl ShipmentStore for SqliteStore {
    async fn insert_shipment(&self, shipment: &Shipment) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO shipments (id, user_id, carrier_id, tracking_code, last_status, last_event_at, \
             last_checked_at, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&shipment.id)
        .bind(&shipment.user_id)
        .bind(&shipment.carrier_id)
        .bind(&shipment.tracking_code)
        .bind(shipment.last_status.map(Status::as_str))
        .bind(shipment.last_event_at.as_ref().map(timestamp_text))
        .bind(timestamp_text(&shipment.last_checked_at))
        .bind(timestamp_text(&shipment.created_at))
        .bind(timestamp_text(&shipment.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_shipment(&self, id: &str) -> Result<Option<TrackedShipment>, sqlx::Error> {
        let row: Option<TrackedRow> = sqlx::query_as(&format!(
            "SELECT {TRACKED_COLUMNS} FROM shipments s JOIN carriers c ON c.id = s.carrier_id \
             WHERE s.id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(tracked_from_row).transpose()
    }

    async fn get_user_shipment(&self, user_id: &str, id: &str) -> Result<Option<TrackedShipment>, sqlx::Error> {
        let row: Option<TrackedRow> = sqlx::query_as(&format!(
            "SELECT {TRACKED_COLUMNS} FROM shipments s JOIN carriers c ON c.id = s.carrier_id \
             WHERE s.id = ?1 AND s.user_id = ?2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(tracked_from_row).transpose()
    }

    async fn list_user_shipments(
        &self,
        user_id: &str,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<TrackedShipment>, sqlx::Error> {
        let rows: Vec<TrackedRow> = sqlx::query_as(&format!(
            "SELECT {TRACKED_COLUMNS} FROM shipments s JOIN carriers c ON c.id = s.carrier_id \
             WHERE s.user_id = ?1 ORDER BY s.created_at DESC, s.id LIMIT ?2 OFFSET ?3"
        ))
        .bind(user_id)
        .bind(i64::from(limit))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(tracked_from_row).collect()
    }

    async fn count_user_shipments(&self, user_id: &str) -> Result<u64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM shipments WHERE user_id = ?1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn find_pending_shipments(&self) -> Result<Vec<TrackedShipment>, sqlx::Error> {
        let rows: Vec<TrackedRow> = sqlx::query_as(&format!(
            "SELECT {TRACKED_COLUMNS} FROM shipments s JOIN carriers c ON c.id = s.carrier_id \
             WHERE s.last_status IS NULL OR s.last_status NOT IN (?1, ?2) \
             ORDER BY s.last_checked_at"
        ))
        .bind(Status::TERMINAL[0].as_str())
        .bind(Status::TERMINAL[1].as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(tracked_from_row).collect()
    }

    async fn find_shipments_by_code(
        &self,
        carrier_id: &str,
        tracking_code: &str,
    ) -> Result<Vec<TrackedShipment>, sqlx::Error> {
        let rows: Vec<TrackedRow> = sqlx::query_as(&format!(
            "SELECT {TRACKED_COLUMNS} FROM shipments s JOIN carriers c ON c.id = s.carrier_id \
             WHERE s.carrier_id = ?1 AND s.tracking_code = ?2 ORDER BY s.created_at"
        ))
        .bind(carrier_id)
        .bind(tracking_code)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(tracked_from_row).collect()
    }

    async fn update_shipment_summary(
        &self,
        id: &str,
        status: Option<Status>,
        event_at: DateTime<Utc>,
        checked_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        let result = sqlx::query(SUMMARY_UPDATE)
            .bind(status.map(Status::as_str))
            .bind(timestamp_text(&event_at))
            .bind(timestamp_text(&checked_at))
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }

    async fn touch_checked(&self, id: &str, checked_at: DateTime<Utc>) -> Result<(), sqlx::Error> {
        let now = timestamp_text(&checked_at);
        sqlx::query("UPDATE shipments SET last_checked_at = ?1, updated_at = ?1 WHERE id = ?2")
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn snapshot(&self, id: &str) -> Result<ShipmentSnapshot, sqlx::Error> {
        let row: Option<(Option<String>, i64)> = sqlx::query_as(
            "SELECT s.last_status, (SELECT COUNT(*) FROM tracking_events e WHERE e.shipment_id = s.id) \
             FROM shipments s WHERE s.id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        let (status, count) = row.ok_or(sqlx::Error::RowNotFound)?;
        Ok(ShipmentSnapshot::new(parse_status(status), count.max(0) as u64))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::store::testing;
    use crate::store::is_unique_violation;

    #[tokio::test]
    async fn duplicate_registration_is_a_unique_violation() {
        let store = testing::store().await;
        let first = testing::shipment(&store, "ana@example.com", "andreani", "360002423941550").await;

        let mut again = first.clone();
        again.id = trackeame_types::new_id();
        let err = store.insert_shipment(&again).await.unwrap_err();
        assert!(is_unique_violation(&err));

        // Another user may track the same parcel.
        testing::shipment(&store, "beto@example.com", "andreani", "360002423941550").await;
        let siblings = store
            .find_shipments_by_code(&first.carrier_id, "360002423941550")
            .await
            .unwrap();
        assert_eq!(siblings.len(), 2);
        assert!(siblings.iter().all(|t| t.carrier.slug == "andreani"));
    }

    #[tokio::test]
    async fn terminal_shipments_are_not_pending() {
        let store = testing::store().await;
        let at = Utc.with_ymd_and_hms(2025, 3, 7, 12, 0, 0).unwrap();
        let mut expected = Vec::new();
        for (code, status) in [
            ("000000000000001", None),
            ("000000000000002", Some(Status::InTransit)),
            ("000000000000003", Some(Status::Failed)),
            ("000000000000004", Some(Status::Delivered)),
            ("000000000000005", Some(Status::Cancelled)),
        ] {
            let shipment = testing::shipment(&store, "ana@example.com", "andreani", code).await;
            if let Some(status) = status {
                store
                    .update_shipment_summary(&shipment.id, Some(status), at, at)
                    .await
                    .unwrap();
            }
            if !status.is_some_and(Status::is_terminal) {
                expected.push(shipment.id);
            }
        }

        let mut pending: Vec<_> = store
            .find_pending_shipments()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.shipment.id)
            .collect();
        pending.sort();
        expected.sort();
        assert_eq!(pending, expected);
    }

    #[tokio::test]
    async fn summary_does_not_regress_to_older_events() {
        let store = testing::store().await;
        let shipment = testing::shipment(&store, "ana@example.com", "andreani", "360002423941550").await;
        let t1 = Utc.with_ymd_and_hms(2025, 3, 7, 12, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2025, 3, 8, 12, 0, 0).unwrap();

        store
            .update_shipment_summary(&shipment.id, Some(Status::InTransit), t2, t2)
            .await
            .unwrap();
        store
            .update_shipment_summary(&shipment.id, Some(Status::Pending), t1, t2)
            .await
            .unwrap();

        let tracked = store.get_shipment(&shipment.id).await.unwrap().unwrap();
        assert_eq!(tracked.shipment.last_status, Some(Status::InTransit));
        assert_eq!(tracked.shipment.last_event_at, Some(t2));

        let err = store
            .update_shipment_summary("missing", Some(Status::Pending), t1, t1)
            .await
            .unwrap_err();
        assert!(matches!(err, sqlx::Error::RowNotFound));
    }

    #[tokio::test]
    async fn listing_is_scoped_to_owner_and_paginated() {
        let store = testing::store().await;
        for code in ["000000000000001", "000000000000002", "000000000000003"] {
            testing::shipment(&store, "ana@example.com", "andreani", code).await;
        }
        let other = testing::shipment(&store, "beto@example.com", "andreani", "000000000000009").await;

        let owner = "uid-ana@example.com";
        assert_eq!(store.count_user_shipments(owner).await.unwrap(), 3);
        assert_eq!(store.list_user_shipments(owner, 2, 0).await.unwrap().len(), 2);
        assert_eq!(store.list_user_shipments(owner, 2, 2).await.unwrap().len(), 1);
        assert!(store.get_user_shipment(owner, &other.id).await.unwrap().is_none());
        assert!(store.get_user_shipment(&other.user_id, &other.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unreadable_stored_timestamp_is_a_decode_error() {
        let store = testing::store().await;
        let shipment = testing::shipment(&store, "ana@example.com", "andreani", "360002423941550").await;
        sqlx::query("UPDATE shipments SET last_event_at = 'ayer' WHERE id = ?1")
            .bind(&shipment.id)
            .execute(store.pool())
            .await
            .unwrap();

        let err = store.get_shipment(&shipment.id).await.unwrap_err();
        assert!(matches!(
            err,
            sqlx::Error::ColumnDecode { ref index, .. } if index == "shipments.last_event_at"
        ));
    }
}
