use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Status;

/// The owner of a shipment and the notification recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
}

/// A tracked parcel. `(user_id, carrier_id, tracking_code)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: String,
    pub user_id: String,
    pub carrier_id: String,
    pub tracking_code: String,
    /// Status of the most recently ingested event.
    pub last_status: Option<Status>,
    /// Carrier time of the most recently ingested event.
    pub last_event_at: Option<DateTime<Utc>>,
    /// Time of the latest sync attempt that touched this shipment.
    pub last_checked_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The part of a shipment's state the change detector compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShipmentSnapshot {
    pub last_status: Option<Status>,
    pub event_count: u64,
}

impl ShipmentSnapshot {
    pub fn new(last_status: Option<Status>, event_count: u64) -> Self {
        Self {
            last_status,
            event_count,
        }
    }
}
