use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Status;

/// A normalized timeline entry produced by a carrier adapter, not yet stored.
///
/// `occurred_at` is always present: entries whose carrier timestamp cannot be
/// parsed are dropped by the adapter before a candidate is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCandidate {
    pub occurred_at: DateTime<Utc>,
    pub status: Option<Status>,
    /// Carrier-native status text, kept for audit.
    pub raw_status: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
}

/// A persisted timeline entry. `(shipment_id, occurred_at)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub id: String,
    pub shipment_id: String,
    pub occurred_at: DateTime<Utc>,
    pub status: Option<Status>,
    pub raw_status: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
